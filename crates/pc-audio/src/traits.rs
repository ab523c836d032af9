//! Audio output trait and error types.

use pc_engine::Frame;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("device init error: {0}")]
    DeviceInit(String),

    #[error("stream create error: {0}")]
    StreamCreate(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("no audio device available")]
    NoDevice,
}

/// A sink for rendered frames.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Queue frames without blocking. Returns how many were accepted.
    fn write(&mut self, frames: &[Frame]) -> usize;

    fn start(&mut self) -> Result<(), AudioError>;

    fn stop(&mut self) -> Result<(), AudioError>;
}

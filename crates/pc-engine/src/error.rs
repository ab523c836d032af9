//! Error types for the playback engine.

use pc_ir::ChipFamily;
use thiserror::Error;

/// Errors raised by engine construction and playback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The mixer made no clock progress for too many passes in one block.
    #[error("hang detected: no clock progress after {iterations} passes")]
    Hang { iterations: u32 },

    #[error("subsong {0} does not exist")]
    UnknownSubsong(usize),

    #[error("no backend registered for chip family {0}")]
    NoBackend(ChipFamily),

    #[error("song has {song} channels but subsong has {subsong}")]
    ChannelMismatch { song: usize, subsong: usize },

    #[error("song has no chips")]
    NoSystems,

    #[error("invalid output sample rate {0}")]
    InvalidSampleRate(u32),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Errors raised by MIDI sinks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device is not open")]
    NotOpen,

    #[error("failed to open device: {0}")]
    Open(String),

    #[error("failed to close device: {0}")]
    Close(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

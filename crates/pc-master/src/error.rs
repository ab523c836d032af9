//! Controller errors.

use pc_audio::AudioError;
use pc_engine::EngineError;
use pc_formats::FormatError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MasterError {
    #[error("invalid config: {0}")]
    Config(String),

    #[error("no song loaded")]
    NoSong,

    #[error("playback thread exited before starting")]
    ThreadStart,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for MasterError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for MasterError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MasterError>;

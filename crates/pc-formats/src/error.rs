//! Error type for the codecs and file formats.

use pc_engine::EngineError;
use thiserror::Error;

/// Result type for format operations.
pub type Result<T> = std::result::Result<T, FormatError>;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// Invalid file header or magic bytes
    #[error("invalid header")]
    InvalidHeader,

    #[error("unsupported format version {0:#x}")]
    UnsupportedVersion(u32),

    #[error("invalid note '{0}'")]
    InvalidNote(String),

    #[error("invalid cell: {0}")]
    InvalidCell(String),

    #[error("invalid song: {0}")]
    InvalidSong(String),

    #[error("TOML error: {0}")]
    Toml(String),

    #[error("binary format error: {0}")]
    Binrw(#[from] binrw::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<toml::de::Error> for FormatError {
    fn from(err: toml::de::Error) -> Self {
        FormatError::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for FormatError {
    fn from(err: toml::ser::Error) -> Self {
        FormatError::Toml(err.to_string())
    }
}

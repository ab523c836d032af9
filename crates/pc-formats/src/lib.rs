//! File formats for the polychip sequencer.
//!
//! The run-length compiled pattern form, tracker cell notation, TOML song
//! files, register-log export and WAV output.

pub mod compiled;
mod error;
pub mod export;
pub mod notation;
pub mod song_file;
mod wav;

pub use compiled::{compile, decompile, effective};
pub use error::{FormatError, Result};
pub use export::{export_register_log, ExportOptions, RegisterLog};
pub use notation::{format_cell, parse_cell};
pub use song_file::{load_song, parse_song, song_to_toml, SongFile};
pub use wav::{write_wav, WavWriter};

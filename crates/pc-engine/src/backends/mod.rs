//! Reference chip backends.

mod psg;
mod silent;
mod voice;

pub use psg::{PsgBackend, PsgVariant};
pub use silent::{SilentBackend, SILENT_RATE};
pub use voice::{Voice, VoiceResult};

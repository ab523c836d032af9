//! Live note input events.

/// A note pressed or released outside of song playback (keyboard, MIDI in).
///
/// Events are queued by the control plane and turned into commands at the
/// start of the next audio block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteEvent {
    pub channel: usize,
    pub instrument: u8,
    pub note: i32,
    pub on: bool,
}

impl NoteEvent {
    pub const fn on(channel: usize, instrument: u8, note: i32) -> Self {
        Self { channel, instrument, note, on: true }
    }

    pub const fn off(channel: usize) -> Self {
        Self { channel, instrument: 0, note: 0, on: false }
    }
}

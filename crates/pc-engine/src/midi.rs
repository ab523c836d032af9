//! MIDI mirror output.

use crate::error::DeviceError;

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const AFTERTOUCH: u8 = 0xA0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const PITCH_BEND: u8 = 0xE0;
pub const CLOCK: u8 = 0xF8;

/// One short MIDI message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MidiMessage {
    pub status: u8,
    pub data0: u8,
    pub data1: u8,
}

impl MidiMessage {
    pub const fn new(status: u8, data0: u8, data1: u8) -> Self {
        Self { status, data0, data1 }
    }

    /// Channel voice message; `channel` is folded into the low nibble.
    pub const fn channel_voice(kind: u8, channel: usize, data0: u8, data1: u8) -> Self {
        Self::new(kind | (channel & 0x0f) as u8, data0 & 0x7f, data1 & 0x7f)
    }

    pub const fn clock() -> Self {
        Self::new(CLOCK, 0, 0)
    }
}

/// Destination for mirrored MIDI traffic.
///
/// Implementations talk to a real port; the engine only produces messages.
pub trait MidiSink: Send {
    fn open(&mut self, name: &str) -> Result<(), DeviceError>;
    fn close(&mut self) -> Result<(), DeviceError>;
    fn is_device_open(&self) -> bool;
    fn send(&mut self, message: MidiMessage);
}

/// A sink that records messages in memory. Useful for tests and dumps.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    open: bool,
    pub messages: Vec<MidiMessage>,
}

impl RecordingSink {
    /// A sink that is already open.
    pub fn opened() -> Self {
        Self { open: true, messages: Vec::new() }
    }
}

impl MidiSink for RecordingSink {
    fn open(&mut self, _name: &str) -> Result<(), DeviceError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::NotOpen);
        }
        self.open = false;
        Ok(())
    }

    fn is_device_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, message: MidiMessage) {
        if self.open {
            self.messages.push(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_voice_masks_data() {
        let msg = MidiMessage::channel_voice(NOTE_ON, 17, 200, 64);
        assert_eq!(msg, MidiMessage::new(0x91, 200 & 0x7f, 64));
    }

    #[test]
    fn closed_sink_drops_messages() {
        let mut sink = RecordingSink::default();
        sink.send(MidiMessage::clock());
        assert!(sink.messages.is_empty());
        assert_eq!(sink.close(), Err(DeviceError::NotOpen));
        sink.open("test").unwrap();
        sink.send(MidiMessage::clock());
        assert_eq!(sink.messages.len(), 1);
    }
}

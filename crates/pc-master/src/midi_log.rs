//! MIDI sink that writes mirrored messages to the log.

use pc_engine::{DeviceError, MidiMessage, MidiSink};

/// Prints each mirrored message at trace level. Clock ticks are counted
/// rather than printed.
#[derive(Debug, Default)]
pub struct LogSink {
    open: bool,
    sent: u64,
    clocks: u64,
}

impl LogSink {
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn clocks(&self) -> u64 {
        self.clocks
    }
}

impl MidiSink for LogSink {
    fn open(&mut self, name: &str) -> Result<(), DeviceError> {
        log::debug!("midi log '{name}' opened");
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::NotOpen);
        }
        log::debug!("midi log closed after {} messages", self.sent);
        self.open = false;
        Ok(())
    }

    fn is_device_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, message: MidiMessage) {
        if !self.open {
            return;
        }
        self.sent += 1;
        if message.status == pc_engine::midi::CLOCK {
            self.clocks += 1;
            return;
        }
        log::trace!(
            "midi {:02x} {:02x} {:02x}",
            message.status,
            message.data0,
            message.data1
        );
    }
}

//! A backend that tracks channel state and register writes but produces no sound.
//!
//! Used for chip families without a synthesis model. Every channel exposes
//! four virtual registers (pitch low, pitch high, volume, key) so the
//! register log and debug views still show what the song is doing.

use pc_ir::{ChipFamily, Command, DISPATCH_ACK, DISPATCH_IGNORED};

use super::voice::{Voice, VoiceResult};
use crate::backend::{ChipBackend, RegisterWrite};

const REGS_PER_CHANNEL: usize = 4;

/// Native rate of the silent backend.
pub const SILENT_RATE: u32 = 44100;

pub struct SilentBackend {
    family: ChipFamily,
    vol_max: i32,
    voices: Vec<Voice>,
    regs: Vec<u8>,
    muted: Vec<bool>,
    logging: bool,
    writes: Vec<RegisterWrite>,
    /// Count of chip-specific commands received, for inspection
    extended: u32,
}

impl SilentBackend {
    pub fn new(family: ChipFamily) -> Self {
        let channels = family.channel_count();
        let vol_max = if family.is_fm() { 127 } else { 15 };
        Self {
            family,
            vol_max,
            voices: vec![Voice::at_volume(vol_max); channels],
            regs: vec![0; channels * REGS_PER_CHANNEL],
            muted: vec![false; channels],
            logging: false,
            writes: Vec::new(),
            extended: 0,
        }
    }

    /// Chip-specific commands seen since the last reset.
    pub fn extended_commands(&self) -> u32 {
        self.extended
    }

    fn write(&mut self, addr: usize, value: u8) {
        if let Some(slot) = self.regs.get_mut(addr) {
            if *slot != value {
                *slot = value;
                if self.logging {
                    self.writes.push(RegisterWrite { addr: addr as u32, value: value as u16 });
                }
            }
        }
    }

    fn sync(&mut self, ch: usize) {
        let voice = self.voices[ch];
        let base = ch * REGS_PER_CHANNEL;
        let pitch = voice.pitch().clamp(0, 0xffff) as u16;
        let volume = if self.muted[ch] { 0 } else { voice.volume.clamp(0, 0xff) as u8 };
        self.write(base, (pitch & 0xff) as u8);
        self.write(base + 1, (pitch >> 8) as u8);
        self.write(base + 2, volume);
        self.write(base + 3, voice.active as u8);
    }
}

impl ChipBackend for SilentBackend {
    fn family(&self) -> ChipFamily {
        self.family
    }

    fn channel_count(&self) -> usize {
        self.voices.len()
    }

    fn rate(&self) -> u32 {
        SILENT_RATE
    }

    fn dispatch(&mut self, cmd: Command) -> i32 {
        let vol_max = self.vol_max;
        let Some(voice) = self.voices.get_mut(cmd.channel) else {
            return DISPATCH_IGNORED;
        };
        match voice.handle(&cmd, vol_max) {
            VoiceResult::Handled(code) => code,
            VoiceResult::Unhandled => {
                self.extended += 1;
                DISPATCH_ACK
            }
        }
    }

    fn acquire(&mut self, buf_l: &mut [i16], buf_r: &mut [i16], start: usize, len: usize) {
        let end = (start + len).min(buf_l.len());
        buf_l[start.min(end)..end].fill(0);
        let end = (start + len).min(buf_r.len());
        buf_r[start.min(end)..end].fill(0);
    }

    fn tick(&mut self, _full_tick: bool) {
        for ch in 0..self.voices.len() {
            if self.voices[ch].take_dirty() {
                self.sync(ch);
            }
        }
    }

    fn reset(&mut self) {
        self.voices.fill(Voice::at_volume(self.vol_max));
        self.regs.fill(0);
        self.extended = 0;
    }

    fn register_pool(&self) -> &[u8] {
        &self.regs
    }

    fn poke(&mut self, addr: u32, value: u16) {
        self.write(addr as usize, value as u8);
    }

    fn set_register_logging(&mut self, enabled: bool) {
        self.logging = enabled;
        if !enabled {
            self.writes.clear();
        }
    }

    fn drain_register_writes(&mut self, out: &mut Vec<RegisterWrite>) {
        out.append(&mut self.writes);
    }

    fn mute(&mut self, channel: usize, muted: bool) {
        if let Some(slot) = self.muted.get_mut(channel) {
            *slot = muted;
            self.voices[channel].dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_ir::Opcode;

    #[test]
    fn fm_families_report_wider_volume() {
        let mut fm = SilentBackend::new(ChipFamily::Ym2612);
        assert_eq!(fm.dispatch(Command::bare(Opcode::GetVolMax, 0)), 127);
        let mut gb = SilentBackend::new(ChipFamily::GameBoy);
        assert_eq!(gb.dispatch(Command::bare(Opcode::GetVolMax, 0)), 15);
    }

    #[test]
    fn tick_logs_only_changes() {
        let mut chip = SilentBackend::new(ChipFamily::Nes);
        chip.set_register_logging(true);
        chip.dispatch(Command::with_value(Opcode::NoteOn, 1, 2));
        chip.tick(true);
        let mut writes = Vec::new();
        chip.drain_register_writes(&mut writes);
        // pitch 256 -> low byte unchanged (0), high byte 1, full volume, key on
        assert_eq!(
            writes,
            vec![
                RegisterWrite { addr: 5, value: 1 },
                RegisterWrite { addr: 6, value: 15 },
                RegisterWrite { addr: 7, value: 1 },
            ]
        );

        chip.tick(true);
        chip.drain_register_writes(&mut writes);
        assert_eq!(writes.len(), 3);
    }

    #[test]
    fn extended_commands_are_acknowledged() {
        let mut chip = SilentBackend::new(ChipFamily::Ym2151);
        assert_eq!(chip.dispatch(Command::with_value(Opcode::FmLfo, 0, 3)), DISPATCH_ACK);
        assert_eq!(chip.extended_commands(), 1);
        assert_eq!(chip.dispatch(Command::with_value(Opcode::FmLfo, 9, 3)), DISPATCH_IGNORED);
    }

    #[test]
    fn output_is_silent() {
        let mut chip = SilentBackend::new(ChipFamily::PcEngine);
        let mut l = vec![5i16; 64];
        let mut r = vec![5i16; 64];
        chip.acquire(&mut l, &mut r, 16, 32);
        assert!(l[16..48].iter().all(|&s| s == 0));
        assert_eq!(l[0], 5);
    }
}

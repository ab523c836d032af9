//! Generic per-channel pitch and volume tracking shared by the reference backends.

use pc_ir::{Command, Opcode, DISPATCH_ACK, DISPATCH_IGNORED, NOTE_NULL, TARGET_REACHED};

use crate::frequency::{note_pitch, pitch_to_hz};

/// Pitch units a `NotePorta` moves per tick for each unit of speed.
const PORTA_STEP: i32 = 4;

/// Command-driven state of one chip channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Voice {
    /// Key is held
    pub active: bool,
    /// Note that started the current sound, in pitch units
    pub base: i32,
    /// Fine offset from `Pitch`
    pub fine: i32,
    pub volume: i32,
    pub instrument: i32,
    pub panning: i32,
    /// Set whenever something the chip registers depend on changed
    pub dirty: bool,
}

/// What a voice did with a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceResult {
    /// Not a voice command; the backend may handle it itself.
    Unhandled,
    /// Handled, return this code.
    Handled(i32),
}

impl Voice {
    /// A released voice at full volume, as after a chip reset.
    pub const fn at_volume(volume: i32) -> Self {
        Self {
            active: false,
            base: 0,
            fine: 0,
            volume,
            instrument: 0,
            panning: 0,
            dirty: false,
        }
    }

    /// Effective pitch in 1/128 semitone units.
    pub fn pitch(&self) -> i32 {
        self.base + self.fine
    }

    pub fn hz(&self) -> f64 {
        pitch_to_hz(self.pitch())
    }

    /// Apply the chip-agnostic part of a command.
    pub fn handle(&mut self, cmd: &Command, vol_max: i32) -> VoiceResult {
        let code = match cmd.opcode {
            Opcode::NoteOn => {
                if cmd.value != NOTE_NULL {
                    self.base = note_pitch(cmd.value);
                }
                self.active = true;
                DISPATCH_ACK
            }
            Opcode::NoteOff | Opcode::NoteOffEnv => {
                self.active = false;
                DISPATCH_ACK
            }
            Opcode::EnvRelease => DISPATCH_ACK,
            Opcode::Instrument => {
                self.instrument = cmd.value;
                DISPATCH_ACK
            }
            Opcode::Volume => {
                self.volume = cmd.value.clamp(0, vol_max);
                DISPATCH_ACK
            }
            Opcode::GetVolume => self.volume,
            Opcode::GetVolMax => vol_max,
            Opcode::Pitch => {
                self.fine = cmd.value;
                DISPATCH_ACK
            }
            Opcode::NotePorta => return VoiceResult::Handled(self.slide(cmd.value, cmd.value2)),
            Opcode::Legato => {
                if cmd.value != NOTE_NULL {
                    self.base = note_pitch(cmd.value);
                }
                DISPATCH_ACK
            }
            Opcode::Panning => {
                self.panning = cmd.value;
                DISPATCH_ACK
            }
            Opcode::PrePorta | Opcode::PreNote => DISPATCH_ACK,
            Opcode::AlwaysSetVolume => DISPATCH_IGNORED,
            _ => return VoiceResult::Unhandled,
        };
        if !cmd.opcode.is_query() {
            self.dirty = true;
        }
        VoiceResult::Handled(code)
    }

    /// Move toward `target` (a note) by `speed` steps.
    fn slide(&mut self, speed: i32, target: i32) -> i32 {
        let dest = note_pitch(target);
        let step = speed.max(0) * PORTA_STEP;
        self.dirty = true;
        if dest > self.base {
            self.base += step;
            if self.base >= dest {
                self.base = dest;
                return TARGET_REACHED;
            }
        } else {
            self.base -= step;
            if self.base <= dest {
                self.base = dest;
                return TARGET_REACHED;
            }
        }
        DISPATCH_ACK
    }

    /// Read and clear the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        core::mem::take(&mut self.dirty)
    }
}

//! Effect decoding.
//!
//! Row effects are resolved in two passes. The pre pass asks the channel's
//! chip table first and falls back to the universal effects; the post pass,
//! run after the row's note, only consults the chip table.

mod chip;
mod universal;

use pc_ir::{ChipFamily, Command, Opcode};

use crate::channel::ChannelRuntimeState;
use crate::context::EngineContext;
use crate::dispatcher::CommandDispatcher;

pub use chip::{post_table, pre_table};
pub(crate) use universal::apply_universal;

/// Chip effect handler: `(song channel, value)` to at most one command.
pub type ChipEffectFn = fn(usize, u8) -> Option<Command>;

/// A chip's effect table, sorted by code.
pub type EffectTable = &'static [(u8, ChipEffectFn)];

/// Find the handler for `code` in a sorted table.
pub fn lookup(table: EffectTable, code: u8) -> Option<ChipEffectFn> {
    table
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|i| table[i].1)
}

/// Kind of the last slide set up on a row, for duplicate handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slide {
    Up,
    Down,
    Porta,
}

/// Vibrato waveform value at `pos` (0..64), -127..=127.
pub fn vibrato_wave(pos: i32) -> i32 {
    let phase = (pos.rem_euclid(64)) as f64 * core::f64::consts::TAU / 64.0;
    libm::round(127.0 * libm::sin(phase)) as i32
}

/// Pitch offset the current vibrato contributes.
pub fn vibrato_offset(chan: &ChannelRuntimeState) -> i32 {
    let raw = (chan.vibrato_depth * vibrato_wave(chan.vibrato_pos) * chan.vibrato_fine) >> 4;
    match chan.vibrato_dir {
        1 => raw.max(0) / 15,
        2 => raw.min(0) / 15,
        _ => raw / 15,
    }
}

/// Everything an effect handler may touch while one channel's row is processed.
pub(crate) struct RowScope<'a> {
    pub ctx: &'a mut EngineContext,
    pub dispatcher: &'a mut CommandDispatcher,
    pub chan: &'a mut ChannelRuntimeState,
    pub channel: usize,
    pub family: ChipFamily,
    pub last_slide: Option<Slide>,
    pub called_porta: bool,
}

impl RowScope<'_> {
    pub fn send(&mut self, cmd: Command) -> i32 {
        self.dispatcher.dispatch(self.chan, cmd)
    }

    pub fn send_op(&mut self, opcode: Opcode, value: i32, value2: i32) -> i32 {
        let cmd = Command::new(opcode, self.channel, value, value2);
        self.send(cmd)
    }

    /// Send the channel's pitch offset including vibrato.
    pub fn send_pitch(&mut self) {
        let pitch = self.chan.pitch + vibrato_offset(self.chan) + self.ctx.global_pitch;
        self.send_op(Opcode::Pitch, pitch, 0);
    }

    /// Run a chip table entry. Returns false if the table has no handler.
    pub fn apply_chip(&mut self, table: EffectTable, code: u8, value: u8) -> bool {
        let Some(handler) = lookup(table, code) else {
            return false;
        };
        if let Some(cmd) = handler(self.channel, value) {
            self.send(cmd);
        }
        true
    }
}

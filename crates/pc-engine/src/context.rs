//! Shared transport state passed to every engine component.

use pc_ir::{PlaybackTime, Song, Subsong};

use crate::clock::ClockState;
use crate::error::{EngineError, Result};
use crate::note_queue::NoteQueue;

/// Coarse playback state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    /// Backends tick for live input but the song does not advance.
    Freelance,
}

/// Boundary at which a requested halt takes effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltMode {
    Tick,
    Row,
    Pattern,
}

/// Step-play progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StepPlay {
    #[default]
    Off,
    /// Play one more row, then hold.
    Armed,
    /// The row has been played; the song position is frozen.
    Holding,
}

/// Target of a pending order jump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderJump {
    /// `0Bxx`: jump to order `xx`
    To(usize),
    /// `0Dxx`: go to the next order
    Next,
}

/// An order jump waiting for the end of the current row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingJump {
    pub target: OrderJump,
    pub row: usize,
}

/// Song position and speed.
#[derive(Clone, Debug, PartialEq)]
pub struct Transport {
    pub state: PlaybackState,
    pub order: usize,
    /// Next row to process
    pub row: usize,
    /// Ticks left in the current row
    pub ticks: i32,
    /// Sub-ticks left in the current tick (low-latency mode)
    pub subticks: i32,
    pub speed1: u8,
    pub speed2: u8,
    pub time_base: u8,
    /// Use `speed2` for the next row
    pub speed_ab: bool,
    /// Speed the next row will use, for `EDxx` range checks
    pub next_speed: i32,
    pub arp_len: i32,
    pub jump: Option<PendingJump>,
    pub end_of_song: bool,
    pub halt_on: Option<HaltMode>,
    pub halted: bool,
    pub step: StepPlay,
    /// `None` loops forever
    pub remaining_loops: Option<u32>,
    /// Set by a new row, cleared after its first tick
    pub first_tick: bool,
    /// Keep looping the current pattern
    pub repeat_pattern: bool,
}

impl Transport {
    /// Initial transport for a subsong.
    pub fn new(subsong: &Subsong) -> Self {
        Self {
            state: PlaybackState::Stopped,
            order: 0,
            row: 0,
            ticks: 1,
            subticks: 0,
            speed1: subsong.speed1,
            speed2: subsong.speed2,
            time_base: subsong.time_base,
            speed_ab: false,
            next_speed: subsong.speed1 as i32,
            arp_len: subsong.arp_len.max(1) as i32,
            jump: None,
            end_of_song: false,
            halt_on: None,
            halted: false,
            step: StepPlay::Off,
            remaining_loops: None,
            first_tick: false,
            repeat_pattern: false,
        }
    }

    /// The song is advancing (not stopped, not live-only).
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Halt now if the requested boundary matches.
    pub fn halt_at(&mut self, boundary: HaltMode) {
        if self.halt_on == Some(boundary) {
            self.halted = true;
        }
    }
}

/// Everything the sequencer, dispatcher and mixer share.
///
/// Built when a song is loaded and dropped with it.
#[derive(Debug)]
pub struct EngineContext {
    pub song: Song,
    pub subsong: usize,
    pub transport: Transport,
    pub clock: ClockState,
    pub elapsed: PlaybackTime,
    /// Pitch offset added to every channel by `EFxx`
    pub global_pitch: i32,
    /// Last `EExx` value
    pub ext_value: Option<u8>,
    /// Channels that started a note since the flags were last read
    pub key_hit: Vec<bool>,
    pub pending_notes: NoteQueue,
    /// Commands dispatched during the last full second of playback
    pub cmds_per_second: u64,
    pub(crate) cmds_at_second: u64,
}

impl EngineContext {
    pub fn new(song: Song, subsong: usize, rate: u32) -> Result<Self> {
        let sub = song
            .subsong(subsong)
            .ok_or(EngineError::UnknownSubsong(subsong))?;
        let channels = song.channel_count();
        if sub.channel_count() != channels {
            return Err(EngineError::ChannelMismatch { song: channels, subsong: sub.channel_count() });
        }
        let transport = Transport::new(sub);
        let clock = ClockState::new(rate, sub.hz);
        Ok(Self {
            song,
            subsong,
            transport,
            clock,
            elapsed: PlaybackTime::ZERO,
            global_pitch: 0,
            ext_value: None,
            key_hit: vec![false; channels],
            pending_notes: NoteQueue::new(),
            cmds_per_second: 0,
            cmds_at_second: 0,
        })
    }

    pub fn sub(&self) -> &Subsong {
        &self.song.subsongs[self.subsong]
    }

    pub fn channel_count(&self) -> usize {
        self.key_hit.len()
    }

    /// Number of orders in the current subsong.
    pub fn order_count(&self) -> usize {
        self.sub().orders.len().max(1)
    }

    /// Put the transport back at the top of the subsong.
    pub fn rewind(&mut self) {
        let sub = &self.song.subsongs[self.subsong];
        let remaining_loops = self.transport.remaining_loops;
        let halt_on = self.transport.halt_on;
        let repeat_pattern = self.transport.repeat_pattern;
        self.transport = Transport::new(sub);
        self.transport.remaining_loops = remaining_loops;
        self.transport.halt_on = halt_on;
        self.transport.repeat_pattern = repeat_pattern;
        self.clock.reset(sub.hz);
        self.elapsed = PlaybackTime::ZERO;
        self.global_pitch = 0;
        self.ext_value = None;
        self.cmds_per_second = 0;
        self.key_hit.fill(false);
    }

    /// Read and clear the key-hit flags into `out`.
    pub fn take_key_hits(&mut self, out: &mut [bool]) {
        for (dst, hit) in out.iter_mut().zip(self.key_hit.iter_mut()) {
            *dst = core::mem::take(hit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_ir::ChipFamily;

    #[test]
    fn context_checks_subsong() {
        let song = Song::with_systems("t", &[ChipFamily::Sms]);
        assert!(EngineContext::new(song.clone(), 0, 44100).is_ok());
        let err = EngineContext::new(song, 3, 44100).err();
        assert_eq!(err.map(|e| e.to_string()), Some("subsong 3 does not exist".into()));
    }

    #[test]
    fn context_rejects_channel_mismatch() {
        let mut song = Song::with_systems("t", &[ChipFamily::Sms]);
        song.systems.push(pc_ir::SystemConfig::new(ChipFamily::Nes));
        let err = EngineContext::new(song, 0, 44100).err();
        assert!(matches!(err, Some(EngineError::ChannelMismatch { song: 9, subsong: 4 })));
    }

    #[test]
    fn rewind_keeps_loop_halt_and_repeat_settings() {
        let song = Song::with_systems("t", &[ChipFamily::Sms]);
        let mut ctx = EngineContext::new(song, 0, 44100).unwrap();
        ctx.transport.remaining_loops = Some(2);
        ctx.transport.halt_on = Some(HaltMode::Row);
        ctx.transport.repeat_pattern = true;
        ctx.transport.subticks = 4;
        ctx.transport.order = 5;
        ctx.global_pitch = 3;
        ctx.rewind();
        assert_eq!(ctx.transport.order, 0);
        assert_eq!(ctx.transport.remaining_loops, Some(2));
        assert_eq!(ctx.transport.halt_on, Some(HaltMode::Row));
        assert!(ctx.transport.repeat_pattern);
        assert_eq!(ctx.transport.subticks, 0);
        assert_eq!(ctx.global_pitch, 0);
    }

    #[test]
    fn halt_only_on_matching_boundary() {
        let sub = Subsong::new(1);
        let mut t = Transport::new(&sub);
        t.halt_on = Some(HaltMode::Row);
        t.halt_at(HaltMode::Tick);
        assert!(!t.halted);
        t.halt_at(HaltMode::Row);
        assert!(t.halted);
    }
}

//! Main playback engine.
//!
//! [`Engine::render_block`] interleaves tick processing with backend
//! synthesis on a fixed-point cycle budget, resamples every backend to the
//! output rate and mixes the result.

use blip_buf::BlipBuf;
use pc_ir::{NoteEvent, PlaybackTime, Song};

use crate::backend::BackendRegistry;
use crate::channel::ChannelRuntimeState;
use crate::clock::MASTER_CLOCK_PREC;
use crate::context::{EngineContext, HaltMode, PlaybackState, StepPlay, Transport};
use crate::dispatcher::CommandDispatcher;
use crate::error::{EngineError, Result};
use crate::frame::Frame;
use crate::metronome::{Click, Metronome};
use crate::preview::Preview;
use crate::scope::Oscilloscope;
use crate::sequencer::Sequencer;

/// Largest block rendered in one pass; longer requests are split.
pub const MAX_BLOCK: usize = 4096;

/// Consecutive passes without clock progress before playback is abandoned.
pub const HANG_LIMIT: u32 = 100;

/// Native-rate buffers and resamplers for one backend.
struct BackendMix {
    blip_l: BlipBuf,
    blip_r: BlipBuf,
    buf_l: Vec<i16>,
    buf_r: Vec<i16>,
    last_l: i16,
    last_r: i16,
    out_l: Vec<i16>,
    out_r: Vec<i16>,
    /// Native samples wanted this block
    run_total: usize,
    run_left: usize,
    run_pos: usize,
    stereo: bool,
}

impl BackendMix {
    fn new(native_rate: u32, out_rate: u32, stereo: bool) -> Self {
        let mut blip_l = BlipBuf::new(MAX_BLOCK as u32 * 2);
        let mut blip_r = BlipBuf::new(MAX_BLOCK as u32 * 2);
        blip_l.set_rates(native_rate as f64, out_rate as f64);
        blip_r.set_rates(native_rate as f64, out_rate as f64);
        let native = (MAX_BLOCK as u64 * native_rate as u64).div_ceil(out_rate.max(1) as u64) as usize + 16;
        Self {
            blip_l,
            blip_r,
            buf_l: vec![0; native],
            buf_r: vec![0; native],
            last_l: 0,
            last_r: 0,
            out_l: vec![0; MAX_BLOCK],
            out_r: vec![0; MAX_BLOCK],
            run_total: 0,
            run_left: 0,
            run_pos: 0,
            stereo,
        }
    }

    fn clear(&mut self) {
        self.blip_l.clear();
        self.blip_r.clear();
        self.last_l = 0;
        self.last_r = 0;
    }

    /// Size this block's native run from what the resampler still holds.
    fn begin_block(&mut self, size: usize) {
        let avail = self.blip_l.samples_avail() as usize;
        let wanted = size.saturating_sub(avail);
        self.run_total = if wanted == 0 {
            0
        } else {
            (self.blip_l.clocks_needed(wanted as u32) as usize).min(self.buf_l.len())
        };
        self.run_left = self.run_total;
        self.run_pos = 0;
    }

    /// Push the native run through the resamplers; returns frames produced.
    fn resample(&mut self, size: usize) -> usize {
        if self.run_total > 0 {
            for (j, &s) in self.buf_l[..self.run_total].iter().enumerate() {
                if s != self.last_l {
                    self.blip_l.add_delta(j as u32, s as i32 - self.last_l as i32);
                    self.last_l = s;
                }
            }
            self.blip_l.end_frame(self.run_total as u32);
            if self.stereo {
                for (j, &s) in self.buf_r[..self.run_total].iter().enumerate() {
                    if s != self.last_r {
                        self.blip_r.add_delta(j as u32, s as i32 - self.last_r as i32);
                        self.last_r = s;
                    }
                }
                self.blip_r.end_frame(self.run_total as u32);
            }
        }
        let got = self.blip_l.read_samples(&mut self.out_l[..size], false);
        if self.stereo {
            self.blip_r.read_samples(&mut self.out_r[..size], false);
        }
        got
    }
}

/// Output options that do not affect sequencing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixOptions {
    pub force_mono: bool,
    pub metronome: bool,
    pub metronome_volume: f32,
}

impl Default for MixOptions {
    fn default() -> Self {
        Self {
            force_mono: false,
            metronome: false,
            metronome_volume: 1.0,
        }
    }
}

/// The main playback engine.
pub struct Engine {
    ctx: EngineContext,
    dispatcher: CommandDispatcher,
    sequencer: Sequencer,
    mixes: Vec<BackendMix>,
    preview: Preview,
    metronome: Metronome,
    scope: Oscilloscope,
    force_mono: bool,
    /// Loop count applied on every `play`
    loops: Option<u32>,
    last_error: Option<EngineError>,
    scratch_l: Vec<f32>,
    scratch_r: Vec<f32>,
}

impl Engine {
    /// Build an engine for `subsong` of `song`, rendering at `rate` Hz.
    pub fn new(song: Song, subsong: usize, rate: u32, registry: &BackendRegistry) -> Result<Self> {
        if rate == 0 {
            return Err(EngineError::InvalidSampleRate(rate));
        }
        let ctx = EngineContext::new(song, subsong, rate)?;
        let mut dispatcher = CommandDispatcher::new(&ctx.song, registry)?;
        let sequencer = Sequencer::new(&ctx.song, &mut dispatcher);
        let mixes = (0..dispatcher.backend_count())
            .filter_map(|i| dispatcher.backend(i))
            .map(|b| BackendMix::new(b.rate(), rate, b.is_stereo()))
            .collect();
        log::debug!(
            "engine ready: {} channels on {} chips at {rate} Hz",
            ctx.channel_count(),
            dispatcher.backend_count()
        );
        Ok(Self {
            ctx,
            dispatcher,
            sequencer,
            mixes,
            preview: Preview::new(rate, MAX_BLOCK),
            metronome: Metronome::new(),
            scope: Oscilloscope::new(),
            force_mono: false,
            loops: None,
            last_error: None,
            scratch_l: vec![0.0; MAX_BLOCK],
            scratch_r: vec![0.0; MAX_BLOCK],
        })
    }

    // --- Transport ---

    /// Start from the first order.
    pub fn play(&mut self) {
        self.play_from(0);
    }

    /// Start from `order`. A halted engine resumes instead.
    pub fn play_from(&mut self, order: usize) {
        if self.ctx.transport.halted && self.ctx.transport.is_playing() {
            self.resume();
            return;
        }
        self.reset_playback();
        self.ctx.rewind();
        self.ctx.transport.order = order.min(self.ctx.order_count() - 1);
        self.ctx.transport.remaining_loops = self.loops;
        self.ctx.transport.state = PlaybackState::Playing;
        self.last_error = None;
        log::info!("play from order {:02x}", self.ctx.transport.order);
    }

    /// Stop immediately. Clears live notes and previews and resets every
    /// channel and backend; calling it again changes nothing.
    pub fn stop(&mut self) {
        if self.ctx.transport.state != PlaybackState::Stopped {
            log::info!("stop at {:02x}:{:02x}", self.ctx.transport.order, self.ctx.transport.row);
        }
        self.reset_playback();
    }

    fn reset_playback(&mut self) {
        let t = &mut self.ctx.transport;
        t.state = PlaybackState::Stopped;
        t.step = StepPlay::Off;
        t.halted = false;
        t.jump = None;
        self.ctx.pending_notes.clear();
        self.ctx.clock.clear_cycles();
        self.preview.stop();
        self.dispatcher.reset_backends();
        self.sequencer.reset(&mut self.dispatcher);
        for mix in &mut self.mixes {
            mix.clear();
        }
    }

    /// Halt at the next boundary of kind `mode`.
    pub fn request_halt(&mut self, mode: HaltMode) {
        self.ctx.transport.halt_on = Some(mode);
        self.ctx.transport.halted = false;
    }

    /// Stop halting at boundaries.
    pub fn cancel_halt(&mut self) {
        self.ctx.transport.halt_on = None;
        self.ctx.transport.halted = false;
    }

    /// Continue after a halt.
    pub fn resume(&mut self) {
        self.ctx.transport.halted = false;
    }

    /// Play exactly one row from the current position, then hold.
    pub fn step_row(&mut self) {
        let t = &mut self.ctx.transport;
        if t.state != PlaybackState::Playing {
            t.state = PlaybackState::Playing;
            t.remaining_loops = self.loops;
        }
        t.halted = false;
        Sequencer::arm_step(&mut self.ctx);
    }

    /// Loop count for the next `play`; `None` loops forever.
    pub fn set_loops(&mut self, loops: Option<u32>) {
        self.loops = loops;
    }

    pub fn set_repeat_pattern(&mut self, repeat: bool) {
        self.ctx.transport.repeat_pattern = repeat;
    }

    /// Split each tick into about 1 ms sub-ticks. Backends run on every
    /// sub-tick; song rows and channel effects only on full ticks, so
    /// [`step_tick`](Self::step_tick) advances by one sub-tick.
    pub fn set_low_latency(&mut self, on: bool) {
        self.ctx.clock.set_low_latency(on);
    }

    // --- Live input ---

    /// Queue a live note. While stopped the engine switches to freelance
    /// mode so backends keep ticking.
    pub fn note_on(&mut self, channel: usize, instrument: u8, note: i32) -> bool {
        self.queue_note(NoteEvent::on(channel, instrument, note))
    }

    pub fn note_off(&mut self, channel: usize) -> bool {
        self.queue_note(NoteEvent::off(channel))
    }

    fn queue_note(&mut self, event: NoteEvent) -> bool {
        if event.channel >= self.ctx.channel_count() {
            return false;
        }
        if self.ctx.transport.state == PlaybackState::Stopped {
            self.ctx.transport.state = PlaybackState::Freelance;
        }
        self.ctx.pending_notes.push(event)
    }

    // --- Preview ---

    pub fn preview_sample(&mut self, index: usize) {
        self.preview.play_sample(index);
    }

    pub fn preview_wave(&mut self, index: usize, note: i32) {
        self.preview.play_wave(index, note);
    }

    pub fn stop_preview(&mut self) {
        self.preview.stop();
    }

    pub fn preview(&self) -> &Preview {
        &self.preview
    }

    // --- Output options ---

    pub fn set_options(&mut self, options: MixOptions) {
        self.force_mono = options.force_mono;
        self.metronome.set_enabled(options.metronome);
        self.metronome.set_volume(options.metronome_volume);
    }

    pub fn options(&self) -> MixOptions {
        MixOptions {
            force_mono: self.force_mono,
            metronome: self.metronome.is_enabled(),
            metronome_volume: self.metronome.volume(),
        }
    }

    // --- Rendering ---

    /// Render `out_l.len()` frames (±1.0 full scale) into the two buffers.
    pub fn render_block(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let len = out_l.len().min(out_r.len());
        let mut done = 0;
        while done < len {
            let size = (len - done).min(MAX_BLOCK);
            self.render_chunk(&mut out_l[done..done + size], &mut out_r[done..done + size]);
            done += size;
        }
    }

    /// Render into 16-bit frames.
    pub fn render_frames(&mut self, frames: &mut [Frame]) {
        let mut scratch_l = core::mem::take(&mut self.scratch_l);
        let mut scratch_r = core::mem::take(&mut self.scratch_r);
        for chunk in frames.chunks_mut(MAX_BLOCK) {
            let n = chunk.len();
            self.render_chunk(&mut scratch_l[..n], &mut scratch_r[..n]);
            for (frame, (&l, &r)) in chunk.iter_mut().zip(scratch_l.iter().zip(&scratch_r)) {
                *frame = Frame::from_f32(l, r);
            }
        }
        self.scratch_l = scratch_l;
        self.scratch_r = scratch_r;
    }

    fn render_chunk(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let size = out_l.len();
        out_l.fill(0.0);
        out_r.fill(0.0);

        self.sequencer.drain_pending_notes(&mut self.ctx, &mut self.dispatcher);
        self.preview.render(&self.ctx.song, out_l, out_r);

        if self.ctx.transport.state == PlaybackState::Stopped {
            self.scope.push(out_l, out_r);
            return;
        }

        for mix in &mut self.mixes {
            mix.begin_block(size);
        }

        let total = (size as i64) << MASTER_CLOCK_PREC;
        let mut budget = total;
        let mut stalls = 0;
        while budget > 0 && !self.ctx.transport.halted && self.ctx.transport.state != PlaybackState::Stopped {
            if self.ctx.clock.cycles() <= 0 {
                let offset = ((total - budget) >> MASTER_CLOCK_PREC) as usize;
                self.mark_metronome(offset);
                self.advance_tick();
                stalls += 1;
                if stalls >= HANG_LIMIT {
                    self.hang(stalls);
                    break;
                }
                continue;
            }
            stalls = 0;
            let slice = self.ctx.clock.cycles().min(budget);
            for (index, mix) in self.mixes.iter_mut().enumerate() {
                let share = if slice == budget {
                    mix.run_left
                } else {
                    ((slice as i128 * mix.run_total as i128) / total as i128) as usize
                };
                let share = share.min(mix.run_left);
                if share == 0 {
                    continue;
                }
                if let Some(backend) = self.dispatcher.backend_mut(index) {
                    backend.acquire(&mut mix.buf_l, &mut mix.buf_r, mix.run_pos, share);
                }
                mix.run_pos += share;
                mix.run_left -= share;
            }
            self.ctx.clock.consume(slice);
            budget -= slice;
        }

        // a halt or stop mid-block still owes the resamplers their samples
        for (index, mix) in self.mixes.iter_mut().enumerate() {
            if mix.run_left > 0 {
                if let Some(backend) = self.dispatcher.backend_mut(index) {
                    backend.acquire(&mut mix.buf_l, &mut mix.buf_r, mix.run_pos, mix.run_left);
                }
                mix.run_pos += mix.run_left;
                mix.run_left = 0;
            }
        }

        self.mix_backends(out_l, out_r);
        self.metronome.render(out_l, out_r, self.ctx.clock.rate());
        self.scope.push(out_l, out_r);
        if self.force_mono {
            for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
                let m = (*l + *r) * 0.5;
                *l = m;
                *r = m;
            }
        }
    }

    fn mix_backends(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let size = out_l.len();
        let master = self.ctx.song.master_volume;
        for (index, mix) in self.mixes.iter_mut().enumerate() {
            let got = mix.resample(size);
            let Some(system) = self.dispatcher.system(index) else {
                continue;
            };
            let post_amp = self.dispatcher.backend(index).map_or(1.0, |b| b.post_amp());
            let pan = system.panning.clamp(-127, 127) as i32;
            let gain = system.volume as f32 / 64.0 * master * post_amp / 127.0;
            let gain_l = gain * (127 - pan).min(127) as f32;
            let gain_r = gain * (127 + pan).min(127) as f32;
            let right = if mix.stereo { &mix.out_r } else { &mix.out_l };
            for i in 0..got {
                out_l[i] += mix.out_l[i] as f32 / 32768.0 * gain_l;
                out_r[i] += right[i] as f32 / 32768.0 * gain_r;
            }
        }
    }

    fn mark_metronome(&mut self, offset: usize) {
        let t = &self.ctx.transport;
        if t.ticks != 1 || t.subticks > 1 || !t.is_playing() || t.step == StepPlay::Holding {
            return;
        }
        let sub = self.ctx.sub();
        if let Some(click) = Click::for_row(t.row, sub.highlight_a, sub.highlight_b) {
            self.metronome.mark(offset, click);
        }
    }

    /// Run one tick and apply loop counting.
    fn advance_tick(&mut self) -> bool {
        let ended = self.sequencer.next_tick(&mut self.ctx, &mut self.dispatcher);
        if ended {
            if let Some(loops) = self.ctx.transport.remaining_loops.as_mut() {
                *loops = loops.saturating_sub(1);
                if *loops == 0 {
                    log::info!("end of song");
                    self.stop();
                }
            }
        }
        if self.ctx.transport.state == PlaybackState::Stopped {
            self.ctx.pending_notes.clear();
            self.preview.stop();
        }
        ended
    }

    fn hang(&mut self, iterations: u32) {
        log::error!(
            "hang detected at {:02x}:{:02x}: no clock progress after {iterations} passes, stopping",
            self.ctx.transport.order,
            self.ctx.transport.row
        );
        self.stop();
        self.last_error = Some(EngineError::Hang { iterations });
    }

    /// Advance one tick without rendering audio.
    ///
    /// Returns whether the song wrapped on this tick and the tick's length
    /// in fixed-point output cycles (`MASTER_CLOCK_PREC` fractional bits).
    pub fn step_tick(&mut self) -> (bool, i64) {
        let ended = self.advance_tick();
        let cycles = self.ctx.clock.cycles().max(0);
        self.ctx.clock.clear_cycles();
        (ended, cycles)
    }

    // --- Inspection ---

    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<EngineError> {
        self.last_error.take()
    }

    pub fn state(&self) -> PlaybackState {
        self.ctx.transport.state
    }

    pub fn is_playing(&self) -> bool {
        self.ctx.transport.is_playing()
    }

    pub fn is_halted(&self) -> bool {
        self.ctx.transport.halted
    }

    pub fn transport(&self) -> &Transport {
        &self.ctx.transport
    }

    /// Current `(order, row)`; `row` is the next row to be played.
    pub fn position(&self) -> (usize, usize) {
        (self.ctx.transport.order, self.ctx.transport.row)
    }

    pub fn elapsed(&self) -> PlaybackTime {
        self.ctx.elapsed
    }

    pub fn song(&self) -> &Song {
        &self.ctx.song
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelRuntimeState> {
        self.sequencer.channel(index)
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut CommandDispatcher {
        &mut self.dispatcher
    }

    pub fn scope(&self) -> &Oscilloscope {
        &self.scope
    }

    pub fn cmds_per_second(&self) -> u64 {
        self.ctx.cmds_per_second
    }

    /// Last `EExx` value seen.
    pub fn ext_value(&self) -> Option<u8> {
        self.ctx.ext_value
    }

    pub fn global_pitch(&self) -> i32 {
        self.ctx.global_pitch
    }

    /// Read and clear per-channel note-start flags.
    pub fn take_key_hits(&mut self, out: &mut [bool]) {
        self.ctx.take_key_hits(out);
    }
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("transport", &self.ctx.transport)
            .field("dispatcher", &self.dispatcher)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

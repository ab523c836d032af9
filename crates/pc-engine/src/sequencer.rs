//! Row and tick state machine.
//!
//! [`Sequencer::next_tick`] is the entry point: it counts down the current
//! row, calls [`Sequencer::next_row`] when the row is used up, and then runs
//! the per-tick effects of every channel in channel order.

use pc_ir::{ChipFamily, Command, Note, Opcode, Song, NOTE_NULL, TARGET_REACHED};

use crate::channel::ChannelRuntimeState;
use crate::context::{EngineContext, HaltMode, OrderJump, PlaybackState, StepPlay};
use crate::dispatcher::CommandDispatcher;
use crate::effects::{apply_universal, post_table, pre_table, RowScope};

/// Per-channel playback state and the logic that advances it.
#[derive(Clone, Debug)]
pub struct Sequencer {
    channels: Vec<ChannelRuntimeState>,
    families: Vec<ChipFamily>,
}

impl Sequencer {
    pub fn new(song: &Song, dispatcher: &mut CommandDispatcher) -> Self {
        let count = song.channel_count();
        let families = (0..count)
            .map(|ch| song.family_of(ch).unwrap_or(ChipFamily::Sms))
            .collect();
        let mut sequencer = Self {
            channels: vec![ChannelRuntimeState::new(0); count],
            families,
        };
        sequencer.reset(dispatcher);
        sequencer
    }

    pub fn channels(&self) -> &[ChannelRuntimeState] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelRuntimeState> {
        self.channels.get(index)
    }

    /// Reset every channel, asking its backend for the volume range.
    pub fn reset(&mut self, dispatcher: &mut CommandDispatcher) {
        for (ch, chan) in self.channels.iter_mut().enumerate() {
            let vol_max = dispatcher.query(Command::bare(Opcode::GetVolMax, ch));
            chan.reset(vol_max);
        }
    }

    /// Turn queued live notes into commands.
    pub fn drain_pending_notes(&mut self, ctx: &mut EngineContext, dispatcher: &mut CommandDispatcher) {
        while let Some(event) = ctx.pending_notes.pop() {
            let ch = event.channel;
            let Some(chan) = self.channels.get_mut(ch) else {
                continue;
            };
            if event.on {
                dispatcher.dispatch(chan, Command::new(Opcode::Instrument, ch, event.instrument as i32, 1));
                chan.last_ins = event.instrument as i32;
                dispatcher.dispatch(chan, Command::with_value(Opcode::NoteOn, ch, event.note));
                chan.note_on_inhibit = true;
                if let Some(hit) = ctx.key_hit.get_mut(ch) {
                    *hit = true;
                }
            } else {
                dispatcher.dispatch(chan, Command::bare(Opcode::NoteOff, ch));
            }
        }
    }

    /// Decode one channel's row. `after_delay` replays a row held back by `EDxx`.
    pub fn process_row(
        &mut self,
        ctx: &mut EngineContext,
        dispatcher: &mut CommandDispatcher,
        ch: usize,
        after_delay: bool,
    ) {
        let Some(chan) = self.channels.get_mut(ch) else {
            return;
        };
        let family = self.families[ch];
        let (order, row) = if after_delay {
            (chan.delay_order, chan.delay_row)
        } else {
            (ctx.transport.order, ctx.transport.row)
        };
        let sub = ctx.sub();
        let columns = sub.effect_columns(ch);
        let cell = *sub.pattern_at(ch, order).row(row);
        let compat = ctx.song.compat;

        if !after_delay {
            // counted in speed ticks, like `ECxx`
            let budget = ctx.transport.next_speed;
            match cell.find_effect(0xed, columns) {
                Some(delay) if delay > 0 && delay as i32 <= budget => {
                    chan.row_delay = delay as i32 + 1;
                    chan.delay_order = order;
                    chan.delay_row = row;
                    chan.delay_locked = delay as i32 == budget;
                    return;
                }
                _ => chan.delay_locked = false,
            }
        }
        if chan.delay_locked {
            return;
        }

        let mut scope = RowScope {
            ctx,
            dispatcher,
            chan,
            channel: ch,
            family,
            last_slide: None,
            called_porta: false,
        };

        let mut ins_changed = false;
        if let Some(ins) = cell.instrument {
            scope.send_op(Opcode::Instrument, ins as i32, 0);
            if scope.chan.last_ins != ins as i32 {
                scope.chan.last_ins = ins as i32;
                ins_changed = true;
            }
        }

        match cell.note {
            Note::Off | Note::OffRelease => {
                scope.chan.key_on = false;
                scope.chan.key_off = true;
                release_slides(&mut scope);
                let opcode = if cell.note == Note::Off { Opcode::NoteOff } else { Opcode::NoteOffEnv };
                scope.send_op(opcode, 0, 0);
            }
            Note::Release => {
                scope.send_op(Opcode::EnvRelease, 0, 0);
            }
            Note::On { .. } => {
                let key_off_arp = scope.dispatcher.key_off_affects_arpeggio(ch);
                let chan = &mut *scope.chan;
                chan.old_note = chan.note;
                chan.note = cell.note.pitch().unwrap_or(chan.note);
                if !chan.key_on && key_off_arp {
                    chan.arp = 0;
                }
                chan.do_note = true;
                if chan.arp != 0 && compat.compatible_arpeggio {
                    chan.arp_yield = true;
                }
            }
            Note::None => {}
        }

        if let Some(vol) = cell.volume {
            let vol = vol as i32;
            let always = scope.dispatcher.query(Command::bare(Opcode::AlwaysSetVolume, ch)) != 0;
            if always || scope.chan.volume.min(scope.chan.vol_max) >> 8 != vol {
                if cell.note == Note::None {
                    scope.chan.midi_aftertouch = true;
                }
                scope.chan.volume = vol << 8;
                scope.send_op(Opcode::Volume, vol, 0);
            }
        }

        scope.chan.retrig_speed = 0;
        let pre = pre_table(family);
        for effect in cell.effects_in(columns) {
            let value = effect.value_or_zero();
            if !scope.apply_chip(pre, effect.code, value) {
                apply_universal(&mut scope, effect.code, value);
            }
        }

        if ins_changed && (scope.chan.in_porta || scope.called_porta) && compat.new_ins_triggers_in_porta {
            scope.send_op(Opcode::NoteOn, NOTE_NULL, 0);
        }

        if scope.chan.do_note {
            if !compat.continuous_vibrato {
                scope.chan.vibrato_pos = 0;
            }
            scope.send_pitch();
            let note = scope.chan.note;
            if scope.chan.legato {
                scope.send_op(Opcode::Legato, note, 0);
            } else if scope.chan.in_porta && scope.chan.key_on && !scope.chan.shorthand_porta {
                scope.chan.porta_note = Some(note);
            } else if !scope.chan.note_on_inhibit {
                let volume = scope.chan.chip_volume();
                scope.send_op(Opcode::NoteOn, note, volume);
                if let Some(hit) = scope.ctx.key_hit.get_mut(ch) {
                    *hit = true;
                }
            }
            let chan = &mut *scope.chan;
            chan.do_note = false;
            if !chan.key_on && chan.scheduled_slide_reset {
                chan.clear_porta();
                chan.scheduled_slide_reset = false;
                chan.in_porta = false;
            }
            if !chan.key_on && chan.volume > chan.vol_max {
                chan.volume = chan.vol_max;
                let volume = chan.chip_volume();
                scope.send_op(Opcode::Volume, volume, 0);
            }
            scope.chan.key_on = true;
            scope.chan.key_off = false;
        }
        scope.chan.now_you_can_stop = true;
        scope.chan.shorthand_porta = false;
        scope.chan.note_on_inhibit = false;

        let post = post_table(family);
        for effect in cell.effects_in(columns) {
            scope.apply_chip(post, effect.code, effect.value_or_zero());
        }
    }

    /// Process the current row on every channel and move to the next one.
    pub fn next_row(&mut self, ctx: &mut EngineContext, dispatcher: &mut CommandDispatcher) {
        log::trace!("row {:02x}:{:02x}", ctx.transport.order, ctx.transport.row);
        for ch in 0..self.channels.len() {
            self.channels[ch].row_delay = 0;
            self.process_row(ctx, dispatcher, ch, false);
        }

        let rows = ctx.sub().rows();
        let order_count = ctx.order_count();
        let compat = ctx.song.compat;
        let t = &mut ctx.transport;
        if let Some(jump) = t.jump.take() {
            if t.repeat_pattern {
                t.row = 0;
            } else {
                t.row = if jump.row < rows { jump.row } else { 0 };
                let target = match jump.target {
                    OrderJump::To(order) => order,
                    OrderJump::Next => t.order + 1,
                };
                if target <= t.order {
                    t.end_of_song = true;
                }
                t.order = target;
                if t.order >= order_count {
                    t.order = 0;
                    t.end_of_song = true;
                }
                log::debug!("jump to order {:02x} row {:02x}", t.order, t.row);
            }
            t.halt_at(HaltMode::Pattern);
        } else if t.is_playing() {
            t.row += 1;
            if t.row >= rows {
                t.row = 0;
                if !t.repeat_pattern {
                    t.order += 1;
                    if t.order >= order_count {
                        t.order = 0;
                        t.end_of_song = true;
                    }
                }
                t.halt_at(HaltMode::Pattern);
            }
        }

        let (speed1, speed2) = (t.speed1 as i32, t.speed2 as i32);
        let speed = if compat.broken_speed_sel {
            let odd_row = t.row & 1 == 1;
            if rows & 1 == 1 && t.order & 1 == 1 {
                t.next_speed = if odd_row { speed1 } else { speed2 };
                if odd_row { speed2 } else { speed1 }
            } else {
                t.next_speed = if odd_row { speed2 } else { speed1 };
                if odd_row { speed1 } else { speed2 }
            }
        } else {
            let speed = if t.speed_ab { speed2 } else { speed1 };
            t.next_speed = if t.speed_ab { speed1 } else { speed2 };
            t.speed_ab = !t.speed_ab;
            speed
        };
        t.ticks = (speed * (t.time_base as i32 + 1)).max(1);
        let ticks = t.ticks;

        // warn backends about notes on the row that is now current
        let (order, row) = (t.order, t.row);
        for ch in 0..self.channels.len() {
            let sub = ctx.sub();
            let columns = sub.effect_columns(ch);
            let cell = *sub.pattern_at(ch, order).row(row);
            if cell.note.pitch().is_none() || self.channels[ch].legato {
                continue;
            }
            let chan = &mut self.channels[ch];
            dispatcher.dispatch(chan, Command::with_value(Opcode::PreNote, ch, ticks));
            if compat.one_tick_cut {
                let portamento = cell.find_effect(0x03, columns).is_some();
                let legato = cell.find_effect(0xea, columns).is_some_and(|v| v > 0);
                if !portamento && !legato {
                    chan.cut = ticks;
                }
            }
        }

        ctx.transport.halt_at(HaltMode::Row);
        ctx.transport.first_tick = true;
    }

    /// Advance one tick. Returns true when the song wrapped around on this tick.
    pub fn next_tick(&mut self, ctx: &mut EngineContext, dispatcher: &mut CommandDispatcher) -> bool {
        let mut ended = false;
        ctx.clock.begin_tick();
        dispatcher.begin_tick(ctx.elapsed.ticks);
        self.drain_pending_notes(ctx, dispatcher);

        let freelance = ctx.transport.state == PlaybackState::Freelance;
        let mut full_tick = true;
        if !freelance {
            let tick_mult = ctx.clock.tick_mult() as i32;
            ctx.transport.subticks -= 1;
            if ctx.transport.subticks <= 0 {
                ctx.transport.subticks = tick_mult;
                ended = self.advance_row_counter(ctx, dispatcher);
                for ch in 0..self.channels.len() {
                    self.tick_channel(ctx, dispatcher, ch);
                }
            }
            full_tick = ctx.transport.subticks == tick_mult;
            ctx.transport.first_tick = false;
        }

        dispatcher.tick_backends(full_tick);

        if !freelance && ctx.transport.step != StepPlay::Holding {
            if ctx.elapsed.advance(ctx.clock.micros_per_tick()) {
                let total = dispatcher.total_commands();
                ctx.cmds_per_second = total - ctx.cmds_at_second;
                ctx.cmds_at_second = total;
            }
        }
        ctx.transport.halt_at(HaltMode::Tick);
        ended
    }

    /// Count down the current row and start the next one when it runs out.
    /// Returns true if the song wrapped.
    fn advance_row_counter(&mut self, ctx: &mut EngineContext, dispatcher: &mut CommandDispatcher) -> bool {
        let continue_on_loop = ctx.song.compat.continue_on_loop;
        let t = &mut ctx.transport;
        if t.step == StepPlay::Holding {
            return false;
        }
        t.ticks -= 1;
        if t.ticks > 0 {
            return false;
        }
        let ended = t.end_of_song;
        t.end_of_song = false;
        if t.step == StepPlay::Armed {
            t.step = StepPlay::Holding;
        }
        if ended && !continue_on_loop {
            dispatcher.reset_backends();
            self.reset(dispatcher);
        }
        self.next_row(ctx, dispatcher);
        ended
    }

    /// Per-tick effects of one channel, in their fixed order.
    fn tick_channel(&mut self, ctx: &mut EngineContext, dispatcher: &mut CommandDispatcher, ch: usize) {
        let chan = &mut self.channels[ch];
        if chan.row_delay > 0 {
            chan.row_delay -= 1;
            if chan.row_delay == 0 {
                self.process_row(ctx, dispatcher, ch, true);
            }
        }

        let compat = ctx.song.compat;
        let first_tick = ctx.transport.first_tick;
        let skip_slides = compat.no_slides_on_first_tick && first_tick;
        let mut scope = RowScope {
            ctx,
            dispatcher,
            chan: &mut self.channels[ch],
            channel: ch,
            family: self.families[ch],
            last_slide: None,
            called_porta: false,
        };

        if scope.chan.retrig_speed > 0 {
            scope.chan.retrig_tick -= 1;
            if scope.chan.retrig_tick < 0 {
                scope.chan.retrig_tick = scope.chan.retrig_speed - 1;
                scope.send_op(Opcode::NoteOn, NOTE_NULL, 0);
                if let Some(hit) = scope.ctx.key_hit.get_mut(ch) {
                    *hit = true;
                }
            }
        }

        if scope.chan.vol_speed != 0 && !skip_slides {
            let current = scope.dispatcher.query(Command::bare(Opcode::GetVolume, ch));
            let chan = &mut *scope.chan;
            chan.volume = (chan.volume & 0xff) | (current << 8);
            chan.volume += chan.vol_speed;
            if chan.volume > chan.vol_max {
                chan.volume = chan.vol_max;
                chan.vol_speed = 0;
            } else if chan.volume < 0 {
                chan.vol_speed = 0;
                chan.volume = if compat.legacy_volume_slides { chan.vol_max + 1 } else { 0 };
            }
            let volume = chan.chip_volume();
            scope.send_op(Opcode::Volume, volume, 0);
        }

        if scope.chan.vibrato_depth > 0 {
            let chan = &mut *scope.chan;
            chan.vibrato_pos += chan.vibrato_rate;
            if chan.vibrato_pos >= 64 {
                chan.vibrato_pos -= 64;
            }
            scope.send_pitch();
        }

        if !skip_slides && (scope.chan.key_on || scope.chan.key_off) && scope.chan.porta_speed > 0 {
            if let Some(target) = scope.chan.porta_note {
                let speed = scope.chan.porta_speed;
                let code = scope.send_op(Opcode::NotePorta, speed, target);
                if code == TARGET_REACHED && scope.chan.porta_stop && compat.target_resets_slides {
                    let chan = &mut *scope.chan;
                    chan.porta_speed = 0;
                    chan.old_note = chan.note;
                    chan.note = target;
                    chan.in_porta = false;
                    scope.send_op(Opcode::Legato, target, 0);
                }
            }
        }

        if scope.chan.cut > 0 {
            scope.chan.cut -= 1;
            if scope.chan.cut < 1 {
                scope.chan.old_note = scope.chan.note;
                if scope.chan.in_porta && compat.note_off_resets_slides {
                    scope.chan.key_off = true;
                    scope.chan.key_on = false;
                }
                release_slides(&mut scope);
                scope.send_op(Opcode::NoteOff, 0, 0);
            }
        }

        if scope.chan.reset_arp {
            let note = scope.chan.note;
            scope.send_op(Opcode::Legato, note, 0);
            scope.chan.reset_arp = false;
        }

        if compat.row_resets_arp_pos && first_tick {
            scope.chan.arp_stage = -1;
        }

        if scope.chan.arp != 0 && !scope.chan.arp_yield && scope.chan.porta_speed < 1 {
            scope.chan.arp_ticks -= 1;
            if scope.chan.arp_ticks < 1 {
                let arp_len = scope.ctx.transport.arp_len;
                let chan = &mut *scope.chan;
                chan.arp_ticks = arp_len;
                chan.arp_stage += 1;
                if chan.arp_stage > 2 {
                    chan.arp_stage = 0;
                }
                let note = match chan.arp_stage {
                    0 => chan.note,
                    1 => chan.note + (chan.arp >> 4) as i32,
                    _ => chan.note + (chan.arp & 15) as i32,
                };
                scope.send_op(Opcode::Legato, note, 0);
            }
        } else {
            scope.chan.arp_yield = false;
        }
    }

    /// Stop on the current row after playing it (step play).
    pub fn arm_step(ctx: &mut EngineContext) {
        ctx.transport.step = StepPlay::Armed;
        ctx.transport.ticks = 1;
    }
}

/// Key-off during a portamento: drop the glide if the song asks for it.
fn release_slides(scope: &mut RowScope<'_>) {
    let compat = scope.ctx.song.compat;
    if !(scope.chan.in_porta && compat.note_off_resets_slides) {
        return;
    }
    if scope.chan.stop_on_off {
        scope.chan.clear_porta();
        scope.chan.stop_on_off = false;
    }
    if scope.dispatcher.key_off_affects_portamento(scope.channel) {
        scope.chan.clear_porta();
    }
    scope.send_op(Opcode::PrePorta, 0, 0);
    scope.chan.scheduled_slide_reset = true;
}

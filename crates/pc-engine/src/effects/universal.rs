//! Effects every chip understands.

use pc_ir::{ChipFamily, DuplicateSlides, Opcode};

use super::{RowScope, Slide};
use crate::context::{OrderJump, PendingJump, PlaybackState, StepPlay};

/// Target used by `01xx` when slides are unlimited.
const SLIDE_UP_TARGET: i32 = 255;
/// Target used by `01xx` with limited slides.
const LIMITED_UP_TARGET: i32 = 0x60;
const SLIDE_DOWN_TARGET: i32 = -60;

/// Whether a slide of `kind` on this row should be skipped.
fn slide_blocked(scope: &RowScope<'_>, kind: Slide) -> bool {
    match scope.ctx.song.compat.duplicate_slides {
        DuplicateSlides::LastWins => false,
        DuplicateSlides::FirstWins => scope.last_slide.is_some(),
        DuplicateSlides::IgnoreRepeated => {
            matches!(scope.last_slide, Some(last) if last == kind || last == Slide::Porta)
        }
    }
}

fn stop_porta(scope: &mut RowScope<'_>, notify: bool) {
    scope.chan.clear_porta();
    scope.chan.in_porta = false;
    if notify {
        scope.send_op(Opcode::PrePorta, 0, 0);
    }
}

/// `01xx` / `02xx`
fn pitch_slide(scope: &mut RowScope<'_>, kind: Slide, value: u8) {
    if slide_blocked(scope, kind) {
        return;
    }
    scope.last_slide = Some(kind);
    let compat = scope.ctx.song.compat;
    if value == 0 {
        stop_porta(scope, !compat.arp_non_porta);
        return;
    }
    let target = match (kind, compat.limit_slides) {
        (Slide::Up, true) => LIMITED_UP_TARGET,
        (Slide::Up, false) => SLIDE_UP_TARGET,
        (_, true) => scope.dispatcher.portamento_floor(scope.channel),
        (_, false) => SLIDE_DOWN_TARGET,
    };
    let chan = &mut *scope.chan;
    chan.porta_note = Some(target);
    chan.porta_speed = value as i32;
    chan.porta_stop = true;
    chan.now_you_can_stop = false;
    chan.stop_on_off = false;
    chan.scheduled_slide_reset = false;
    chan.in_porta = false;
    if !compat.arp_non_porta {
        scope.send_op(Opcode::PrePorta, 1, 0);
    }
}

/// `03xx`
fn portamento(scope: &mut RowScope<'_>, value: u8) {
    let compat = scope.ctx.song.compat;
    if compat.duplicate_slides == DuplicateSlides::FirstWins && scope.last_slide.is_some() {
        return;
    }
    if value == 0 {
        stop_porta(scope, true);
        return;
    }
    scope.called_porta = true;
    let chan = &mut *scope.chan;
    if chan.note == chan.old_note && !chan.in_porta && compat.buggy_porta_after_slide {
        chan.porta_note = Some(chan.note);
        chan.porta_speed = -1;
    } else {
        chan.porta_note = Some(chan.note);
        chan.porta_speed = value as i32;
        chan.in_porta = true;
    }
    chan.porta_stop = true;
    if chan.key_on {
        chan.do_note = false;
    }
    chan.stop_on_off = compat.stop_porta_on_note_off;
    chan.scheduled_slide_reset = false;
    scope.send_op(Opcode::PrePorta, 1, 1);
    scope.last_slide = Some(Slide::Porta);
}

/// `E1xy` / `E2xy`: slide `y` semitones at speed `x`.
fn short_porta(scope: &mut RowScope<'_>, up: bool, value: u8) {
    let compat = scope.ctx.song.compat;
    let semitones = (value & 15) as i32;
    let chan = &mut *scope.chan;
    chan.porta_note = Some(if up { chan.note + semitones } else { chan.note - semitones });
    chan.porta_speed = (value >> 4) as i32 * 4;
    chan.porta_stop = true;
    chan.now_you_can_stop = false;
    chan.stop_on_off = compat.stop_porta_on_note_off;
    chan.scheduled_slide_reset = false;
    if semitones != 0 {
        chan.in_porta = true;
        chan.shorthand_porta = true;
        if !compat.broken_shortcut_slides {
            scope.send_op(Opcode::PrePorta, 1, 0);
        }
        if compat.e1e2_also_take_priority {
            scope.last_slide = Some(Slide::Porta);
        }
    } else {
        chan.in_porta = false;
        if !compat.broken_shortcut_slides {
            scope.send_op(Opcode::PrePorta, 0, 0);
        }
    }
}

/// `F1xx` / `F2xx`: one immediate pitch step.
fn single_step(scope: &mut RowScope<'_>, up: bool, value: u8) {
    let compat = scope.ctx.song.compat;
    let target = if up { SLIDE_UP_TARGET } else { SLIDE_DOWN_TARGET };
    scope.chan.porta_note = Some(target);
    scope.chan.porta_speed = value as i32;
    if !compat.arp_non_porta {
        scope.send_op(Opcode::PrePorta, 1, 0);
    }
    scope.send_op(Opcode::NotePorta, value as i32, target);
    stop_porta(scope, false);
    if !compat.arp_non_porta {
        scope.send_op(Opcode::PrePorta, 0, 0);
    }
}

fn set_tick_rate(scope: &mut RowScope<'_>, hz: f64) {
    log::debug!("tick rate {hz} Hz");
    scope.ctx.clock.set_hz(hz);
}

/// Stop playback from inside the song (`FFxx`).
fn stop_song(scope: &mut RowScope<'_>) {
    let transport = &mut scope.ctx.transport;
    transport.state = PlaybackState::Stopped;
    transport.step = StepPlay::Off;
    transport.remaining_loops = None;
    scope.ctx.ext_value = None;
    log::info!("song stopped by effect");
}

/// Apply a universal effect. Returns false for unknown codes.
pub(crate) fn apply_universal(scope: &mut RowScope<'_>, code: u8, value: u8) -> bool {
    let compat = scope.ctx.song.compat;
    match code {
        0x09 => {
            if value > 0 {
                scope.ctx.transport.speed1 = value;
            }
        }
        0x0f => {
            if value > 0 {
                scope.ctx.transport.speed2 = value;
            }
        }
        0x0b => {
            if scope.ctx.transport.jump.is_none() {
                scope.ctx.transport.jump = Some(PendingJump { target: OrderJump::To(value as usize), row: 0 });
            }
        }
        0x0d => {
            let last_order = scope.ctx.transport.order + 1 >= scope.ctx.order_count();
            if scope.ctx.transport.jump.is_none() && !(last_order && compat.ignore_jump_at_end) {
                scope.ctx.transport.jump = Some(PendingJump { target: OrderJump::Next, row: value as usize });
            }
        }
        0x08 => {
            scope.send_op(Opcode::Panning, value as i32, 0);
        }
        0x01 => pitch_slide(scope, Slide::Up, value),
        0x02 => pitch_slide(scope, Slide::Down, value),
        0x03 => portamento(scope, value),
        0x04 => {
            scope.chan.vibrato_depth = (value & 15) as i32;
            scope.chan.vibrato_rate = (value >> 4) as i32;
            scope.send_pitch();
        }
        0x0a => {
            scope.chan.vol_speed = if value & 15 != 0 {
                -((value & 15) as i32) * 64
            } else {
                (value >> 4) as i32 * 64
            };
        }
        0x00 => {
            scope.chan.arp = value;
            if value == 0 && compat.arp0_reset {
                scope.chan.reset_arp = true;
            }
        }
        0x0c => {
            if value != 0 {
                scope.chan.retrig_speed = value as i32;
                scope.chan.retrig_tick = 0;
            }
        }
        0x90..=0x9f => {
            let pos = (((code & 0x0f) as i32) << 8 | value as i32) * 256;
            scope.send_op(Opcode::SamplePos, pos, 0);
        }
        0xc0..=0xc3 => {
            let hz = (((code & 0x03) as u32) << 8 | value as u32).max(10);
            set_tick_rate(scope, hz as f64);
        }
        0xe0 => {
            if value > 0 {
                scope.ctx.transport.arp_len = value as i32;
            }
        }
        0xe1 => short_porta(scope, true, value),
        0xe2 => short_porta(scope, false, value),
        0xe3 => scope.chan.vibrato_dir = value as i32,
        0xe4 => scope.chan.vibrato_fine = (value & 15) as i32,
        0xe5 => {
            let mut pitch = value as i32 - 0x80;
            if scope.family == ChipFamily::Ym2151 {
                pitch = (pitch * 2).clamp(-128, 127);
            }
            scope.chan.pitch = pitch;
            scope.send_pitch();
        }
        0xea => scope.chan.legato = value != 0,
        0xeb => {
            scope.send_op(Opcode::SampleBank, value as i32, 0);
        }
        0xec => {
            if value > 0 && (value as i32) < scope.ctx.transport.next_speed {
                scope.chan.cut = value as i32 + 1;
            }
        }
        // Handled by the pre-scan
        0xed => {}
        0xee => scope.ctx.ext_value = Some(value),
        0xef => scope.ctx.global_pitch += value as i32 - 0x80,
        0xf0 => {
            let hz = (value as f64 * 2.0 / 5.0).max(10.0);
            set_tick_rate(scope, hz);
        }
        0xf1 => single_step(scope, true, value),
        0xf2 => single_step(scope, false, value),
        0xf3 => scope.chan.vol_speed = value as i32,
        0xf4 => scope.chan.vol_speed = -(value as i32),
        0xf8 | 0xf9 => {
            let chan = &mut *scope.chan;
            chan.volume = if code == 0xf8 {
                (chan.volume + value as i32 * 256).min(chan.vol_max)
            } else {
                (chan.volume - value as i32 * 256).max(0)
            };
            let volume = chan.chip_volume();
            scope.send_op(Opcode::Volume, volume, 0);
        }
        0xfa => {
            scope.chan.vol_speed = if value & 15 != 0 {
                -((value & 15) as i32) * 256
            } else {
                (value >> 4) as i32 * 256
            };
        }
        0xff => stop_song(scope),
        _ => return false,
    }
    true
}

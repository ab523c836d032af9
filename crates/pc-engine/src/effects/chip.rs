//! Per-family effect tables.
//!
//! Each table is sorted by effect code. Handlers turn `(channel, value)` into
//! at most one command; returning `None` still counts as handled.

use pc_ir::{ChipFamily, Command, Opcode};

use super::{ChipEffectFn, EffectTable};

/// Send `$op` with the effect value unchanged.
macro_rules! forward {
    ($name:ident, $op:ident) => {
        fn $name(ch: usize, v: u8) -> Option<Command> {
            Some(Command::with_value(Opcode::$op, ch, v as i32))
        }
    };
    ($name:ident, $op:ident, $mask:expr) => {
        fn $name(ch: usize, v: u8) -> Option<Command> {
            Some(Command::with_value(Opcode::$op, ch, (v & $mask) as i32))
        }
    };
}

/// Send `$op` with a fixed first value and the effect value second.
macro_rules! indexed {
    ($name:ident, $op:ident, $index:expr, $mask:expr) => {
        fn $name(ch: usize, v: u8) -> Option<Command> {
            Some(Command::new(Opcode::$op, ch, $index, (v & $mask) as i32))
        }
    };
}

forward!(wave, Wave);
forward!(noise_mode, StdNoiseMode);
forward!(noise_freq, StdNoiseFreq);
forward!(hard_reset, FmHardReset);
forward!(gb_sweep_time, GbSweepTime);
forward!(gb_sweep_dir, GbSweepDir);
forward!(pce_lfo_mode, PceLfoMode);
forward!(pce_lfo_speed, PceLfoSpeed);
forward!(fds_mod_depth, FdsModDepth);
forward!(fds_mod_high, FdsModHigh);
forward!(fds_mod_low, FdsModLow);
forward!(fds_mod_pos, FdsModPos);
forward!(fds_mod_wave, FdsModWave);
forward!(fm_lfo, FmLfo);
forward!(fm_lfo_wave, FmLfoWave);
forward!(fm_ext_ch, FmExtCh);
forward!(fm_fb, FmFb, 7);
forward!(fm_am_depth, FmAmDepth, 0x7f);
forward!(fm_pm_depth, FmPmDepth, 0x7f);
forward!(ay_env_set, AyEnvelopeSet);
forward!(ay_env_low, AyEnvelopeLow);
forward!(ay_env_high, AyEnvelopeHigh);
forward!(ay_noise_and, AyNoiseMaskAnd);
forward!(ay_noise_or, AyNoiseMaskOr);
forward!(ay_auto_env, AyAutoEnvelope);

indexed!(nes_sweep_up, NesSweep, 0, 0xff);
indexed!(nes_sweep_down, NesSweep, 1, 0xff);
indexed!(fm_tl1, FmTl, 0, 0x7f);
indexed!(fm_tl2, FmTl, 1, 0x7f);
indexed!(fm_tl3, FmTl, 2, 0x7f);
indexed!(fm_tl4, FmTl, 3, 0x7f);
indexed!(fm_ar_all, FmAr, -1, 31);
indexed!(fm_ar1, FmAr, 0, 31);
indexed!(fm_ar2, FmAr, 1, 31);
indexed!(fm_ar3, FmAr, 2, 31);
indexed!(fm_ar4, FmAr, 3, 31);

fn sample_mode(ch: usize, v: u8) -> Option<Command> {
    Some(Command::with_value(Opcode::SampleMode, ch, (v > 0) as i32))
}

/// `16xy`: operator `x` (1-4) multiplier `y`.
fn fm_mult(ch: usize, v: u8) -> Option<Command> {
    let op = v >> 4;
    if op == 0 || op > 4 {
        return None;
    }
    Some(Command::new(Opcode::FmMult, ch, op as i32 - 1, (v & 15) as i32))
}

fn ay_mode(ch: usize, v: u8) -> Option<Command> {
    Some(Command::with_value(Opcode::StdNoiseMode, ch, (v & 15) as i32))
}

/// `12xx` on AY: duty-style mode with the envelope bit forced.
fn ay_mode_alt(ch: usize, v: u8) -> Option<Command> {
    Some(Command::with_value(Opcode::StdNoiseMode, ch, 0x10 + (v & 15) as i32))
}

fn ay_env_slide_up(ch: usize, v: u8) -> Option<Command> {
    Some(Command::with_value(Opcode::AyEnvelopeSlide, ch, -(v as i32)))
}

fn ay_env_slide_down(ch: usize, v: u8) -> Option<Command> {
    Some(Command::with_value(Opcode::AyEnvelopeSlide, ch, v as i32))
}

fn ay_io_dir(ch: usize, v: u8) -> Option<Command> {
    Some(Command::new(Opcode::AyIoWrite, ch, v as i32, 255))
}

fn ay_io_a(ch: usize, v: u8) -> Option<Command> {
    Some(Command::new(Opcode::AyIoWrite, ch, v as i32, 0))
}

fn ay_io_b(ch: usize, v: u8) -> Option<Command> {
    Some(Command::new(Opcode::AyIoWrite, ch, v as i32, 1))
}

static YM2612_PRE: &[(u8, ChipEffectFn)] = &[(0x17, sample_mode), (0x20, noise_mode), (0x30, hard_reset)];

static YM2151_PRE: &[(u8, ChipEffectFn)] = &[(0x30, hard_reset)];

static SMS_PRE: &[(u8, ChipEffectFn)] = &[(0x20, noise_mode)];

static GB_PRE: &[(u8, ChipEffectFn)] = &[
    (0x10, wave),
    (0x11, noise_mode),
    (0x12, noise_mode),
    (0x13, gb_sweep_time),
    (0x14, gb_sweep_dir),
];

static PCE_PRE: &[(u8, ChipEffectFn)] = &[
    (0x10, wave),
    (0x11, noise_mode),
    (0x12, pce_lfo_mode),
    (0x13, pce_lfo_speed),
    (0x17, sample_mode),
];

static NES_PRE: &[(u8, ChipEffectFn)] = &[
    (0x12, noise_mode),
    (0x13, nes_sweep_up),
    (0x14, nes_sweep_down),
];

static FDS_PRE: &[(u8, ChipEffectFn)] = &[
    (0x10, wave),
    (0x11, fds_mod_depth),
    (0x12, fds_mod_high),
    (0x13, fds_mod_low),
    (0x14, fds_mod_pos),
    (0x15, fds_mod_wave),
];

static YM2612_POST: &[(u8, ChipEffectFn)] = &[
    (0x10, fm_lfo),
    (0x11, fm_fb),
    (0x12, fm_tl1),
    (0x13, fm_tl2),
    (0x14, fm_tl3),
    (0x15, fm_tl4),
    (0x16, fm_mult),
    (0x18, fm_ext_ch),
    (0x19, fm_ar_all),
    (0x1a, fm_ar1),
    (0x1b, fm_ar2),
    (0x1c, fm_ar3),
    (0x1d, fm_ar4),
    (0x1e, fm_am_depth),
    (0x1f, fm_pm_depth),
];

static YM2151_POST: &[(u8, ChipEffectFn)] = &[
    (0x10, noise_freq),
    (0x11, fm_fb),
    (0x12, fm_tl1),
    (0x13, fm_tl2),
    (0x14, fm_tl3),
    (0x15, fm_tl4),
    (0x16, fm_mult),
    (0x17, fm_lfo),
    (0x18, fm_lfo_wave),
    (0x19, fm_ar_all),
    (0x1a, fm_ar1),
    (0x1b, fm_ar2),
    (0x1c, fm_ar3),
    (0x1d, fm_ar4),
    (0x1e, fm_am_depth),
    (0x1f, fm_pm_depth),
];

static AY_POST: &[(u8, ChipEffectFn)] = &[
    (0x12, ay_mode_alt),
    (0x20, ay_mode),
    (0x21, noise_freq),
    (0x22, ay_env_set),
    (0x23, ay_env_low),
    (0x24, ay_env_high),
    (0x25, ay_env_slide_up),
    (0x26, ay_env_slide_down),
    (0x27, ay_noise_and),
    (0x28, ay_noise_or),
    (0x29, ay_auto_env),
    (0x2d, ay_io_dir),
    (0x2e, ay_io_a),
    (0x2f, ay_io_b),
];

/// Effects resolved before the universal table.
pub fn pre_table(family: ChipFamily) -> EffectTable {
    match family {
        ChipFamily::Ym2612 => YM2612_PRE,
        ChipFamily::Ym2151 => YM2151_PRE,
        ChipFamily::Sms => SMS_PRE,
        ChipFamily::GameBoy => GB_PRE,
        ChipFamily::PcEngine => PCE_PRE,
        ChipFamily::Nes => NES_PRE,
        ChipFamily::Fds => FDS_PRE,
        ChipFamily::Ay8910 => &[],
    }
}

/// Effects applied after the row's note.
pub fn post_table(family: ChipFamily) -> EffectTable {
    match family {
        ChipFamily::Ym2612 => YM2612_POST,
        ChipFamily::Ym2151 => YM2151_POST,
        ChipFamily::Ay8910 => AY_POST,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::lookup;

    #[test]
    fn tables_are_sorted() {
        for family in ChipFamily::ALL {
            for table in [pre_table(family), post_table(family)] {
                assert!(
                    table.windows(2).all(|w| w[0].0 < w[1].0),
                    "{family} table out of order"
                );
            }
        }
    }

    #[test]
    fn mult_ignores_invalid_operator() {
        assert_eq!(fm_mult(0, 0x05), None);
        assert_eq!(fm_mult(0, 0x52), None);
        assert_eq!(fm_mult(2, 0x3a), Some(Command::new(Opcode::FmMult, 2, 2, 10)));
    }

    #[test]
    fn opm_lfo_moves_to_17() {
        let opn = lookup(post_table(ChipFamily::Ym2612), 0x10).unwrap();
        let opm = lookup(post_table(ChipFamily::Ym2151), 0x10).unwrap();
        assert_eq!(opn(0, 4), Some(Command::with_value(Opcode::FmLfo, 0, 4)));
        assert_eq!(opm(0, 4), Some(Command::with_value(Opcode::StdNoiseFreq, 0, 4)));
        assert!(lookup(post_table(ChipFamily::Ym2612), 0x17).is_none());
    }

    #[test]
    fn ay_io_ports() {
        let table = post_table(ChipFamily::Ay8910);
        let io_b = lookup(table, 0x2f).unwrap();
        assert_eq!(io_b(1, 0x55), Some(Command::new(Opcode::AyIoWrite, 1, 0x55, 1)));
        let slide = lookup(table, 0x25).unwrap();
        assert_eq!(slide(0, 3), Some(Command::with_value(Opcode::AyEnvelopeSlide, 0, -3)));
    }

    #[test]
    fn nes_sweep_direction() {
        let down = lookup(pre_table(ChipFamily::Nes), 0x14).unwrap();
        assert_eq!(down(0, 0x21), Some(Command::new(Opcode::NesSweep, 0, 1, 0x21)));
    }
}

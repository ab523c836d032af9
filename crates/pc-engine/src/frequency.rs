//! Pitch-to-frequency conversion for the reference backends.
//!
//! Pitches are expressed in 1/128 semitone units with C-0 = 0, so note `n`
//! sits at `n * 128`. A-4 (note 57) is 440 Hz.

/// Subdivisions of one semitone.
pub const PITCH_UNITS: i32 = 128;

/// Pitch of A-4 in pitch units.
const A4_PITCH: i32 = 57 * PITCH_UNITS;

/// A-4 in milli-Hz.
const A4_MILLIHZ: u64 = 440_000;

/// Pitch units for a note number.
pub const fn note_pitch(note: i32) -> i32 {
    note * PITCH_UNITS
}

/// Convert a pitch (1/128 semitone units) to Hz.
pub fn pitch_to_hz(pitch: i32) -> f64 {
    let offset = pitch - A4_PITCH;
    let semitones = offset.div_euclid(PITCH_UNITS);
    let fraction = offset.rem_euclid(PITCH_UNITS);
    let base = shift_frequency(A4_MILLIHZ, semitones) as f64 / 1000.0;
    base * libm::exp2(fraction as f64 / (12 * PITCH_UNITS) as f64)
}

/// Divider value for a tone generator that toggles every `divider` input
/// clocks per half period: `clock / (divider * hz)`, clamped to `1..=max`.
pub fn tone_period(clock: u32, divider: u32, hz: f64, max: u32) -> u32 {
    if hz <= 0.0 || divider == 0 {
        return max;
    }
    let period = clock as f64 / (divider as f64 * hz);
    (period as u32).clamp(1, max)
}

/// Shift a frequency by a number of semitones using 12-TET.
fn shift_frequency(base_freq: u64, semitones: i32) -> u64 {
    let octaves = semitones.div_euclid(12);
    let remainder = semitones.rem_euclid(12) as usize;

    // round(2^(n/12) * 65536)
    const SEMITONE_MUL: [u64; 12] = [
        65536, 69433, 73562, 77936, 82570, 87480, 92682, 98193, 104032, 110218, 116772, 123715,
    ];

    let freq = (base_freq * SEMITONE_MUL[remainder]) >> 16;

    if octaves >= 0 {
        freq << octaves.min(24) as u32
    } else {
        freq >> (-octaves).min(63) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert!((pitch_to_hz(note_pitch(57)) - 440.0).abs() < 0.01);
    }

    #[test]
    fn octave_up_doubles() {
        let a4 = pitch_to_hz(note_pitch(57));
        let a5 = pitch_to_hz(note_pitch(69));
        assert!((a5 - a4 * 2.0).abs() < 0.01);
    }

    #[test]
    fn octave_down_halves() {
        let a4 = pitch_to_hz(note_pitch(57));
        let a3 = pitch_to_hz(note_pitch(45));
        assert!((a3 - a4 / 2.0).abs() < 0.01);
    }

    #[test]
    fn fine_pitch_lands_between_semitones() {
        let a4 = pitch_to_hz(note_pitch(57));
        let half = pitch_to_hz(note_pitch(57) + PITCH_UNITS / 2);
        let bb4 = pitch_to_hz(note_pitch(58));
        assert!(a4 < half && half < bb4);
    }

    #[test]
    fn tone_period_matches_sn76489_formula() {
        // A-4 on a 3.58 MHz SN76489: 3579545 / (32 * 440) = 254
        assert_eq!(tone_period(3_579_545, 32, 440.0, 1023), 254);
    }

    #[test]
    fn tone_period_clamps() {
        assert_eq!(tone_period(3_579_545, 32, 1.0, 1023), 1023);
        assert_eq!(tone_period(3_579_545, 32, 1.0e9, 1023), 1);
        assert_eq!(tone_period(3_579_545, 32, 0.0, 1023), 1023);
    }
}

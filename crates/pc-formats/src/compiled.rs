//! Run-length compiled pattern form.
//!
//! Each row becomes a record: a mask byte, the fields the mask announces,
//! then a run byte counting how many further rows encode to the same
//! record. Volume and instrument are only written when they differ from the
//! last value written, so a record describes what changed rather than the
//! literal cell. The stream ends with [`END_MARK`].
//!
//! Mask layout:
//!
//! | bit    | meaning                                        |
//! |--------|------------------------------------------------|
//! | `0x80` | note byte follows                              |
//! | `0x40` | volume byte follows                            |
//! | `0x20` | instrument byte follows                        |
//! | `0x10` | effects follow; low 3 bits hold `count - 1`    |

use pc_ir::{Cell, EffectCell, Note, Pattern, MAX_EFFECT_COLUMNS, MAX_ROWS};

use crate::error::{FormatError, Result};

/// Terminates a compiled stream. No record mask has this value.
pub const END_MARK: u8 = 0x08;

const NOTE_BIT: u8 = 0x80;
const VOLUME_BIT: u8 = 0x40;
const INSTRUMENT_BIT: u8 = 0x20;
const EFFECTS_BIT: u8 = 0x10;
const COUNT_MASK: u8 = 0x07;

const NOTE_OFF: i8 = -128;
const NOTE_OFF_RELEASE: i8 = -127;
const NOTE_RELEASE: i8 = -126;

/// Pitch range a note byte can carry next to the sentinels.
const MIN_PITCH: i32 = -125;
const MAX_PITCH: i32 = 127;

/// Last volume and instrument written to the stream.
#[derive(Default)]
struct Emitted {
    volume: Option<u8>,
    instrument: Option<u8>,
}

impl Emitted {
    fn volume(&mut self, volume: Option<u8>) -> Option<u8> {
        let v = volume.filter(|&v| Some(v) != self.volume)?;
        self.volume = Some(v);
        Some(v)
    }

    fn instrument(&mut self, instrument: Option<u8>) -> Option<u8> {
        let i = instrument.filter(|&i| Some(i) != self.instrument)?;
        self.instrument = Some(i);
        Some(i)
    }
}

fn clamp_columns(effect_columns: usize) -> usize {
    effect_columns.clamp(1, MAX_EFFECT_COLUMNS)
}

/// A note as the stream can represent it.
fn storable(note: Note) -> Note {
    match note.pitch() {
        Some(pitch) => Note::from_pitch(pitch.clamp(MIN_PITCH, MAX_PITCH)),
        None => note,
    }
}

fn note_byte(note: Note) -> Option<i8> {
    match note {
        Note::None => None,
        Note::Off => Some(NOTE_OFF),
        Note::OffRelease => Some(NOTE_OFF_RELEASE),
        Note::Release => Some(NOTE_RELEASE),
        Note::On { .. } => note.pitch().map(|p| p.clamp(MIN_PITCH, MAX_PITCH) as i8),
    }
}

fn decode_note(byte: i8) -> Note {
    match byte {
        NOTE_OFF => Note::Off,
        NOTE_OFF_RELEASE => Note::OffRelease,
        NOTE_RELEASE => Note::Release,
        pitch => Note::from_pitch(pitch as i32),
    }
}

fn encode_row(cell: &Cell, columns: usize, last: &mut Emitted, out: &mut Vec<u8>) {
    let note = note_byte(cell.note);
    let volume = last.volume(cell.volume);
    let instrument = last.instrument(cell.instrument);
    let count = cell.effects[..columns]
        .iter()
        .rposition(Option::is_some)
        .map(|i| i + 1);

    let mut mask = 0;
    if note.is_some() {
        mask |= NOTE_BIT;
    }
    if volume.is_some() {
        mask |= VOLUME_BIT;
    }
    if instrument.is_some() {
        mask |= INSTRUMENT_BIT;
    }
    if let Some(count) = count {
        mask |= EFFECTS_BIT | (count - 1) as u8;
    }

    out.push(mask);
    out.extend(note.map(|n| n as u8));
    out.extend(volume);
    out.extend(instrument);
    if let Some(count) = count {
        let effects = &cell.effects[..count];
        let presence = effects
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .fold(0u8, |bits, (col, _)| bits | 1 << col);
        out.push(presence);
        for effect in effects.iter().flatten() {
            out.push(effect.code);
            out.push(effect.value_or_zero());
        }
    }
}

/// Compile the first `length_rows` rows of `pattern`.
pub fn compile(pattern: &Pattern, length_rows: usize, effect_columns: usize) -> Vec<u8> {
    let columns = clamp_columns(effect_columns);
    let mut out = Vec::new();
    let mut last = Emitted::default();
    let mut pending: Option<(Vec<u8>, u8)> = None;
    let mut record = Vec::new();

    for cell in pattern.rows(length_rows.min(MAX_ROWS)) {
        record.clear();
        encode_row(cell, columns, &mut last, &mut record);
        if let Some((prev, run)) = &mut pending {
            if *prev == record && *run < u8::MAX {
                *run += 1;
                continue;
            }
        }
        if let Some((prev, run)) = pending.take() {
            out.extend_from_slice(&prev);
            out.push(run);
        }
        pending = Some((record.clone(), 0));
    }
    if let Some((prev, run)) = pending {
        out.extend_from_slice(&prev);
        out.push(run);
    }
    out.push(END_MARK);
    out
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn byte(&mut self) -> Result<u8> {
        let b = *self.bytes.get(self.pos).ok_or(FormatError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }
}

/// Rebuild a pattern from its compiled form.
///
/// The result equals [`effective`] of the pattern that was compiled.
pub fn decompile(bytes: &[u8], length_rows: usize, effect_columns: usize) -> Result<Pattern> {
    let rows = length_rows.min(MAX_ROWS);
    let columns = clamp_columns(effect_columns);
    let mut reader = Reader { bytes, pos: 0 };
    let mut pattern = Pattern::new();
    let mut row = 0;

    loop {
        let mask = reader.byte()?;
        if mask == END_MARK {
            break;
        }
        if mask & END_MARK != 0 || (mask & EFFECTS_BIT == 0 && mask & COUNT_MASK != 0) {
            return Err(FormatError::InvalidCell(format!("bad mask {mask:#04x} at row {row}")));
        }

        let mut cell = Cell::EMPTY;
        if mask & NOTE_BIT != 0 {
            cell.note = decode_note(reader.byte()? as i8);
        }
        if mask & VOLUME_BIT != 0 {
            cell.volume = Some(reader.byte()?);
        }
        if mask & INSTRUMENT_BIT != 0 {
            cell.instrument = Some(reader.byte()?);
        }
        if mask & EFFECTS_BIT != 0 {
            let count = (mask & COUNT_MASK) as usize + 1;
            if count > columns {
                return Err(FormatError::InvalidCell(format!(
                    "{count} effect columns at row {row}, pattern has {columns}"
                )));
            }
            let presence = reader.byte()?;
            for col in 0..count {
                if presence & (1 << col) != 0 {
                    let code = reader.byte()?;
                    let value = reader.byte()?;
                    cell.effects[col] = Some(EffectCell::new(code, value));
                }
            }
        }

        let run = reader.byte()? as usize;
        if row + run >= rows {
            return Err(FormatError::InvalidCell(format!(
                "stream runs past the pattern length of {rows} rows"
            )));
        }
        for _ in 0..=run {
            pattern.set_row(row, cell);
            row += 1;
        }
    }
    Ok(pattern)
}

/// The pattern a compile/decompile round trip yields.
///
/// Effect values left blank read as 0, volume and instrument equal to the
/// last written value are dropped, and everything past `length_rows` or
/// `effect_columns` is cleared.
pub fn effective(pattern: &Pattern, length_rows: usize, effect_columns: usize) -> Pattern {
    let columns = clamp_columns(effect_columns);
    let mut last = Emitted::default();
    let mut out = Pattern::new();
    for (row, cell) in pattern.rows(length_rows.min(MAX_ROWS)).iter().enumerate() {
        let mut normalized = Cell::EMPTY;
        normalized.note = storable(cell.note);
        normalized.volume = last.volume(cell.volume);
        normalized.instrument = last.instrument(cell.instrument);
        for (dst, src) in normalized.effects.iter_mut().zip(&cell.effects[..columns]) {
            *dst = src.map(|e| EffectCell::new(e.code, e.value_or_zero()));
        }
        out.set_row(row, normalized);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(note: Note, instrument: Option<u8>, volume: Option<u8>) -> Cell {
        let mut cell = Cell::with_note(note);
        cell.instrument = instrument;
        cell.volume = volume;
        cell
    }

    #[test]
    fn silent_pattern_is_three_bytes() {
        let pattern = Pattern::new();
        assert_eq!(compile(&pattern, 256, 1), vec![0x00, 255, END_MARK]);
        assert_eq!(compile(&pattern, 64, 4), vec![0x00, 63, END_MARK]);
    }

    #[test]
    fn record_layout() {
        let mut pattern = Pattern::new();
        let mut first = cell(Note::new(0, 4), Some(1), Some(0x40));
        first.set_effect(0, 0x03, 0x04);
        pattern.set_row(0, first);
        let bytes = compile(&pattern, 4, 1);
        assert_eq!(
            bytes,
            vec![0xf0, 48, 0x40, 0x01, 0b1, 0x03, 0x04, 0, 0x00, 2, END_MARK]
        );
    }

    #[test]
    fn unchanged_instrument_is_not_rewritten() {
        let mut pattern = Pattern::new();
        for row in 0..3 {
            pattern.set_row(row, cell(Note::new(2, 3), Some(5), None));
        }
        let bytes = compile(&pattern, 3, 1);
        // first row carries the instrument, the next two share one record
        assert_eq!(bytes, vec![0xa0, 38, 5, 0, 0x80, 38, 1, END_MARK]);
    }

    #[test]
    fn round_trip_matches_effective() {
        let mut pattern = Pattern::new();
        let mut a = cell(Note::new(9, 4), Some(2), Some(0x30));
        a.set_effect(0, 0x04, 0x44);
        a.effects[2] = Some(EffectCell { code: 0x0a, value: None });
        pattern.set_row(0, a);
        pattern.set_row(1, cell(Note::Off, Some(2), Some(0x30)));
        pattern.set_row(2, cell(Note::OffRelease, None, Some(0x10)));
        pattern.set_row(3, cell(Note::Release, Some(3), None));
        let mut hidden = Cell::EMPTY;
        hidden.set_effect(5, 0xe5, 0x80);
        pattern.set_row(4, hidden);
        pattern.set_row(40, cell(Note::new(0, -1), None, None));
        pattern.set_row(63, cell(Note::new(11, 9), Some(0), Some(0)));
        // beyond the length
        pattern.set_row(70, cell(Note::new(0, 2), None, None));

        let bytes = compile(&pattern, 64, 3);
        let decoded = decompile(&bytes, 64, 3).unwrap();
        let expected = effective(&pattern, 64, 3);
        assert_eq!(decoded, expected);
        assert_eq!(expected.row(1).instrument, None);
        assert_eq!(expected.row(0).effects[2], Some(EffectCell::new(0x0a, 0)));
        assert!(expected.row(4).is_empty());
        assert!(expected.row(70).is_empty());
    }

    #[test]
    fn round_trip_with_every_column() {
        let mut pattern = Pattern::new();
        for row in (0..32).step_by(3) {
            let mut c = cell(Note::from_pitch(row as i32 + 24), Some(row as u8 % 4), None);
            for col in 0..MAX_EFFECT_COLUMNS {
                if (row + col) % 2 == 0 {
                    c.set_effect(col, col as u8 + 1, row as u8);
                }
            }
            pattern.set_row(row, c);
        }
        let bytes = compile(&pattern, 32, 8);
        assert_eq!(decompile(&bytes, 32, 8).unwrap(), effective(&pattern, 32, 8));
    }

    #[test]
    fn out_of_range_pitch_is_clamped() {
        let mut pattern = Pattern::new();
        pattern.set_row(0, cell(Note::from_pitch(200), None, None));
        let decoded = decompile(&compile(&pattern, 1, 1), 1, 1).unwrap();
        assert_eq!(decoded.row(0).note.pitch(), Some(127));
    }

    #[test]
    fn truncated_stream() {
        assert!(matches!(decompile(&[0x80], 4, 1), Err(FormatError::UnexpectedEof)));
        assert!(matches!(decompile(&[0x00, 3], 4, 1), Err(FormatError::UnexpectedEof)));
    }

    #[test]
    fn stream_longer_than_pattern() {
        let err = decompile(&[0x00, 9, END_MARK], 4, 1);
        assert!(matches!(err, Err(FormatError::InvalidCell(_))));
    }

    #[test]
    fn malformed_masks() {
        assert!(matches!(decompile(&[0x0c, 0, END_MARK], 4, 1), Err(FormatError::InvalidCell(_))));
        assert!(matches!(decompile(&[0x03, 0, END_MARK], 4, 1), Err(FormatError::InvalidCell(_))));
        // three columns announced, one configured
        assert!(matches!(
            decompile(&[0x12, 0b100, 1, 1, 0, END_MARK], 4, 1),
            Err(FormatError::InvalidCell(_))
        ));
    }

    #[test]
    fn short_stream_leaves_rest_empty() {
        let decoded = decompile(&[0x80, 48, 0, END_MARK], 16, 1).unwrap();
        assert_eq!(decoded.row(0).note, Note::new(0, 4));
        assert!(decoded.row(1).is_empty());
    }
}

//! Tracker cell notation: `"C-4 01 40 0304"`.
//!
//! A cell is written as whitespace separated fields: note, instrument,
//! volume, then one four character field per effect column. Blank fields
//! are dots. Trailing fields may be left out when parsing.

use pc_ir::{Cell, EffectCell, Note, MAX_EFFECT_COLUMNS};

use crate::error::{FormatError, Result};

const NOTE_NAMES: [&str; 12] = ["C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-"];

pub fn format_note(note: Note) -> String {
    match note {
        Note::None => "...".into(),
        Note::Off => "OFF".into(),
        Note::OffRelease => "===".into(),
        Note::Release => "REL".into(),
        Note::On { semitone, octave } => {
            format!("{}{}", NOTE_NAMES[semitone as usize % 12], octave)
        }
    }
}

pub fn parse_note(text: &str) -> Result<Note> {
    match text {
        "..." | "---" => return Ok(Note::None),
        "OFF" => return Ok(Note::Off),
        "===" => return Ok(Note::OffRelease),
        "REL" => return Ok(Note::Release),
        _ => {}
    }
    let invalid = || FormatError::InvalidNote(text.to_string());
    let name = text.get(..2).ok_or_else(invalid)?.to_ascii_uppercase();
    let semitone = NOTE_NAMES.iter().position(|&n| n == name).ok_or_else(invalid)?;
    let octave: i8 = text[2..].parse().map_err(|_| invalid())?;
    Ok(Note::new(semitone as u8, octave))
}

fn parse_hex(text: &str, what: &str) -> Result<Option<u8>> {
    if text == ".." {
        return Ok(None);
    }
    if text.len() != 2 {
        return Err(FormatError::InvalidCell(format!("{what} '{text}' is not two hex digits")));
    }
    u8::from_str_radix(text, 16)
        .map(Some)
        .map_err(|_| FormatError::InvalidCell(format!("{what} '{text}' is not two hex digits")))
}

fn format_hex(value: Option<u8>) -> String {
    value.map_or_else(|| "..".into(), |v| format!("{v:02X}"))
}

fn parse_effect(text: &str) -> Result<Option<EffectCell>> {
    if text.len() != 4 || !text.is_ascii() {
        return Err(FormatError::InvalidCell(format!("effect '{text}' is not four characters")));
    }
    let code = parse_hex(&text[..2], "effect code")?;
    let value = parse_hex(&text[2..], "effect value")?;
    match (code, value) {
        (Some(code), value) => Ok(Some(EffectCell { code, value })),
        (None, None) => Ok(None),
        (None, Some(_)) => Err(FormatError::InvalidCell(format!("effect '{text}' has a value but no code"))),
    }
}

/// Parse one cell.
pub fn parse_cell(text: &str) -> Result<Cell> {
    let mut fields = text.split_whitespace();
    let mut cell = Cell::EMPTY;
    if let Some(note) = fields.next() {
        cell.note = parse_note(note)?;
    }
    if let Some(ins) = fields.next() {
        cell.instrument = parse_hex(ins, "instrument")?;
    }
    if let Some(vol) = fields.next() {
        cell.volume = parse_hex(vol, "volume")?;
    }
    for (col, field) in fields.enumerate() {
        if col >= MAX_EFFECT_COLUMNS {
            return Err(FormatError::InvalidCell(format!(
                "more than {MAX_EFFECT_COLUMNS} effect columns in '{text}'"
            )));
        }
        cell.effects[col] = parse_effect(field)?;
    }
    Ok(cell)
}

/// Write a cell with `effect_columns` effect fields.
pub fn format_cell(cell: &Cell, effect_columns: usize) -> String {
    let mut out = format!(
        "{} {} {}",
        format_note(cell.note),
        format_hex(cell.instrument),
        format_hex(cell.volume)
    );
    for effect in &cell.effects[..effect_columns.clamp(1, MAX_EFFECT_COLUMNS)] {
        out.push(' ');
        match effect {
            Some(e) => {
                out.push_str(&format!("{:02X}", e.code));
                out.push_str(&format_hex(e.value));
            }
            None => out.push_str("...."),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_cell() {
        let cell = parse_cell("C-4 01 40 0304").unwrap();
        assert_eq!(cell.note, Note::new(0, 4));
        assert_eq!(cell.instrument, Some(1));
        assert_eq!(cell.volume, Some(0x40));
        assert_eq!(cell.effects[0], Some(EffectCell::new(0x03, 0x04)));
    }

    #[test]
    fn dots_are_blank() {
        let cell = parse_cell("... .. .. .... 0A..").unwrap();
        assert!(cell.note == Note::None && cell.instrument.is_none() && cell.volume.is_none());
        assert_eq!(cell.effects[0], None);
        assert_eq!(cell.effects[1], Some(EffectCell { code: 0x0a, value: None }));
        assert!(parse_cell("").unwrap().is_empty());
    }

    #[test]
    fn special_notes() {
        assert_eq!(parse_note("OFF").unwrap(), Note::Off);
        assert_eq!(parse_note("===").unwrap(), Note::OffRelease);
        assert_eq!(parse_note("REL").unwrap(), Note::Release);
        assert_eq!(parse_note("a#3").unwrap(), Note::new(10, 3));
        assert_eq!(parse_note("C--1").unwrap(), Note::new(0, -1));
    }

    #[test]
    fn bad_input() {
        assert!(matches!(parse_note("H-4"), Err(FormatError::InvalidNote(_))));
        assert!(matches!(parse_note("C-x"), Err(FormatError::InvalidNote(_))));
        assert!(matches!(parse_note("C"), Err(FormatError::InvalidNote(_))));
        assert!(matches!(parse_cell("C-4 1 .."), Err(FormatError::InvalidCell(_))));
        assert!(matches!(parse_cell("C-4 .. .. ..04"), Err(FormatError::InvalidCell(_))));
        assert!(matches!(parse_cell("C-4 .. .. 030"), Err(FormatError::InvalidCell(_))));
    }

    #[test]
    fn format_round_trips() {
        for text in ["C-4 01 40 0304", "OFF .. .. ....", "G#-2 FF .. E5.. 0B01", "=== .. 7F ...."] {
            let cell = parse_cell(text).unwrap();
            let columns = text.split_whitespace().count() - 3;
            assert_eq!(format_cell(&cell, columns), text);
        }
    }
}

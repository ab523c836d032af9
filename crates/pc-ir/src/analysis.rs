//! Subsong feature scan: reports which effects and note kinds a subsong uses.

use alloc::collections::BTreeSet;
use core::fmt;

use crate::pattern::{Cell, Note};
use crate::song::Subsong;

/// Summary of features used in a subsong.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SongFeatures {
    pub effects: BTreeSet<u8>,
    pub has_note_off: bool,
    pub has_release: bool,
    pub pitch_range: Option<(i32, i32)>,
    pub instruments_used: BTreeSet<u8>,
    pub patterns_allocated: usize,
    pub total_notes: usize,
}

/// Analyze the patterns reachable from a subsong's order list.
pub fn analyze(subsong: &Subsong) -> SongFeatures {
    let mut features = SongFeatures {
        patterns_allocated: subsong
            .channels
            .iter()
            .map(|c| c.patterns.allocated().count())
            .sum(),
        ..SongFeatures::default()
    };

    let rows = subsong.rows();
    for channel in 0..subsong.channel_count() {
        let columns = subsong.effect_columns(channel);
        let mut seen = BTreeSet::new();
        for order in 0..subsong.orders.len() {
            let index = subsong.orders.get(channel, order);
            if !seen.insert(index) {
                continue;
            }
            for cell in subsong.pattern_at(channel, order).rows(rows) {
                analyze_cell(cell, columns, &mut features);
            }
        }
    }

    features
}

fn analyze_cell(cell: &Cell, columns: usize, features: &mut SongFeatures) {
    match cell.note {
        Note::On { .. } => {
            features.total_notes += 1;
            if let Some(p) = cell.note.pitch() {
                features.pitch_range = Some(match features.pitch_range {
                    Some((lo, hi)) => (lo.min(p), hi.max(p)),
                    None => (p, p),
                });
            }
        }
        Note::Off | Note::OffRelease => features.has_note_off = true,
        Note::Release => features.has_release = true,
        Note::None => {}
    }

    if let Some(ins) = cell.instrument {
        features.instruments_used.insert(ins);
    }

    for effect in cell.effects_in(columns) {
        features.effects.insert(effect.code);
    }
}

impl fmt::Display for SongFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Notes:        {}", self.total_notes)?;
        if let Some((lo, hi)) = self.pitch_range {
            writeln!(f, "Pitch range:  {} - {}", lo, hi)?;
        }
        writeln!(f, "Patterns:     {}", self.patterns_allocated)?;
        writeln!(f, "Instruments:  {}", self.instruments_used.len())?;
        write!(f, "Effects:     ")?;
        if self.effects.is_empty() {
            write!(f, " (none)")?;
        }
        for code in &self.effects {
            write!(f, " {:02X}", code)?;
        }
        writeln!(f)?;
        if self.has_note_off {
            writeln!(f, "Uses note off")?;
        }
        if self.has_release {
            writeln!(f, "Uses envelope release")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Cell;
    use crate::song::Subsong;

    #[test]
    fn counts_reachable_notes_once_per_pattern() {
        let mut sub = Subsong::new(1);
        sub.pattern_length = 4;
        sub.orders.push(&[0]);
        let pat = sub.pattern_at_mut(0, 0).unwrap();
        let mut cell = Cell::with_note(Note::new(0, 4));
        cell.instrument = Some(2);
        cell.set_effect(0, 0x04, 0x21);
        pat.set_row(0, cell);
        pat.set_row(3, Cell::with_note(Note::Off));

        let features = analyze(&sub);
        assert_eq!(features.total_notes, 1);
        assert_eq!(features.pitch_range, Some((48, 48)));
        assert!(features.effects.contains(&0x04));
        assert!(features.has_note_off);
        assert_eq!(features.patterns_allocated, 1);
    }
}

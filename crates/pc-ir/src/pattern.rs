//! Pattern and cell types for per-channel sequences.

use alloc::boxed::Box;
use alloc::vec::Vec;
use arrayvec::ArrayString;

/// Maximum rows a pattern can hold.
pub const MAX_ROWS: usize = 256;
/// Maximum effect columns per channel.
pub const MAX_EFFECT_COLUMNS: usize = 8;
/// Maximum patterns per channel.
pub const MAX_PATTERNS: usize = 256;

/// A note value in a pattern cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Note {
    /// No note
    #[default]
    None,
    /// Note on. `semitone` is 0-11, `octave` may be negative.
    On { semitone: u8, octave: i8 },
    /// Key off
    Off,
    /// Key off with envelope release
    OffRelease,
    /// Envelope release only
    Release,
}

impl Note {
    /// Create a note from semitone (0-11) and octave.
    pub const fn new(semitone: u8, octave: i8) -> Self {
        Note::On { semitone: semitone % 12, octave }
    }

    /// Create a note from an absolute pitch (`octave * 12 + semitone`, C-0 = 0).
    pub const fn from_pitch(pitch: i32) -> Self {
        Note::On {
            semitone: pitch.rem_euclid(12) as u8,
            octave: pitch.div_euclid(12) as i8,
        }
    }

    /// Absolute pitch if this is a note on.
    pub const fn pitch(self) -> Option<i32> {
        match self {
            Note::On { semitone, octave } => Some(octave as i32 * 12 + semitone as i32),
            _ => None,
        }
    }

    /// True for `Off`, `OffRelease` and `Release`.
    pub const fn is_release(self) -> bool {
        matches!(self, Note::Off | Note::OffRelease | Note::Release)
    }
}

/// One effect column: an effect code and its optional parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EffectCell {
    pub code: u8,
    /// `None` means the value column is blank; it reads as 0.
    pub value: Option<u8>,
}

impl EffectCell {
    pub const fn new(code: u8, value: u8) -> Self {
        Self { code, value: Some(value) }
    }

    /// Parameter value, defaulting to 0 when unset.
    pub const fn value_or_zero(self) -> u8 {
        match self.value {
            Some(v) => v,
            None => 0,
        }
    }
}

/// A single row of one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cell {
    pub note: Note,
    pub instrument: Option<u8>,
    pub volume: Option<u8>,
    pub effects: [Option<EffectCell>; MAX_EFFECT_COLUMNS],
}

impl Default for Cell {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Cell {
    /// An empty cell.
    pub const EMPTY: Cell = Cell {
        note: Note::None,
        instrument: None,
        volume: None,
        effects: [None; MAX_EFFECT_COLUMNS],
    };

    /// Create a cell holding only a note.
    pub const fn with_note(note: Note) -> Self {
        let mut cell = Self::EMPTY;
        cell.note = note;
        cell
    }

    /// Returns true if the cell is completely empty.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Set effect column `column` (ignored past `MAX_EFFECT_COLUMNS`).
    pub fn set_effect(&mut self, column: usize, code: u8, value: u8) {
        if let Some(slot) = self.effects.get_mut(column) {
            *slot = Some(EffectCell::new(code, value));
        }
    }

    /// Iterate over the present effects in the first `columns` columns.
    pub fn effects_in(&self, columns: usize) -> impl Iterator<Item = EffectCell> + '_ {
        self.effects[..columns.min(MAX_EFFECT_COLUMNS)]
            .iter()
            .flatten()
            .copied()
    }

    /// First value of effect `code` in the first `columns` columns.
    pub fn find_effect(&self, code: u8, columns: usize) -> Option<u8> {
        self.effects_in(columns)
            .find(|e| e.code == code)
            .map(EffectCell::value_or_zero)
    }
}

static EMPTY_CELL: Cell = Cell::EMPTY;

/// The pattern returned for every read of an unallocated slot.
pub static EMPTY_PATTERN: Pattern = Pattern::EMPTY;

/// A fixed-capacity column of rows belonging to one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    pub name: ArrayString<32>,
    rows: [Cell; MAX_ROWS],
}

impl Default for Pattern {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Pattern {
    pub const EMPTY: Pattern = Pattern {
        name: ArrayString::new_const(),
        rows: [Cell::EMPTY; MAX_ROWS],
    };

    /// Create a zero-initialized pattern.
    pub fn new() -> Self {
        Self::EMPTY
    }

    /// Read a row. Out-of-range rows read as empty.
    pub fn row(&self, row: usize) -> &Cell {
        self.rows.get(row).unwrap_or(&EMPTY_CELL)
    }

    /// Mutable access to a row, `None` when out of range.
    pub fn row_mut(&mut self, row: usize) -> Option<&mut Cell> {
        self.rows.get_mut(row)
    }

    /// Overwrite a row. Returns false when out of range.
    pub fn set_row(&mut self, row: usize, cell: Cell) -> bool {
        match self.rows.get_mut(row) {
            Some(slot) => {
                *slot = cell;
                true
            }
            None => false,
        }
    }

    /// The first `len` rows.
    pub fn rows(&self, len: usize) -> &[Cell] {
        &self.rows[..len.min(MAX_ROWS)]
    }

    /// Returns true if none of the first `len` rows carry data.
    pub fn is_blank(&self, len: usize) -> bool {
        self.rows(len).iter().all(Cell::is_empty)
    }

    pub fn clear(&mut self) {
        self.rows = [Cell::EMPTY; MAX_ROWS];
    }
}

/// Sparse per-channel pattern collection.
///
/// Slots are allocated on first write. Reads of unallocated or out-of-range
/// slots return [`EMPTY_PATTERN`], so playback of malformed order data never
/// dereferences a missing pattern.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatternStore {
    patterns: Vec<Option<Box<Pattern>>>,
    effect_columns: u8,
}

impl PatternStore {
    pub fn new(effect_columns: u8) -> Self {
        Self {
            patterns: Vec::new(),
            effect_columns: effect_columns.clamp(1, MAX_EFFECT_COLUMNS as u8),
        }
    }

    /// Number of visible effect columns (1-8).
    pub fn effect_columns(&self) -> usize {
        self.effect_columns.max(1) as usize
    }

    pub fn set_effect_columns(&mut self, columns: u8) {
        self.effect_columns = columns.clamp(1, MAX_EFFECT_COLUMNS as u8);
    }

    /// Read a pattern, falling back to the shared empty pattern.
    pub fn get(&self, index: usize) -> &Pattern {
        match self.patterns.get(index) {
            Some(Some(pattern)) => pattern,
            _ => &EMPTY_PATTERN,
        }
    }

    /// Get a pattern for writing, allocating it on first access.
    ///
    /// Returns `None` if `index` is outside `0..MAX_PATTERNS`.
    pub fn get_or_create(&mut self, index: usize) -> Option<&mut Pattern> {
        if index >= MAX_PATTERNS {
            return None;
        }
        if self.patterns.len() <= index {
            self.patterns.resize_with(index + 1, || None);
        }
        let slot = &mut self.patterns[index];
        Some(slot.get_or_insert_with(|| Box::new(Pattern::new())))
    }

    pub fn is_allocated(&self, index: usize) -> bool {
        matches!(self.patterns.get(index), Some(Some(_)))
    }

    /// Iterate over allocated patterns with their slot index.
    pub fn allocated(&self) -> impl Iterator<Item = (usize, &Pattern)> {
        self.patterns
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_deref().map(|p| (i, p)))
    }

    /// Release every allocated pattern.
    pub fn wipe(&mut self) {
        self.patterns.clear();
    }
}

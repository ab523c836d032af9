//! Song structure and sequencing types.

use alloc::vec;
use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::chip::{ChipFamily, SystemConfig};
use crate::compat::CompatFlags;
use crate::pattern::{Pattern, PatternStore, MAX_ROWS};
use crate::sample::{Sample, Wavetable};

/// Maximum orders in a subsong.
pub const MAX_ORDERS: usize = 256;

/// A complete song: chips, subsongs, quirks and preview material.
#[derive(Clone, Debug)]
pub struct Song {
    pub title: ArrayString<32>,
    pub author: ArrayString<32>,
    /// Chips in mixing and channel-numbering order
    pub systems: Vec<SystemConfig>,
    pub subsongs: Vec<Subsong>,
    pub compat: CompatFlags,
    /// Master output gain
    pub master_volume: f32,
    pub samples: Vec<Sample>,
    pub wavetables: Vec<Wavetable>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            title: ArrayString::new(),
            author: ArrayString::new(),
            systems: Vec::new(),
            subsongs: Vec::new(),
            compat: CompatFlags::default(),
            master_volume: 1.0,
            samples: Vec::new(),
            wavetables: Vec::new(),
        }
    }
}

impl Song {
    /// Create a song using the given chips, with one empty subsong sized to
    /// their combined channel count.
    pub fn with_systems(title: &str, families: &[ChipFamily]) -> Self {
        let mut song = Self::default();
        let _ = song.title.try_push_str(title);
        song.systems = families.iter().map(|&f| SystemConfig::new(f)).collect();
        let channels = song.channel_count();
        song.subsongs.push(Subsong::new(channels));
        song
    }

    /// Total channels across all systems.
    pub fn channel_count(&self) -> usize {
        self.systems.iter().map(|s| s.family.channel_count()).sum()
    }

    /// Map a song channel to `(system index, local channel)`.
    pub fn locate_channel(&self, channel: usize) -> Option<(usize, usize)> {
        let mut base = 0;
        for (index, system) in self.systems.iter().enumerate() {
            let count = system.family.channel_count();
            if channel < base + count {
                return Some((index, channel - base));
            }
            base += count;
        }
        None
    }

    /// Chip family driving a song channel.
    pub fn family_of(&self, channel: usize) -> Option<ChipFamily> {
        self.locate_channel(channel)
            .map(|(system, _)| self.systems[system].family)
    }

    pub fn subsong(&self, index: usize) -> Option<&Subsong> {
        self.subsongs.get(index)
    }

    pub fn subsong_mut(&mut self, index: usize) -> Option<&mut Subsong> {
        self.subsongs.get_mut(index)
    }
}

/// Per-channel order list. All channels share one length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderTable {
    len: usize,
    /// `entries[channel][order]` = pattern index
    entries: Vec<Vec<u8>>,
}

impl OrderTable {
    /// A table with one order pointing every channel at pattern 0.
    pub fn new(channels: usize) -> Self {
        Self {
            len: 1,
            entries: vec![vec![0; 1]; channels],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn channels(&self) -> usize {
        self.entries.len()
    }

    /// Pattern index for a channel at an order. Out of range reads 0.
    pub fn get(&self, channel: usize, order: usize) -> u8 {
        self.entries
            .get(channel)
            .and_then(|c| c.get(order))
            .copied()
            .unwrap_or(0)
    }

    pub fn set(&mut self, channel: usize, order: usize, pattern: u8) {
        if order >= self.len {
            return;
        }
        if let Some(slot) = self.entries.get_mut(channel).and_then(|c| c.get_mut(order)) {
            *slot = pattern;
        }
    }

    /// Append an order row (one pattern index per channel; missing channels get 0).
    pub fn push(&mut self, patterns: &[u8]) -> bool {
        if self.len >= MAX_ORDERS {
            return false;
        }
        for (channel, list) in self.entries.iter_mut().enumerate() {
            list.push(patterns.get(channel).copied().unwrap_or(0));
        }
        self.len += 1;
        true
    }

    /// Replace all orders from a list of rows.
    pub fn set_rows(&mut self, rows: &[Vec<u8>]) {
        for list in &mut self.entries {
            list.clear();
        }
        self.len = 0;
        for row in rows.iter().take(MAX_ORDERS) {
            self.push(row);
        }
        if self.len == 0 {
            self.push(&[]);
        }
    }
}

/// One channel's pattern collection and display name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelData {
    pub name: ArrayString<32>,
    pub patterns: PatternStore,
}

/// An independent piece of music sharing the song's chips.
#[derive(Clone, Debug)]
pub struct Subsong {
    pub name: ArrayString<32>,
    /// Ticks per row on even rows
    pub speed1: u8,
    /// Ticks per row on odd rows
    pub speed2: u8,
    /// Extra multiplier: every speed tick lasts `time_base + 1` ticks
    pub time_base: u8,
    /// Tick rate in Hz
    pub hz: f64,
    /// Rows per pattern (1-256)
    pub pattern_length: usize,
    /// Ticks per arpeggio step
    pub arp_len: u8,
    /// Rows per beat (metronome)
    pub highlight_a: u8,
    /// Rows per bar (metronome)
    pub highlight_b: u8,
    pub orders: OrderTable,
    pub channels: Vec<ChannelData>,
}

impl Subsong {
    pub fn new(channels: usize) -> Self {
        Self {
            name: ArrayString::new(),
            speed1: 6,
            speed2: 6,
            time_base: 0,
            hz: 60.0,
            pattern_length: 64,
            arp_len: 1,
            highlight_a: 4,
            highlight_b: 16,
            orders: OrderTable::new(channels),
            channels: (0..channels)
                .map(|_| ChannelData {
                    name: ArrayString::new(),
                    patterns: PatternStore::new(1),
                })
                .collect(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Pattern length clamped to the valid range.
    pub fn rows(&self) -> usize {
        self.pattern_length.clamp(1, MAX_ROWS)
    }

    /// The pattern a channel plays at an order (empty if unallocated).
    pub fn pattern_at(&self, channel: usize, order: usize) -> &Pattern {
        let index = self.orders.get(channel, order) as usize;
        match self.channels.get(channel) {
            Some(data) => data.patterns.get(index),
            None => &crate::pattern::EMPTY_PATTERN,
        }
    }

    /// Writable pattern for a channel at an order, allocated on demand.
    pub fn pattern_at_mut(&mut self, channel: usize, order: usize) -> Option<&mut Pattern> {
        let index = self.orders.get(channel, order) as usize;
        self.channels
            .get_mut(channel)?
            .patterns
            .get_or_create(index)
    }

    pub fn effect_columns(&self, channel: usize) -> usize {
        self.channels
            .get(channel)
            .map_or(1, |c| c.patterns.effect_columns())
    }
}

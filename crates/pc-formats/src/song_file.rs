//! TOML song files.
//!
//! Patterns are stored as lists of rows in tracker notation, one string per
//! row starting at row 0. Rows after the last listed one are empty.
//!
//! ```toml
//! title = "demo"
//!
//! [[systems]]
//! family = "sms"
//!
//! [[subsongs]]
//! speed1 = 6
//! pattern_length = 16
//! orders = [[0, 0, 0, 0]]
//!
//! [[subsongs.channels]]
//! name = "square 1"
//!
//! [[subsongs.channels.patterns]]
//! index = 0
//! rows = ["C-4 00 0F ....", "... .. .. ....", "OFF .. .. ...."]
//! ```

use std::path::Path;

use arrayvec::ArrayString;
use pc_ir::{
    ChannelData, ChipFamily, CompatFlags, Pattern, Sample, Song, Subsong, SystemConfig, Wavetable,
    MAX_EFFECT_COLUMNS, MAX_ORDERS, MAX_PATTERNS, MAX_ROWS,
};
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result};
use crate::notation::{format_cell, parse_cell};

fn unity() -> i8 {
    64
}

fn one() -> u8 {
    1
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SystemEntry {
    pub family: ChipFamily,
    #[serde(default = "unity")]
    pub volume: i8,
    #[serde(default)]
    pub panning: i8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PatternEntry {
    pub index: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub rows: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ChannelEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default = "one")]
    pub effect_columns: u8,
    #[serde(default)]
    pub patterns: Vec<PatternEntry>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SubsongEntry {
    pub name: String,
    pub speed1: u8,
    pub speed2: u8,
    pub time_base: u8,
    pub hz: f64,
    pub pattern_length: usize,
    pub arp_len: u8,
    pub highlight_a: u8,
    pub highlight_b: u8,
    /// One list per order with a pattern index per channel
    pub orders: Vec<Vec<u8>>,
    pub channels: Vec<ChannelEntry>,
}

impl Default for SubsongEntry {
    fn default() -> Self {
        let sub = Subsong::new(0);
        Self {
            name: String::new(),
            speed1: sub.speed1,
            speed2: sub.speed2,
            time_base: sub.time_base,
            hz: sub.hz,
            pattern_length: sub.pattern_length,
            arp_len: sub.arp_len,
            highlight_a: sub.highlight_a,
            highlight_b: sub.highlight_b,
            orders: Vec::new(),
            channels: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SampleEntry {
    #[serde(default)]
    pub name: String,
    pub rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_start: Option<usize>,
    pub data: Vec<i16>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WavetableEntry {
    pub max: u8,
    pub data: Vec<u8>,
}

/// On-disk shape of a song.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SongFile {
    pub title: String,
    pub author: String,
    pub master_volume: f32,
    pub systems: Vec<SystemEntry>,
    pub compat: CompatFlags,
    pub subsongs: Vec<SubsongEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<SampleEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub wavetables: Vec<WavetableEntry>,
}

impl Default for SongFile {
    fn default() -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            master_volume: 1.0,
            systems: Vec::new(),
            compat: CompatFlags::default(),
            subsongs: Vec::new(),
            samples: Vec::new(),
            wavetables: Vec::new(),
        }
    }
}

/// Copy at most 32 bytes of `text`, cutting at a character boundary.
fn short_name(text: &str) -> ArrayString<32> {
    let mut name = ArrayString::new();
    for c in text.chars() {
        if name.try_push(c).is_err() {
            break;
        }
    }
    name
}

fn invalid(msg: String) -> FormatError {
    FormatError::InvalidSong(msg)
}

impl SongFile {
    pub fn from_song(song: &Song) -> Self {
        Self {
            title: song.title.to_string(),
            author: song.author.to_string(),
            master_volume: song.master_volume,
            systems: song
                .systems
                .iter()
                .map(|s| SystemEntry {
                    family: s.family,
                    volume: s.volume,
                    panning: s.panning,
                    clock: s.clock,
                })
                .collect(),
            compat: song.compat,
            subsongs: song.subsongs.iter().map(subsong_entry).collect(),
            samples: song
                .samples
                .iter()
                .map(|s| SampleEntry {
                    name: s.name.to_string(),
                    rate: s.rate,
                    loop_start: s.loop_start,
                    data: s.data.clone(),
                })
                .collect(),
            wavetables: song
                .wavetables
                .iter()
                .map(|w| WavetableEntry { max: w.max, data: w.data.clone() })
                .collect(),
        }
    }

    /// Validate and build the song.
    pub fn into_song(self) -> Result<Song> {
        if self.systems.is_empty() {
            return Err(invalid("song has no systems".into()));
        }
        let mut song = Song {
            title: short_name(&self.title),
            author: short_name(&self.author),
            master_volume: self.master_volume,
            compat: self.compat,
            ..Song::default()
        };
        song.systems = self
            .systems
            .iter()
            .map(|s| SystemConfig {
                family: s.family,
                volume: s.volume.clamp(-64, 64),
                panning: s.panning.max(-127),
                clock: s.clock,
            })
            .collect();

        let channels = song.channel_count();
        let subsongs = if self.subsongs.is_empty() { vec![SubsongEntry::default()] } else { self.subsongs };
        for (index, entry) in subsongs.into_iter().enumerate() {
            let sub = build_subsong(entry, channels)
                .map_err(|e| invalid(format!("subsong {index}: {e}")))?;
            song.subsongs.push(sub);
        }

        song.samples = self
            .samples
            .into_iter()
            .map(|s| {
                let mut sample = Sample::new(&s.name, s.data, s.rate);
                sample.loop_start = s.loop_start;
                sample
            })
            .collect();
        song.wavetables = self
            .wavetables
            .into_iter()
            .map(|w| Wavetable::new(w.data, w.max))
            .collect();
        Ok(song)
    }
}

fn subsong_entry(sub: &Subsong) -> SubsongEntry {
    let rows = sub.rows();
    SubsongEntry {
        name: sub.name.to_string(),
        speed1: sub.speed1,
        speed2: sub.speed2,
        time_base: sub.time_base,
        hz: sub.hz,
        pattern_length: sub.pattern_length,
        arp_len: sub.arp_len,
        highlight_a: sub.highlight_a,
        highlight_b: sub.highlight_b,
        orders: (0..sub.orders.len())
            .map(|order| (0..sub.channel_count()).map(|ch| sub.orders.get(ch, order)).collect())
            .collect(),
        channels: sub
            .channels
            .iter()
            .map(|data| {
                let columns = data.patterns.effect_columns();
                ChannelEntry {
                    name: data.name.to_string(),
                    effect_columns: columns as u8,
                    patterns: data
                        .patterns
                        .allocated()
                        .map(|(index, pattern)| pattern_entry(index, pattern, rows, columns))
                        .collect(),
                }
            })
            .collect(),
    }
}

fn pattern_entry(index: usize, pattern: &Pattern, rows: usize, columns: usize) -> PatternEntry {
    let cells = pattern.rows(rows);
    let used = cells.iter().rposition(|c| !c.is_empty()).map_or(0, |last| last + 1);
    PatternEntry {
        index,
        name: pattern.name.to_string(),
        rows: cells[..used].iter().map(|c| format_cell(c, columns)).collect(),
    }
}

fn build_subsong(entry: SubsongEntry, channels: usize) -> std::result::Result<Subsong, String> {
    if !(1..=MAX_ROWS).contains(&entry.pattern_length) {
        return Err(format!("pattern length {} is outside 1..={MAX_ROWS}", entry.pattern_length));
    }
    if entry.speed1 == 0 || entry.speed2 == 0 {
        return Err("speeds must be at least 1".into());
    }
    if entry.channels.len() > channels {
        return Err(format!(
            "{} channels listed but the systems provide {channels}",
            entry.channels.len()
        ));
    }
    if entry.orders.len() > MAX_ORDERS {
        return Err(format!("{} orders, at most {MAX_ORDERS} allowed", entry.orders.len()));
    }
    if let Some(row) = entry.orders.iter().position(|o| o.len() > channels) {
        return Err(format!("order {row} lists more than {channels} patterns"));
    }

    let mut sub = Subsong::new(channels);
    sub.name = short_name(&entry.name);
    sub.speed1 = entry.speed1;
    sub.speed2 = entry.speed2;
    sub.time_base = entry.time_base;
    sub.hz = entry.hz;
    sub.pattern_length = entry.pattern_length;
    sub.arp_len = entry.arp_len.max(1);
    sub.highlight_a = entry.highlight_a;
    sub.highlight_b = entry.highlight_b;
    sub.orders.set_rows(&entry.orders);

    for (ch, channel) in entry.channels.into_iter().enumerate() {
        if !(1..=MAX_EFFECT_COLUMNS as u8).contains(&channel.effect_columns) {
            return Err(format!("channel {ch}: effect columns must be 1..={MAX_EFFECT_COLUMNS}"));
        }
        let data: &mut ChannelData = &mut sub.channels[ch];
        data.name = short_name(&channel.name);
        data.patterns.set_effect_columns(channel.effect_columns);
        for entry in channel.patterns {
            if entry.rows.len() > sub.pattern_length {
                return Err(format!(
                    "channel {ch} pattern {}: {} rows in a {}-row pattern",
                    entry.index,
                    entry.rows.len(),
                    sub.pattern_length
                ));
            }
            let pattern = data
                .patterns
                .get_or_create(entry.index)
                .ok_or_else(|| format!("channel {ch}: pattern index {} >= {MAX_PATTERNS}", entry.index))?;
            pattern.name = short_name(&entry.name);
            for (row, text) in entry.rows.iter().enumerate() {
                let cell = parse_cell(text)
                    .map_err(|e| format!("channel {ch} pattern {} row {row}: {e}", entry.index))?;
                pattern.set_row(row, cell);
            }
        }
    }
    Ok(sub)
}

/// Parse a song from TOML text.
pub fn parse_song(text: &str) -> Result<Song> {
    let file: SongFile = toml::from_str(text)?;
    file.into_song()
}

/// Serialize a song to TOML text.
pub fn song_to_toml(song: &Song) -> Result<String> {
    Ok(toml::to_string(&SongFile::from_song(song))?)
}

/// Read and parse a song file.
pub fn load_song(path: impl AsRef<Path>) -> Result<Song> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let song = parse_song(&text)?;
    log::info!(
        "loaded '{}' from {}: {} chips, {} channels",
        song.title,
        path.display(),
        song.systems.len(),
        song.channel_count()
    );
    Ok(song)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_ir::{DuplicateSlides, EffectCell, Note};
    use test_log::test;

    const DEMO: &str = r#"
title = "demo"
author = "elh"

[[systems]]
family = "sms"

[[systems]]
family = "ay8910"
volume = 32
panning = -20

[compat]
limit_slides = true
duplicate_slides = "first-wins"

[[subsongs]]
speed1 = 3
speed2 = 4
pattern_length = 8
orders = [[0, 0, 0, 0, 0, 0, 0], [1]]

[[subsongs.channels]]
name = "lead"
effect_columns = 2

[[subsongs.channels.patterns]]
index = 0
rows = ["C-4 00 0F 0304 ....", "... .. .. .... ....", "OFF .. .. ...."]

[[subsongs.channels.patterns]]
index = 1
rows = ["... .. .. 0B00"]

[[samples]]
name = "kick"
rate = 8000
data = [0, 1000, -1000, 0]
"#;

    #[test]
    fn parse_demo() {
        let song = parse_song(DEMO).unwrap();
        assert_eq!(song.title.as_str(), "demo");
        assert_eq!(song.systems.len(), 2);
        assert_eq!(song.systems[1].volume, 32);
        assert_eq!(song.systems[0].volume, 64);
        assert_eq!(song.channel_count(), 7);
        assert!(song.compat.limit_slides);
        assert_eq!(song.compat.duplicate_slides, DuplicateSlides::FirstWins);
        assert!(song.compat.arp0_reset);

        let sub = &song.subsongs[0];
        assert_eq!((sub.speed1, sub.speed2, sub.pattern_length), (3, 4, 8));
        assert_eq!(sub.orders.len(), 2);
        assert_eq!(sub.orders.get(0, 1), 1);
        assert_eq!(sub.orders.get(3, 1), 0);
        assert_eq!(sub.effect_columns(0), 2);
        let row0 = sub.pattern_at(0, 0).row(0);
        assert_eq!(row0.note, Note::new(0, 4));
        assert_eq!(row0.volume, Some(0x0f));
        assert_eq!(row0.effects[0], Some(EffectCell::new(3, 4)));
        assert_eq!(sub.pattern_at(0, 0).row(2).note, Note::Off);
        assert_eq!(sub.pattern_at(0, 1).row(0).effects[0], Some(EffectCell::new(0x0b, 0)));
        assert_eq!(song.samples[0].data, vec![0, 1000, -1000, 0]);
    }

    #[test]
    fn save_and_reload() {
        let song = parse_song(DEMO).unwrap();
        let text = song_to_toml(&song).unwrap();
        let again = parse_song(&text).unwrap();
        assert_eq!(again.systems, song.systems);
        assert_eq!(again.compat, song.compat);
        assert_eq!(again.samples, song.samples);
        assert_eq!(again.subsongs[0].orders, song.subsongs[0].orders);
        assert_eq!(again.subsongs[0].channels, song.subsongs[0].channels);
    }

    #[test]
    fn missing_subsong_gets_defaults() {
        let song = parse_song("[[systems]]\nfamily = \"gameboy\"\n").unwrap();
        assert_eq!(song.subsongs.len(), 1);
        assert_eq!(song.subsongs[0].channel_count(), 4);
        assert_eq!(song.subsongs[0].speed1, 6);
    }

    #[test]
    fn rejects_bad_songs() {
        assert!(matches!(parse_song("title = \"x\""), Err(FormatError::InvalidSong(_))));
        assert!(matches!(parse_song("[[systems]]\nfamily = \"sid\"\n"), Err(FormatError::Toml(_))));

        let long = "[[systems]]\nfamily = \"fds\"\n[[subsongs]]\npattern_length = 300\n";
        assert!(matches!(parse_song(long), Err(FormatError::InvalidSong(_))));

        let bad_row = "[[systems]]\nfamily = \"fds\"\n[[subsongs]]\n[[subsongs.channels]]\n\
                       [[subsongs.channels.patterns]]\nindex = 0\nrows = [\"X-4\"]\n";
        let err = parse_song(bad_row).err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("row 0"), "{err}");

        let extra = "[[systems]]\nfamily = \"fds\"\n[[subsongs]]\n[[subsongs.channels]]\n[[subsongs.channels]]\n";
        assert!(matches!(parse_song(extra), Err(FormatError::InvalidSong(_))));
    }

    #[test]
    fn names_are_truncated() {
        let text = format!("title = \"{}\"\n[[systems]]\nfamily = \"nes\"\n", "x".repeat(40));
        assert_eq!(parse_song(&text).unwrap().title.len(), 32);
    }
}

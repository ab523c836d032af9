//! Core song and pattern types for the polychip sequencer.
//!
//! This crate defines the data model shared by the playback engine, the
//! format codecs and the controller: songs made of chips and subsongs,
//! sparse per-channel pattern storage, and the chip-agnostic command
//! vocabulary backends understand.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod analysis;
mod chip;
mod command;
mod compat;
mod note_event;
mod pattern;
mod sample;
pub mod song;
mod timestamp;

pub use analysis::{analyze, SongFeatures};
pub use chip::{ChipFamily, SystemConfig, UnknownChip};
pub use command::{Command, Opcode, DISPATCH_ACK, DISPATCH_IGNORED, NOTE_NULL, TARGET_REACHED};
pub use compat::{CompatFlags, DuplicateSlides};
pub use note_event::NoteEvent;
pub use pattern::{
    Cell, EffectCell, Note, Pattern, PatternStore, EMPTY_PATTERN, MAX_EFFECT_COLUMNS,
    MAX_PATTERNS, MAX_ROWS,
};
pub use sample::{Sample, Wavetable};
pub use song::{ChannelData, OrderTable, Song, Subsong, MAX_ORDERS};
pub use timestamp::PlaybackTime;

//! Playback engine for the polychip sequencer.
//!
//! Walks a song's patterns tick by tick, turns rows into chip-agnostic
//! commands, dispatches them to per-chip backends and mixes the backends'
//! output into one stereo stream.

mod backend;
pub mod backends;
mod channel;
mod clock;
mod context;
mod dispatcher;
pub mod effects;
mod error;
mod frame;
pub mod frequency;
mod metronome;
pub mod midi;
mod mixer;
mod note_queue;
mod preview;
mod scope;
mod sequencer;
mod shared;
pub mod walk;

pub use backend::{BackendCtor, BackendRegistry, ChipBackend, RegisterField, RegisterWrite};
pub use channel::{ChannelRuntimeState, NO_NOTE};
pub use clock::{ClockState, MASTER_CLOCK_PREC, MIN_HZ};
pub use context::{EngineContext, HaltMode, OrderJump, PendingJump, PlaybackState, StepPlay, Transport};
pub use dispatcher::{CapturedCommand, CommandDispatcher, CAPTURE_CAPACITY};
pub use error::{DeviceError, EngineError, Result};
pub use frame::Frame;
pub use metronome::{Click, Metronome};
pub use midi::{MidiMessage, MidiSink, RecordingSink};
pub use mixer::{Engine, MixOptions, HANG_LIMIT, MAX_BLOCK};
pub use note_queue::{NoteQueue, NOTE_QUEUE_CAPACITY};
pub use preview::{Preview, PreviewSource};
pub use scope::{Oscilloscope, SCOPE_LEN};
pub use sequencer::Sequencer;
pub use shared::SharedEngine;
pub use walk::{walk, LoopPoint, SongWalk};

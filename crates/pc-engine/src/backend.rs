//! The chip backend contract and the family registry.

use std::collections::BTreeMap;

use pc_ir::{ChipFamily, Command, SystemConfig};

use crate::backends::{PsgBackend, SilentBackend};
use crate::error::{EngineError, Result};

/// One raw register write observed on a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegisterWrite {
    pub addr: u32,
    pub value: u16,
}

/// Named register shown in debug views: `(label, index into register_pool)`.
pub type RegisterField = (&'static str, usize);

/// A sound chip as seen by the sequencer and mixer.
///
/// Backends receive [`Command`]s addressed to their local channels and
/// produce samples at their native rate. Everything chip specific stays
/// behind this trait.
pub trait ChipBackend: Send {
    fn family(&self) -> ChipFamily;

    fn channel_count(&self) -> usize;

    /// Native sample rate in Hz.
    fn rate(&self) -> u32;

    /// Handle one command. Returns 0 (ignored), 1 (acknowledged) or
    /// `TARGET_REACHED` for a finished `NotePorta`. Queries return their value.
    fn dispatch(&mut self, cmd: Command) -> i32;

    /// Render `len` native samples into `buf_l[start..]` (and `buf_r[start..]`
    /// for stereo chips).
    fn acquire(&mut self, buf_l: &mut [i16], buf_r: &mut [i16], start: usize, len: usize);

    /// Per-tick bookkeeping. `full_tick` is false for the extra sub-ticks
    /// of low-latency mode.
    fn tick(&mut self, full_tick: bool);

    fn reset(&mut self);

    fn notify_instrument_change(&mut self, _instrument: usize) {}

    fn notify_instrument_deletion(&mut self, _instrument: usize) {}

    fn notify_wave_change(&mut self, _wave: usize) {}

    fn is_stereo(&self) -> bool {
        false
    }

    /// Gain applied after mixing this chip's output.
    fn post_amp(&self) -> f32 {
        1.0
    }

    /// Whether a key-off on `channel` ends an arpeggio.
    fn key_off_affects_arpeggio(&self, _channel: usize) -> bool {
        false
    }

    /// Whether a key-off on `channel` ends a portamento.
    fn key_off_affects_portamento(&self, _channel: usize) -> bool {
        false
    }

    /// Lowest note a downward slide on `channel` may reach with limited slides.
    fn portamento_floor(&self, _channel: usize) -> i32 {
        0
    }

    /// Raw register contents for inspection.
    fn register_pool(&self) -> &[u8] {
        &[]
    }

    fn register_sheet(&self) -> &'static [RegisterField] {
        &[]
    }

    /// Write a register directly, bypassing the command path.
    fn poke(&mut self, _addr: u32, _value: u16) {}

    /// Start or stop recording register writes.
    fn set_register_logging(&mut self, _enabled: bool) {}

    /// Move recorded register writes into `out`, in write order.
    fn drain_register_writes(&mut self, _out: &mut Vec<RegisterWrite>) {}

    /// Silence or restore one channel's output.
    fn mute(&mut self, _channel: usize, _muted: bool) {}
}

/// Constructor stored in the registry.
pub type BackendCtor = Box<dyn Fn(&SystemConfig) -> Box<dyn ChipBackend> + Send + Sync>;

/// Maps chip families to backend constructors.
pub struct BackendRegistry {
    ctors: BTreeMap<ChipFamily, BackendCtor>,
}

impl BackendRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self { ctors: BTreeMap::new() }
    }

    /// A registry with the reference backends for every family.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(ChipFamily::Sms, |sys| Box::new(PsgBackend::sn76489(sys.clock())));
        registry.register(ChipFamily::Ay8910, |sys| Box::new(PsgBackend::ay8910(sys.clock())));
        for family in ChipFamily::ALL {
            if !registry.contains(family) {
                registry.register(family, move |_| Box::new(SilentBackend::new(family)));
            }
        }
        registry
    }

    /// Add or replace the constructor for `family`.
    pub fn register<F>(&mut self, family: ChipFamily, ctor: F)
    where
        F: Fn(&SystemConfig) -> Box<dyn ChipBackend> + Send + Sync + 'static,
    {
        self.ctors.insert(family, Box::new(ctor));
    }

    pub fn contains(&self, family: ChipFamily) -> bool {
        self.ctors.contains_key(&family)
    }

    /// Build a backend for one configured system.
    pub fn create(&self, system: &SystemConfig) -> Result<Box<dyn ChipBackend>> {
        let ctor = self
            .ctors
            .get(&system.family)
            .ok_or(EngineError::NoBackend(system.family))?;
        Ok(ctor(system))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl core::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.ctors.keys()).finish()
    }
}

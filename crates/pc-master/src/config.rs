//! Player settings, read from TOML.

use std::path::Path;

use pc_engine::{MixOptions, MAX_BLOCK};
use pc_formats::export::{ExportOptions, CURRENT_VERSION, MIN_VERSION};
use serde::{Deserialize, Serialize};

use crate::error::{MasterError, Result};

/// Settings shared by live playback, offline rendering and export.
///
/// Every key is optional in the file; missing keys take the defaults below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Output rate for offline rendering and export. Live playback uses
    /// the device rate.
    pub sample_rate: u32,
    /// Frames rendered per lock of the engine
    pub block_size: usize,
    /// Depth of the device queue
    pub buffer_ms: u32,
    /// Passes through the song before stopping; absent loops forever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loops: Option<u32>,
    /// Output silence instead of waiting when the engine is busy
    pub soft_lock: bool,
    /// Run backends on ~1 ms sub-ticks for finer live timing
    pub low_latency: bool,
    pub force_mono: bool,
    pub metronome: bool,
    pub metronome_volume: f32,
    /// Mirror dispatched commands to the log as MIDI
    pub midi_log: bool,
    /// Keep the most recent dispatched commands for inspection
    pub capture: bool,
    pub export_version: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 512,
            buffer_ms: 50,
            loops: None,
            soft_lock: false,
            low_latency: false,
            force_mono: false,
            metronome: false,
            metronome_volume: 1.0,
            midi_log: false,
            capture: false,
            export_version: CURRENT_VERSION,
        }
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Read a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(MasterError::Config("sample_rate must be positive".into()));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK {
            return Err(MasterError::Config(format!(
                "block_size {} outside 1..={MAX_BLOCK}",
                self.block_size
            )));
        }
        if !(self.metronome_volume.is_finite() && self.metronome_volume >= 0.0) {
            return Err(MasterError::Config(format!(
                "metronome_volume {} is not a non-negative number",
                self.metronome_volume
            )));
        }
        if self.export_version < MIN_VERSION {
            return Err(MasterError::Config(format!(
                "export_version {:#x} is older than {MIN_VERSION:#x}",
                self.export_version
            )));
        }
        Ok(())
    }

    pub fn mix_options(&self) -> MixOptions {
        MixOptions {
            force_mono: self.force_mono,
            metronome: self.metronome,
            metronome_volume: self.metronome_volume,
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions { version: self.export_version, sample_rate: self.sample_rate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn partial_file_overrides() {
        let config = Config::from_toml("block_size = 256\nloops = 2\nsoft_lock = true\nlow_latency = true\n").unwrap();
        assert_eq!(config.block_size, 256);
        assert_eq!(config.loops, Some(2));
        assert!(config.soft_lock);
        assert!(config.low_latency);
        assert_eq!(config.sample_rate, 44100);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_toml("block_size = 0").is_err());
        assert!(Config::from_toml("block_size = 100000").is_err());
        assert!(Config::from_toml("sample_rate = 0").is_err());
        assert!(Config::from_toml("metronome_volume = -1.0").is_err());
        assert!(Config::from_toml("export_version = 0x100").is_err());
        assert!(Config::from_toml("volume = 3").is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config { loops: Some(3), force_mono: true, ..Config::default() };
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
        assert!(!Config::default().to_toml().unwrap().contains("loops"));
    }
}

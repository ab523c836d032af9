//! Sound chip families and per-song system configuration.

use core::fmt;
use core::str::FromStr;

/// Family tag of an emulated sound chip.
///
/// The tag selects the backend constructor and the per-chip effect tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ChipFamily {
    /// SN76489 as found in the Master System
    Sms,
    /// AY-3-8910 / YM2149
    Ay8910,
    /// Game Boy APU
    GameBoy,
    /// PC Engine / HuC6280
    PcEngine,
    /// NES 2A03
    Nes,
    /// Famicom Disk System
    Fds,
    /// YM2612 (OPN2)
    Ym2612,
    /// YM2151 (OPM)
    Ym2151,
}

impl ChipFamily {
    pub const ALL: [ChipFamily; 8] = [
        ChipFamily::Sms,
        ChipFamily::Ay8910,
        ChipFamily::GameBoy,
        ChipFamily::PcEngine,
        ChipFamily::Nes,
        ChipFamily::Fds,
        ChipFamily::Ym2612,
        ChipFamily::Ym2151,
    ];

    /// Number of channels the chip exposes to the sequencer.
    pub const fn channel_count(self) -> usize {
        match self {
            ChipFamily::Sms => 4,
            ChipFamily::Ay8910 => 3,
            ChipFamily::GameBoy => 4,
            ChipFamily::PcEngine => 6,
            ChipFamily::Nes => 5,
            ChipFamily::Fds => 1,
            ChipFamily::Ym2612 => 6,
            ChipFamily::Ym2151 => 8,
        }
    }

    /// Default input clock in Hz.
    pub const fn default_clock(self) -> u32 {
        match self {
            ChipFamily::Sms => 3_579_545,
            ChipFamily::Ay8910 => 1_789_773,
            ChipFamily::GameBoy => 4_194_304,
            ChipFamily::PcEngine => 3_579_545,
            ChipFamily::Nes | ChipFamily::Fds => 1_789_773,
            ChipFamily::Ym2612 => 7_670_453,
            ChipFamily::Ym2151 => 3_579_545,
        }
    }

    /// True for the FM families.
    pub const fn is_fm(self) -> bool {
        matches!(self, ChipFamily::Ym2612 | ChipFamily::Ym2151)
    }

    pub const fn name(self) -> &'static str {
        match self {
            ChipFamily::Sms => "sms",
            ChipFamily::Ay8910 => "ay8910",
            ChipFamily::GameBoy => "gameboy",
            ChipFamily::PcEngine => "pcengine",
            ChipFamily::Nes => "nes",
            ChipFamily::Fds => "fds",
            ChipFamily::Ym2612 => "ym2612",
            ChipFamily::Ym2151 => "ym2151",
        }
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown chip family name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownChip;

impl fmt::Display for UnknownChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown chip family")
    }
}

impl FromStr for ChipFamily {
    type Err = UnknownChip;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChipFamily::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or(UnknownChip)
    }
}

/// One chip instance configured in a song.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SystemConfig {
    pub family: ChipFamily,
    /// Mix volume, 64 = unity. Negative values invert the output.
    pub volume: i8,
    /// Stereo balance, -127 (left) to 127 (right).
    pub panning: i8,
    /// Clock override in Hz.
    pub clock: Option<u32>,
}

impl SystemConfig {
    pub const fn new(family: ChipFamily) -> Self {
        Self {
            family,
            volume: 64,
            panning: 0,
            clock: None,
        }
    }

    pub const fn clock(&self) -> u32 {
        match self.clock {
            Some(clock) => clock,
            None => self.family.default_clock(),
        }
    }
}

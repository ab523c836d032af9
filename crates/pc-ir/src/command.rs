//! Chip-agnostic commands sent from the sequencer to chip backends.

/// Value of a `NoteOn` command that retriggers the current note.
pub const NOTE_NULL: i32 = i32::MAX;

/// Backend return code: command ignored.
pub const DISPATCH_IGNORED: i32 = 0;
/// Backend return code: command acknowledged.
pub const DISPATCH_ACK: i32 = 1;
/// Backend return code: a `NotePorta` glide reached its target.
pub const TARGET_REACHED: i32 = 2;

/// Operation carried by a [`Command`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `value` = note, `value2` = volume hint
    NoteOn,
    NoteOff,
    NoteOffEnv,
    EnvRelease,
    /// `value` = instrument, `value2` = 1 when triggered by live input
    Instrument,
    Volume,
    /// Query: returns the chip-visible volume
    GetVolume,
    /// Query: returns the maximum volume
    GetVolMax,
    /// `value` = speed, `value2` = target note
    NotePorta,
    Pitch,
    Panning,
    Legato,
    /// `value` = active, `value2` = 1 for a tone portamento
    PrePorta,
    /// `value` = ticks until the note lands
    PreNote,
    /// Query: nonzero if the volume must be set on every volume cell
    AlwaysSetVolume,

    SampleMode,
    SampleBank,
    SamplePos,

    FmHardReset,
    FmLfo,
    FmLfoWave,
    FmFb,
    FmMult,
    FmTl,
    FmAr,
    FmAmDepth,
    FmPmDepth,
    FmExtCh,

    StdNoiseFreq,
    StdNoiseMode,
    Wave,

    GbSweepTime,
    GbSweepDir,
    PceLfoMode,
    PceLfoSpeed,
    NesSweep,
    FdsModDepth,
    FdsModHigh,
    FdsModLow,
    FdsModPos,
    FdsModWave,

    AyEnvelopeSet,
    AyEnvelopeLow,
    AyEnvelopeHigh,
    AyEnvelopeSlide,
    AyNoiseMaskAnd,
    AyNoiseMaskOr,
    AyAutoEnvelope,
    AyIoWrite,
}

impl Opcode {
    /// Upper-case mnemonic used in logs and capture dumps.
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::NoteOn => "NOTE_ON",
            Opcode::NoteOff => "NOTE_OFF",
            Opcode::NoteOffEnv => "NOTE_OFF_ENV",
            Opcode::EnvRelease => "ENV_RELEASE",
            Opcode::Instrument => "INSTRUMENT",
            Opcode::Volume => "VOLUME",
            Opcode::GetVolume => "GET_VOLUME",
            Opcode::GetVolMax => "GET_VOLMAX",
            Opcode::NotePorta => "NOTE_PORTA",
            Opcode::Pitch => "PITCH",
            Opcode::Panning => "PANNING",
            Opcode::Legato => "LEGATO",
            Opcode::PrePorta => "PRE_PORTA",
            Opcode::PreNote => "PRE_NOTE",
            Opcode::AlwaysSetVolume => "ALWAYS_SET_VOLUME",
            Opcode::SampleMode => "SAMPLE_MODE",
            Opcode::SampleBank => "SAMPLE_BANK",
            Opcode::SamplePos => "SAMPLE_POS",
            Opcode::FmHardReset => "FM_HARD_RESET",
            Opcode::FmLfo => "FM_LFO",
            Opcode::FmLfoWave => "FM_LFO_WAVE",
            Opcode::FmFb => "FM_FB",
            Opcode::FmMult => "FM_MULT",
            Opcode::FmTl => "FM_TL",
            Opcode::FmAr => "FM_AR",
            Opcode::FmAmDepth => "FM_AM_DEPTH",
            Opcode::FmPmDepth => "FM_PM_DEPTH",
            Opcode::FmExtCh => "FM_EXTCH",
            Opcode::StdNoiseFreq => "STD_NOISE_FREQ",
            Opcode::StdNoiseMode => "STD_NOISE_MODE",
            Opcode::Wave => "WAVE",
            Opcode::GbSweepTime => "GB_SWEEP_TIME",
            Opcode::GbSweepDir => "GB_SWEEP_DIR",
            Opcode::PceLfoMode => "PCE_LFO_MODE",
            Opcode::PceLfoSpeed => "PCE_LFO_SPEED",
            Opcode::NesSweep => "NES_SWEEP",
            Opcode::FdsModDepth => "FDS_MOD_DEPTH",
            Opcode::FdsModHigh => "FDS_MOD_HIGH",
            Opcode::FdsModLow => "FDS_MOD_LOW",
            Opcode::FdsModPos => "FDS_MOD_POS",
            Opcode::FdsModWave => "FDS_MOD_WAVE",
            Opcode::AyEnvelopeSet => "AY_ENVELOPE_SET",
            Opcode::AyEnvelopeLow => "AY_ENVELOPE_LOW",
            Opcode::AyEnvelopeHigh => "AY_ENVELOPE_HIGH",
            Opcode::AyEnvelopeSlide => "AY_ENVELOPE_SLIDE",
            Opcode::AyNoiseMaskAnd => "AY_NOISE_MASK_AND",
            Opcode::AyNoiseMaskOr => "AY_NOISE_MASK_OR",
            Opcode::AyAutoEnvelope => "AY_AUTO_ENVELOPE",
            Opcode::AyIoWrite => "AY_IO_WRITE",
        }
    }

    /// Queries return data instead of changing chip state.
    pub const fn is_query(self) -> bool {
        matches!(
            self,
            Opcode::GetVolume | Opcode::GetVolMax | Opcode::AlwaysSetVolume
        )
    }
}

/// One semantic operation addressed to a channel.
///
/// The sequencer addresses song channels; the dispatcher rewrites `channel`
/// to the backend-local index before handing the command to a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Command {
    pub opcode: Opcode,
    pub channel: usize,
    pub value: i32,
    pub value2: i32,
}

impl Command {
    pub const fn new(opcode: Opcode, channel: usize, value: i32, value2: i32) -> Self {
        Self { opcode, channel, value, value2 }
    }

    /// A command without parameters.
    pub const fn bare(opcode: Opcode, channel: usize) -> Self {
        Self::new(opcode, channel, 0, 0)
    }

    pub const fn with_value(opcode: Opcode, channel: usize, value: i32) -> Self {
        Self::new(opcode, channel, value, 0)
    }

    /// Same command addressed to another channel.
    pub const fn on_channel(self, channel: usize) -> Self {
        Self { channel, ..self }
    }
}

//! Reference square/noise backend covering the SN76489 and AY-3-8910 families.
//!
//! Register layout and write protocol follow the real chips so the register
//! log can be replayed on hardware, but the synthesis is a plain counter
//! model without analog filtering.

use pc_ir::{ChipFamily, Command, Opcode, DISPATCH_ACK, DISPATCH_IGNORED};

use super::voice::{Voice, VoiceResult};
use crate::backend::{ChipBackend, RegisterField, RegisterWrite};
use crate::frequency::tone_period;

/// Linear amplitude for each 4-bit level (2 dB steps, 15 = loudest).
const VOLUME_TABLE: [i32; 16] = [
    0, 326, 411, 517, 651, 819, 1031, 1298, 1634, 2058, 2590, 3261, 4106, 5169, 6507, 8192,
];

const VOL_MAX: i32 = 15;

/// Lowest note a limited downward slide reaches on the SN76489.
const SN_PORTA_FLOOR: i32 = 0x0c;

// SN76489 pool indices
const SN_TONE: usize = 0;
const SN_NOISE: usize = 6;
const SN_ATTEN: usize = 7;

// AY-3-8910 register numbers
const AY_NOISE_PERIOD: usize = 6;
const AY_MIXER: usize = 7;
const AY_VOLUME: usize = 8;
const AY_ENV_LOW: usize = 11;
const AY_ENV_HIGH: usize = 12;
const AY_ENV_SHAPE: usize = 13;
const AY_IO_A: usize = 14;

const SN_SHEET: &[RegisterField] = &[
    ("tone0 lo", 0),
    ("tone0 hi", 1),
    ("tone1 lo", 2),
    ("tone1 hi", 3),
    ("tone2 lo", 4),
    ("tone2 hi", 5),
    ("noise", 6),
    ("atten0", 7),
    ("atten1", 8),
    ("atten2", 9),
    ("atten3", 10),
];

const AY_SHEET: &[RegisterField] = &[
    ("tone A lo", 0),
    ("tone A hi", 1),
    ("tone B lo", 2),
    ("tone B hi", 3),
    ("tone C lo", 4),
    ("tone C hi", 5),
    ("noise", 6),
    ("mixer", 7),
    ("vol A", 8),
    ("vol B", 9),
    ("vol C", 10),
    ("env lo", 11),
    ("env hi", 12),
    ("env shape", 13),
    ("io A", 14),
    ("io B", 15),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PsgVariant {
    Sn76489,
    Ay8910,
}

/// Square wave divider.
#[derive(Clone, Copy, Debug, Default)]
struct ToneGen {
    period: u32,
    counter: u32,
    high: bool,
}

impl ToneGen {
    /// Advance one native sample. Returns true on a rising edge.
    fn step(&mut self) -> bool {
        if self.counter <= 1 {
            self.counter = self.period.max(1);
            self.high = !self.high;
            return self.high;
        }
        self.counter -= 1;
        false
    }
}

/// Reference PSG backend.
pub struct PsgBackend {
    variant: PsgVariant,
    clock: u32,
    voices: [Voice; 4],
    tones: [ToneGen; 4],
    regs: [u8; 16],
    lfsr: u32,
    /// SN76489 register selected by the last latch byte
    latched: u8,
    /// SMS noise: bit 0 white noise, bit 1 follow tone 2
    noise_mode: u8,
    /// AY per-channel mode: bit 0 tone, bit 1 noise
    ay_mode: [u8; 3],
    ay_envelope: [bool; 3],
    env_slide: i32,
    auto_env: u8,
    noise_and: u8,
    noise_or: u8,
    muted: [bool; 4],
    logging: bool,
    writes: Vec<RegisterWrite>,
}

impl PsgBackend {
    fn new(variant: PsgVariant, clock: u32) -> Self {
        let mut backend = Self {
            variant,
            clock: clock.max(1),
            voices: [Voice::at_volume(VOL_MAX); 4],
            tones: [ToneGen::default(); 4],
            regs: [0; 16],
            lfsr: 0,
            latched: 0,
            noise_mode: 0,
            ay_mode: [1; 3],
            ay_envelope: [false; 3],
            env_slide: 0,
            auto_env: 0,
            noise_and: 0xff,
            noise_or: 0,
            muted: [false; 4],
            logging: false,
            writes: Vec::new(),
        };
        backend.reset();
        backend
    }

    pub fn sn76489(clock: u32) -> Self {
        Self::new(PsgVariant::Sn76489, clock)
    }

    pub fn ay8910(clock: u32) -> Self {
        Self::new(PsgVariant::Ay8910, clock)
    }

    pub fn variant(&self) -> PsgVariant {
        self.variant
    }

    fn channels(&self) -> usize {
        match self.variant {
            PsgVariant::Sn76489 => 4,
            PsgVariant::Ay8910 => 3,
        }
    }

    fn log(&mut self, addr: u32, value: u16) {
        if self.logging {
            self.writes.push(RegisterWrite { addr, value });
        }
    }

    /// Feed one byte to the SN76489 data port.
    fn sn_write(&mut self, byte: u8) {
        self.log(0, byte as u16);
        if byte & 0x80 != 0 {
            self.latched = (byte >> 4) & 0x07;
            let data = byte & 0x0f;
            match self.latched {
                0 | 2 | 4 => self.regs[SN_TONE + self.latched as usize] = data,
                6 => {
                    self.regs[SN_NOISE] = data & 0x07;
                    self.lfsr = 0x8000;
                }
                r => self.regs[SN_ATTEN + (r as usize >> 1)] = data,
            }
        } else if matches!(self.latched, 0 | 2 | 4) {
            self.regs[SN_TONE + self.latched as usize + 1] = byte & 0x3f;
        }
        self.sn_refresh_dividers();
    }

    fn sn_refresh_dividers(&mut self) {
        for ch in 0..3 {
            let lo = self.regs[SN_TONE + ch * 2] as u32;
            let hi = self.regs[SN_TONE + ch * 2 + 1] as u32;
            self.tones[ch].period = (hi << 4) | lo;
        }
        self.tones[3].period = match self.regs[SN_NOISE] & 0x03 {
            3 => self.tones[2].period,
            rate => 0x10 << rate,
        };
    }

    fn ay_write(&mut self, reg: usize, value: u8) {
        if reg >= self.regs.len() {
            return;
        }
        self.log(reg as u32, value as u16);
        self.regs[reg] = value;
        self.ay_refresh_dividers();
    }

    fn ay_refresh_dividers(&mut self) {
        for ch in 0..3 {
            let lo = self.regs[ch * 2] as u32;
            let hi = (self.regs[ch * 2 + 1] & 0x0f) as u32;
            self.tones[ch].period = (hi << 8) | lo;
        }
        let noise = (self.regs[AY_NOISE_PERIOD] & self.noise_and) | self.noise_or;
        self.tones[3].period = ((noise & 0x1f) as u32).max(1) * 2;
    }

    fn sn_sync(&mut self, ch: usize) {
        let voice = self.voices[ch];
        if ch < 3 {
            let n = tone_period(self.clock, 32, voice.hz(), 1023);
            let lo = (n & 0x0f) as u8;
            let hi = ((n >> 4) & 0x3f) as u8;
            if self.regs[SN_TONE + ch * 2] != lo || self.regs[SN_TONE + ch * 2 + 1] != hi {
                self.sn_write(0x80 | ((ch as u8) << 5) | lo);
                self.sn_write(hi);
            }
        } else {
            let rate = if self.noise_mode & 0x02 != 0 {
                3
            } else {
                (voice.base / 128).rem_euclid(3) as u8
            };
            let white = (self.noise_mode & 0x01) << 2;
            let control = white | rate;
            if self.regs[SN_NOISE] != control {
                self.sn_write(0xe0 | control);
            }
        }
        let atten = if voice.active && !self.muted[ch] {
            (VOL_MAX - voice.volume.clamp(0, VOL_MAX)) as u8
        } else {
            0x0f
        };
        if self.regs[SN_ATTEN + ch] != atten {
            self.sn_write(0x90 | ((ch as u8) << 5) | atten);
        }
    }

    fn ay_sync(&mut self, ch: usize) {
        let voice = self.voices[ch];
        let tp = tone_period(self.clock, 16, voice.hz(), 4095);
        if self.regs[ch * 2] != (tp & 0xff) as u8 {
            self.ay_write(ch * 2, (tp & 0xff) as u8);
        }
        if self.regs[ch * 2 + 1] != (tp >> 8) as u8 {
            self.ay_write(ch * 2 + 1, (tp >> 8) as u8);
        }

        let mut mixer = self.regs[AY_MIXER];
        let mode = self.ay_mode[ch];
        mixer = (mixer & !(1 << ch)) | (((mode & 1) ^ 1) << ch);
        mixer = (mixer & !(8 << ch)) | ((((mode >> 1) & 1) ^ 1) << (ch + 3));
        if self.regs[AY_MIXER] != mixer {
            self.ay_write(AY_MIXER, mixer);
        }

        let level = if voice.active && !self.muted[ch] {
            voice.volume.clamp(0, VOL_MAX) as u8 | if self.ay_envelope[ch] { 0x10 } else { 0 }
        } else {
            0
        };
        if self.regs[AY_VOLUME + ch] != level {
            self.ay_write(AY_VOLUME + ch, level);
        }

        if self.auto_env != 0 && voice.active {
            let num = (self.auto_env >> 4) as u32;
            let den = (self.auto_env & 0x0f) as u32;
            if num > 0 && den > 0 {
                let period = ((tp * den / num) >> 4).min(0xffff);
                self.set_envelope_period(period);
            }
        }
    }

    fn envelope_period(&self) -> u32 {
        self.regs[AY_ENV_LOW] as u32 | (self.regs[AY_ENV_HIGH] as u32) << 8
    }

    fn set_envelope_period(&mut self, period: u32) {
        if self.regs[AY_ENV_LOW] != (period & 0xff) as u8 {
            self.ay_write(AY_ENV_LOW, (period & 0xff) as u8);
        }
        if self.regs[AY_ENV_HIGH] != (period >> 8) as u8 {
            self.ay_write(AY_ENV_HIGH, (period >> 8) as u8);
        }
    }

    /// Chip-specific opcodes the generic voice does not understand.
    fn dispatch_extended(&mut self, cmd: Command) -> i32 {
        let ch = cmd.channel;
        let value = cmd.value;
        match (self.variant, cmd.opcode) {
            (PsgVariant::Sn76489, Opcode::StdNoiseMode) => {
                self.noise_mode = (((value >> 4) & 1) << 1 | (value & 1)) as u8;
                self.voices[3].dirty = true;
            }
            (PsgVariant::Ay8910, Opcode::StdNoiseMode) => {
                if let Some(mode) = self.ay_mode.get_mut(ch) {
                    *mode = (value & 0x03) as u8;
                    self.ay_envelope[ch] = value & 0x04 != 0;
                    self.voices[ch].dirty = true;
                }
            }
            (PsgVariant::Ay8910, Opcode::StdNoiseFreq) => {
                self.ay_write(AY_NOISE_PERIOD, (value & 0x1f) as u8);
            }
            (PsgVariant::Ay8910, Opcode::AyEnvelopeSet) => {
                if ch < 3 {
                    self.ay_envelope[ch] = value & 0x0f != 0;
                    self.voices[ch].dirty = true;
                }
                self.ay_write(AY_ENV_SHAPE, ((value >> 4) & 0x0f) as u8);
            }
            (PsgVariant::Ay8910, Opcode::AyEnvelopeLow) => {
                self.ay_write(AY_ENV_LOW, value as u8);
            }
            (PsgVariant::Ay8910, Opcode::AyEnvelopeHigh) => {
                self.ay_write(AY_ENV_HIGH, value as u8);
            }
            (PsgVariant::Ay8910, Opcode::AyEnvelopeSlide) => self.env_slide = value,
            (PsgVariant::Ay8910, Opcode::AyNoiseMaskAnd) => {
                self.noise_and = value as u8;
                self.ay_refresh_dividers();
            }
            (PsgVariant::Ay8910, Opcode::AyNoiseMaskOr) => {
                self.noise_or = value as u8;
                self.ay_refresh_dividers();
            }
            (PsgVariant::Ay8910, Opcode::AyAutoEnvelope) => {
                self.auto_env = value as u8;
                self.voices[ch.min(2)].dirty = true;
            }
            // value2 is the port; 255 selects the port direction bits in the mixer
            (PsgVariant::Ay8910, Opcode::AyIoWrite) if cmd.value2 == 255 => {
                let mixer = (self.regs[AY_MIXER] & 0x3f) | (((value & 0x03) as u8) << 6);
                self.ay_write(AY_MIXER, mixer);
            }
            (PsgVariant::Ay8910, Opcode::AyIoWrite) => {
                self.ay_write(AY_IO_A + (cmd.value2 & 1) as usize, value as u8);
            }
            _ => return DISPATCH_IGNORED,
        }
        DISPATCH_ACK
    }

    fn step_noise(&mut self) {
        match self.variant {
            PsgVariant::Sn76489 => {
                let white = self.regs[SN_NOISE] & 0x04 != 0;
                let feedback = if white {
                    (self.lfsr ^ (self.lfsr >> 3)) & 1
                } else {
                    self.lfsr & 1
                };
                self.lfsr = (self.lfsr >> 1) | (feedback << 15);
            }
            PsgVariant::Ay8910 => {
                let feedback = (self.lfsr ^ (self.lfsr >> 3)) & 1;
                self.lfsr = (self.lfsr >> 1) | (feedback << 16);
            }
        }
    }

    fn render_sample(&mut self) -> i16 {
        let mut out = 0i32;
        match self.variant {
            PsgVariant::Sn76489 => {
                for ch in 0..3 {
                    self.tones[ch].step();
                    if self.tones[ch].high {
                        out += VOLUME_TABLE[(15 - (self.regs[SN_ATTEN + ch] & 0x0f)) as usize];
                    }
                }
                if self.tones[3].step() {
                    self.step_noise();
                }
                if self.lfsr & 1 != 0 {
                    out += VOLUME_TABLE[(15 - (self.regs[SN_ATTEN + 3] & 0x0f)) as usize];
                }
            }
            PsgVariant::Ay8910 => {
                if self.tones[3].step() {
                    self.step_noise();
                }
                let noise = self.lfsr & 1 != 0;
                let mixer = self.regs[AY_MIXER];
                for ch in 0..3 {
                    self.tones[ch].step();
                    let tone_off = mixer & (1 << ch) != 0;
                    let noise_off = mixer & (8 << ch) != 0;
                    if (self.tones[ch].high || tone_off) && (noise || noise_off) {
                        let vol = self.regs[AY_VOLUME + ch];
                        // Envelope mode plays at full level.
                        let level = if vol & 0x10 != 0 { 15 } else { vol & 0x0f };
                        out += VOLUME_TABLE[level as usize];
                    }
                }
            }
        }
        out.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

impl ChipBackend for PsgBackend {
    fn family(&self) -> ChipFamily {
        match self.variant {
            PsgVariant::Sn76489 => ChipFamily::Sms,
            PsgVariant::Ay8910 => ChipFamily::Ay8910,
        }
    }

    fn channel_count(&self) -> usize {
        self.channels()
    }

    fn rate(&self) -> u32 {
        match self.variant {
            PsgVariant::Sn76489 => self.clock / 16,
            PsgVariant::Ay8910 => self.clock / 8,
        }
    }

    fn dispatch(&mut self, cmd: Command) -> i32 {
        if cmd.channel >= self.channels() {
            return DISPATCH_IGNORED;
        }
        match self.voices[cmd.channel].handle(&cmd, VOL_MAX) {
            VoiceResult::Handled(code) => code,
            VoiceResult::Unhandled => self.dispatch_extended(cmd),
        }
    }

    fn acquire(&mut self, buf_l: &mut [i16], _buf_r: &mut [i16], start: usize, len: usize) {
        let end = (start + len).min(buf_l.len());
        for slot in buf_l[start.min(end)..end].iter_mut() {
            *slot = self.render_sample();
        }
    }

    fn tick(&mut self, full_tick: bool) {
        if full_tick && self.variant == PsgVariant::Ay8910 && self.env_slide != 0 {
            let period = (self.envelope_period() as i32 + self.env_slide).clamp(0, 0xffff);
            self.set_envelope_period(period as u32);
        }
        for ch in 0..self.channels() {
            if !self.voices[ch].take_dirty() {
                continue;
            }
            match self.variant {
                PsgVariant::Sn76489 => self.sn_sync(ch),
                PsgVariant::Ay8910 => self.ay_sync(ch),
            }
        }
    }

    fn reset(&mut self) {
        self.voices = [Voice::at_volume(VOL_MAX); 4];
        self.tones = [ToneGen::default(); 4];
        self.regs = [0; 16];
        self.latched = 0;
        self.noise_mode = 0;
        self.ay_mode = [1; 3];
        self.ay_envelope = [false; 3];
        self.env_slide = 0;
        self.auto_env = 0;
        self.noise_and = 0xff;
        self.noise_or = 0;
        match self.variant {
            PsgVariant::Sn76489 => {
                self.lfsr = 0x8000;
                for ch in 0..4u8 {
                    self.regs[SN_ATTEN + ch as usize] = 0x0f;
                }
            }
            PsgVariant::Ay8910 => {
                self.lfsr = 1;
                self.regs[AY_MIXER] = 0x38;
            }
        }
        match self.variant {
            PsgVariant::Sn76489 => self.sn_refresh_dividers(),
            PsgVariant::Ay8910 => self.ay_refresh_dividers(),
        }
    }

    fn key_off_affects_arpeggio(&self, channel: usize) -> bool {
        self.variant == PsgVariant::Sn76489 && channel == 3
    }

    fn portamento_floor(&self, _channel: usize) -> i32 {
        match self.variant {
            PsgVariant::Sn76489 => SN_PORTA_FLOOR,
            PsgVariant::Ay8910 => 0,
        }
    }

    fn register_pool(&self) -> &[u8] {
        match self.variant {
            PsgVariant::Sn76489 => &self.regs[..11],
            PsgVariant::Ay8910 => &self.regs,
        }
    }

    fn register_sheet(&self) -> &'static [RegisterField] {
        match self.variant {
            PsgVariant::Sn76489 => SN_SHEET,
            PsgVariant::Ay8910 => AY_SHEET,
        }
    }

    fn poke(&mut self, addr: u32, value: u16) {
        match self.variant {
            PsgVariant::Sn76489 => self.sn_write(value as u8),
            PsgVariant::Ay8910 => self.ay_write(addr as usize, value as u8),
        }
    }

    fn set_register_logging(&mut self, enabled: bool) {
        self.logging = enabled;
        if !enabled {
            self.writes.clear();
        }
    }

    fn drain_register_writes(&mut self, out: &mut Vec<RegisterWrite>) {
        out.append(&mut self.writes);
    }

    fn mute(&mut self, channel: usize, muted: bool) {
        if let Some(slot) = self.muted.get_mut(channel) {
            *slot = muted;
            self.voices[channel].dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_ir::TARGET_REACHED;

    fn note_on(backend: &mut PsgBackend, ch: usize, note: i32, vol: i32) {
        backend.dispatch(Command::with_value(Opcode::Volume, ch, vol));
        backend.dispatch(Command::with_value(Opcode::NoteOn, ch, note));
        backend.tick(true);
    }

    #[test]
    fn sn_note_on_writes_latch_pair_and_attenuation() {
        let mut psg = PsgBackend::sn76489(3_579_545);
        psg.set_register_logging(true);
        note_on(&mut psg, 0, 57, 15);

        let mut writes = Vec::new();
        psg.drain_register_writes(&mut writes);
        // A-4: N = 254 = 0xFE
        let bytes: Vec<u16> = writes.iter().map(|w| w.value).collect();
        assert_eq!(bytes, vec![0x80 | 0x0e, 0x0f, 0x90]);
        assert_eq!(psg.register_pool()[SN_ATTEN], 0);
    }

    #[test]
    fn unchanged_state_writes_nothing() {
        let mut psg = PsgBackend::sn76489(3_579_545);
        note_on(&mut psg, 1, 48, 10);
        psg.set_register_logging(true);
        psg.dispatch(Command::with_value(Opcode::Volume, 1, 10));
        psg.tick(true);
        let mut writes = Vec::new();
        psg.drain_register_writes(&mut writes);
        assert!(writes.is_empty());
    }

    #[test]
    fn note_off_silences_channel() {
        let mut psg = PsgBackend::ay8910(1_789_773);
        note_on(&mut psg, 2, 60, 12);
        assert_eq!(psg.register_pool()[AY_VOLUME + 2], 12);
        psg.dispatch(Command::bare(Opcode::NoteOff, 2));
        psg.tick(true);
        assert_eq!(psg.register_pool()[AY_VOLUME + 2], 0);
    }

    #[test]
    fn ay_mode_controls_mixer() {
        let mut psg = PsgBackend::ay8910(1_789_773);
        psg.dispatch(Command::with_value(Opcode::StdNoiseMode, 1, 2));
        note_on(&mut psg, 1, 60, 15);
        let mixer = psg.register_pool()[AY_MIXER];
        assert_eq!(mixer & 0x02, 0x02, "tone B disabled");
        assert_eq!(mixer & 0x10, 0, "noise B enabled");
    }

    #[test]
    fn porta_reports_target() {
        let mut psg = PsgBackend::sn76489(3_579_545);
        note_on(&mut psg, 0, 48, 15);
        let code = psg.dispatch(Command::new(Opcode::NotePorta, 0, 1000, 49));
        assert_eq!(code, TARGET_REACHED);
    }

    #[test]
    fn produces_audio_when_keyed() {
        let mut psg = PsgBackend::sn76489(3_579_545);
        note_on(&mut psg, 0, 57, 15);
        let mut l = vec![0i16; 2048];
        let mut r = vec![0i16; 2048];
        psg.acquire(&mut l, &mut r, 0, 2048);
        assert!(l.iter().any(|&s| s != 0));
        assert!(l.iter().any(|&s| s == 0));
    }

    #[test]
    fn silent_until_keyed() {
        let mut psg = PsgBackend::ay8910(1_789_773);
        let mut l = vec![1i16; 256];
        let mut r = vec![0i16; 256];
        psg.acquire(&mut l, &mut r, 0, 256);
        assert!(l.iter().all(|&s| s == 0));
    }

    #[test]
    fn out_of_range_channel_is_ignored() {
        let mut psg = PsgBackend::ay8910(1_789_773);
        assert_eq!(psg.dispatch(Command::with_value(Opcode::NoteOn, 3, 48)), DISPATCH_IGNORED);
    }

    #[test]
    fn sms_noise_channel_policies() {
        let psg = PsgBackend::sn76489(3_579_545);
        assert!(psg.key_off_affects_arpeggio(3));
        assert!(!psg.key_off_affects_arpeggio(0));
        assert_eq!(psg.portamento_floor(0), 0x0c);
    }
}

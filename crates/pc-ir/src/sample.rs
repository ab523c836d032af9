//! PCM samples and wavetables, used by the preview voice.

use alloc::vec::Vec;
use arrayvec::ArrayString;

/// A mono 16-bit PCM sample.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sample {
    pub name: ArrayString<32>,
    pub data: Vec<i16>,
    /// Playback rate at the sample's base note, in Hz
    pub rate: u32,
    /// Loop start frame; the loop runs to the end of `data`.
    pub loop_start: Option<usize>,
}

impl Sample {
    pub fn new(name: &str, data: Vec<i16>, rate: u32) -> Self {
        let mut sample = Self {
            data,
            rate,
            ..Self::default()
        };
        let _ = sample.name.try_push_str(name);
        sample
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Frame at `pos`, following the loop if one is set. `None` once a
    /// one-shot sample has finished.
    pub fn frame_at(&self, pos: usize) -> Option<i16> {
        if let Some(&frame) = self.data.get(pos) {
            return Some(frame);
        }
        let start = self.loop_start.filter(|&s| s < self.data.len())?;
        let span = self.data.len() - start;
        Some(self.data[start + (pos - start) % span])
    }
}

/// A single-cycle waveform with values in `0..=max`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Wavetable {
    pub data: Vec<u8>,
    pub max: u8,
}

impl Wavetable {
    pub fn new(data: Vec<u8>, max: u8) -> Self {
        Self { data, max: max.max(1) }
    }

    /// Value at `pos` (wrapping) scaled to the signed 16-bit range.
    pub fn sample_at(&self, pos: usize) -> i16 {
        if self.data.is_empty() {
            return 0;
        }
        let v = self.data[pos % self.data.len()].min(self.max) as i32;
        let max = self.max as i32;
        (((v * 2 - max) * 32767) / max) as i16
    }
}

//! Sample and wavetable audition, mixed on top of the song.

use blip_buf::BlipBuf;
use pc_ir::Song;

use crate::frequency::{note_pitch, pitch_to_hz};

/// What the preview voice is playing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PreviewSource {
    /// Song sample `index`, from frame `pos`
    Sample { index: usize, pos: usize },
    /// Wavetable `index` looped at the pitch of `note`
    Wave { index: usize, note: i32, pos: usize },
}

/// A monophonic voice with its own band-limited resampler.
pub struct Preview {
    blip: BlipBuf,
    source: Option<PreviewSource>,
    last: i32,
    out_rate: u32,
    scratch: Vec<i16>,
}

impl Preview {
    /// `capacity` is the largest block the preview will be asked for.
    pub fn new(out_rate: u32, capacity: usize) -> Self {
        Self {
            blip: BlipBuf::new(capacity as u32 * 2),
            source: None,
            last: 0,
            out_rate,
            scratch: vec![0; capacity],
        }
    }

    pub fn play_sample(&mut self, index: usize) {
        self.restart(PreviewSource::Sample { index, pos: 0 });
    }

    pub fn play_wave(&mut self, index: usize, note: i32) {
        self.restart(PreviewSource::Wave { index, note, pos: 0 });
    }

    pub fn stop(&mut self) {
        self.source = None;
        self.blip.clear();
        self.last = 0;
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<PreviewSource> {
        self.source
    }

    fn restart(&mut self, source: PreviewSource) {
        self.stop();
        self.source = Some(source);
    }

    /// Add up to `out_l.len()` frames of preview audio to both outputs.
    pub fn render(&mut self, song: &Song, out_l: &mut [f32], out_r: &mut [f32]) {
        let Some(source) = self.source else {
            return;
        };
        let size = out_l.len().min(self.scratch.len());
        let native_rate = match source {
            PreviewSource::Sample { index, .. } => song.samples.get(index).map(|s| s.rate as f64),
            PreviewSource::Wave { index, note, .. } => song
                .wavetables
                .get(index)
                .map(|w| pitch_to_hz(note_pitch(note)) * w.data.len() as f64),
        };
        let Some(native_rate) = native_rate.filter(|&r| r > 0.0) else {
            self.stop();
            return;
        };
        self.blip.set_rates(native_rate, self.out_rate as f64);

        let avail = self.blip.samples_avail() as usize;
        let needed = self.blip.clocks_needed(size.saturating_sub(avail) as u32);
        let mut next = Some(source);
        for clock in 0..needed {
            let value = match next {
                Some(PreviewSource::Sample { index, ref mut pos }) => {
                    let frame = song.samples.get(index).and_then(|s| s.frame_at(*pos));
                    *pos += 1;
                    frame.map(i32::from)
                }
                Some(PreviewSource::Wave { index, ref mut pos, .. }) => {
                    let value = song.wavetables.get(index).map(|w| w.sample_at(*pos) as i32);
                    *pos += 1;
                    value
                }
                None => None,
            };
            let value = match value {
                Some(v) => v,
                None => {
                    next = None;
                    0
                }
            };
            if value != self.last {
                self.blip.add_delta(clock, value - self.last);
                self.last = value;
            }
        }
        self.blip.end_frame(needed);
        self.source = next;

        let got = self.blip.read_samples(&mut self.scratch[..size], false);
        for (i, &s) in self.scratch[..got].iter().enumerate() {
            let s = s as f32 / 32768.0;
            out_l[i] += s;
            out_r[i] += s;
        }
    }
}

impl core::fmt::Debug for Preview {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Preview")
            .field("source", &self.source)
            .field("out_rate", &self.out_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_ir::{ChipFamily, Sample, Wavetable};

    fn song() -> Song {
        let mut song = Song::with_systems("p", &[ChipFamily::Sms]);
        song.samples.push(Sample::new("blip", vec![12000; 200], 22050));
        song.wavetables.push(Wavetable::new(vec![0, 15, 15, 0], 15));
        song
    }

    #[test]
    fn one_shot_sample_finishes() {
        let song = song();
        let mut preview = Preview::new(44100, 1024);
        preview.play_sample(0);
        let mut l = vec![0.0f32; 1024];
        let mut r = vec![0.0f32; 1024];
        preview.render(&song, &mut l, &mut r);
        assert!(l.iter().any(|&s| s > 0.2));
        assert!(!preview.is_active());
    }

    #[test]
    fn wave_keeps_playing() {
        let song = song();
        let mut preview = Preview::new(44100, 512);
        preview.play_wave(0, 57);
        let mut l = vec![0.0f32; 512];
        let mut r = vec![0.0f32; 512];
        preview.render(&song, &mut l, &mut r);
        preview.render(&song, &mut l, &mut r);
        assert!(preview.is_active());
        assert!(l.iter().any(|&s| s.abs() > 0.1));
    }

    #[test]
    fn missing_sample_stops_preview() {
        let song = song();
        let mut preview = Preview::new(44100, 64);
        preview.play_sample(9);
        let mut l = [0.0f32; 64];
        let mut r = [0.0f32; 64];
        preview.render(&song, &mut l, &mut r);
        assert!(!preview.is_active());
        assert!(l.iter().all(|&s| s == 0.0));
    }
}

//! Click track mixed over the song.

use core::f64::consts::TAU;

use heapless::Vec as FixedVec;

/// Click pitch on bar highlights.
pub const BAR_HZ: f64 = 1400.0;
/// Click pitch on beat highlights.
pub const BEAT_HZ: f64 = 1050.0;
const START_AMP: f32 = 0.7;
/// Amplitude lost per output sample.
const DECAY: f32 = 0.0003;
/// Clicks remembered per block; more than this are dropped.
const MAX_MARKS: usize = 16;

/// Kind of highlight a row falls on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Click {
    Beat,
    Bar,
}

impl Click {
    /// Which click, if any, row `row` triggers with the given highlights.
    pub fn for_row(row: usize, beat: u8, bar: u8) -> Option<Click> {
        if bar > 0 && row % bar as usize == 0 {
            Some(Click::Bar)
        } else if beat > 0 && row % beat as usize == 0 {
            Some(Click::Beat)
        } else {
            None
        }
    }

    fn hz(self) -> f64 {
        match self {
            Click::Bar => BAR_HZ,
            Click::Beat => BEAT_HZ,
        }
    }
}

/// Decaying sine clicks placed at sample offsets within a block.
#[derive(Debug)]
pub struct Metronome {
    enabled: bool,
    volume: f32,
    phase: f64,
    hz: f64,
    amp: f32,
    marks: FixedVec<(usize, Click), MAX_MARKS>,
}

impl Default for Metronome {
    fn default() -> Self {
        Self::new()
    }
}

impl Metronome {
    pub const fn new() -> Self {
        Self {
            enabled: false,
            volume: 1.0,
            phase: 0.0,
            hz: BEAT_HZ,
            amp: 0.0,
            marks: FixedVec::new(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.amp = 0.0;
            self.marks.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 2.0);
    }

    /// Queue a click at `offset` samples into the current block.
    pub fn mark(&mut self, offset: usize, click: Click) {
        if self.enabled {
            let _ = self.marks.push((offset, click));
        }
    }

    /// Add the block's clicks to the output and forget the marks.
    pub fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32], rate: u32) {
        if !self.enabled {
            return;
        }
        let step = TAU / rate.max(1) as f64;
        let mut marks = self.marks.iter().peekable();
        for (i, (l, r)) in out_l.iter_mut().zip(out_r.iter_mut()).enumerate() {
            while let Some(&&(offset, click)) = marks.peek() {
                if offset > i {
                    break;
                }
                self.hz = click.hz();
                self.phase = 0.0;
                self.amp = START_AMP;
                marks.next();
            }
            if self.amp <= 0.0 {
                continue;
            }
            let s = libm::sin(self.phase) as f32 * self.amp * self.volume;
            *l += s;
            *r += s;
            self.phase = (self.phase + step * self.hz) % TAU;
            self.amp = (self.amp - DECAY).max(0.0);
        }
        self.marks.clear();
    }
}

//! Elapsed playback time.

use core::fmt;

/// Microseconds per second.
const MICROS: u32 = 1_000_000;

/// Playback time as whole seconds plus a microsecond remainder, and the
/// number of ticks played.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaybackTime {
    pub seconds: u32,
    pub micros: u32,
    pub ticks: u64,
}

impl PlaybackTime {
    pub const ZERO: PlaybackTime = PlaybackTime { seconds: 0, micros: 0, ticks: 0 };

    /// Advance by one tick lasting `micros_per_tick`.
    ///
    /// Returns true when a second boundary was crossed.
    pub fn advance(&mut self, micros_per_tick: u32) -> bool {
        self.ticks += 1;
        self.micros += micros_per_tick;
        let mut crossed = false;
        while self.micros >= MICROS {
            self.micros -= MICROS;
            self.seconds += 1;
            crossed = true;
        }
        crossed
    }

    /// Time in seconds as a float.
    pub fn as_secs_f64(self) -> f64 {
        self.seconds as f64 + self.micros as f64 / MICROS as f64
    }
}

impl fmt::Display for PlaybackTime {
    /// `h:mm:ss.cc`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:02}:{:02}.{:02}",
            self.seconds / 3600,
            (self.seconds / 60) % 60,
            self.seconds % 60,
            self.micros / 10_000
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn advance_crosses_seconds() {
        let mut t = PlaybackTime::ZERO;
        let mut crossings = 0;
        for _ in 0..120 {
            if t.advance(MICROS / 60) {
                crossings += 1;
            }
        }
        assert_eq!(t.ticks, 120);
        assert_eq!(crossings, 1);
        assert_eq!(t.seconds, 1);
    }

    #[test]
    fn display_format() {
        let t = PlaybackTime { seconds: 3725, micros: 500_000, ticks: 0 };
        assert_eq!(t.to_string(), "1:02:05.50");
    }
}

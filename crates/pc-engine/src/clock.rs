//! Fixed-point tick clock with fractional-cycle carry.

/// Fractional bits carried below the output sample count.
pub const MASTER_CLOCK_PREC: u32 = 8;

/// Lowest accepted tick rate in Hz.
pub const MIN_HZ: f64 = 10.0;

/// Low-latency mode splits each tick into sub-ticks of about a millisecond.
const SUB_TICKS_PER_SECOND: f64 = 1000.0;

/// Master cycle budget for the current tick.
///
/// One "cycle" is `1 / 2^MASTER_CLOCK_PREC` of an output sample. Each tick
/// gets `floor(rate * 2^PREC / hz)` cycles; the remainder accumulates in
/// `drift` and adds one cycle whenever it reaches `hz`, so the long-run tick
/// length never drifts by more than a cycle.
///
/// In low-latency mode the budget is for one sub-tick instead: the tick is
/// divided into `tick_mult` equal parts and `hz` is multiplied accordingly.
#[derive(Clone, Debug, PartialEq)]
pub struct ClockState {
    rate: u32,
    hz: f64,
    cycles: i64,
    drift: f64,
    low_latency: bool,
    tick_mult: u32,
}

impl ClockState {
    pub fn new(rate: u32, hz: f64) -> Self {
        Self {
            rate,
            hz: hz.max(MIN_HZ),
            cycles: 0,
            drift: 0.0,
            low_latency: false,
            tick_mult: 1,
        }
    }

    pub fn set_low_latency(&mut self, on: bool) {
        self.low_latency = on;
    }

    pub fn low_latency(&self) -> bool {
        self.low_latency
    }

    /// Sub-ticks per tick, fixed at the last [`begin_tick`](Self::begin_tick).
    pub fn tick_mult(&self) -> u32 {
        self.tick_mult
    }

    /// Output sample rate in Hz.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Current tick rate in Hz.
    pub fn hz(&self) -> f64 {
        self.hz
    }

    /// Cycles left in the current tick.
    pub fn cycles(&self) -> i64 {
        self.cycles
    }

    pub fn drift(&self) -> f64 {
        self.drift
    }

    fn scaled_rate(&self) -> f64 {
        self.rate as f64 * (1u64 << MASTER_CLOCK_PREC) as f64
    }

    /// Sub-tick rate: `hz` times the sub-tick count.
    fn divider(&self) -> f64 {
        self.hz * self.tick_mult as f64
    }

    /// Start a new tick (or sub-tick): load its cycle budget and carry the fraction.
    pub fn begin_tick(&mut self) {
        if self.hz < MIN_HZ {
            self.hz = MIN_HZ;
        }
        self.tick_mult = if self.low_latency {
            ((SUB_TICKS_PER_SECOND / self.hz) as u32).max(1)
        } else {
            1
        };
        let scaled = self.scaled_rate();
        let divider = self.divider();
        self.cycles = (scaled / divider) as i64;
        self.drift += scaled % divider;
        if self.drift >= divider {
            self.drift -= divider;
            self.cycles += 1;
        }
    }

    /// Change the tick rate mid-tick. The current budget restarts at the new
    /// rate and the carried fraction is dropped.
    pub fn set_hz(&mut self, hz: f64) {
        self.hz = if hz.is_nan() { MIN_HZ } else { hz.max(MIN_HZ) };
        self.cycles = (self.scaled_rate() / self.divider()) as i64;
        self.drift = 0.0;
    }

    /// Consume up to `amount` cycles of the current tick.
    pub fn consume(&mut self, amount: i64) {
        self.cycles -= amount;
    }

    /// Throw away the rest of the current tick.
    pub fn clear_cycles(&mut self) {
        self.cycles = 0;
    }

    /// Microseconds per tick (or sub-tick), for elapsed-time accounting.
    pub fn micros_per_tick(&self) -> u32 {
        (1_000_000.0 / self.divider()) as u32
    }

    /// Reset for a fresh playback start. Low-latency mode is kept.
    pub fn reset(&mut self, hz: f64) {
        self.hz = hz.max(MIN_HZ);
        self.cycles = 0;
        self.drift = 0.0;
        self.tick_mult = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_rate_has_no_drift() {
        let mut clock = ClockState::new(48000, 60.0);
        clock.begin_tick();
        assert_eq!(clock.cycles(), 48000 * 256 / 60);
        assert_eq!(clock.drift(), 0.0);
    }

    #[test]
    fn drift_carry_keeps_total_within_one_cycle() {
        let mut clock = ClockState::new(44100, 13.0);
        let scaled = 44100i64 * 256;
        let mut total = 0i64;
        for n in 1..=2000i64 {
            clock.begin_tick();
            total += clock.cycles();
            let exact_times_hz = scaled * n;
            let error = exact_times_hz - total * 13;
            assert!((0..13).contains(&error), "tick {n}: error {error}");
        }
    }

    #[test]
    fn low_latency_splits_ticks() {
        let mut clock = ClockState::new(48000, 50.0);
        clock.set_low_latency(true);
        clock.begin_tick();
        assert_eq!(clock.tick_mult(), 20);
        assert_eq!(clock.cycles(), 48000 * 256 / 1000);
        assert_eq!(clock.micros_per_tick(), 1000);

        // tick rates above 1 kHz keep a single sub-tick
        clock.set_hz(2000.0);
        clock.begin_tick();
        assert_eq!(clock.tick_mult(), 1);
        clock.set_low_latency(false);
        clock.set_hz(50.0);
        clock.begin_tick();
        assert_eq!(clock.tick_mult(), 1);
        assert_eq!(clock.cycles(), 48000 * 256 / 50);
    }

    #[test]
    fn hz_is_clamped() {
        let mut clock = ClockState::new(44100, 1.0);
        assert_eq!(clock.hz(), MIN_HZ);
        clock.set_hz(3.0);
        assert_eq!(clock.hz(), MIN_HZ);
        assert_eq!(clock.cycles(), 44100 * 256 / 10);
    }
}

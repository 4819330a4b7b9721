//! Simulation clock and cadence buckets.
//!
//! Every periodic behaviour is derived from the tick counter modulo a
//! fixed interval. Nothing in the core reads wall-clock time.

use serde::{Deserialize, Serialize};

/// Default simulation ticks per second.
pub const TICK_RATE: u32 = 20;

/// How often a periodic handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cadence {
    /// Every tick.
    EveryTick,
    /// Once per second.
    EverySecond,
    /// Once every five seconds.
    EveryFiveSeconds,
    /// Once per minute.
    EveryMinute,
}

impl Cadence {
    /// All cadences, in the order handlers are dispatched within a tick.
    pub const ALL: [Self; 4] = [
        Self::EveryTick,
        Self::EverySecond,
        Self::EveryFiveSeconds,
        Self::EveryMinute,
    ];

    /// Interval in ticks for the given tick rate.
    #[must_use]
    pub const fn interval(self, ticks_per_second: u32) -> u64 {
        let tps = if ticks_per_second == 0 {
            1
        } else {
            ticks_per_second as u64
        };
        match self {
            Self::EveryTick => 1,
            Self::EverySecond => tps,
            Self::EveryFiveSeconds => tps * 5,
            Self::EveryMinute => tps * 60,
        }
    }

    /// Whether this cadence fires on `tick`.
    #[must_use]
    pub const fn is_due(self, tick: u64, ticks_per_second: u32) -> bool {
        tick % self.interval(ticks_per_second) == 0
    }
}

/// Monotonic tick counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimClock {
    tick: u64,
    ticks_per_second: u32,
}

impl SimClock {
    /// Clock at tick zero.
    #[must_use]
    pub const fn new(ticks_per_second: u32) -> Self {
        Self {
            tick: 0,
            ticks_per_second,
        }
    }

    /// Current tick.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Configured tick rate.
    #[must_use]
    pub const fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second
    }

    /// Cadences due on the current tick.
    pub fn due(&self) -> impl Iterator<Item = Cadence> + '_ {
        Cadence::ALL
            .into_iter()
            .filter(move |c| c.is_due(self.tick, self.ticks_per_second))
    }

    /// Move to the next tick.
    pub fn advance(&mut self) {
        self.tick += 1;
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(TICK_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals() {
        assert_eq!(Cadence::EveryTick.interval(20), 1);
        assert_eq!(Cadence::EverySecond.interval(20), 20);
        assert_eq!(Cadence::EveryFiveSeconds.interval(20), 100);
        assert_eq!(Cadence::EveryMinute.interval(20), 1200);
    }

    #[test]
    fn test_due_on_multiples_only() {
        assert!(Cadence::EverySecond.is_due(40, 20));
        assert!(!Cadence::EverySecond.is_due(41, 20));
        assert!(Cadence::EveryMinute.is_due(0, 20));
    }

    #[test]
    fn test_clock_due_set() {
        let mut clock = SimClock::new(10);
        let due: Vec<_> = clock.due().collect();
        assert_eq!(due, Cadence::ALL.to_vec());
        clock.advance();
        let due: Vec<_> = clock.due().collect();
        assert_eq!(due, vec![Cadence::EveryTick]);
    }

    #[test]
    fn test_zero_rate_does_not_divide_by_zero() {
        assert!(Cadence::EverySecond.is_due(3, 0));
    }
}

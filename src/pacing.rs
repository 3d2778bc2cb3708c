//! Randomized pacing and wall-clock deadlines.
//!
//! Every pause and polling loop in the harvester goes through a [`Pacer`] so
//! that timing is human-looking in production and virtual in tests.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

/// Source of elapsed time and blocking sleeps.
pub trait Clock: Send {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Real clock backed by [`Instant`] and `thread::sleep`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Point in time after which a polling loop must give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Duration);

pub struct Pacer {
    clock: Box<dyn Clock>,
    rng: StdRng,
}

impl Pacer {
    pub fn new(clock: Box<dyn Clock>, rng: StdRng) -> Self {
        Self { clock, rng }
    }

    /// Real time, entropy-seeded.
    pub fn system() -> Self {
        Self::new(Box::new(SystemClock::new()), StdRng::from_entropy())
    }

    /// Deterministic randomness over the given clock.
    pub fn seeded(clock: Box<dyn Clock>, seed: u64) -> Self {
        Self::new(clock, StdRng::seed_from_u64(seed))
    }

    /// Sleep for a random duration in `[lo, hi)` seconds.
    pub fn jitter(&mut self, lo: f64, hi: f64) {
        let secs = self.uniform(lo, hi);
        self.pause(Duration::from_secs_f64(secs.max(0.0)));
    }

    pub fn pause(&self, duration: Duration) {
        self.clock.sleep(duration);
    }

    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            lo
        } else {
            self.rng.gen_range(lo..hi)
        }
    }

    /// Random integer in `[lo, hi]`.
    pub fn int_between(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            lo
        } else {
            self.rng.gen_range(lo..=hi)
        }
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn deadline_after(&self, duration: Duration) -> Deadline {
        Deadline(self.clock.now() + duration)
    }

    pub fn expired(&self, deadline: Deadline) -> bool {
        self.clock.now() >= deadline.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;

    #[test]
    fn test_jitter_advances_virtual_time_within_bounds() {
        let clock = ManualClock::new();
        let mut pacer = Pacer::seeded(Box::new(clock.clone()), 7);
        pacer.jitter(1.0, 1.6);
        let elapsed = clock.elapsed();
        assert!(elapsed >= Duration::from_secs_f64(1.0));
        assert!(elapsed < Duration::from_secs_f64(1.6));
    }

    #[test]
    fn test_deadline_expiry() {
        let clock = ManualClock::new();
        let pacer = Pacer::seeded(Box::new(clock.clone()), 1);
        let deadline = pacer.deadline_after(Duration::from_secs(2));
        assert!(!pacer.expired(deadline));
        pacer.pause(Duration::from_millis(1999));
        assert!(!pacer.expired(deadline));
        pacer.pause(Duration::from_millis(1));
        assert!(pacer.expired(deadline));
    }

    #[test]
    fn test_ranges_are_inclusive_and_degenerate_safe() {
        let mut pacer = Pacer::seeded(Box::new(ManualClock::new()), 3);
        for _ in 0..100 {
            let n = pacer.int_between(3, 6);
            assert!((3..=6).contains(&n));
        }
        assert_eq!(pacer.int_between(5, 5), 5);
        assert_eq!(pacer.uniform(2.0, 2.0), 2.0);
        assert_eq!(pacer.pick::<u8>(&[]), None);
        assert!(pacer.pick(&["a", "b"]).is_some());
    }
}

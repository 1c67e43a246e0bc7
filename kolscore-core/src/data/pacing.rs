//! Blocking delays between upstream calls.
//!
//! All waits in the acquisition layer (backoff, per-ticker spacing,
//! inter-batch pacing) go through a `Sleeper` so tests can record them
//! instead of blocking.

use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;

/// Something that can block the calling thread for a duration.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real sleeper: `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested sleeps without blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duration requested so far, in order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn total(&self) -> Duration {
        self.recorded().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}

/// Uniform random duration in `[min, max]`. Returns `min` when `max <= min`.
pub fn uniform_between<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    Duration::from_secs_f64(rng.gen_range(min.as_secs_f64()..=max.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn uniform_between_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let min = Duration::from_secs(1);
        let max = Duration::from_secs(3);
        for _ in 0..200 {
            let d = uniform_between(&mut rng, min, max);
            assert!(d >= min && d <= max, "{d:?} out of bounds");
        }
    }

    #[test]
    fn degenerate_range_returns_min() {
        let mut rng = StdRng::seed_from_u64(7);
        let d = uniform_between(&mut rng, Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(d, Duration::from_secs(2));
        assert_eq!(
            uniform_between(&mut rng, Duration::ZERO, Duration::ZERO),
            Duration::ZERO
        );
    }

    #[test]
    fn recording_sleeper_keeps_order() {
        let s = RecordingSleeper::new();
        s.sleep(Duration::from_millis(5));
        s.sleep(Duration::from_millis(1));
        assert_eq!(
            s.recorded(),
            vec![Duration::from_millis(5), Duration::from_millis(1)]
        );
        assert_eq!(s.total(), Duration::from_millis(6));
    }
}

use std::thread;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tracing::debug;

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(800);

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Keeps consecutive geocoding requests at least `min_interval` apart.
///
/// A bucket of one: callers block in place, there is no queue. A zero
/// interval never waits.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    limiter: Option<DirectLimiter>,
    clock: DefaultClock,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            // burst of one; `None` for a zero interval
            limiter: Quota::with_period(min_interval).map(RateLimiter::direct),
            clock: DefaultClock::default(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until a request may go out and claim the slot. Returns how long
    /// it slept.
    pub fn wait(&mut self) -> Duration {
        let Some(limiter) = &self.limiter else {
            return Duration::ZERO;
        };
        let mut slept = Duration::ZERO;
        while let Err(not_until) = limiter.check() {
            let pause = not_until.wait_time_from(self.clock.now());
            debug!("Throttling geocoder for {:.0}ms", pause.as_secs_f64() * 1000.0);
            thread::sleep(pause);
            slept += pause;
        }
        slept
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    // clock granularity differs between governor's clock and `Instant`
    const SLACK: Duration = Duration::from_millis(2);

    #[test]
    fn first_call_does_not_wait() {
        let mut throttle = Throttle::new(Duration::from_secs(60));
        assert_eq!(throttle.wait(), Duration::ZERO);
    }

    #[test]
    fn back_to_back_calls_are_spaced() {
        let interval = Duration::from_millis(40);
        let mut throttle = Throttle::new(interval);
        let start = Instant::now();
        throttle.wait();
        throttle.wait();
        throttle.wait();
        assert!(start.elapsed() + SLACK >= interval * 2);
    }

    #[test]
    fn second_call_reports_its_pause() {
        let interval = Duration::from_millis(30);
        let mut throttle = Throttle::new(interval);
        throttle.wait();
        let slept = throttle.wait();
        assert!(slept > Duration::ZERO);
        assert!(slept <= interval + SLACK);
    }

    #[test]
    fn no_wait_after_interval_elapsed() {
        let mut throttle = Throttle::new(Duration::from_millis(5));
        throttle.wait();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(throttle.wait(), Duration::ZERO);
    }

    #[test]
    fn zero_interval_never_waits() {
        let mut throttle = Throttle::new(Duration::ZERO);
        for _ in 0..3 {
            assert_eq!(throttle.wait(), Duration::ZERO);
        }
    }

    #[test]
    fn default_interval() {
        assert_eq!(Throttle::default().min_interval(), Duration::from_millis(800));
    }
}

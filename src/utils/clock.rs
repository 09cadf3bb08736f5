//! Clock abstraction for waits that tests need to fast-forward.

use std::time::{Duration, Instant};

/// Source of monotonic time and sleeps.
#[allow(async_fn_in_trait)]
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock whose sleeps return immediately and advance time by the requested amount.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    elapsed: std::cell::Cell<Duration>,
    sleeps: std::cell::RefCell<Vec<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    /// Create a clock at time zero.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: std::cell::Cell::new(Duration::ZERO),
            sleeps: std::cell::RefCell::new(Vec::new()),
        }
    }

    /// Total simulated time.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    /// Every sleep requested so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed.get()
    }

    async fn sleep(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
        self.sleeps.borrow_mut().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let before = clock.now();

        clock.sleep(Duration::from_secs(20)).await;
        clock.sleep(Duration::from_secs(20)).await;

        assert_eq!(clock.now() - before, Duration::from_secs(40));
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_system_clock_sleep_elapses() {
        let clock = SystemClock;
        let before = clock.now();
        clock.sleep(Duration::from_millis(5)).await;
        assert!(clock.now() - before >= Duration::from_millis(5));
    }
}

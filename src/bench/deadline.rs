use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};

/// The run deadline fired while an operation was pending.
///
/// This is how a virtual client learns the run is over; it is not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired;

/// Absolute point in time bounding every blocking client operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn has_passed(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Drive `fut` until it completes or the deadline fires, whichever is first.
    pub async fn bound<F>(&self, fut: F) -> Result<F::Output, Expired>
    where
        F: Future,
    {
        time::timeout_at(self.at, fut).await.map_err(|_| Expired)
    }

    /// Sleep for `duration`, cut short by the deadline.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Expired> {
        self.bound(time::sleep(duration)).await
    }
}

/// Time axis shared by every execution unit of one run.
///
/// Sample start times are stored as offsets from `epoch` so samples taken on
/// different units compare directly.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    epoch: Instant,
    warmup_end: Instant,
    deadline: Deadline,
}

impl RunClock {
    /// Start a clock now: `warmup` first, then `measurement` until the deadline.
    pub fn start(warmup: Duration, measurement: Duration) -> Self {
        let epoch = Instant::now();
        let warmup_end = epoch + warmup;
        Self {
            epoch,
            warmup_end,
            deadline: Deadline::at(warmup_end + measurement),
        }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn warmup_end(&self) -> Instant {
        self.warmup_end
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn offset(&self, instant: Instant) -> Duration {
        instant.saturating_duration_since(self.epoch)
    }

    /// Whether a request started at `start` counts towards the results
    pub fn in_measurement(&self, start: Instant) -> bool {
        start >= self.warmup_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bound_cuts_off_at_absolute_deadline() {
        let deadline = Deadline::at(Instant::now() + Duration::from_millis(100));
        let started = Instant::now();

        // A much longer operation is cut off at the deadline, not after its own length
        let result = deadline.sleep(Duration::from_secs(30)).await;

        assert_eq!(result, Err(Expired));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(deadline.has_passed());
    }

    #[tokio::test(start_paused = true)]
    async fn bound_passes_through_completed_operations() {
        let deadline = Deadline::at(Instant::now() + Duration::from_secs(1));

        assert_eq!(deadline.bound(async { 7 }).await, Ok(7));
        assert_eq!(deadline.sleep(Duration::from_millis(10)).await, Ok(()));
        assert!(!deadline.has_passed());
    }

    #[tokio::test(start_paused = true)]
    async fn clock_windows_follow_warmup_and_measurement() {
        let clock = RunClock::start(Duration::from_secs(2), Duration::from_secs(10));

        assert_eq!(clock.warmup_end() - clock.epoch(), Duration::from_secs(2));
        assert_eq!(
            clock.deadline().instant() - clock.epoch(),
            Duration::from_secs(12)
        );
        assert!(!clock.in_measurement(clock.epoch() + Duration::from_millis(1999)));
        assert!(clock.in_measurement(clock.warmup_end()));
        assert_eq!(
            clock.offset(clock.epoch() + Duration::from_millis(5)),
            Duration::from_millis(5)
        );
    }
}

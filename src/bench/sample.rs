use std::time::Duration;

/// One completed, in-window request.
///
/// `start` is an offset on the run clock; after final aggregation it is
/// relative to the first request of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LatencySample {
    pub start: Duration,
    pub duration: Duration,
}

impl LatencySample {
    pub fn new(start: Duration, duration: Duration) -> Self {
        Self { start, duration }
    }

    /// `(start_ns, duration_ns)` as stored in a result bundle
    pub fn as_nanos(&self) -> (u64, u64) {
        (
            self.start.as_nanos() as u64,
            self.duration.as_nanos() as u64,
        )
    }
}

/// Whether `samples` is non-decreasing in start time
pub fn is_sorted_by_start(samples: &[LatencySample]) -> bool {
    samples.windows(2).all(|pair| pair[0].start <= pair[1].start)
}

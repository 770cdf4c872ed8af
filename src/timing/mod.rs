//! Monotonic timing for throughput figures
//!
//! Each streaming session owns one clock started when it goes live.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock measuring how long a session has been live
#[derive(Debug, Clone)]
pub struct ThroughputClock {
    start: Arc<Instant>,
}

impl ThroughputClock {
    /// Create a clock with the current instant as time zero
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for ThroughputClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Events per second over `elapsed`, zero for an empty window
pub fn rate_over(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        0.0
    } else {
        count as f64 / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_over_window() {
        assert_eq!(rate_over(40, Duration::from_secs(2)), 20.0);
        assert_eq!(rate_over(10, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_clones_share_time_zero() {
        let clock = ThroughputClock::new();
        let copy = clock.clone();
        std::thread::sleep(Duration::from_millis(5));
        let first = copy.elapsed();
        assert!(first >= Duration::from_millis(5));
        assert!(clock.elapsed() >= first);
    }
}

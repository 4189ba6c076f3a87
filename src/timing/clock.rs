//! Time sources.
//!
//! Recording logic reads time through [`Clock`] so a scenario spanning
//! minutes of footage can run against a [`ManualClock`] in microseconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};

pub trait Clock: Send + Sync {
    /// Milliseconds on a monotonic timebase
    fn now_ms(&self) -> u64;

    /// Local wall-clock time used for folder and file names
    fn local_time(&self) -> NaiveDateTime;
}

/// Monotonic clock anchored at creation
///
/// Clones share the same start instant.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Arc<Instant>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    pub fn from_instant(start: Instant) -> Self {
        Self {
            start: Arc::new(start),
        }
    }

    pub fn start_instant(&self) -> Instant {
        *self.start
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn local_time(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    ms: AtomicU64,
    base: NaiveDateTime,
}

impl ManualClock {
    pub fn new(base: NaiveDateTime) -> Self {
        Self {
            ms: AtomicU64::new(0),
            base,
        }
    }

    pub fn advance(&self, ms: u64) {
        self.ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }

    fn local_time(&self) -> NaiveDateTime {
        self.base + ChronoDuration::milliseconds(self.now_ms() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_manual_clock_advances_both_views() {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        let clock = ManualClock::new(base);
        clock.advance(1500);
        assert_eq!(clock.now_ms(), 1500);
        assert_eq!(
            clock.local_time().format("%Y%m%d_%H%M%S").to_string(),
            "20240102_000000"
        );
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.clone().now_ms();
        assert!(b >= a);
    }
}

// clock.rs: Time sources for the tracker
//
// The session itself never reads a clock. The tracker stamps every command
// with `now_ms()` on arrival so sessions replay deterministically under a
// `ManualClock`.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub trait Clock: Send + Sync {
    /// Monotonic milliseconds from an arbitrary origin
    fn now_ms(&self) -> u64;

    /// Wall-clock time, used only to date the run summary
    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Production clock backed by `Instant`
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Scripted clock for tests and log replay
pub struct ManualClock {
    now_ms: AtomicU64,
    wall_origin: DateTime<Utc>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
            wall_origin: Utc::now(),
        }
    }

    /// Pin the wall clock so `wall_clock()` is `origin + now_ms`.
    pub fn with_wall_origin(start_ms: u64, wall_origin: DateTime<Utc>) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
            wall_origin,
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        self.wall_origin + chrono::Duration::milliseconds(self.now_ms() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_monotonic_clock_never_decreases() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock() {
        let origin = Utc.with_ymd_and_hms(2024, 5, 1, 7, 30, 0).unwrap();
        let clock = ManualClock::with_wall_origin(1_000, origin);
        assert_eq!(clock.now_ms(), 1_000);

        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);

        clock.set(60_000);
        assert_eq!(clock.now_ms(), 60_000);
        assert_eq!(clock.wall_clock(), origin + chrono::Duration::seconds(60));
    }
}

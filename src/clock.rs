//! Time sources.
//!
//! Ledgers, recently trackers and producers never call `Instant::now()`
//! directly; they read an `Arc<dyn Clock>` so tests and replays can drive
//! time by hand.

use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};

/// A monotonic time source measured from an arbitrary origin.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

/// Real time, measured from the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to.
///
/// # Examples
///
/// ```rust
/// use statgraph::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// clock.advance_secs(1.5);
/// assert_eq!(clock.now(), Duration::from_millis(1500));
/// ```
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to an absolute time.
    pub fn set(&self, at: Duration) {
        *self.now.lock() = at;
    }

    /// Jump to an absolute time given in seconds.
    pub fn set_secs(&self, secs: f64) {
        self.set(Duration::from_secs_f64(secs));
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &self.now())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_only_on_request() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance(Duration::from_secs(2));
        clock.advance_secs(0.5);
        assert_eq!(clock.now(), Duration::from_millis(2500));
        clock.set_secs(1.0);
        assert_eq!(clock.now(), Duration::from_secs(1));
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}

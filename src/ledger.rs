//! Event ledgers.
//!
//! An `EventLedger` is the temporal backing store of a history node: an
//! append-only, capacity-bounded queue of timestamped values. Entries are
//! kept in timestamp order, so expiry only ever trims the front.
//!
//! Ledgers lock their own queue and can be shared (`Arc<EventLedger>`) with
//! threads that record events while the graph owner ticks and reads.

use crate::clock::Clock;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A single recorded event.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub value: f64,
    /// Clock reading when the event was recorded.
    pub at: Duration,
    /// Optional categorisation, e.g. the damage type.
    pub category: Option<String>,
}

struct LedgerState {
    events: VecDeque<TimedEvent>,
    last_cleanup: Duration,
}

/// Bounded, time-ordered event history with window queries.
///
/// # Examples
///
/// ```rust
/// use statgraph::clock::ManualClock;
/// use statgraph::EventLedger;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = Arc::new(ManualClock::new());
/// let ledger = EventLedger::new(clock.clone(), Duration::from_secs(4), 100);
///
/// ledger.record(10.0, None);
/// clock.set_secs(1.0);
/// ledger.record(20.0, Some("Fire"));
/// clock.set_secs(3.0);
/// ledger.record(30.0, Some("Fire"));
///
/// clock.set_secs(3.5);
/// // Ages are 3.5, 2.5 and 0.5
/// let window = Duration::from_secs(3);
/// assert_eq!(ledger.sum_recent(window), 50.0);
/// assert_eq!(ledger.count_recent(window), 2);
/// assert_eq!(ledger.sum_recent_by_category(window, "Fire"), 50.0);
/// ```
pub struct EventLedger {
    clock: Arc<dyn Clock>,
    window: Duration,
    capacity: usize,
    cleanup_interval: Duration,
    state: Mutex<LedgerState>,
    revision: AtomicU64,
}

impl EventLedger {
    /// Create a ledger with a default query `window` holding at most
    /// `capacity` events.
    pub fn new(clock: Arc<dyn Clock>, window: Duration, capacity: usize) -> Self {
        let now = clock.now();
        Self {
            clock,
            window,
            capacity: capacity.max(1),
            cleanup_interval: Duration::from_secs(1),
            state: Mutex::new(LedgerState {
                events: VecDeque::new(),
                last_cleanup: now,
            }),
            revision: AtomicU64::new(0),
        }
    }

    /// Minimum spacing between sweeps performed by [`EventLedger::maintain`].
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Record an event at the current clock time.
    ///
    /// Returns how many old events were evicted to respect the capacity.
    pub fn record(&self, value: f64, category: Option<&str>) -> usize {
        self.record_at(value, self.clock.now(), category)
    }

    /// Record an event at an explicit time (replay).
    ///
    /// A timestamp older than the newest entry is moved up to it, so the
    /// queue stays time-ordered.
    pub fn record_at(&self, value: f64, at: Duration, category: Option<&str>) -> usize {
        let evicted = {
            let mut state = self.state.lock();
            let at = match state.events.back() {
                Some(last) if last.at > at => last.at,
                _ => at,
            };
            state.events.push_back(TimedEvent {
                value,
                at,
                category: category.map(str::to_string),
            });
            let mut evicted = 0;
            while state.events.len() > self.capacity {
                state.events.pop_front();
                evicted += 1;
            }
            evicted
        };
        if evicted > 0 {
            tracing::trace!(evicted, capacity = self.capacity, "ledger over capacity");
        }
        self.bump();
        evicted
    }

    /// Sum of values whose age is at most `window`.
    pub fn sum_recent(&self, window: Duration) -> f64 {
        let now = self.clock.now();
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| within(now, e, window))
            .map(|e| e.value)
            .sum()
    }

    /// Like [`EventLedger::sum_recent`], restricted to one category.
    pub fn sum_recent_by_category(&self, window: Duration, category: &str) -> f64 {
        let now = self.clock.now();
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| e.category.as_deref() == Some(category) && within(now, e, window))
            .map(|e| e.value)
            .sum()
    }

    pub fn count_recent(&self, window: Duration) -> usize {
        let now = self.clock.now();
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| within(now, e, window))
            .count()
    }

    pub fn has_recent_event(&self, window: Duration) -> bool {
        self.count_recent(window) > 0
    }

    /// Age of the newest event, `None` if the ledger is empty.
    pub fn last_event_age(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.state
            .lock()
            .events
            .back()
            .map(|e| now.saturating_sub(e.at))
    }

    /// Exponential decay of the newest event: `value * 2^(-age / half_life)`.
    pub fn decaying_value(&self, half_life: Duration) -> f64 {
        let now = self.clock.now();
        let state = self.state.lock();
        let Some(last) = state.events.back() else {
            return 0.0;
        };
        let age = now.saturating_sub(last.at);
        if half_life.is_zero() {
            return if age.is_zero() { last.value } else { 0.0 };
        }
        last.value * (-age.as_secs_f64() / half_life.as_secs_f64()).exp2()
    }

    /// Drop events older than `max_age` from the front.
    ///
    /// Stops at the first retained entry. Returns the number removed.
    pub fn cleanup_old_events(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let removed = {
            let mut state = self.state.lock();
            let mut removed = 0;
            while let Some(front) = state.events.front() {
                if now.saturating_sub(front.at) > max_age {
                    state.events.pop_front();
                    removed += 1;
                } else {
                    break;
                }
            }
            state.last_cleanup = now;
            removed
        };
        if removed > 0 {
            tracing::trace!(removed, "swept expired ledger events");
            self.bump();
        }
        removed
    }

    /// Sweep expired events if the cleanup interval has elapsed since the
    /// last sweep. Returns `true` if a sweep ran.
    pub fn maintain(&self, max_age: Duration) -> bool {
        let now = self.clock.now();
        let due = now.saturating_sub(self.state.lock().last_cleanup) > self.cleanup_interval;
        if due {
            self.cleanup_old_events(max_age);
        }
        due
    }

    /// `(value, age in seconds)` of every retained event, oldest first.
    pub fn history(&self) -> Vec<(f64, f64)> {
        let now = self.clock.now();
        self.state
            .lock()
            .events
            .iter()
            .map(|e| (e.value, now.saturating_sub(e.at).as_secs_f64()))
            .collect()
    }

    /// Copy of the retained events, oldest first.
    pub fn events(&self) -> Vec<TimedEvent> {
        self.state.lock().events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().events.is_empty()
    }

    /// The default window used by history nodes built on this ledger.
    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Monotonic counter bumped on every change to the event queue.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

fn within(now: Duration, event: &TimedEvent, window: Duration) -> bool {
    now.saturating_sub(event.at) <= window
}

impl fmt::Debug for EventLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLedger")
            .field("window", &self.window)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

/// Custom aggregation over a ledger.
pub type LedgerFn = Arc<dyn Fn(&EventLedger) -> f64 + Send + Sync>;

/// How a history node turns its ledger into a value.
#[derive(Clone, Default)]
pub enum LedgerAggregation {
    /// Sum over the ledger's default window.
    #[default]
    SumRecent,
    /// Number of events in the ledger's default window.
    CountRecent,
    /// Decayed value of the newest event.
    Decaying { half_life: Duration },
    Custom(LedgerFn),
}

impl LedgerAggregation {
    pub fn custom(f: impl Fn(&EventLedger) -> f64 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn evaluate(&self, ledger: &EventLedger) -> f64 {
        match self {
            Self::SumRecent => ledger.sum_recent(ledger.window()),
            Self::CountRecent => ledger.count_recent(ledger.window()) as f64,
            Self::Decaying { half_life } => ledger.decaying_value(*half_life),
            Self::Custom(f) => f(ledger),
        }
    }
}

impl fmt::Debug for LedgerAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SumRecent => f.write_str("SumRecent"),
            Self::CountRecent => f.write_str("CountRecent"),
            Self::Decaying { half_life } => f
                .debug_struct("Decaying")
                .field("half_life", half_life)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn ledger(capacity: usize) -> (Arc<ManualClock>, EventLedger) {
        let clock = Arc::new(ManualClock::new());
        let ledger = EventLedger::new(clock.clone(), Duration::from_secs(4), capacity);
        (clock, ledger)
    }

    #[test]
    fn test_window_inclusion_is_age_at_most_window() {
        let (clock, ledger) = ledger(10);
        ledger.record(10.0, None);
        clock.set_secs(2.0);
        assert_eq!(ledger.sum_recent(Duration::from_secs(2)), 10.0);
        clock.set_secs(2.001);
        assert_eq!(ledger.sum_recent(Duration::from_secs(2)), 0.0);
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let (clock, ledger) = ledger(3);
        for i in 0..5 {
            clock.set_secs(i as f64);
            ledger.record(i as f64, None);
        }
        assert_eq!(ledger.len(), 3);
        let values: Vec<f64> = ledger.events().iter().map(|e| e.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(ledger.count_recent(Duration::MAX), 3);
    }

    #[test]
    fn test_record_at_keeps_time_order() {
        let (_clock, ledger) = ledger(10);
        ledger.record_at(1.0, Duration::from_secs(5), None);
        ledger.record_at(2.0, Duration::from_secs(3), None);
        let events = ledger.events();
        assert_eq!(events[1].at, Duration::from_secs(5));
    }

    #[test]
    fn test_cleanup_stops_at_first_retained() {
        let (clock, ledger) = ledger(10);
        ledger.record(1.0, None);
        clock.set_secs(5.0);
        ledger.record(2.0, None);
        clock.set_secs(8.0);
        assert_eq!(ledger.cleanup_old_events(Duration::from_secs(4)), 1);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.cleanup_old_events(Duration::from_secs(4)), 0);
    }

    #[test]
    fn test_maintain_is_rate_limited() {
        let (clock, ledger) = ledger(10);
        ledger.record(1.0, None);
        clock.set_secs(0.5);
        assert!(!ledger.maintain(Duration::ZERO));
        assert_eq!(ledger.len(), 1);
        clock.set_secs(1.5);
        assert!(ledger.maintain(Duration::ZERO));
        assert!(ledger.is_empty());
        clock.set_secs(2.0);
        assert!(!ledger.maintain(Duration::ZERO));
    }

    #[test]
    fn test_decaying_value_halves_per_half_life() {
        let (clock, ledger) = ledger(10);
        assert_eq!(ledger.decaying_value(Duration::from_secs(2)), 0.0);
        ledger.record(100.0, None);
        clock.set_secs(2.0);
        assert!((ledger.decaying_value(Duration::from_secs(2)) - 50.0).abs() < 1e-9);
        clock.set_secs(4.0);
        assert!((ledger.decaying_value(Duration::from_secs(2)) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_last_event_age_and_history() {
        let (clock, ledger) = ledger(10);
        assert_eq!(ledger.last_event_age(), None);
        ledger.record(7.0, Some("Cold"));
        clock.set_secs(1.25);
        assert_eq!(ledger.last_event_age(), Some(Duration::from_millis(1250)));
        assert_eq!(ledger.history(), vec![(7.0, 1.25)]);
    }

    #[test]
    fn test_revision_tracks_changes() {
        let (clock, ledger) = ledger(10);
        let start = ledger.revision();
        ledger.record(1.0, None);
        assert_eq!(ledger.revision(), start + 1);
        clock.set_secs(100.0);
        ledger.cleanup_old_events(Duration::from_secs(1));
        assert_eq!(ledger.revision(), start + 2);
        ledger.cleanup_old_events(Duration::from_secs(1));
        assert_eq!(ledger.revision(), start + 2);
    }

    #[test]
    fn test_aggregations() {
        let (clock, ledger) = ledger(10);
        ledger.record(3.0, None);
        ledger.record(4.0, None);
        clock.set_secs(1.0);
        assert_eq!(LedgerAggregation::SumRecent.evaluate(&ledger), 7.0);
        assert_eq!(LedgerAggregation::CountRecent.evaluate(&ledger), 2.0);
        let max = LedgerAggregation::custom(|l| {
            l.events().iter().map(|e| e.value).fold(0.0, f64::max)
        });
        assert_eq!(max.evaluate(&ledger), 4.0);
    }
}

//! "Did X happen recently?" trackers.
//!
//! A `RecentlyTracker` keeps only the time of the last trigger and a window;
//! unlike a ledger it retains no history.

use crate::config::RecentlyConfig;
use serde::Serialize;
use std::time::Duration;
use strum::{Display, EnumIter, EnumString};

/// The built-in trackers every graph carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RecentlyKind {
    Crit,
    Block,
    Kill,
}

/// Boolean state derived from a single trigger timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecentlyTracker {
    last_trigger: Option<Duration>,
    window: Duration,
}

impl RecentlyTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            last_trigger: None,
            window,
        }
    }

    pub fn trigger(&mut self, now: Duration) {
        self.last_trigger = Some(now);
    }

    /// True if triggered and at most `window` has elapsed since.
    pub fn is_recent(&self, now: Duration) -> bool {
        self.last_trigger
            .is_some_and(|at| now.saturating_sub(at) <= self.window)
    }

    /// Seconds since the last trigger; infinite if never triggered.
    pub fn seconds_since_trigger(&self, now: Duration) -> f64 {
        match self.last_trigger {
            Some(at) => now.saturating_sub(at).as_secs_f64(),
            None => f64::INFINITY,
        }
    }

    /// Seconds until the state expires; zero if inactive.
    pub fn remaining(&self, now: Duration) -> f64 {
        match self.last_trigger {
            Some(at) => self
                .window
                .saturating_sub(now.saturating_sub(at))
                .as_secs_f64(),
            None => 0.0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }
}

/// Active flag and remaining seconds of one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecentlyState {
    pub active: bool,
    pub remaining: f64,
}

/// The crit/block/kill tracker trio.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentlyTrackers {
    crit: RecentlyTracker,
    block: RecentlyTracker,
    kill: RecentlyTracker,
}

impl RecentlyTrackers {
    pub fn new(config: &RecentlyConfig) -> Self {
        Self {
            crit: RecentlyTracker::new(Duration::from_secs_f64(config.crit_window_secs)),
            block: RecentlyTracker::new(Duration::from_secs_f64(config.block_window_secs)),
            kill: RecentlyTracker::new(Duration::from_secs_f64(config.kill_window_secs)),
        }
    }

    pub fn get(&self, kind: RecentlyKind) -> &RecentlyTracker {
        match kind {
            RecentlyKind::Crit => &self.crit,
            RecentlyKind::Block => &self.block,
            RecentlyKind::Kill => &self.kill,
        }
    }

    pub fn get_mut(&mut self, kind: RecentlyKind) -> &mut RecentlyTracker {
        match kind {
            RecentlyKind::Crit => &mut self.crit,
            RecentlyKind::Block => &mut self.block,
            RecentlyKind::Kill => &mut self.kill,
        }
    }

    pub fn is_recent(&self, kind: RecentlyKind, now: Duration) -> bool {
        self.get(kind).is_recent(now)
    }

    pub fn state(&self, kind: RecentlyKind, now: Duration) -> RecentlyState {
        let tracker = self.get(kind);
        RecentlyState {
            active: tracker.is_recent(now),
            remaining: tracker.remaining(now),
        }
    }
}

impl Default for RecentlyTrackers {
    fn default() -> Self {
        Self::new(&RecentlyConfig::default())
    }
}

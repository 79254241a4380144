//! Evaluation context.
//!
//! The `EvalContext` is what conditions, dynamic modifier values and edge
//! predicates get to look at: the active tags, the recently trackers, the
//! event ledgers and the current clock reading. It borrows everything, so
//! building one per evaluation is free.

use crate::ledger::EventLedger;
use crate::recently::{RecentlyKind, RecentlyTrackers};
use crate::stat_id::StatId;
use crate::tag::{Tag, TagSet};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;

/// Ledgers by history node id, in creation order.
pub type LedgerMap = IndexMap<StatId, Arc<EventLedger>>;

/// Read-only view of the environment a stat is evaluated in.
///
/// # Examples
///
/// ```rust
/// use statgraph::context::LedgerMap;
/// use statgraph::recently::RecentlyTrackers;
/// use statgraph::tag::{TagPool, TagSet};
/// use statgraph::EvalContext;
/// use std::time::Duration;
///
/// let pool = TagPool::new();
/// let tags = TagSet::new();
/// tags.add(&pool.intern("Buff.Onslaught"));
///
/// let recently = RecentlyTrackers::default();
/// let ledgers = LedgerMap::new();
/// let ctx = EvalContext::new(&tags, &recently, &ledgers, Duration::ZERO);
///
/// assert!(ctx.has_tag_named("Buff.Onslaught"));
/// ```
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    tags: &'a TagSet,
    recently: &'a RecentlyTrackers,
    ledgers: &'a LedgerMap,
    now: Duration,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        tags: &'a TagSet,
        recently: &'a RecentlyTrackers,
        ledgers: &'a LedgerMap,
        now: Duration,
    ) -> Self {
        Self {
            tags,
            recently,
            ledgers,
            now,
        }
    }

    pub fn tags(&self) -> &'a TagSet {
        self.tags
    }

    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.has_tag(tag)
    }

    pub fn has_tag_named(&self, name: &str) -> bool {
        self.tags.has_tag_named(name)
    }

    /// Whether the given tracker is currently active.
    pub fn is_recently(&self, kind: RecentlyKind) -> bool {
        self.recently.is_recent(kind, self.now)
    }

    pub fn recently(&self) -> &'a RecentlyTrackers {
        self.recently
    }

    /// Ledger backing the history node `id`, if any.
    pub fn ledger(&self, id: &str) -> Option<&'a EventLedger> {
        self.ledgers.get(id).map(Arc::as_ref)
    }

    /// Clock reading the context was built at.
    pub fn now(&self) -> Duration {
        self.now
    }
}

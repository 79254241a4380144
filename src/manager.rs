//! Graph manager.
//!
//! `GraphManager` is the entry point of the crate. It owns the node graph and
//! everything its conditions can read (tags, recently trackers, event
//! ledgers), the per-stat modifier aggregators and the active producers, and
//! keeps the caches consistent as any of them change.
//!
//! The manager itself is single-owner: mutation and reads go through
//! `&mut self`. The tag set and the event ledgers are shared handles
//! (`Arc<TagSet>`, `Arc<EventLedger>`) that other threads may write to; the
//! manager picks those writes up on its next operation.

use crate::aggregator::ModifierTable;
use crate::clock::{Clock, MonotonicClock};
use crate::condition::Condition;
use crate::config::GraphConfig;
use crate::context::{EvalContext, LedgerMap};
use crate::error::StatError;
use crate::graph::StatGraph;
use crate::ledger::{EventLedger, LedgerAggregation};
use crate::modifier::Modifier;
use crate::node::{CalcFn, StatNode};
use crate::producer::{recently_ledger, CombatEvent, ProducerConfig};
use crate::recently::{RecentlyKind, RecentlyState, RecentlyTrackers};
use crate::snapshot::GraphSnapshot;
use crate::stat_id::StatId;
use crate::tag::{Tag, TagPool, TagSet};
use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;

struct ActiveProducer {
    config: ProducerConfig,
    activated_at: Duration,
}

/// Owner of a stat graph and its environment.
///
/// # Examples
///
/// ```rust
/// use statgraph::{GraphConfig, GraphManager, Modifier, ModifierKind};
///
/// let mut graph = GraphManager::new(GraphConfig::default()).unwrap();
/// graph.create_base_stat("strength", "Strength", 20.0, "attribute").unwrap();
/// graph
///     .create_modified_stat("maxLife", "Maximum Life", 50.0, &["strength"], "defense")
///     .unwrap();
///
/// assert_eq!(graph.get_value("maxLife").unwrap(), 70.0);
///
/// graph.add_modifier(Modifier::new("belt", "maxLife", ModifierKind::Increased, 0.5));
/// assert_eq!(graph.get_value("maxLife").unwrap(), 105.0);
///
/// graph.set_node_value("strength", 30.0).unwrap();
/// assert_eq!(graph.get_value("maxLife").unwrap(), 120.0);
/// assert!(graph.take_changes());
/// assert!(!graph.take_changes());
/// ```
pub struct GraphManager {
    graph: StatGraph,
    modifiers: ModifierTable,
    ledgers: LedgerMap,
    history_nodes: Vec<NodeIndex>,
    pool: Arc<TagPool>,
    tags: Arc<TagSet>,
    tag_events: Arc<AtomicBool>,
    recently: RecentlyTrackers,
    recently_seen: Vec<bool>,
    producers: IndexMap<String, ActiveProducer>,
    catalog: IndexMap<String, ProducerConfig>,
    clock: Arc<dyn Clock>,
    config: GraphConfig,
    pending: Arc<AtomicBool>,
}

impl GraphManager {
    /// A manager driven by the real monotonic clock.
    ///
    /// Fails with [`StatError::Config`] if `config` does not validate.
    pub fn new(config: GraphConfig) -> Result<Self, StatError> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// A manager reading time from `clock`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use statgraph::clock::ManualClock;
    /// use statgraph::{GraphConfig, GraphManager, StatError};
    /// use std::sync::Arc;
    ///
    /// let clock = Arc::new(ManualClock::new());
    /// assert!(GraphManager::with_clock(GraphConfig::default(), clock.clone()).is_ok());
    ///
    /// let mut config = GraphConfig::default();
    /// config.recently.crit_window_secs = -1.0;
    /// assert!(matches!(
    ///     GraphManager::with_clock(config, clock),
    ///     Err(StatError::Config(_))
    /// ));
    /// ```
    pub fn with_clock(config: GraphConfig, clock: Arc<dyn Clock>) -> Result<Self, StatError> {
        config.validate()?;
        Ok(Self::assemble(config, clock))
    }

    /// `config` must already be valid.
    fn assemble(config: GraphConfig, clock: Arc<dyn Clock>) -> Self {
        let tag_events = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(AtomicBool::new(false));
        let (events, changed) = (tag_events.clone(), pending.clone());
        // Invalidation waits for the next `&mut` call; the change flag does not.
        let tags = Arc::new(TagSet::with_callback(move || {
            events.store(true, Ordering::Release);
            changed.store(true, Ordering::Release);
        }));
        Self {
            graph: StatGraph::new(),
            modifiers: ModifierTable::new(),
            ledgers: LedgerMap::new(),
            history_nodes: Vec::new(),
            pool: Arc::new(TagPool::new()),
            tags,
            tag_events,
            recently: RecentlyTrackers::new(&config.recently),
            recently_seen: vec![false; RecentlyKind::iter().count()],
            producers: IndexMap::new(),
            catalog: IndexMap::new(),
            clock,
            config,
            pending,
        }
    }

    /// The validated configuration this manager was built with.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// The time source shared with every ledger the manager creates.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // Registration

    /// Create a base stat holding `base` until [`GraphManager::set_node_value`]
    /// changes it.
    ///
    /// Fails with [`StatError::DuplicateNode`] if the id is taken.
    pub fn create_base_stat(
        &mut self,
        id: &str,
        label: &str,
        base: f64,
        category: &str,
    ) -> Result<(), StatError> {
        self.graph
            .add_node(StatNode::base(id, label, base).with_category(category))?;
        tracing::debug!(id, base, "created base stat");
        self.mark_changed();
        Ok(())
    }

    /// Create a derived stat reading `parents` in order.
    ///
    /// Without a calculation the value is the sum of the parents. Parents
    /// that do not exist are skipped.
    pub fn create_derived_stat(
        &mut self,
        id: &str,
        label: &str,
        parents: &[&str],
        calculation: Option<CalcFn>,
        category: &str,
    ) -> Result<(), StatError> {
        let mut node = StatNode::derived(id, label).with_category(category);
        if let Some(calculation) = calculation {
            node = node.with_calculation(calculation);
        }
        self.add_derived(node, parents)
    }

    /// Create a derived stat whose value is `base + Σ parents`, passed through
    /// its modifiers.
    pub fn create_modified_stat(
        &mut self,
        id: &str,
        label: &str,
        base: f64,
        parents: &[&str],
        category: &str,
    ) -> Result<(), StatError> {
        let mut node = StatNode::derived(id, label).with_category(category);
        node.base_value = base;
        self.add_derived(node, parents)
    }

    fn add_derived(&mut self, node: StatNode, parents: &[&str]) -> Result<(), StatError> {
        let idx = self.graph.add_node(node)?;
        for parent in parents {
            match self.graph.index_of(parent) {
                Some(parent_idx) => {
                    self.graph.add_parent(idx, parent_idx)?;
                }
                None => {
                    tracing::warn!(
                        child = %self.graph.node(idx).id(),
                        parent = %parent,
                        "unknown parent skipped"
                    );
                }
            }
        }
        tracing::debug!(id = %self.graph.node(idx).id(), parents = parents.len(), "created derived stat");
        self.mark_changed();
        Ok(())
    }

    /// Create a history node backed by a new ledger.
    ///
    /// `window` defaults to `history.default_window_secs`. The node's value is
    /// the sum of events within the window until
    /// [`GraphManager::set_history_aggregation`] says otherwise.
    pub fn create_history_node(
        &mut self,
        id: &str,
        label: &str,
        window: Option<Duration>,
        category: &str,
    ) -> Result<Arc<EventLedger>, StatError> {
        if self.graph.contains_node(id) {
            return Err(StatError::DuplicateNode(StatId::from(id)));
        }
        let history = &self.config.history;
        let ledger = Arc::new(
            EventLedger::new(
                self.clock.clone(),
                window.unwrap_or_else(|| history.default_window()),
                history.max_events,
            )
            .with_cleanup_interval(history.cleanup_interval()),
        );
        let node = StatNode::history(id, label, ledger.clone(), LedgerAggregation::SumRecent)
            .with_category(category);
        let idx = self.graph.add_node(node)?;
        self.ledgers.insert(StatId::from(id), ledger.clone());
        self.history_nodes.push(idx);
        tracing::debug!(id, window = ?ledger.window(), "created history node");
        self.mark_changed();
        Ok(ledger)
    }

    /// Change how a history node folds its ledger into a value.
    pub fn set_history_aggregation(
        &mut self,
        id: &str,
        aggregation: LedgerAggregation,
    ) -> Result<(), StatError> {
        let idx = self.history_index(id)?;
        self.graph.set_aggregation(idx, aggregation);
        self.mark_changed();
        Ok(())
    }

    /// Make `child` read `parent`. Both must exist and `child` must be derived.
    pub fn add_parent(&mut self, child: &str, parent: &str) -> Result<(), StatError> {
        let child_idx = self.index(child)?;
        let parent_idx = self.index(parent)?;
        self.graph.add_parent(child_idx, parent_idx)?;
        self.mark_changed();
        Ok(())
    }

    /// Add a parent that only contributes while `condition` holds.
    pub fn add_conditional_parent(
        &mut self,
        child: &str,
        parent: &str,
        condition: Condition,
    ) -> Result<(), StatError> {
        let child_idx = self.index(child)?;
        let parent_idx = self.index(parent)?;
        self.graph
            .add_conditional_parent(child_idx, parent_idx, condition)?;
        self.mark_changed();
        Ok(())
    }

    /// Replace how a derived stat combines its inputs.
    pub fn set_calculation(&mut self, id: &str, calculation: CalcFn) -> Result<(), StatError> {
        let idx = self.index(id)?;
        self.graph.set_calculation(idx, calculation)?;
        self.mark_changed();
        Ok(())
    }

    // Values

    /// Current value of a stat, recomputing whatever is stale.
    pub fn get_value(&mut self, id: &str) -> Result<f64, StatError> {
        self.sync();
        let idx = self.index(id)?;
        let ctx = EvalContext::new(&self.tags, &self.recently, &self.ledgers, self.clock.now());
        Ok(self.graph.value(idx, &ctx, &mut self.modifiers))
    }

    /// Last computed value, without recomputing.
    pub fn cached_value(&self, id: &str) -> Option<f64> {
        self.graph.get(id).map(StatNode::cached_value)
    }

    /// The node registered under `id`, with its cached state.
    pub fn node(&self, id: &str) -> Option<&StatNode> {
        self.graph.get(id)
    }

    /// True if a stat with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.graph.contains_node(id)
    }

    /// Stat ids in registration order.
    pub fn node_ids(&self) -> Vec<StatId> {
        self.graph.nodes().map(|n| n.id().clone()).collect()
    }

    /// Read access to the underlying graph.
    pub fn graph(&self) -> &StatGraph {
        &self.graph
    }

    /// Set the base value of a stat. Returns `true` if it changed.
    pub fn set_node_value(&mut self, id: &str, value: f64) -> Result<bool, StatError> {
        let idx = self.index(id)?;
        let changed = self.graph.set_base_value(idx, value);
        if changed {
            tracing::debug!(id, value, "base value set");
            self.mark_changed();
        }
        Ok(changed)
    }

    /// Mark a stat and its dependents dirty. Returns how many nodes were
    /// newly flagged.
    ///
    /// Raises the pending-changes flag if anything was flagged.
    pub fn mark_dirty(&mut self, id: &str) -> Result<usize, StatError> {
        let idx = self.index(id)?;
        let flagged = self.graph.mark_dirty(idx);
        if flagged > 0 {
            self.mark_changed();
        }
        Ok(flagged)
    }

    // Tags

    /// Intern a tag name in the manager's pool.
    pub fn intern(&self, name: &str) -> Tag {
        self.pool.intern(name)
    }

    /// Shared handle to the tag set; writes from any thread are picked up by
    /// the next manager operation.
    pub fn tag_set(&self) -> Arc<TagSet> {
        self.tags.clone()
    }

    /// Add a tag by name. Returns `false` if it was already present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use statgraph::{GraphConfig, GraphManager};
    ///
    /// let mut graph = GraphManager::new(GraphConfig::default()).unwrap();
    /// graph.take_changes();
    /// assert!(graph.add_tag("Equipment.Weapon.Sword"));
    /// assert!(!graph.add_tag("Equipment.Weapon.Sword"));
    /// assert!(graph.has_tag("Equipment.Weapon.Sword"));
    /// assert!(graph.take_changes());
    /// ```
    pub fn add_tag(&mut self, name: &str) -> bool {
        let added = self.tags.add(&self.pool.intern(name));
        self.sync();
        added
    }

    /// Remove a tag by name. Returns `false` if it was not present.
    pub fn remove_tag(&mut self, name: &str) -> bool {
        let removed = self.tags.remove(&self.pool.intern(name));
        self.sync();
        removed
    }

    /// Remove every tag. Returns `false` if the set was already empty.
    pub fn clear_tags(&mut self) -> bool {
        let cleared = self.tags.clear();
        self.sync();
        cleared
    }

    /// Exact membership test; parents in the hierarchy do not match.
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.has_tag_named(name)
    }

    /// Active tag names, sorted.
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.names()
    }

    // Modifiers

    /// Add a modifier to its target's aggregator and mark the target dirty.
    pub fn add_modifier(&mut self, modifier: Modifier) {
        let target = modifier.target().clone();
        tracing::debug!(id = modifier.id(), target = %target, kind = %modifier.kind(), "added modifier");
        self.modifiers.add(modifier);
        if let Some(idx) = self.graph.index_of(target.as_str()) {
            self.graph.mark_dirty(idx);
        }
        self.mark_changed();
    }

    /// Remove a modifier by id and mark its targets dirty.
    ///
    /// Fails with [`StatError::ModifierNotFound`] if no aggregator holds it.
    pub fn remove_modifier(&mut self, id: &str) -> Result<(), StatError> {
        let affected = self.modifiers.remove_modifier(id);
        if affected.is_empty() {
            return Err(StatError::ModifierNotFound(id.to_string()));
        }
        self.dirty_targets(&affected);
        tracing::debug!(id, "removed modifier");
        self.mark_changed();
        Ok(())
    }

    /// Remove every modifier granted by `source`. Returns the number of
    /// stats affected.
    pub fn remove_modifiers_by_source(&mut self, source: &str) -> Result<usize, StatError> {
        let affected = self.modifiers.remove_by_source(source);
        if affected.is_empty() {
            return Err(StatError::SourceNotFound(source.to_string()));
        }
        self.dirty_targets(&affected);
        tracing::debug!(source, stats = affected.len(), "removed modifiers by source");
        self.mark_changed();
        Ok(affected.len())
    }

    fn dirty_targets(&mut self, targets: &[StatId]) {
        for target in targets {
            if let Some(idx) = self.graph.index_of(target.as_str()) {
                self.graph.mark_dirty(idx);
            }
        }
    }

    /// Modifiers on a stat, in processing order.
    pub fn modifiers(&self, target: &str) -> &[Modifier] {
        self.modifiers
            .get(target)
            .map(|agg| agg.modifiers())
            .unwrap_or(&[])
    }

    /// Every aggregator, keyed by target stat.
    pub fn modifier_table(&self) -> &ModifierTable {
        &self.modifiers
    }

    // Recently

    /// Trigger a recently tracker. Conditions may read tracker state, so
    /// condition-dependent nodes are invalidated.
    pub fn trigger(&mut self, kind: RecentlyKind) {
        let now = self.clock.now();
        self.recently.get_mut(kind).trigger(now);
        self.recently_seen = self.recently_flags(now);
        self.invalidate_tag_sensitive();
        self.mark_changed();
    }

    /// True while the tracker's window is open.
    pub fn is_recently(&self, kind: RecentlyKind) -> bool {
        self.recently.is_recent(kind, self.clock.now())
    }

    /// Activity and remaining seconds of a tracker.
    pub fn recently_state(&self, kind: RecentlyKind) -> RecentlyState {
        self.recently.state(kind, self.clock.now())
    }

    fn recently_flags(&self, now: Duration) -> Vec<bool> {
        RecentlyKind::iter()
            .map(|kind| self.recently.is_recent(kind, now))
            .collect()
    }

    // Ledgers

    /// Record an event into a history node's ledger.
    pub fn record_event(
        &mut self,
        history_id: &str,
        value: f64,
        category: Option<&str>,
    ) -> Result<(), StatError> {
        let idx = self.history_index(history_id)?;
        if let Some(ledger) = self.graph.node(idx).ledger() {
            ledger.record(value, category);
        }
        self.graph.refresh_history(idx);
        self.mark_changed();
        Ok(())
    }

    /// Shared handle to a history node's ledger. Other threads may record
    /// into it; the node refreshes on the next manager operation.
    pub fn ledger(&self, id: &str) -> Option<Arc<EventLedger>> {
        self.ledgers.get(id).cloned()
    }

    /// True if `id` names a history node.
    pub fn is_history(&self, id: &str) -> bool {
        self.ledgers.contains_key(id)
    }

    // Maintenance

    /// Periodic maintenance; call at a fixed cadence (e.g. every 100ms).
    ///
    /// Sweeps and recomputes history nodes, reacts to recently trackers
    /// expiring and expires timed auras. Returns `true` if anything
    /// observable changed; the pending-changes flag is raised as well.
    pub fn tick(&mut self) -> bool {
        self.sync();
        let history = &self.config.history;
        let (max_age, epsilon) = (history.max_age(), history.change_epsilon);
        let mut changed = false;

        for idx in self.history_nodes.clone() {
            changed |= self.graph.tick_history(idx, max_age, epsilon);
        }

        let now = self.clock.now();
        let flags = self.recently_flags(now);
        if flags != self.recently_seen {
            self.recently_seen = flags;
            self.invalidate_tag_sensitive();
            changed = true;
        }
        // Remaining-time countdowns are observable while a tracker runs.
        changed |= self.recently_seen.iter().any(|&active| active);

        let expired: Vec<String> = self
            .producers
            .values()
            .filter(|p| {
                p.config
                    .duration()
                    .is_some_and(|d| now.saturating_sub(p.activated_at) > d)
            })
            .map(|p| p.config.id.clone())
            .collect();
        for id in expired {
            tracing::debug!(producer = %id, "aura expired");
            changed |= self.deactivate(&id).is_ok();
        }

        if changed {
            tracing::trace!("tick produced changes");
            self.mark_changed();
        }
        changed
    }

    /// Read and clear the pending-changes flag.
    ///
    /// Tag writes through [`GraphManager::tag_set`] raise the flag from any
    /// thread, before the manager reacts to them.
    pub fn take_changes(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Raise the pending-changes flag.
    pub fn mark_changed(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Mark dirty every node with conditional parents or modifiers.
    pub fn invalidate_tag_sensitive(&mut self) -> usize {
        self.graph.invalidate_conditional(&self.modifiers)
    }

    /// Pick up changes made through the shared tag set or ledgers.
    fn sync(&mut self) {
        if self.tag_events.swap(false, Ordering::AcqRel) {
            self.invalidate_tag_sensitive();
            self.mark_changed();
        }
        for i in 0..self.history_nodes.len() {
            if self.graph.refresh_history(self.history_nodes[i]).is_some() {
                self.mark_changed();
            }
        }
    }

    // Export

    /// Read-only snapshot. Dirty nodes report their stale cached value.
    pub fn snapshot(&self) -> GraphSnapshot {
        let ctx = EvalContext::new(&self.tags, &self.recently, &self.ledgers, self.clock.now());
        GraphSnapshot::capture(&self.graph, &self.modifiers, &ctx)
    }

    /// Bring every node up to date, then snapshot.
    pub fn recalculate_and_snapshot(&mut self) -> GraphSnapshot {
        self.sync();
        let ctx = EvalContext::new(&self.tags, &self.recently, &self.ledgers, self.clock.now());
        for target in self.modifiers.evaluate_conditions(&ctx) {
            if let Some(idx) = self.graph.index_of(target.as_str()) {
                self.graph.mark_dirty(idx);
            }
        }
        let indices: Vec<NodeIndex> = self.graph.indices().collect();
        for idx in indices {
            self.graph.value(idx, &ctx, &mut self.modifiers);
        }
        GraphSnapshot::capture(&self.graph, &self.modifiers, &ctx)
    }

    /// Recompute every node parents-first. Fails on a cyclic graph.
    pub fn recalculate_all(&mut self) -> Result<(), StatError> {
        self.sync();
        let order = self.graph.topological_order()?;
        let ctx = EvalContext::new(&self.tags, &self.recently, &self.ledgers, self.clock.now());
        for idx in order {
            self.graph.value(idx, &ctx, &mut self.modifiers);
        }
        Ok(())
    }

    // Producers

    /// Apply a producer's modifiers and tags. Returns `false` if it was
    /// already active.
    pub fn activate(&mut self, config: &ProducerConfig) -> bool {
        if self.producers.contains_key(&config.id) {
            return false;
        }
        for modifier in config.build_modifiers() {
            self.add_modifier(modifier);
        }
        for name in &config.granted_tags {
            self.tags.add(&self.pool.intern(name));
        }
        self.producers.insert(
            config.id.clone(),
            ActiveProducer {
                config: config.clone(),
                activated_at: self.clock.now(),
            },
        );
        tracing::info!(producer = %config.id, name = %config.name, "activated");
        self.sync();
        self.mark_changed();
        true
    }

    /// Remove everything an active producer contributed.
    pub fn deactivate(&mut self, id: &str) -> Result<(), StatError> {
        let producer = self
            .producers
            .shift_remove(id)
            .ok_or_else(|| StatError::ProducerNotFound(id.to_string()))?;
        let affected = self.modifiers.remove_by_source(id);
        self.dirty_targets(&affected);
        for name in &producer.config.granted_tags {
            self.tags.remove(&self.pool.intern(name));
        }
        tracing::info!(producer = %id, "deactivated");
        self.sync();
        self.mark_changed();
        Ok(())
    }

    /// True if the producer's contributions are currently applied.
    pub fn is_producer_active(&self, id: &str) -> bool {
        self.producers.contains_key(id)
    }

    /// Ids of the active producers, in activation order.
    pub fn active_producers(&self) -> Vec<&str> {
        self.producers.keys().map(String::as_str).collect()
    }

    /// Add a producer to the catalog [`GraphManager::equip`] and
    /// [`GraphManager::toggle_aura`] draw from. Returns the entry it replaced.
    ///
    /// Registering does not activate anything.
    pub fn register_producer(&mut self, config: ProducerConfig) -> Option<ProducerConfig> {
        tracing::debug!(producer = %config.id, name = %config.name, "registered producer");
        self.catalog.insert(config.id.clone(), config)
    }

    /// A catalog entry, looked up by exact id first, then ignoring ASCII case.
    pub fn registered_producer(&self, id: &str) -> Option<&ProducerConfig> {
        self.catalog.get(id).or_else(|| {
            self.catalog
                .values()
                .find(|config| config.id.eq_ignore_ascii_case(id))
        })
    }

    /// Ids in the catalog, in registration order.
    pub fn registered_producers(&self) -> Vec<&str> {
        self.catalog.keys().map(String::as_str).collect()
    }

    /// Activate a catalog entry. Returns the canonical id and `false` if it
    /// was already active.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use statgraph::producer::ItemSlot;
    /// use statgraph::{GraphConfig, GraphManager, ModifierKind, ProducerConfig};
    ///
    /// let mut graph = GraphManager::new(GraphConfig::default()).unwrap();
    /// graph.create_modified_stat("maxLife", "Maximum Life", 50.0, &[], "defense").unwrap();
    /// graph.register_producer(
    ///     ProducerConfig::item("belt", "Heavy Belt", ItemSlot::Belt)
    ///         .with_modifier("maxLife", ModifierKind::Flat, 25.0),
    /// );
    ///
    /// assert_eq!(graph.equip("Belt").unwrap(), ("belt".to_string(), true));
    /// assert_eq!(graph.get_value("maxLife").unwrap(), 75.0);
    /// assert!(graph.equip("shield").is_err());
    /// ```
    pub fn equip(&mut self, id: &str) -> Result<(String, bool), StatError> {
        let config = self.catalog_entry(id)?;
        let activated = self.activate(&config);
        Ok((config.id, activated))
    }

    /// Flip an aura from the catalog. A permanent aura is toggled: active
    /// ones are deactivated. A timed aura is (re)started with a fresh
    /// duration. Returns the canonical id and whether the aura is active
    /// afterwards.
    pub fn toggle_aura(&mut self, id: &str) -> Result<(String, bool), StatError> {
        let config = self.catalog_entry(id)?;
        let was_active = self.is_producer_active(&config.id);
        if was_active {
            self.deactivate(&config.id)?;
            if config.duration().is_none() {
                return Ok((config.id, false));
            }
        }
        self.activate(&config);
        tracing::debug!(producer = %config.id, restarted = was_active, "aura started");
        Ok((config.id, true))
    }

    fn catalog_entry(&self, id: &str) -> Result<ProducerConfig, StatError> {
        self.registered_producer(id)
            .cloned()
            .ok_or_else(|| StatError::ProducerNotFound(id.to_string()))
    }

    /// Time left on a timed aura. `None` for inactive or permanent producers.
    pub fn producer_remaining(&self, id: &str) -> Option<Duration> {
        let producer = self.producers.get(id)?;
        let duration = producer.config.duration()?;
        let elapsed = self.clock.now().saturating_sub(producer.activated_at);
        Some(duration.saturating_sub(elapsed))
    }

    // Combat

    /// Feed a combat event into the ledgers and trackers that exist.
    pub fn apply_combat_event(&mut self, event: CombatEvent) {
        match event {
            CombatEvent::TakeDamage { amount, damage_type } => {
                let category = damage_type.to_string();
                self.record_if_present(&damage_type.taken_ledger(), amount, &category);
                self.record_if_present("damageTaken", amount, &category);
            }
            CombatEvent::DealDamage { amount, damage_type } => {
                let category = damage_type.to_string();
                self.record_if_present(&damage_type.dealt_ledger(), amount, &category);
                self.record_if_present("damageDealt", amount, &category);
            }
            CombatEvent::Crit | CombatEvent::Block | CombatEvent::Kill => {
                if let Some(kind) = event.recently_kind() {
                    self.trigger(kind);
                    self.record_if_present(recently_ledger(kind), 1.0, &kind.to_string());
                }
            }
        }
        self.mark_changed();
    }

    fn record_if_present(&mut self, id: &str, value: f64, category: &str) {
        if self.is_history(id) {
            let _ = self.record_event(id, value, Some(category));
        }
    }

    // Lookups

    fn index(&self, id: &str) -> Result<NodeIndex, StatError> {
        self.graph
            .index_of(id)
            .ok_or_else(|| StatError::NodeNotFound(StatId::from(id)))
    }

    fn history_index(&self, id: &str) -> Result<NodeIndex, StatError> {
        match self.graph.index_of(id) {
            Some(idx) if self.ledgers.contains_key(id) => Ok(idx),
            _ => Err(StatError::HistoryNotFound(StatId::from(id))),
        }
    }
}

impl Default for GraphManager {
    fn default() -> Self {
        Self::assemble(GraphConfig::default(), Arc::new(MonotonicClock::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::modifier::ModifierKind;
    use crate::producer::{DamageType, ItemSlot};

    fn manager() -> (Arc<ManualClock>, GraphManager) {
        let clock = Arc::new(ManualClock::new());
        let graph = GraphManager::with_clock(GraphConfig::default(), clock.clone()).unwrap();
        (clock, graph)
    }

    #[test]
    fn test_unknown_ids() {
        let (_clock, mut graph) = manager();
        assert_eq!(
            graph.get_value("nope").unwrap_err(),
            StatError::NodeNotFound(StatId::from("nope"))
        );
        assert!(matches!(
            graph.record_event("nope", 1.0, None),
            Err(StatError::HistoryNotFound(_))
        ));
        assert!(matches!(
            graph.remove_modifier("nope"),
            Err(StatError::ModifierNotFound(_))
        ));
        assert!(matches!(
            graph.remove_modifiers_by_source("nope"),
            Err(StatError::SourceNotFound(_))
        ));
        assert!(matches!(graph.deactivate("nope"), Err(StatError::ProducerNotFound(_))));
    }

    #[test]
    fn test_base_stat_is_not_history() {
        let (_clock, mut graph) = manager();
        graph.create_base_stat("hp", "HP", 1.0, "defense").unwrap();
        assert!(matches!(
            graph.record_event("hp", 1.0, None),
            Err(StatError::HistoryNotFound(_))
        ));
    }

    #[test]
    fn test_missing_parents_are_skipped() {
        let (_clock, mut graph) = manager();
        graph.create_base_stat("a", "A", 2.0, "x").unwrap();
        graph
            .create_derived_stat("b", "B", &["a", "ghost"], None, "x")
            .unwrap();
        assert_eq!(graph.get_value("b").unwrap(), 2.0);
    }

    #[test]
    fn test_duplicate_history_node_keeps_first() {
        let (_clock, mut graph) = manager();
        graph.create_base_stat("hits", "Hits", 3.0, "x").unwrap();
        assert!(matches!(
            graph.create_history_node("hits", "Hits", None, "x"),
            Err(StatError::DuplicateNode(_))
        ));
        assert!(!graph.is_history("hits"));
        assert_eq!(graph.get_value("hits").unwrap(), 3.0);
    }

    #[test]
    fn test_external_tag_writes_are_picked_up() {
        let (_clock, mut graph) = manager();
        graph.create_base_stat("bonus", "Bonus", 5.0, "x").unwrap();
        graph.create_derived_stat("dmg", "Damage", &[], None, "x").unwrap();
        let onslaught = graph.intern("Buff.Onslaught");
        graph
            .add_conditional_parent("dmg", "bonus", Condition::has_tag(onslaught.clone()))
            .unwrap();
        assert_eq!(graph.get_value("dmg").unwrap(), 0.0);

        let shared = graph.tag_set();
        std::thread::spawn(move || {
            shared.add(&onslaught);
        })
        .join()
        .unwrap();
        assert_eq!(graph.get_value("dmg").unwrap(), 5.0);
    }

    #[test]
    fn test_external_tag_write_raises_change_flag() {
        let (_clock, graph) = manager();
        graph.take_changes();
        graph.tag_set().add(&graph.intern("State.Moving"));
        assert!(graph.take_changes());
        assert!(!graph.take_changes());

        // Re-adding a present tag is not a change
        graph.tag_set().add(&graph.intern("State.Moving"));
        assert!(!graph.take_changes());
    }

    #[test]
    fn test_invalid_config_is_rejected_at_construction() {
        let mut config = GraphConfig::default();
        config.recently.crit_window_secs = -1.0;
        let clock = Arc::new(ManualClock::new());
        assert!(matches!(
            GraphManager::with_clock(config, clock.clone()),
            Err(StatError::Config(_))
        ));

        let mut config = GraphConfig::default();
        config.history.default_window_secs = 1e30;
        assert!(matches!(
            GraphManager::with_clock(config, clock),
            Err(StatError::Config(_))
        ));
    }

    #[test]
    fn test_mark_dirty_raises_change_flag() {
        let (_clock, mut graph) = manager();
        graph.create_base_stat("a", "A", 1.0, "x").unwrap();
        graph.create_derived_stat("b", "B", &["a"], None, "x").unwrap();
        graph.get_value("b").unwrap();
        graph.take_changes();

        assert_eq!(graph.mark_dirty("b").unwrap(), 1);
        assert!(graph.take_changes());
        assert!(graph.node("b").unwrap().is_dirty());

        // Already dirty: nothing newly flagged
        assert_eq!(graph.mark_dirty("b").unwrap(), 0);
        assert!(!graph.take_changes());
    }

    #[test]
    fn test_catalog_equip_and_aura_toggle() {
        let (clock, mut graph) = manager();
        graph.create_modified_stat("speed", "Speed", 1.0, &[], "offense").unwrap();
        graph.create_modified_stat("conv", "Conversion", 0.0, &[], "conversion").unwrap();
        graph.register_producer(
            ProducerConfig::aura("purity", "Purity of Elements", None)
                .with_modifier("conv", ModifierKind::Flat, 20.0)
                .grants_tag("Buff.PurityOfElements"),
        );
        graph.register_producer(
            ProducerConfig::aura("onslaught", "Onslaught", Some(Duration::from_secs(4)))
                .with_modifier("speed", ModifierKind::Increased, 0.2),
        );
        assert_eq!(graph.registered_producers(), vec!["purity", "onslaught"]);

        assert_eq!(graph.toggle_aura("PURITY").unwrap(), ("purity".to_string(), true));
        assert_eq!(graph.get_value("conv").unwrap(), 20.0);
        assert_eq!(graph.toggle_aura("purity").unwrap(), ("purity".to_string(), false));
        assert_eq!(graph.get_value("conv").unwrap(), 0.0);
        assert!(!graph.has_tag("Buff.PurityOfElements"));

        graph.toggle_aura("onslaught").unwrap();
        clock.set_secs(3.0);
        assert_eq!(graph.producer_remaining("onslaught"), Some(Duration::from_secs(1)));
        // A timed aura restarts instead of toggling off
        assert_eq!(graph.toggle_aura("onslaught").unwrap(), ("onslaught".to_string(), true));
        assert_eq!(graph.producer_remaining("onslaught"), Some(Duration::from_secs(4)));
        assert_eq!(graph.modifiers("speed").len(), 1);

        assert!(matches!(graph.toggle_aura("haste"), Err(StatError::ProducerNotFound(_))));
        assert!(matches!(graph.equip("haste"), Err(StatError::ProducerNotFound(_))));
    }

    #[test]
    fn test_external_ledger_writes_are_picked_up() {
        let (_clock, mut graph) = manager();
        let ledger = graph.create_history_node("hits", "Hits", None, "combat").unwrap();
        graph
            .create_derived_stat("rage", "Rage", &["hits"], None, "combat")
            .unwrap();
        assert_eq!(graph.get_value("rage").unwrap(), 0.0);
        ledger.record(4.0, None);
        assert_eq!(graph.get_value("rage").unwrap(), 4.0);
    }

    #[test]
    fn test_history_aggregation_can_change() {
        let (_clock, mut graph) = manager();
        graph.create_history_node("hits", "Hits", None, "combat").unwrap();
        graph.record_event("hits", 10.0, None).unwrap();
        graph.record_event("hits", 10.0, None).unwrap();
        assert_eq!(graph.get_value("hits").unwrap(), 20.0);
        graph
            .set_history_aggregation("hits", LedgerAggregation::CountRecent)
            .unwrap();
        assert_eq!(graph.get_value("hits").unwrap(), 2.0);
    }

    #[test]
    fn test_timed_aura_expires_on_tick() {
        let (clock, mut graph) = manager();
        graph
            .create_modified_stat("speed", "Speed", 1.0, &[], "offense")
            .unwrap();
        let onslaught = ProducerConfig::aura("onslaught", "Onslaught", Some(Duration::from_secs(4)))
            .with_modifier("speed", ModifierKind::Increased, 0.2)
            .grants_tag("Buff.Onslaught");

        assert!(graph.activate(&onslaught));
        assert!(!graph.activate(&onslaught));
        assert!(graph.has_tag("Buff.Onslaught"));
        assert!((graph.get_value("speed").unwrap() - 1.2).abs() < 1e-12);

        clock.set_secs(3.0);
        graph.tick();
        assert_eq!(graph.producer_remaining("onslaught"), Some(Duration::from_secs(1)));

        clock.set_secs(4.5);
        assert!(graph.tick());
        assert!(!graph.is_producer_active("onslaught"));
        assert!(!graph.has_tag("Buff.Onslaught"));
        assert_eq!(graph.get_value("speed").unwrap(), 1.0);
    }

    #[test]
    fn test_unequip_removes_modifiers_and_tags() {
        let (_clock, mut graph) = manager();
        graph.create_modified_stat("block", "Block", 0.0, &[], "defense").unwrap();
        let shield = ProducerConfig::item("shield", "Tower Shield", ItemSlot::OffHand)
            .with_modifier("block", ModifierKind::Flat, 25.0)
            .grants_tag("Equipment.Shield");
        graph.activate(&shield);
        assert_eq!(graph.get_value("block").unwrap(), 25.0);
        assert_eq!(graph.active_producers(), vec!["shield"]);

        graph.deactivate("shield").unwrap();
        assert_eq!(graph.get_value("block").unwrap(), 0.0);
        assert!(!graph.has_tag("Equipment.Shield"));
        assert!(graph.modifiers("block").is_empty());
    }

    #[test]
    fn test_combat_events_route_to_ledgers() {
        let (_clock, mut graph) = manager();
        graph.create_history_node("FireDamageTaken", "Fire Taken", None, "combat").unwrap();
        graph.create_history_node("damageTaken", "Damage Taken", None, "combat").unwrap();
        graph.create_history_node("critHistory", "Crits", None, "combat").unwrap();

        graph.apply_combat_event(CombatEvent::TakeDamage {
            amount: 120.0,
            damage_type: DamageType::Fire,
        });
        graph.apply_combat_event(CombatEvent::TakeDamage {
            amount: 30.0,
            damage_type: DamageType::Cold,
        });
        graph.apply_combat_event(CombatEvent::Crit);

        assert_eq!(graph.get_value("FireDamageTaken").unwrap(), 120.0);
        assert_eq!(graph.get_value("damageTaken").unwrap(), 150.0);
        assert_eq!(graph.get_value("critHistory").unwrap(), 1.0);
        assert!(graph.is_recently(RecentlyKind::Crit));
        let ledger = graph.ledger("damageTaken").unwrap();
        assert_eq!(ledger.sum_recent_by_category(Duration::from_secs(4), "Cold"), 30.0);
    }

    #[test]
    fn test_recently_expiry_invalidates_on_tick() {
        let (clock, mut graph) = manager();
        graph.create_modified_stat("crit", "Crit", 5.0, &[], "offense").unwrap();
        graph.add_modifier(
            Modifier::new("crit_recently", "crit", ModifierKind::More, 0.5)
                .with_condition(Condition::recently(RecentlyKind::Crit)),
        );
        assert_eq!(graph.get_value("crit").unwrap(), 5.0);

        graph.trigger(RecentlyKind::Crit);
        assert_eq!(graph.get_value("crit").unwrap(), 7.5);

        clock.set_secs(5.0);
        assert!(graph.tick());
        assert_eq!(graph.get_value("crit").unwrap(), 5.0);
        graph.take_changes();
        assert!(!graph.tick());
        assert!(!graph.take_changes());
    }
}

//! Modifier aggregation.
//!
//! [`ModifierAggregator`] holds the modifiers of one stat and folds them into
//! a final value:
//!
//! ```text
//! (base + Σflat) × (1 + Σincreased) × Π(1 + more)
//! ```
//!
//! unless an applicable `Override` exists, in which case the last override in
//! processing order is the result. [`ModifierTable`] keeps one aggregator per
//! target stat and plugs into the graph's pull as a [`ModifierStage`].

use crate::context::EvalContext;
use crate::modifier::{Modifier, ModifierKind};
use crate::stat_id::StatId;
use indexmap::IndexMap;
use serde::Serialize;

/// Intermediate sums of one aggregation, for debugging and display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackBreakdown {
    pub base: f64,
    pub flat: f64,
    /// Sum of increased percentages (`0.5` is +50%).
    pub increased: f64,
    /// Product of all `(1 + more)` multipliers.
    pub more: f64,
    pub override_value: Option<f64>,
    pub result: f64,
    /// `(modifier id, value)` of each modifier that applied, in processing order.
    pub applied: Vec<(String, f64)>,
}

/// The ordered modifiers of a single stat.
///
/// # Examples
///
/// ```rust
/// use statgraph::context::LedgerMap;
/// use statgraph::recently::RecentlyTrackers;
/// use statgraph::tag::TagSet;
/// use statgraph::{EvalContext, Modifier, ModifierAggregator, ModifierKind};
/// use std::time::Duration;
///
/// let tags = TagSet::new();
/// let recently = RecentlyTrackers::default();
/// let ledgers = LedgerMap::new();
/// let ctx = EvalContext::new(&tags, &recently, &ledgers, Duration::ZERO);
///
/// let mut agg = ModifierAggregator::new();
/// agg.add(Modifier::new("a", "life", ModifierKind::Flat, 10.0));
/// agg.add(Modifier::new("b", "life", ModifierKind::Increased, 0.5));
/// agg.add(Modifier::new("c", "life", ModifierKind::More, 0.2));
///
/// // (100 + 10) * 1.5 * 1.2
/// assert!((agg.calculate(100.0, &ctx) - 198.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModifierAggregator {
    modifiers: Vec<Modifier>,
}

impl ModifierAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a modifier, keeping the list ordered by `(kind, priority)`.
    ///
    /// Equal keys keep insertion order.
    pub fn add(&mut self, modifier: Modifier) {
        let key = (modifier.kind(), modifier.priority());
        let at = self
            .modifiers
            .partition_point(|m| (m.kind(), m.priority()) <= key);
        self.modifiers.insert(at, modifier);
    }

    /// Remove every modifier with this id. Returns how many were removed.
    pub fn remove(&mut self, id: &str) -> usize {
        let before = self.modifiers.len();
        self.modifiers.retain(|m| m.id() != id);
        before - self.modifiers.len()
    }

    /// Remove every modifier contributed by `source`.
    pub fn remove_by_source(&mut self, source: &str) -> usize {
        let before = self.modifiers.len();
        self.modifiers.retain(|m| m.source() != source);
        before - self.modifiers.len()
    }

    /// Fold the modifiers over `base`, re-evaluating and caching every
    /// condition.
    pub fn calculate(&mut self, base: f64, ctx: &EvalContext<'_>) -> f64 {
        for modifier in &mut self.modifiers {
            modifier.evaluate_condition(ctx);
        }
        self.breakdown(base, ctx).result
    }

    /// Fold using the cached condition results, reporting every step.
    pub fn breakdown(&self, base: f64, ctx: &EvalContext<'_>) -> StackBreakdown {
        let mut flat = 0.0;
        let mut increased = 0.0;
        let mut more = 1.0;
        let mut override_value = None;
        let mut applied = Vec::new();

        for modifier in self.modifiers.iter().filter(|m| m.is_condition_met()) {
            let value = modifier.value(ctx);
            match modifier.kind() {
                ModifierKind::Flat => flat += value,
                ModifierKind::Increased => increased += value,
                ModifierKind::More => more *= 1.0 + value,
                ModifierKind::Override => override_value = Some(value),
            }
            applied.push((modifier.id().to_string(), value));
        }

        let result = override_value.unwrap_or((base + flat) * (1.0 + increased) * more);
        StackBreakdown {
            base,
            flat,
            increased,
            more,
            override_value,
            result,
            applied,
        }
    }

    /// Number of modifiers whose condition currently holds.
    pub fn active_count(&self, ctx: &EvalContext<'_>) -> usize {
        self.modifiers
            .iter()
            .filter(|m| m.condition_holds(ctx))
            .count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modifiers.iter().any(|m| m.id() == id)
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    pub fn clear(&mut self) {
        self.modifiers.clear();
    }
}

/// Post-processing applied to a derived node's pre-modifier value during a
/// pull.
pub trait ModifierStage {
    /// Final value of `target` given its pre-modifier value.
    fn apply(&mut self, target: &StatId, value: f64, ctx: &EvalContext<'_>) -> f64;

    /// Whether `target` has anything that could change its value.
    fn has_modifiers(&self, target: &StatId) -> bool;
}

/// A graph evaluated without modifiers.
impl ModifierStage for () {
    fn apply(&mut self, _target: &StatId, value: f64, _ctx: &EvalContext<'_>) -> f64 {
        value
    }

    fn has_modifiers(&self, _target: &StatId) -> bool {
        false
    }
}

/// One aggregator per target stat, created on first use.
#[derive(Debug, Clone, Default)]
pub struct ModifierTable {
    aggregators: IndexMap<StatId, ModifierAggregator>,
}

impl ModifierTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, modifier: Modifier) {
        self.aggregators
            .entry(modifier.target().clone())
            .or_default()
            .add(modifier);
    }

    /// Remove a modifier by id from whichever stats hold it.
    ///
    /// Returns the affected targets.
    pub fn remove_modifier(&mut self, id: &str) -> Vec<StatId> {
        self.aggregators
            .iter_mut()
            .filter_map(|(target, agg)| (agg.remove(id) > 0).then(|| target.clone()))
            .collect()
    }

    /// Remove every modifier of `source`. Returns the affected targets.
    pub fn remove_by_source(&mut self, source: &str) -> Vec<StatId> {
        self.aggregators
            .iter_mut()
            .filter_map(|(target, agg)| (agg.remove_by_source(source) > 0).then(|| target.clone()))
            .collect()
    }

    pub fn get(&self, target: &str) -> Option<&ModifierAggregator> {
        self.aggregators.get(target)
    }

    pub fn get_mut(&mut self, target: &str) -> Option<&mut ModifierAggregator> {
        self.aggregators.get_mut(target)
    }

    pub fn contains_modifier(&self, id: &str) -> bool {
        self.aggregators.values().any(|agg| agg.contains(id))
    }

    pub fn has_source(&self, source: &str) -> bool {
        self.aggregators
            .values()
            .flat_map(|agg| agg.modifiers())
            .any(|m| m.source() == source)
    }

    /// Re-evaluate and cache every modifier condition.
    ///
    /// Returns the targets where at least one result flipped.
    pub fn evaluate_conditions(&mut self, ctx: &EvalContext<'_>) -> Vec<StatId> {
        self.aggregators
            .iter_mut()
            .filter_map(|(target, agg)| {
                let mut flipped = false;
                for modifier in &mut agg.modifiers {
                    let before = modifier.is_condition_met();
                    flipped |= modifier.evaluate_condition(ctx) != before;
                }
                flipped.then(|| target.clone())
            })
            .collect()
    }

    /// Targets and their aggregators, in first-use order.
    pub fn iter(&self) -> impl Iterator<Item = (&StatId, &ModifierAggregator)> {
        self.aggregators.iter()
    }

    pub fn total_modifiers(&self) -> usize {
        self.aggregators.values().map(ModifierAggregator::len).sum()
    }
}

impl ModifierStage for ModifierTable {
    fn apply(&mut self, target: &StatId, value: f64, ctx: &EvalContext<'_>) -> f64 {
        match self.aggregators.get_mut(target) {
            Some(agg) if !agg.is_empty() => agg.calculate(value, ctx),
            _ => value,
        }
    }

    fn has_modifiers(&self, target: &StatId) -> bool {
        self.aggregators
            .get(target)
            .is_some_and(|agg| !agg.is_empty())
    }
}

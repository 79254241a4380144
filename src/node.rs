//! Graph nodes.

use crate::condition::Condition;
use crate::ledger::{EventLedger, LedgerAggregation};
use crate::stat_id::StatId;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumString};

/// Role of a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Externally set value with no parents.
    Base,
    /// Computed from its parents.
    Derived,
    /// Value aggregated from an event ledger.
    History,
}

/// Combines the parent values of a derived node, in parent order.
pub type CalcFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Ties a history node to its ledger.
#[derive(Clone)]
pub struct HistoryBinding {
    pub ledger: Arc<EventLedger>,
    pub aggregation: LedgerAggregation,
    /// Ledger revision the node's value was last computed from.
    pub seen_revision: u64,
}

/// A single stat in the graph.
///
/// Base and history nodes hold their value in `base_value`; derived nodes
/// cache their last computed value and are recomputed when `dirty`.
#[derive(Clone)]
pub struct StatNode {
    pub(crate) id: StatId,
    pub(crate) label: String,
    pub(crate) category: String,
    pub(crate) kind: NodeKind,
    pub(crate) base_value: f64,
    pub(crate) cached_value: f64,
    pub(crate) dirty: bool,
    pub(crate) calculation: Option<CalcFn>,
    pub(crate) history: Option<HistoryBinding>,
    pub(crate) recalculations: u64,
}

impl StatNode {
    pub fn base(id: impl Into<StatId>, label: impl Into<String>, value: f64) -> Self {
        Self::with_kind(id, label, NodeKind::Base, value)
    }

    /// A derived node starts dirty; its first read computes it.
    pub fn derived(id: impl Into<StatId>, label: impl Into<String>) -> Self {
        let mut node = Self::with_kind(id, label, NodeKind::Derived, 0.0);
        node.dirty = true;
        node
    }

    pub fn history(
        id: impl Into<StatId>,
        label: impl Into<String>,
        ledger: Arc<EventLedger>,
        aggregation: LedgerAggregation,
    ) -> Self {
        let mut node = Self::with_kind(id, label, NodeKind::History, 0.0);
        let value = aggregation.evaluate(&ledger);
        node.base_value = value;
        node.cached_value = value;
        node.history = Some(HistoryBinding {
            seen_revision: ledger.revision(),
            ledger,
            aggregation,
        });
        node
    }

    fn with_kind(id: impl Into<StatId>, label: impl Into<String>, kind: NodeKind, value: f64) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            category: "unknown".to_string(),
            kind,
            base_value: value,
            cached_value: value,
            dirty: false,
            calculation: None,
            history: None,
            recalculations: 0,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_calculation(mut self, calculation: CalcFn) -> Self {
        self.calculation = Some(calculation);
        self
    }

    pub fn id(&self) -> &StatId {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    /// Last known value without recomputing. Stale while dirty.
    pub fn cached_value(&self) -> f64 {
        match self.kind {
            NodeKind::Derived => self.cached_value,
            NodeKind::Base | NodeKind::History => self.base_value,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn has_calculation(&self) -> bool {
        self.calculation.is_some()
    }

    pub fn ledger(&self) -> Option<&Arc<EventLedger>> {
        self.history.as_ref().map(|h| &h.ledger)
    }

    /// How many times this node has been recomputed.
    pub fn recalculations(&self) -> u64 {
        self.recalculations
    }
}

impl fmt::Debug for StatNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("base_value", &self.base_value)
            .field("cached_value", &self.cached_value)
            .field("dirty", &self.dirty)
            .field("category", &self.category)
            .finish()
    }
}

/// Edge payload: parent → child.
#[derive(Clone)]
pub enum Dependency {
    Direct,
    /// Contributes only while the condition holds.
    Conditional(Condition),
}

impl Dependency {
    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Dependency::Direct => None,
            Dependency::Conditional(condition) => Some(condition),
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Direct => f.write_str("Direct"),
            Dependency::Conditional(c) => f.debug_tuple("Conditional").field(c).finish(),
        }
    }
}

/// Inspection record for one incoming edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeState {
    pub from: StatId,
    pub to: StatId,
    pub active: bool,
    pub conditional: bool,
    /// Description of the edge condition; empty for ordinary edges.
    pub condition: String,
}

//! Snapshot export.
//!
//! A [`GraphSnapshot`] is a plain, serializable description of the whole
//! graph: nodes with their cached values, edges with conditional activity,
//! modifiers, tags and recently states. Capturing one never mutates the
//! graph; dirty nodes are reported with their stale cached value and
//! `isDirty: true`.

use crate::aggregator::ModifierTable;
use crate::context::EvalContext;
use crate::graph::StatGraph;
use crate::modifier::ModifierKind;
use crate::node::{EdgeState, NodeKind};
use crate::recently::RecentlyKind;
use crate::stat_id::StatId;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifierSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ModifierKind,
    /// Static value.
    pub value: f64,
    pub source: String,
    /// Whether the modifier applies right now.
    pub active: bool,
    pub has_condition: bool,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: StatId,
    pub label: String,
    pub value: f64,
    pub is_dirty: bool,
    pub category: String,
    pub is_history: bool,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_count: Option<usize>,
    /// Ledger window in seconds, history nodes only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<ModifierSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentlySnapshot {
    pub crit: bool,
    pub crit_remaining: f64,
    pub block: bool,
    pub block_remaining: f64,
    pub kill: bool,
    pub kill_remaining: f64,
}

/// Everything an external observer needs to render the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<EdgeState>,
    /// Active tag names, sorted.
    pub tags: Vec<String>,
    pub recently: RecentlySnapshot,
    /// Wall-clock capture time, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl GraphSnapshot {
    /// Read the current state. Conditions are evaluated against `ctx`
    /// without caching anything.
    pub fn capture(graph: &StatGraph, table: &ModifierTable, ctx: &EvalContext<'_>) -> Self {
        let mut nodes = Vec::with_capacity(graph.len());
        let mut edges = Vec::with_capacity(graph.edge_count());

        for idx in graph.indices() {
            let node = graph.node(idx);
            let ledger = node.ledger();
            let modifiers: Vec<ModifierSnapshot> = table
                .get(node.id().as_str())
                .map(|agg| {
                    agg.modifiers()
                        .iter()
                        .map(|m| ModifierSnapshot {
                            id: m.id().to_string(),
                            kind: m.kind(),
                            value: m.static_value(),
                            source: m.source().to_string(),
                            active: m.condition_holds(ctx),
                            has_condition: m.has_condition(),
                            description: m.description().to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default();

            nodes.push(NodeSnapshot {
                id: node.id().clone(),
                label: node.label().to_string(),
                value: node.cached_value(),
                is_dirty: node.is_dirty(),
                category: node.category().to_string(),
                is_history: node.kind() == NodeKind::History,
                kind: node.kind(),
                event_count: ledger.map(|l| l.len()),
                window: ledger.map(|l| l.window().as_secs_f64()),
                modifiers,
            });
            edges.extend(graph.edge_states(idx, ctx));
        }

        let recently = ctx.recently();
        let now = ctx.now();
        let crit = recently.state(RecentlyKind::Crit, now);
        let block = recently.state(RecentlyKind::Block, now);
        let kill = recently.state(RecentlyKind::Kill, now);

        Self {
            nodes,
            edges,
            tags: ctx.tags().names(),
            recently: RecentlySnapshot {
                crit: crit.active,
                crit_remaining: crit.remaining,
                block: block.active,
                block_remaining: block.remaining,
                kill: kill.active,
                kill_remaining: kill.remaining,
            },
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id.as_str() == id)
    }
}

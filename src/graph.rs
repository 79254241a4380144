//! Dependency graph module.
//!
//! Provides `StatGraph`, the arena that owns every [`StatNode`] and the
//! parent → child edges between them. Values flow along the edges in two
//! directions:
//!
//! - **Pull**: reading a dirty derived node recomputes it from its parents,
//!   recursively, and caches the result.
//! - **Push**: changing a base value, or marking a node dirty, flags every
//!   transitive dependent dirty, stopping at nodes that already are.
//!
//! The graph is expected to be acyclic. Cycles are not checked when edges are
//! added; [`StatGraph::topological_order`] reports them.

use crate::aggregator::ModifierStage;
use crate::condition::Condition;
use crate::context::EvalContext;
use crate::error::StatError;
use crate::ledger::LedgerAggregation;
use crate::node::{CalcFn, Dependency, EdgeState, NodeKind, StatNode};
use crate::stat_id::StatId;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Arena of stat nodes with dependency edges pointing from parent to child.
///
/// # Examples
///
/// ```rust
/// use statgraph::context::LedgerMap;
/// use statgraph::graph::StatGraph;
/// use statgraph::node::StatNode;
/// use statgraph::recently::RecentlyTrackers;
/// use statgraph::tag::TagSet;
/// use statgraph::EvalContext;
/// use std::time::Duration;
///
/// let mut graph = StatGraph::new();
/// let str_idx = graph.add_node(StatNode::base("str", "Strength", 20.0)).unwrap();
/// let life_idx = graph.add_node(StatNode::derived("life", "Life")).unwrap();
/// graph.add_parent(life_idx, str_idx).unwrap();
///
/// let (tags, recently, ledgers) = (TagSet::new(), RecentlyTrackers::default(), LedgerMap::new());
/// let ctx = EvalContext::new(&tags, &recently, &ledgers, Duration::ZERO);
/// assert_eq!(graph.value(life_idx, &ctx, &mut ()), 20.0);
///
/// graph.set_base_value(str_idx, 30.0);
/// assert!(graph.node(life_idx).is_dirty());
/// assert_eq!(graph.value(life_idx, &ctx, &mut ()), 30.0);
/// ```
#[derive(Default)]
pub struct StatGraph {
    graph: DiGraph<StatNode, Dependency>,
    node_map: HashMap<StatId, NodeIndex>,
}

impl StatGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Ids are unique; a duplicate leaves the existing node
    /// untouched.
    pub fn add_node(&mut self, node: StatNode) -> Result<NodeIndex, StatError> {
        if self.node_map.contains_key(node.id()) {
            tracing::warn!(id = %node.id(), "rejected duplicate node registration");
            return Err(StatError::DuplicateNode(node.id().clone()));
        }
        let id = node.id().clone();
        let idx = self.graph.add_node(node);
        self.node_map.insert(id, idx);
        Ok(idx)
    }

    /// Add an ordinary dependency: `child` reads `parent`.
    pub fn add_parent(&mut self, child: NodeIndex, parent: NodeIndex) -> Result<EdgeIndex, StatError> {
        self.add_dependency(child, parent, Dependency::Direct)
    }

    /// Add a dependency that only contributes while `condition` holds.
    pub fn add_conditional_parent(
        &mut self,
        child: NodeIndex,
        parent: NodeIndex,
        condition: Condition,
    ) -> Result<EdgeIndex, StatError> {
        self.add_dependency(child, parent, Dependency::Conditional(condition))
    }

    fn add_dependency(
        &mut self,
        child: NodeIndex,
        parent: NodeIndex,
        dependency: Dependency,
    ) -> Result<EdgeIndex, StatError> {
        if self.graph[child].kind != NodeKind::Derived {
            return Err(StatError::NotDerived(self.graph[child].id.clone()));
        }
        tracing::trace!(
            parent = %self.graph[parent].id,
            child = %self.graph[child].id,
            conditional = dependency.condition().is_some(),
            "added dependency"
        );
        let edge = self.graph.add_edge(parent, child, dependency);
        self.mark_dirty(child);
        Ok(edge)
    }

    /// Replace the calculation of a derived node and mark it dirty.
    pub fn set_calculation(&mut self, idx: NodeIndex, calculation: CalcFn) -> Result<(), StatError> {
        let node = &mut self.graph[idx];
        if node.kind != NodeKind::Derived {
            return Err(StatError::NotDerived(node.id.clone()));
        }
        node.calculation = Some(calculation);
        self.mark_dirty(idx);
        Ok(())
    }

    /// Look up a node's index by id.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use statgraph::graph::StatGraph;
    /// use statgraph::node::StatNode;
    ///
    /// let mut graph = StatGraph::new();
    /// let idx = graph.add_node(StatNode::base("str", "Strength", 10.0)).unwrap();
    /// assert_eq!(graph.index_of("str"), Some(idx));
    /// assert_eq!(graph.index_of("dex"), None);
    /// ```
    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    /// True if a node is registered under `id`.
    pub fn contains_node(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    /// The node at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` did not come from this graph.
    pub fn node(&self, idx: NodeIndex) -> &StatNode {
        &self.graph[idx]
    }

    /// The node registered under `id`.
    pub fn get(&self, id: &str) -> Option<&StatNode> {
        self.index_of(id).map(|idx| &self.graph[idx])
    }

    /// Node indices in registration order.
    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &StatNode> + '_ {
        self.graph.node_weights()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of dependency edges, conditional ones included.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Incoming edges of `idx`: ordinary parents first, then conditional
    /// ones, each group in the order the edges were added.
    fn incoming(&self, idx: NodeIndex) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut edges: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.id(), e.source()))
            .collect();
        edges.sort_by_key(|&(edge, _)| (self.graph[edge].condition().is_some(), edge.index()));
        edges
    }

    fn edge_active(&self, edge: EdgeIndex, ctx: &EvalContext<'_>) -> bool {
        match &self.graph[edge] {
            Dependency::Direct => true,
            Dependency::Conditional(condition) => condition.evaluate(ctx),
        }
    }

    /// True if any incoming edge of `idx` carries a condition.
    pub fn has_conditional_parents(&self, idx: NodeIndex) -> bool {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .any(|e| e.weight().condition().is_some())
    }

    /// Current value of a node, recomputing it if dirty.
    ///
    /// A dirty derived node pulls every ordinary parent and every conditional
    /// parent whose condition holds, combines them with its calculation (or
    /// `base + Σ inputs` without one), then passes the result through `stage`.
    pub fn value<S>(&mut self, idx: NodeIndex, ctx: &EvalContext<'_>, stage: &mut S) -> f64
    where
        S: ModifierStage + ?Sized,
    {
        let node = &self.graph[idx];
        match node.kind {
            NodeKind::Base | NodeKind::History => return node.base_value,
            NodeKind::Derived if !node.dirty => return node.cached_value,
            NodeKind::Derived => {}
        }

        let mut inputs = Vec::new();
        for (edge, parent) in self.incoming(idx) {
            if self.edge_active(edge, ctx) {
                inputs.push(self.value(parent, ctx, stage));
            }
        }

        let node = &self.graph[idx];
        let raw = match &node.calculation {
            Some(calculation) => calculation(&inputs),
            None => node.base_value + inputs.iter().sum::<f64>(),
        };
        let id = node.id.clone();
        let value = stage.apply(&id, raw, ctx);

        let node = &mut self.graph[idx];
        node.cached_value = value;
        node.dirty = false;
        node.recalculations += 1;
        tracing::trace!(id = %id, value, "recomputed");
        value
    }

    /// Set a node's base value. Unchanged values are a no-op.
    ///
    /// Returns `true` if the value changed.
    pub fn set_base_value(&mut self, idx: NodeIndex, value: f64) -> bool {
        let node = &mut self.graph[idx];
        if node.base_value == value {
            return false;
        }
        node.base_value = value;
        let kind = node.kind;
        match kind {
            NodeKind::Base | NodeKind::History => {
                node.cached_value = value;
                self.invalidate_children(idx);
            }
            NodeKind::Derived => {
                self.mark_dirty(idx);
            }
        }
        true
    }

    /// Flag a node and its transitive dependents dirty.
    ///
    /// Base and history nodes are never flagged themselves but still
    /// propagate. Descent stops at dependents that are already dirty.
    /// Returns the number of nodes newly flagged.
    pub fn mark_dirty(&mut self, idx: NodeIndex) -> usize {
        let node = &mut self.graph[idx];
        if node.kind == NodeKind::Derived {
            if node.dirty {
                return 0;
            }
            node.dirty = true;
            1 + self.invalidate_children(idx)
        } else {
            self.invalidate_children(idx)
        }
    }

    fn invalidate_children(&mut self, idx: NodeIndex) -> usize {
        let mut flagged = 0;
        let mut stack: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        while let Some(child) = stack.pop() {
            let node = &mut self.graph[child];
            if node.dirty {
                continue;
            }
            node.dirty = true;
            flagged += 1;
            stack.extend(self.graph.neighbors_directed(child, Direction::Outgoing));
        }
        flagged
    }

    /// Mark dirty every node that reads conditions: nodes with conditional
    /// parents and nodes `stage` holds modifiers for.
    pub fn invalidate_conditional<S>(&mut self, stage: &S) -> usize
    where
        S: ModifierStage + ?Sized,
    {
        let targets: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| {
                self.has_conditional_parents(idx) || stage.has_modifiers(&self.graph[idx].id)
            })
            .collect();
        let flagged: usize = targets.into_iter().map(|idx| self.mark_dirty(idx)).sum();
        tracing::debug!(flagged, "invalidated condition-dependent nodes");
        flagged
    }

    /// Recompute a history node from its ledger if the ledger changed since
    /// the last read. Returns the new value if it differs.
    pub fn refresh_history(&mut self, idx: NodeIndex) -> Option<f64> {
        let node = &mut self.graph[idx];
        let binding = node.history.as_mut()?;
        let revision = binding.ledger.revision();
        if revision == binding.seen_revision {
            return None;
        }
        binding.seen_revision = revision;
        let value = binding.aggregation.evaluate(&binding.ledger);
        self.set_base_value(idx, value).then_some(value)
    }

    /// Replace how a history node folds its ledger and recompute it.
    ///
    /// Returns `false` if `idx` is not a history node.
    pub fn set_aggregation(&mut self, idx: NodeIndex, aggregation: LedgerAggregation) -> bool {
        let node = &mut self.graph[idx];
        let Some(binding) = node.history.as_mut() else {
            return false;
        };
        binding.aggregation = aggregation;
        binding.seen_revision = binding.ledger.revision();
        let value = binding.aggregation.evaluate(&binding.ledger);
        self.set_base_value(idx, value);
        true
    }

    /// Periodic maintenance of a history node: sweep its ledger (rate
    /// limited), recompute unconditionally, and report whether the value moved
    /// by more than `epsilon`.
    pub fn tick_history(&mut self, idx: NodeIndex, max_age: Duration, epsilon: f64) -> bool {
        let node = &mut self.graph[idx];
        let old = node.base_value;
        let Some(binding) = node.history.as_mut() else {
            return false;
        };
        binding.ledger.maintain(max_age);
        binding.seen_revision = binding.ledger.revision();
        let value = binding.aggregation.evaluate(&binding.ledger);
        self.set_base_value(idx, value);
        (value - old).abs() > epsilon
    }

    /// Activity of every incoming edge of `idx`, evaluated without touching
    /// node state.
    pub fn edge_states(&self, idx: NodeIndex, ctx: &EvalContext<'_>) -> Vec<EdgeState> {
        let child = &self.graph[idx].id;
        self.incoming(idx)
            .into_iter()
            .map(|(edge, parent)| {
                let condition = self.graph[edge].condition();
                EdgeState {
                    from: self.graph[parent].id.clone(),
                    to: child.clone(),
                    active: self.edge_active(edge, ctx),
                    conditional: condition.is_some(),
                    condition: condition
                        .map(|c| c.description().to_string())
                        .unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Detect cycles in the graph.
    ///
    /// Returns `StatError::Cycle` with the closed path of the first cycle
    /// found, e.g. `[A, B, A]`.
    pub fn detect_cycles(&self) -> Result<(), StatError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for node_idx in self.graph.node_indices() {
            if !visited.contains(&node_idx) {
                let mut cycle_path = Vec::new();
                if let Some(cycle) =
                    self.dfs_cycle_detect(node_idx, &mut visited, &mut rec_stack, &mut cycle_path)
                {
                    return Err(cycle);
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle_detect(
        &self,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        rec_stack: &mut HashSet<NodeIndex>,
        cycle_path: &mut Vec<NodeIndex>,
    ) -> Option<StatError> {
        visited.insert(node);
        rec_stack.insert(node);
        cycle_path.push(node);

        for neighbor in self.graph.neighbors_directed(node, Direction::Outgoing) {
            if !visited.contains(&neighbor) {
                if let Some(cycle) = self.dfs_cycle_detect(neighbor, visited, rec_stack, cycle_path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(&neighbor) {
                let start = cycle_path.iter().position(|&idx| idx == neighbor).unwrap_or(0);
                let mut path: Vec<StatId> = cycle_path[start..]
                    .iter()
                    .map(|&idx| self.graph[idx].id.clone())
                    .collect();
                path.push(self.graph[neighbor].id.clone());
                return Some(StatError::Cycle { path });
            }
        }

        rec_stack.remove(&node);
        cycle_path.pop();
        None
    }

    /// All nodes ordered so that every parent precedes its children.
    pub fn topological_order(&self) -> Result<Vec<NodeIndex>, StatError> {
        self.detect_cycles()?;
        toposort(&self.graph, None).map_err(|cycle| StatError::Cycle {
            path: vec![self.graph[cycle.node_id()].id.clone()],
        })
    }
}

//! # statgraph - Reactive Stat Dependency Graph for ARPG Characters
//!
//! A stat engine for action-RPG characters that provides:
//! - **Lazy** recomputation (derived stats recompute only when read while dirty)
//! - **Push** invalidation (a change marks exactly its dependents dirty)
//! - **Conditional** edges and modifiers driven by tags and recent events
//! - **Time-windowed** history stats backed by event ledgers
//!
//! ## Core Concepts
//!
//! ### Stat Pipeline
//!
//! A derived stat is computed in two stages:
//!
//! ```text
//! [parents] → [calculation] → [modifier aggregation] → value
//! ```
//!
//! 1. **Parents** are read in insertion order; conditional parents contribute
//!    only while their condition holds
//! 2. **Calculation** combines parent values (default: `base + Σ parents`)
//! 3. **Modifiers** stack as `(base + Σflat) × (1 + Σincreased) × Π(1 + more)`,
//!    unless an override is present
//!
//! ### Key Features
//!
//! - **Dependency Graph**: nodes and edges held in a `petgraph` graph
//! - **Cycle Detection**: explicit, reporting the offending path
//! - **Tags**: hierarchical `A.B.C` tags with parent matching
//! - **Recently Trackers**: crit/block/kill windows with countdowns
//! - **Producers**: items and auras that add and remove modifiers by source
//! - **Snapshots**: serializable export for external rendering
//!
//! ## Example
//!
//! ```rust
//! use statgraph::*;
//!
//! let mut graph = GraphManager::new(GraphConfig::default()).unwrap();
//! graph.create_base_stat("baseLife", "Base Life", 50.0, "defense").unwrap();
//! graph.create_base_stat("strength", "Strength", 20.0, "attribute").unwrap();
//! graph
//!     .create_derived_stat(
//!         "maxLife",
//!         "Maximum Life",
//!         &["baseLife", "strength"],
//!         Some(calculation(|v| v[0] + (v[1] / 10.0).floor() * 5.0)),
//!         "defense",
//!     )
//!     .unwrap();
//!
//! assert_eq!(graph.get_value("maxLife").unwrap(), 60.0);
//!
//! graph.add_modifier(Modifier::new("amulet", "maxLife", ModifierKind::Flat, 40.0));
//! assert_eq!(graph.get_value("maxLife").unwrap(), 100.0);
//! ```
//!
//! ## Modules
//!
//! - [`manager`] - Graph owner and public entry point
//! - [`graph`] - Dependency graph, pull evaluation and push invalidation
//! - [`node`] - Stat nodes and edge kinds
//! - [`modifier`] / [`aggregator`] - Modifiers and their stacking
//! - [`tag`] / [`condition`] / [`recently`] - Inputs to conditional logic
//! - [`ledger`] - Time-windowed event ledgers
//! - [`producer`] - Items, auras and combat events
//! - [`snapshot`] - Serializable graph export
//! - [`command`] - Text command surface
//! - [`config`] / [`clock`] / [`error`] - Ambient support

pub mod aggregator;
pub mod clock;
pub mod command;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod ledger;
pub mod manager;
pub mod modifier;
pub mod node;
pub mod producer;
pub mod recently;
pub mod snapshot;
pub mod stat_id;
pub mod tag;

// Re-export main types for convenience
pub use aggregator::{ModifierAggregator, ModifierStage, ModifierTable, StackBreakdown};
pub use command::{Command, CommandOutput};
pub use condition::Condition;
pub use config::GraphConfig;
pub use context::EvalContext;
pub use error::StatError;
pub use ledger::{EventLedger, LedgerAggregation};
pub use manager::GraphManager;
pub use modifier::{Modifier, ModifierKind};
pub use node::{CalcFn, NodeKind, StatNode};
pub use producer::{CombatEvent, DamageType, ProducerConfig};
pub use recently::RecentlyKind;
pub use snapshot::GraphSnapshot;
pub use stat_id::StatId;
pub use tag::{Tag, TagPool, TagSet};

/// Wrap a closure as a node calculation.
///
/// Parent values arrive in the order the parents were added.
pub fn calculation<F>(f: F) -> CalcFn
where
    F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
{
    std::sync::Arc::new(f)
}

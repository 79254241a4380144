//! Error types for graph construction, lookups and commands.
//!
//! All errors surfaced by the crate are represented by the `StatError` enum.

use crate::stat_id::StatId;
use thiserror::Error;

/// Format a cycle path as a readable string.
fn format_cycle_path(path: &[StatId]) -> String {
    if path.is_empty() {
        return String::from("(empty cycle)");
    }
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors reported by the stat graph.
///
/// `DuplicateNode` and `NotDerived` are configuration errors: the caller
/// built the graph wrong and the registration is rejected. The `*NotFound`
/// variants are ordinary "no such entity" outcomes and leave all state
/// untouched.
///
/// # Examples
///
/// ```rust
/// use statgraph::{StatError, StatId};
///
/// let err = StatError::NodeNotFound(StatId::new("maxLife"));
/// assert_eq!(err.to_string(), "Unknown stat: maxLife");
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatError {
    /// A node with this id is already registered.
    #[error("Node with id '{0}' already exists")]
    DuplicateNode(StatId),

    /// No node is registered under this id.
    #[error("Unknown stat: {0}")]
    NodeNotFound(StatId),

    /// The id exists but does not name a history node.
    #[error("Unknown history node: {0}")]
    HistoryNotFound(StatId),

    /// No modifier with this id is attached to any stat.
    #[error("Unknown modifier: {0}")]
    ModifierNotFound(String),

    /// No modifier was granted by this source.
    #[error("No modifiers from source: {0}")]
    SourceNotFound(String),

    /// No active producer with this id.
    #[error("Unknown producer: {0}")]
    ProducerNotFound(String),

    /// Parents can only be attached to derived nodes.
    #[error("Node '{0}' is not a derived node and cannot have parents")]
    NotDerived(StatId),

    /// A dependency cycle was found while ordering the graph.
    ///
    /// Graph construction does not check for cycles; only the explicit
    /// topological ordering reports them.
    #[error("Cycle detected: {}", format_cycle_path(.path))]
    Cycle { path: Vec<StatId> },

    /// Malformed external command (bad verb, argument count or type).
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Configuration could not be loaded or failed validation.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

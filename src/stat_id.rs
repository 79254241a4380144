//! Node identifier module.
//!
//! Provides `StatId`, the identifier every node in the graph is registered
//! under. Backed by `Arc<str>` so ids can be handed to snapshots, modifier
//! tables and ledger maps without copying the string.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::sync::Arc;

/// Identifier of a stat node (`"maxLife"`, `"critChance"`, `"damageTaken"`).
///
/// Ids are case-sensitive. `StatId` borrows as `str`, so maps keyed by
/// `StatId` can be queried with a plain `&str`.
///
/// # Examples
///
/// ```rust
/// use statgraph::StatId;
///
/// let life = StatId::new("maxLife");
/// let same: StatId = "maxLife".into();
///
/// assert_eq!(life, same);
/// assert_eq!(life.as_str(), "maxLife");
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StatId(Arc<str>);

impl Serialize for StatId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StatId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(StatId::from(s))
    }
}

impl StatId {
    /// Create a new id from a string slice.
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for StatId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StatId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StatId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StatId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&StatId> for StatId {
    fn from(id: &StatId) -> Self {
        id.clone()
    }
}

impl std::fmt::Display for StatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//! Graph configuration.
//!
//! Every tunable constant of the graph lives here. Missing keys fall back to
//! the defaults, so an empty TOML document is a valid configuration.

use crate::error::StatError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for a `GraphManager`.
///
/// # Examples
///
/// ```rust
/// use statgraph::GraphConfig;
///
/// let config = GraphConfig::from_toml_str(
///     r#"
///     [history]
///     max_events = 64
///
///     [recently]
///     crit_window_secs = 2.0
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.history.max_events, 64);
/// assert_eq!(config.recently.crit_window_secs, 2.0);
/// assert_eq!(config.recently.block_window_secs, 4.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Event ledger and history node parameters.
    pub history: HistoryConfig,
    /// Windows of the built-in recently trackers.
    pub recently: RecentlyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Window used by history nodes created without an explicit one.
    pub default_window_secs: f64,
    /// Maximum retained events per ledger; the oldest are dropped first.
    pub max_events: usize,
    /// Events older than this are swept during ticks.
    pub max_age_secs: f64,
    /// Minimum time between two sweeps of the same ledger.
    pub cleanup_interval_secs: f64,
    /// A ticked history value must move by more than this to count as changed.
    pub change_epsilon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentlyConfig {
    pub crit_window_secs: f64,
    pub block_window_secs: f64,
    pub kill_window_secs: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_window_secs: 4.0,
            max_events: 1000,
            max_age_secs: 10.0,
            cleanup_interval_secs: 1.0,
            change_epsilon: 0.01,
        }
    }
}

impl Default for RecentlyConfig {
    fn default() -> Self {
        Self {
            crit_window_secs: 4.0,
            block_window_secs: 4.0,
            kill_window_secs: 4.0,
        }
    }
}

impl HistoryConfig {
    pub fn default_window(&self) -> Duration {
        Duration::from_secs_f64(self.default_window_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs_f64(self.max_age_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs_f64(self.cleanup_interval_secs)
    }
}

impl GraphConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, StatError> {
        let config: GraphConfig =
            toml::from_str(source).map_err(|e| StatError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StatError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let source = std::fs::read_to_string(path)
            .map_err(|e| StatError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Reject values the graph cannot work with.
    pub fn validate(&self) -> Result<(), StatError> {
        let h = &self.history;
        if h.max_events == 0 {
            return Err(StatError::Config("history.max_events must be > 0".into()));
        }
        let windows = [
            ("history.default_window_secs", h.default_window_secs),
            ("history.max_age_secs", h.max_age_secs),
            ("recently.crit_window_secs", self.recently.crit_window_secs),
            ("recently.block_window_secs", self.recently.block_window_secs),
            ("recently.kill_window_secs", self.recently.kill_window_secs),
        ];
        for (name, secs) in windows {
            check_duration(name, secs)?;
            if secs <= 0.0 {
                return Err(StatError::Config(format!("{name} must be positive, got {secs}")));
            }
        }
        check_duration("history.cleanup_interval_secs", h.cleanup_interval_secs)?;
        if !h.change_epsilon.is_finite() || h.change_epsilon < 0.0 {
            return Err(StatError::Config(format!(
                "history.change_epsilon must be >= 0, got {}",
                h.change_epsilon
            )));
        }
        Ok(())
    }
}

/// Seconds must convert to a `Duration`: finite, non-negative and in range.
fn check_duration(name: &str, secs: f64) -> Result<(), StatError> {
    Duration::try_from_secs_f64(secs)
        .map(|_| ())
        .map_err(|e| StatError::Config(format!("{name}: {secs} is not a valid duration ({e})")))
}

//! Modifiers.
//!
//! A modifier is a single adjustment to one target stat, contributed by some
//! source (an item, an aura, a passive). Modifiers are grouped per target by
//! the [`ModifierAggregator`](crate::aggregator::ModifierAggregator), which
//! combines them in a fixed order:
//!
//! 1. **Flat** values are summed and added to the base
//! 2. **Increased** percentages are summed into one multiplier
//! 3. **More** multipliers are chained multiplicatively
//! 4. **Override** replaces the result outright (last one wins)

use crate::condition::Condition;
use crate::context::EvalContext;
use crate::stat_id::StatId;
use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumString};

/// Stacking category of a modifier. The declaration order is the order in
/// which the aggregator processes them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ModifierKind {
    Flat,
    Increased,
    More,
    Override,
}

/// Value computed at evaluation time instead of a static number.
pub type ValueFn = Arc<dyn Fn(&EvalContext<'_>) -> f64 + Send + Sync>;

/// A single conditional adjustment to one stat.
///
/// # Examples
///
/// ```rust
/// use statgraph::{Modifier, ModifierKind};
///
/// let bonus = Modifier::new("ring_life", "maxLife", ModifierKind::Flat, 40.0)
///     .with_source("ring")
///     .with_description("+40 to maximum Life");
///
/// assert_eq!(bonus.source(), "ring");
/// assert_eq!(bonus.kind(), ModifierKind::Flat);
/// assert!(bonus.is_active());
/// ```
#[derive(Clone)]
pub struct Modifier {
    id: String,
    description: String,
    source: String,
    target: StatId,
    kind: ModifierKind,
    value: f64,
    priority: i32,
    condition: Option<Condition>,
    dynamic_value: Option<ValueFn>,
    active: bool,
    condition_met: bool,
}

impl Modifier {
    pub fn new(
        id: impl Into<String>,
        target: impl Into<StatId>,
        kind: ModifierKind,
        value: f64,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            source: String::new(),
            target: target.into(),
            kind,
            value,
            priority: 0,
            condition: None,
            dynamic_value: None,
            active: true,
            condition_met: true,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Ordering within the same kind; lower runs first.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn requires_tag(self, tag: Tag) -> Self {
        self.with_condition(Condition::has_tag(tag))
    }

    pub fn requires_any_tag(self, tags: Vec<Tag>) -> Self {
        self.with_condition(Condition::has_any_tag(tags))
    }

    /// Compute the value from the context on every evaluation.
    pub fn with_dynamic_value(
        mut self,
        value: impl Fn(&EvalContext<'_>) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.dynamic_value = Some(Arc::new(value));
        self
    }

    /// Evaluate and cache whether the modifier applies.
    ///
    /// A deactivated modifier never applies; one without a condition always
    /// does.
    pub fn evaluate_condition(&mut self, ctx: &EvalContext<'_>) -> bool {
        self.condition_met = self.condition_holds(ctx);
        self.condition_met
    }

    /// Same as [`Modifier::evaluate_condition`] without caching the result.
    pub fn condition_holds(&self, ctx: &EvalContext<'_>) -> bool {
        self.active
            && self
                .condition
                .as_ref()
                .map_or(true, |condition| condition.evaluate(ctx))
    }

    /// The raw value, or 0 if the cached condition result is false.
    pub fn value(&self, ctx: &EvalContext<'_>) -> f64 {
        if !self.condition_met {
            return 0.0;
        }
        match &self.dynamic_value {
            Some(f) => f(ctx),
            None => self.value,
        }
    }

    /// [`Modifier::value`] converted for its stacking step. A `More` value
    /// becomes a multiplier (`0.2` → `1.2`).
    pub fn effective_value(&self, ctx: &EvalContext<'_>) -> f64 {
        let value = self.value(ctx);
        match self.kind {
            ModifierKind::More => 1.0 + value,
            _ => value,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &StatId {
        &self.target
    }

    pub fn kind(&self) -> ModifierKind {
        self.kind
    }

    /// The static value, ignoring conditions and dynamic values.
    pub fn static_value(&self) -> f64 {
        self.value
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    pub fn has_dynamic_value(&self) -> bool {
        self.dynamic_value.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Result of the last [`Modifier::evaluate_condition`].
    pub fn is_condition_met(&self) -> bool {
        self.condition_met
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }
}

impl fmt::Debug for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modifier")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("priority", &self.priority)
            .field("source", &self.source)
            .field("condition", &self.condition)
            .field("dynamic", &self.dynamic_value.is_some())
            .field("active", &self.active)
            .finish()
    }
}

//! Conditions.
//!
//! A `Condition` is a predicate over an [`EvalContext`]. Modifiers use them
//! to decide whether they apply, conditional edges use them to decide
//! whether a parent contributes.

use crate::context::EvalContext;
use crate::recently::RecentlyKind;
use crate::tag::Tag;
use std::fmt;
use std::sync::Arc;

/// Arbitrary predicate over the evaluation context.
pub type Predicate = Arc<dyn Fn(&EvalContext<'_>) -> bool + Send + Sync>;

/// What a condition checks.
#[derive(Clone)]
pub enum ConditionKind {
    HasTag(Tag),
    HasAnyTag(Vec<Tag>),
    HasAllTags(Vec<Tag>),
    /// Any active tag equal to or below this one in the hierarchy.
    TagMatching(Tag),
    Recently(RecentlyKind),
    Custom(Predicate),
}

/// A described predicate.
///
/// # Examples
///
/// ```rust
/// use statgraph::context::LedgerMap;
/// use statgraph::recently::RecentlyTrackers;
/// use statgraph::tag::{TagPool, TagSet};
/// use statgraph::{Condition, EvalContext};
/// use std::time::Duration;
///
/// let pool = TagPool::new();
/// let tags = TagSet::new();
/// let recently = RecentlyTrackers::default();
/// let ledgers = LedgerMap::new();
///
/// let purity = Condition::has_tag(pool.intern("Buff.PurityOfElements"));
/// let ctx = EvalContext::new(&tags, &recently, &ledgers, Duration::ZERO);
/// assert!(!purity.evaluate(&ctx));
///
/// tags.add(&pool.intern("Buff.PurityOfElements"));
/// assert!(purity.evaluate(&ctx));
/// assert_eq!(purity.description(), "has tag Buff.PurityOfElements");
/// ```
#[derive(Clone)]
pub struct Condition {
    kind: ConditionKind,
    description: String,
}

impl Condition {
    pub fn has_tag(tag: Tag) -> Self {
        let description = format!("has tag {}", tag.name());
        Self {
            kind: ConditionKind::HasTag(tag),
            description,
        }
    }

    pub fn has_any_tag(tags: Vec<Tag>) -> Self {
        let description = format!("has any of [{}]", join_names(&tags));
        Self {
            kind: ConditionKind::HasAnyTag(tags),
            description,
        }
    }

    pub fn has_all_tags(tags: Vec<Tag>) -> Self {
        let description = format!("has all of [{}]", join_names(&tags));
        Self {
            kind: ConditionKind::HasAllTags(tags),
            description,
        }
    }

    pub fn tag_matching(parent: Tag) -> Self {
        let description = format!("has tag under {}", parent.name());
        Self {
            kind: ConditionKind::TagMatching(parent),
            description,
        }
    }

    pub fn recently(kind: RecentlyKind) -> Self {
        Self {
            kind: ConditionKind::Recently(kind),
            description: format!("{kind} recently"),
        }
    }

    pub fn custom(
        description: impl Into<String>,
        predicate: impl Fn(&EvalContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind: ConditionKind::Custom(Arc::new(predicate)),
            description: description.into(),
        }
    }

    /// Replace the generated description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> &ConditionKind {
        &self.kind
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match &self.kind {
            ConditionKind::HasTag(tag) => ctx.has_tag(tag),
            ConditionKind::HasAnyTag(tags) => ctx.tags().has_any_tag(tags),
            ConditionKind::HasAllTags(tags) => ctx.tags().has_all_tags(tags),
            ConditionKind::TagMatching(parent) => ctx.tags().has_tag_matching(parent),
            ConditionKind::Recently(kind) => ctx.is_recently(*kind),
            ConditionKind::Custom(predicate) => predicate(ctx),
        }
    }
}

fn join_names(tags: &[Tag]) -> String {
    tags.iter().map(Tag::name).collect::<Vec<_>>().join(", ")
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Condition").field(&self.description).finish()
    }
}

//! Modifier producers and combat events.
//!
//! A producer is anything that, while active, contributes modifiers and tags
//! to the graph: an equipped item, a running aura. Producers are plain
//! configuration; the [`GraphManager`](crate::GraphManager) tracks which ones
//! are active and removes their contributions by source id on deactivation.

use crate::condition::Condition;
use crate::modifier::{Modifier, ModifierKind};
use crate::recently::RecentlyKind;
use crate::stat_id::StatId;
use crate::tag::names;
use std::time::Duration;
use strum::{Display, EnumIter, EnumString};

/// Equipment slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum ItemSlot {
    MainHand,
    OffHand,
    Helmet,
    BodyArmor,
    Gloves,
    Boots,
    Ring1,
    Ring2,
    Amulet,
    Belt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProducerKind {
    Item { slot: ItemSlot },
    /// `duration: None` is permanent.
    Aura { duration: Option<Duration> },
}

/// One modifier a producer grants.
#[derive(Debug, Clone)]
pub struct ModifierSpec {
    pub target: StatId,
    pub kind: ModifierKind,
    pub value: f64,
    pub description: Option<String>,
    pub priority: i32,
    pub condition: Option<Condition>,
}

impl ModifierSpec {
    pub fn new(target: impl Into<StatId>, kind: ModifierKind, value: f64) -> Self {
        Self {
            target: target.into(),
            kind,
            value,
            description: None,
            priority: 0,
            condition: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Definition of an item or aura.
///
/// # Examples
///
/// ```rust
/// use statgraph::producer::{ItemSlot, ProducerConfig};
/// use statgraph::ModifierKind;
///
/// let dagger = ProducerConfig::item("dagger", "Rusty Dagger", ItemSlot::MainHand)
///     .with_modifier("attackSpeed", ModifierKind::Increased, 0.1)
///     .grants_tag("Equipment.Weapon.Dagger");
///
/// let mods = dagger.build_modifiers();
/// assert_eq!(mods[0].id(), "dagger:attackSpeed:0");
/// assert_eq!(mods[0].source(), "dagger");
/// assert_eq!(mods[0].description(), "Rusty Dagger attackSpeed");
/// ```
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub id: String,
    pub name: String,
    pub kind: ProducerKind,
    pub modifiers: Vec<ModifierSpec>,
    pub granted_tags: Vec<String>,
}

impl ProducerConfig {
    pub fn item(id: impl Into<String>, name: impl Into<String>, slot: ItemSlot) -> Self {
        Self::new(id, name, ProducerKind::Item { slot })
    }

    pub fn aura(id: impl Into<String>, name: impl Into<String>, duration: Option<Duration>) -> Self {
        Self::new(id, name, ProducerKind::Aura { duration })
    }

    fn new(id: impl Into<String>, name: impl Into<String>, kind: ProducerKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            modifiers: Vec::new(),
            granted_tags: Vec::new(),
        }
    }

    pub fn with_modifier(self, target: impl Into<StatId>, kind: ModifierKind, value: f64) -> Self {
        self.with_modifier_spec(ModifierSpec::new(target, kind, value))
    }

    pub fn with_modifier_spec(mut self, spec: ModifierSpec) -> Self {
        self.modifiers.push(spec);
        self
    }

    pub fn grants_tag(mut self, name: impl Into<String>) -> Self {
        self.granted_tags.push(name.into());
        self
    }

    /// Time-limited auras only.
    pub fn duration(&self) -> Option<Duration> {
        match self.kind {
            ProducerKind::Aura { duration } => duration,
            ProducerKind::Item { .. } => None,
        }
    }

    /// Instantiate the granted modifiers, sourced to this producer.
    ///
    /// Ids are `"{producer}:{target}:{index}"`, so two specs on the same
    /// target never collide.
    pub fn build_modifiers(&self) -> Vec<Modifier> {
        self.modifiers
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let description = spec
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("{} {}", self.name, spec.target));
                let mut modifier = Modifier::new(
                    format!("{}:{}:{}", self.id, spec.target, index),
                    spec.target.clone(),
                    spec.kind,
                    spec.value,
                )
                .with_source(self.id.clone())
                .with_description(description)
                .with_priority(spec.priority);
                if let Some(condition) = &spec.condition {
                    modifier = modifier.with_condition(condition.clone());
                }
                modifier
            })
            .collect()
    }
}

/// Damage categories recorded into ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum DamageType {
    Physical,
    Fire,
    Cold,
    #[strum(to_string = "Lightning", serialize = "light")]
    Lightning,
    Chaos,
}

impl DamageType {
    /// The well-known tag for this damage type.
    pub fn tag_name(self) -> &'static str {
        match self {
            DamageType::Physical => names::DAMAGE_PHYSICAL,
            DamageType::Fire => names::DAMAGE_FIRE,
            DamageType::Cold => names::DAMAGE_COLD,
            DamageType::Lightning => names::DAMAGE_LIGHTNING,
            DamageType::Chaos => names::DAMAGE_CHAOS,
        }
    }

    /// History node receiving damage of this type taken, e.g. `FireDamageTaken`.
    pub fn taken_ledger(self) -> String {
        format!("{self}DamageTaken")
    }

    pub fn dealt_ledger(self) -> String {
        format!("{self}DamageDealt")
    }
}

/// Something that happened in combat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CombatEvent {
    TakeDamage { amount: f64, damage_type: DamageType },
    DealDamage { amount: f64, damage_type: DamageType },
    Crit,
    Block,
    Kill,
}

impl CombatEvent {
    /// The tracker this event triggers, if any.
    pub fn recently_kind(&self) -> Option<RecentlyKind> {
        match self {
            CombatEvent::Crit => Some(RecentlyKind::Crit),
            CombatEvent::Block => Some(RecentlyKind::Block),
            CombatEvent::Kill => Some(RecentlyKind::Kill),
            CombatEvent::TakeDamage { .. } | CombatEvent::DealDamage { .. } => None,
        }
    }
}

/// History nodes fed by crit/block/kill events.
pub fn recently_ledger(kind: RecentlyKind) -> &'static str {
    match kind {
        RecentlyKind::Crit => "critHistory",
        RecentlyKind::Block => "blockHistory",
        RecentlyKind::Kill => "killHistory",
    }
}

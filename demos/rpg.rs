//! ARPG Character Example
//!
//! Builds a small character sheet on top of statgraph and replays a short
//! fight against a manual clock:
//! - Attributes feeding derived stats (life, mana, accuracy, damage)
//! - A "crit recently" modifier driven by a recently tracker
//! - Block chance fed by a fire damage history node
//! - Tag-gated conversion modifiers
//! - Items and auras registered as producers, equipped and toggled
//! - Snapshot export as JSON
//!
//! Run with `RUST_LOG=statgraph=debug cargo run --example rpg` to watch the
//! graph invalidate and recompute.

use statgraph::clock::ManualClock;
use statgraph::producer::{ItemSlot, ModifierSpec};
use statgraph::tag::names;
use statgraph::*;
use std::sync::Arc;
use std::time::Duration;

/// `floor(value / step) * amount`, the usual "per N attribute points" bonus.
fn per(value: f64, step: f64, amount: f64) -> f64 {
    (value / step).floor() * amount
}

fn build_character(graph: &mut GraphManager) -> Result<(), StatError> {
    // Attributes and flat bases
    graph.create_base_stat("strength", "Strength", 32.0, "attribute")?;
    graph.create_base_stat("dexterity", "Dexterity", 24.0, "attribute")?;
    graph.create_base_stat("intelligence", "Intelligence", 14.0, "attribute")?;
    graph.create_base_stat("baseLife", "Base Life", 50.0, "defense")?;
    graph.create_base_stat("baseMana", "Base Mana", 40.0, "resource")?;
    graph.create_base_stat("baseAccuracy", "Base Accuracy", 100.0, "offense")?;
    graph.create_base_stat("baseEvasion", "Base Evasion", 60.0, "defense")?;
    graph.create_base_stat("baseMeleePhysDmg", "Base Melee Damage", 12.0, "offense")?;
    graph.create_base_stat("baseBlockChance", "Base Block Chance", 0.0, "defense")?;

    // History
    graph.create_history_node("FireDamageTaken", "Fire Damage Taken", None, "history")?;
    graph.create_history_node("critHistory", "Recent Crits", None, "history")?;

    // Derived
    graph.create_derived_stat(
        "maxLife",
        "Maximum Life",
        &["baseLife", "strength"],
        Some(calculation(|v| v[0] + per(v[1], 10.0, 5.0))),
        "defense",
    )?;
    graph.create_derived_stat(
        "maxMana",
        "Maximum Mana",
        &["baseMana", "intelligence"],
        Some(calculation(|v| v[0] + per(v[1], 10.0, 5.0))),
        "resource",
    )?;
    graph.create_derived_stat(
        "accuracy",
        "Accuracy Rating",
        &["baseAccuracy", "dexterity"],
        Some(calculation(|v| v[0] + per(v[1], 10.0, 20.0))),
        "offense",
    )?;
    graph.create_derived_stat(
        "evasion",
        "Evasion Rating",
        &["baseEvasion", "dexterity"],
        Some(calculation(|v| v[0] * (1.0 + per(v[1], 10.0, 0.02)))),
        "defense",
    )?;
    graph.create_derived_stat(
        "meleePhysDmg",
        "Melee Physical Damage",
        &["baseMeleePhysDmg", "strength"],
        Some(calculation(|v| v[0] * (1.0 + per(v[1], 10.0, 0.02)))),
        "offense",
    )?;
    graph.create_derived_stat(
        "blockChance",
        "Block Chance %",
        &["baseBlockChance", "FireDamageTaken"],
        Some(calculation(|v| v[0] + (v[1] / 200.0).floor())),
        "defense",
    )?;

    // +50% more crit chance after a crit
    graph.create_modified_stat("critChance", "Crit Chance %", 5.0, &[], "offense")?;
    graph.add_modifier(
        Modifier::new("critRecently_bonus", "critChance", ModifierKind::More, 0.5)
            .with_source("innate")
            .with_description("+50% more crit chance if you crit recently")
            .with_condition(Condition::recently(RecentlyKind::Crit)),
    );

    graph.create_modified_stat("physToLightning", "Phys to Lightning %", 0.0, &[], "conversion")?;
    let purity = graph.intern(names::PURITY_OF_ELEMENTS);
    let dual = graph.intern(names::DUAL_WIELDING);
    graph.add_modifier(
        Modifier::new("purity_phys_light", "physToLightning", ModifierKind::Flat, 20.0)
            .with_source("purityOfElements")
            .requires_tag(purity),
    );
    graph.add_modifier(
        Modifier::new("dualwield_phys_light", "physToLightning", ModifierKind::Flat, 10.0)
            .with_source("innate")
            .requires_tag(dual),
    );

    graph.create_modified_stat("attackSpeed", "Attack Speed", 1.2, &[], "offense")?;

    graph.create_derived_stat(
        "effectiveDPS",
        "Effective DPS",
        &["meleePhysDmg", "critChance", "attackSpeed", "accuracy"],
        Some(calculation(|v| {
            let (dmg, crit, speed, acc) = (v[0], v[1] / 100.0, v[2], v[3]);
            let hit_chance = (acc / (acc + 500.0)).min(0.95);
            dmg * hit_chance * (1.0 + crit * 0.5) * speed
        })),
        "offense",
    )?;

    Ok(())
}

/// Items and auras the `equip` and `aura` commands can reach.
fn register_gear(graph: &mut GraphManager) {
    graph.register_producer(
        ProducerConfig::item("sword", "Corsair Sword", ItemSlot::MainHand)
            .with_modifier("meleePhysDmg", ModifierKind::Flat, 18.0)
            .with_modifier("attackSpeed", ModifierKind::Increased, 0.1)
            .grants_tag(names::WEAPON_SWORD),
    );
    graph.register_producer(
        ProducerConfig::item("offhand", "Jewelled Foil", ItemSlot::OffHand)
            .with_modifier("critChance", ModifierKind::Increased, 0.3)
            .grants_tag(names::DUAL_WIELDING),
    );
    graph.register_producer(
        ProducerConfig::item("ring", "Ruby Ring", ItemSlot::Ring1).with_modifier_spec(
            ModifierSpec::new("maxLife", ModifierKind::Increased, 0.15)
                .with_description("15% increased life"),
        ),
    );
    graph.register_producer(
        ProducerConfig::aura("purity", "Purity of Elements", None)
            .grants_tag(names::PURITY_OF_ELEMENTS),
    );
    graph.register_producer(
        ProducerConfig::aura("onslaught", "Onslaught", Some(Duration::from_secs(4)))
            .with_modifier("attackSpeed", ModifierKind::Increased, 0.2)
            .grants_tag(names::ONSLAUGHT),
    );
}

fn print_stats(graph: &mut GraphManager, ids: &[&str]) -> Result<(), StatError> {
    for id in ids {
        println!("  {:<16} {:>10.2}", id, graph.get_value(id)?);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statgraph=info".into()),
        )
        .init();

    let clock = Arc::new(ManualClock::new());
    let config = GraphConfig::load("statgraph.toml")?;
    let mut graph = GraphManager::with_clock(config, clock.clone())?;
    build_character(&mut graph)?;
    register_gear(&mut graph);
    graph.recalculate_all()?;

    let watched = [
        "maxLife",
        "accuracy",
        "evasion",
        "critChance",
        "blockChance",
        "physToLightning",
        "attackSpeed",
        "effectiveDPS",
    ];
    println!("=== Fresh character ===");
    print_stats(&mut graph, &watched)?;

    println!("\n=== Equip ===");
    for id in ["sword", "offhand", "ring"] {
        graph.equip(id)?;
    }
    print_stats(&mut graph, &watched)?;
    println!("  tags: {}", graph.tag_names().join(", "));

    println!("\n=== Onslaught (4s) and a crit ===");
    graph.toggle_aura("onslaught")?;
    graph.apply_combat_event(CombatEvent::Crit);
    print_stats(&mut graph, &["critChance", "attackSpeed", "effectiveDPS"])?;

    println!("\n=== Taking fire damage ===");
    for amount in [180.0, 240.0, 150.0] {
        clock.advance_secs(0.5);
        graph.apply_combat_event(CombatEvent::TakeDamage {
            amount,
            damage_type: DamageType::Fire,
        });
        graph.tick();
    }
    print_stats(&mut graph, &["FireDamageTaken", "blockChance"])?;

    println!("\n=== Five seconds later ===");
    for _ in 0..50 {
        clock.advance(Duration::from_millis(100));
        graph.tick();
    }
    print_stats(&mut graph, &watched)?;
    println!("  onslaught active: {}", graph.is_producer_active("onslaught"));

    println!("\n=== Commands ===");
    for line in [
        "aura purity",
        "get physToLightning",
        "unequip offhand",
        "get physToLightning",
        "equip offhand",
        "aura purity",
        "stats",
    ] {
        println!("> {line}");
        match graph.execute_line(line) {
            Ok(output) => println!("{output}"),
            Err(err) => println!("error: {err}"),
        }
    }

    println!("\n=== Snapshot ===");
    let snapshot = graph.recalculate_and_snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}

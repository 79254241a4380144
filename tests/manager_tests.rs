use statgraph::clock::ManualClock;
use statgraph::producer::ItemSlot;
use statgraph::tag::names;
use statgraph::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn manager() -> (Arc<ManualClock>, GraphManager) {
    let clock = Arc::new(ManualClock::new());
    let graph = GraphManager::with_clock(GraphConfig::default(), clock.clone()).unwrap();
    (clock, graph)
}

/// Test that block chance follows recent fire damage and decays out of the window.
#[test]
fn test_history_driven_stat() {
    let (clock, mut graph) = manager();
    graph
        .create_history_node("FireDamageTaken", "Fire Damage Taken", None, "history")
        .unwrap();
    graph
        .create_derived_stat(
            "blockChance",
            "Block Chance",
            &["FireDamageTaken"],
            Some(calculation(|v| (v[0] / 200.0).floor())),
            "defense",
        )
        .unwrap();
    assert_eq!(graph.get_value("blockChance").unwrap(), 0.0);

    graph.apply_combat_event(CombatEvent::TakeDamage {
        amount: 250.0,
        damage_type: DamageType::Fire,
    });
    clock.advance_secs(1.0);
    graph.apply_combat_event(CombatEvent::TakeDamage {
        amount: 200.0,
        damage_type: DamageType::Fire,
    });
    // Cold damage has no ledger here and is ignored
    graph.apply_combat_event(CombatEvent::TakeDamage {
        amount: 999.0,
        damage_type: DamageType::Cold,
    });

    assert_eq!(graph.get_value("FireDamageTaken").unwrap(), 450.0);
    assert_eq!(graph.get_value("blockChance").unwrap(), 2.0);

    // The first hit leaves the 4s window
    clock.advance_secs(3.5);
    assert!(graph.tick());
    assert_eq!(graph.get_value("FireDamageTaken").unwrap(), 200.0);
    assert_eq!(graph.get_value("blockChance").unwrap(), 1.0);

    clock.advance_secs(2.0);
    graph.tick();
    assert_eq!(graph.get_value("blockChance").unwrap(), 0.0);
}

/// Test a "more" modifier that only applies after a recent crit.
#[test]
fn test_crit_recently_modifier() {
    let (clock, mut graph) = manager();
    graph
        .create_modified_stat("critChance", "Critical Strike Chance", 5.0, &[], "offense")
        .unwrap();
    graph.add_modifier(
        Modifier::new("critRecently", "critChance", ModifierKind::More, 0.5)
            .with_source("passive")
            .with_condition(Condition::recently(RecentlyKind::Crit)),
    );
    assert_eq!(graph.get_value("critChance").unwrap(), 5.0);

    graph.apply_combat_event(CombatEvent::Crit);
    assert!(graph.is_recently(RecentlyKind::Crit));
    assert_eq!(graph.get_value("critChance").unwrap(), 7.5);

    clock.advance_secs(1.0);
    let state = graph.recently_state(RecentlyKind::Crit);
    assert!(state.active);
    assert!((state.remaining - 3.0).abs() < 1e-9);

    clock.advance_secs(3.5);
    assert!(graph.tick());
    assert!(!graph.is_recently(RecentlyKind::Crit));
    assert_eq!(graph.get_value("critChance").unwrap(), 5.0);
}

/// Test a conditional parent driven by a parent tag in the hierarchy.
#[test]
fn test_tag_hierarchy_condition() {
    let (_clock, mut graph) = manager();
    graph.create_base_stat("weaponBonus", "Weapon Bonus", 25.0, "offense").unwrap();
    graph.create_modified_stat("damage", "Damage", 100.0, &[], "offense").unwrap();
    let weapon = graph.intern("Equipment.Weapon");
    graph
        .add_conditional_parent("damage", "weaponBonus", Condition::tag_matching(weapon))
        .unwrap();

    assert_eq!(graph.get_value("damage").unwrap(), 100.0);
    assert!(graph.add_tag(names::WEAPON_SWORD));
    assert!(!graph.add_tag(names::WEAPON_SWORD));
    assert_eq!(graph.get_value("damage").unwrap(), 125.0);

    // A sibling prefix is not a parent
    assert!(graph.remove_tag(names::WEAPON_SWORD));
    graph.add_tag("Equipment.WeaponRack");
    assert_eq!(graph.get_value("damage").unwrap(), 100.0);
}

/// Test that tag writes from another thread are seen on the next read.
#[test]
fn test_tag_write_from_thread() {
    let (_clock, mut graph) = manager();
    graph.create_base_stat("bonus", "Bonus", 10.0, "offense").unwrap();
    graph.create_derived_stat("dmg", "Damage", &[], None, "offense").unwrap();
    let fortify = graph.intern(names::FORTIFY);
    graph
        .add_conditional_parent("dmg", "bonus", Condition::has_tag(fortify.clone()))
        .unwrap();
    assert_eq!(graph.get_value("dmg").unwrap(), 0.0);
    graph.take_changes();

    let tags = graph.tag_set();
    thread::spawn(move || {
        tags.add(&fortify);
    })
    .join()
    .unwrap();

    assert_eq!(graph.get_value("dmg").unwrap(), 10.0);
    assert!(graph.take_changes());
}

/// Test equipping and unequipping an item.
#[test]
fn test_item_producer() {
    let (_clock, mut graph) = manager();
    graph.create_base_stat("strength", "Strength", 20.0, "attribute").unwrap();
    graph
        .create_modified_stat("maxLife", "Maximum Life", 50.0, &["strength"], "defense")
        .unwrap();

    let belt = ProducerConfig::item("belt", "Heavy Belt", ItemSlot::Belt)
        .with_modifier("maxLife", ModifierKind::Flat, 30.0)
        .with_modifier("maxLife", ModifierKind::Increased, 0.25)
        .grants_tag("Equipment.Belt");

    assert!(graph.activate(&belt));
    assert!(!graph.activate(&belt));
    assert_eq!(graph.get_value("maxLife").unwrap(), 125.0);
    assert!(graph.has_tag("Equipment.Belt"));
    assert_eq!(graph.modifiers("maxLife").len(), 2);
    assert_eq!(graph.active_producers(), vec!["belt"]);

    graph.deactivate("belt").unwrap();
    assert_eq!(graph.get_value("maxLife").unwrap(), 70.0);
    assert!(!graph.has_tag("Equipment.Belt"));
    assert!(graph.modifiers("maxLife").is_empty());
}

/// Test that a timed aura expires during tick.
#[test]
fn test_aura_expiry() {
    let (clock, mut graph) = manager();
    graph.create_modified_stat("attackSpeed", "Attack Speed", 1.0, &[], "offense").unwrap();
    let onslaught = ProducerConfig::aura("onslaught", "Onslaught", Some(Duration::from_secs(4)))
        .with_modifier("attackSpeed", ModifierKind::Increased, 0.2)
        .grants_tag(names::ONSLAUGHT);

    graph.activate(&onslaught);
    assert!((graph.get_value("attackSpeed").unwrap() - 1.2).abs() < 1e-9);

    clock.advance_secs(1.0);
    graph.tick();
    assert_eq!(graph.producer_remaining("onslaught"), Some(Duration::from_secs(3)));

    clock.advance_secs(3.5);
    assert!(graph.tick());
    assert!(!graph.is_producer_active("onslaught"));
    assert!(!graph.has_tag(names::ONSLAUGHT));
    assert_eq!(graph.get_value("attackSpeed").unwrap(), 1.0);
}

/// Test that an idle tick reports no changes.
#[test]
fn test_idle_tick() {
    let (clock, mut graph) = manager();
    graph.create_base_stat("a", "A", 1.0, "x").unwrap();
    graph.create_history_node("hits", "Hits", None, "history").unwrap();
    graph.take_changes();

    clock.advance_secs(1.0);
    assert!(!graph.tick());
    assert!(!graph.take_changes());
}

/// Test override stacking through the manager.
#[test]
fn test_override() {
    let (_clock, mut graph) = manager();
    graph.create_modified_stat("moveSpeed", "Movement Speed", 100.0, &[], "utility").unwrap();
    graph.add_modifier(Modifier::new("boots", "moveSpeed", ModifierKind::Increased, 0.3));
    graph.add_modifier(Modifier::new("frozen", "moveSpeed", ModifierKind::Override, 0.0));
    assert_eq!(graph.get_value("moveSpeed").unwrap(), 0.0);

    graph.remove_modifier("frozen").unwrap();
    assert!((graph.get_value("moveSpeed").unwrap() - 130.0).abs() < 1e-9);
}

/// Test the snapshot JSON layout and its read-only behavior.
#[test]
fn test_snapshot_json() {
    let (_clock, mut graph) = manager();
    graph.create_base_stat("strength", "Strength", 20.0, "attribute").unwrap();
    graph
        .create_modified_stat("maxLife", "Maximum Life", 50.0, &["strength"], "defense")
        .unwrap();
    graph.create_history_node("FireDamageTaken", "Fire Damage Taken", None, "history").unwrap();
    graph.add_modifier(
        Modifier::new("amulet", "maxLife", ModifierKind::Flat, 10.0).with_source("amulet"),
    );
    graph.record_event("FireDamageTaken", 40.0, Some("Fire")).unwrap();

    let stale = graph.snapshot();
    let life = stale.node("maxLife").unwrap();
    assert!(life.is_dirty);
    assert_eq!(life.value, 0.0);

    let json = serde_json::to_value(graph.recalculate_and_snapshot()).unwrap();
    let nodes = json["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 3);

    let life = nodes.iter().find(|n| n["id"] == "maxLife").unwrap();
    assert_eq!(life["value"], 80.0);
    assert_eq!(life["isDirty"], false);
    assert_eq!(life["type"], "derived");
    assert_eq!(life["modifiers"][0]["type"], "flat");
    assert_eq!(life["modifiers"][0]["hasCondition"], false);

    let fire = nodes.iter().find(|n| n["id"] == "FireDamageTaken").unwrap();
    assert_eq!(fire["isHistory"], true);
    assert_eq!(fire["eventCount"], 1);
    assert_eq!(fire["window"], 4.0);
    assert_eq!(fire["value"], 40.0);

    assert_eq!(json["edges"][0]["from"], "strength");
    assert_eq!(json["edges"][0]["to"], "maxLife");
    assert!(json["recently"]["crit"].is_boolean());
    assert!(json["timestamp"].is_i64());
}

/// Test loading configuration from TOML.
#[test]
fn test_config_from_toml() {
    let config = GraphConfig::from_toml_str(
        r#"
        [history]
        default_window_secs = 2.0
        "#,
    )
    .unwrap();
    assert_eq!(config.history.default_window(), Duration::from_secs(2));
    assert_eq!(config.history.max_events, 1000);

    assert!(matches!(
        GraphConfig::from_toml_str("[history]\nmax_events = 0\n"),
        Err(StatError::Config(_))
    ));

    let mut graph = GraphManager::with_clock(config, Arc::new(ManualClock::new())).unwrap();
    let ledger = graph.create_history_node("hits", "Hits", None, "history").unwrap();
    assert_eq!(ledger.window(), Duration::from_secs(2));
}

/// Test a short session driven through text commands.
#[test]
fn test_command_session() {
    let (_clock, mut graph) = manager();
    graph.create_base_stat("strength", "Strength", 20.0, "attribute").unwrap();
    graph.create_history_node("FireDamageTaken", "Fire", None, "history").unwrap();

    graph.execute_line("set strength 42").unwrap();
    assert_eq!(graph.execute_line("get strength").unwrap().to_string(), "strength = 42.00");

    graph.execute_line("damage 120 FIRE").unwrap();
    assert_eq!(graph.get_value("FireDamageTaken").unwrap(), 120.0);

    graph.execute_line("block").unwrap();
    assert!(graph.is_recently(RecentlyKind::Block));

    assert!(matches!(
        graph.execute_line("damage 10 holy"),
        Err(StatError::InvalidCommand(_))
    ));
    match graph.execute("stats".parse().unwrap()).unwrap() {
        CommandOutput::Stats(stats) => assert_eq!(stats.len(), 2),
        other => panic!("unexpected output {other:?}"),
    }
}

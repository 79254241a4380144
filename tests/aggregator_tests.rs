use proptest::prelude::*;
use statgraph::context::LedgerMap;
use statgraph::recently::RecentlyTrackers;
use statgraph::tag::{names, TagPool, TagSet};
use statgraph::*;
use std::time::Duration;

fn with_ctx<R>(tags: &TagSet, f: impl FnOnce(&EvalContext<'_>) -> R) -> R {
    let recently = RecentlyTrackers::default();
    let ledgers = LedgerMap::new();
    let ctx = EvalContext::new(tags, &recently, &ledgers, Duration::ZERO);
    f(&ctx)
}

/// Test the reference stacking example and an override on top of it.
#[test]
fn test_stacking_law() {
    let tags = TagSet::new();
    let mut agg = ModifierAggregator::new();
    agg.add(Modifier::new("more", "x", ModifierKind::More, 0.2));
    agg.add(Modifier::new("flat", "x", ModifierKind::Flat, 10.0));
    agg.add(Modifier::new("inc", "x", ModifierKind::Increased, 0.5));

    let result = with_ctx(&tags, |ctx| agg.calculate(100.0, ctx));
    assert!((result - 198.0).abs() < 1e-9);

    agg.add(Modifier::new("fixed", "x", ModifierKind::Override, 42.0));
    assert_eq!(with_ctx(&tags, |ctx| agg.calculate(100.0, ctx)), 42.0);

    let kinds: Vec<ModifierKind> = agg.modifiers().iter().map(|m| m.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            ModifierKind::Flat,
            ModifierKind::Increased,
            ModifierKind::More,
            ModifierKind::Override
        ]
    );
}

/// Test that the last override by priority wins.
#[test]
fn test_override_priority() {
    let tags = TagSet::new();
    let mut agg = ModifierAggregator::new();
    agg.add(Modifier::new("high", "x", ModifierKind::Override, 7.0).with_priority(10));
    agg.add(Modifier::new("low", "x", ModifierKind::Override, 3.0).with_priority(1));
    assert_eq!(with_ctx(&tags, |ctx| agg.calculate(0.0, ctx)), 7.0);

    let breakdown = with_ctx(&tags, |ctx| agg.breakdown(0.0, ctx));
    assert_eq!(breakdown.override_value, Some(7.0));
}

/// Test that a tag-gated modifier contributes nothing until its tag is present.
#[test]
fn test_conditional_modifier() {
    let pool = TagPool::new();
    let tags = TagSet::new();
    let dual = pool.intern(names::DUAL_WIELDING);
    let mut agg = ModifierAggregator::new();
    agg.add(
        Modifier::new("dw", "x", ModifierKind::More, 0.1)
            .with_condition(Condition::has_tag(dual.clone())),
    );

    assert_eq!(with_ctx(&tags, |ctx| agg.calculate(100.0, ctx)), 100.0);
    tags.add(&dual);
    assert!((with_ctx(&tags, |ctx| agg.calculate(100.0, ctx)) - 110.0).abs() < 1e-9);
    assert_eq!(with_ctx(&tags, |ctx| agg.active_count(ctx)), 1);
}

proptest! {
    /// Flat, increased and more contributions commute within their kind.
    #[test]
    fn prop_insertion_order_irrelevant(
        base in -1000.0f64..1000.0,
        values in prop::collection::vec((0usize..3, -1.0f64..1.0), 0..12),
    ) {
        let tags = TagSet::new();
        let kinds = [ModifierKind::Flat, ModifierKind::Increased, ModifierKind::More];

        let mut forward = ModifierAggregator::new();
        let mut backward = ModifierAggregator::new();
        for (i, &(k, v)) in values.iter().enumerate() {
            forward.add(Modifier::new(format!("m{i}"), "x", kinds[k], v));
        }
        for (i, &(k, v)) in values.iter().enumerate().rev() {
            backward.add(Modifier::new(format!("m{i}"), "x", kinds[k], v));
        }

        let flat: f64 = values.iter().filter(|(k, _)| *k == 0).map(|(_, v)| v).sum();
        let inc: f64 = values.iter().filter(|(k, _)| *k == 1).map(|(_, v)| v).sum();
        let more: f64 = values.iter().filter(|(k, _)| *k == 2).map(|(_, v)| 1.0 + v).product();
        let expected = (base + flat) * (1.0 + inc) * more;

        let a = with_ctx(&tags, |ctx| forward.calculate(base, ctx));
        let b = with_ctx(&tags, |ctx| backward.calculate(base, ctx));
        prop_assert!((a - expected).abs() < 1e-6 * (1.0 + expected.abs()));
        prop_assert!((a - b).abs() < 1e-6 * (1.0 + a.abs()));
    }

    /// Any applicable override replaces the stacked result.
    #[test]
    fn prop_override_wins(
        base in -1000.0f64..1000.0,
        flat in -100.0f64..100.0,
        fixed in -1000.0f64..1000.0,
    ) {
        let tags = TagSet::new();
        let mut agg = ModifierAggregator::new();
        agg.add(Modifier::new("fixed", "x", ModifierKind::Override, fixed));
        agg.add(Modifier::new("flat", "x", ModifierKind::Flat, flat));
        prop_assert_eq!(with_ctx(&tags, |ctx| agg.calculate(base, ctx)), fixed);
    }
}

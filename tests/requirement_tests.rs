//! Requirement evaluation laws

use proptest::prelude::*;
use scancore::probe::PropertyCategory;
use scancore::{AnalyzedProperty, ProbeId, PropertyValue, ReportData, Requirement};

const PROPERTY_NAMES: [&str; 4] = ["A", "B", "C", "D"];

fn property(index: usize) -> AnalyzedProperty {
    AnalyzedProperty::new(PROPERTY_NAMES[index], PropertyCategory::from_static("test"))
}

/// Constant trees paired with their truth value
fn constant_tree() -> impl Strategy<Value = (Requirement, bool)> {
    let leaf = any::<bool>().prop_map(|b| {
        let requirement = if b {
            Requirement::AlwaysTrue
        } else {
            Requirement::AlwaysFalse
        };
        (requirement, b)
    });

    leaf.prop_recursive(4, 48, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(|children| {
                let expected = children.iter().all(|(_, b)| *b);
                (Requirement::And(children.into_iter().map(|(r, _)| r).collect()), expected)
            }),
            prop::collection::vec(inner.clone(), 0..4).prop_map(|children| {
                let expected = children.iter().any(|(_, b)| *b);
                (Requirement::Or(children.into_iter().map(|(r, _)| r).collect()), expected)
            }),
            inner.clone().prop_map(|(r, b)| (Requirement::Not(Box::new(r)), !b)),
            (inner.clone(), inner.clone()).prop_map(|((a, x), (b, y))| (a.xor(b), x != y)),
            (prop::collection::vec(inner, 0..4), 0usize..4).prop_filter_map(
                "count above children",
                |(children, count)| {
                    if count > children.len() {
                        return None;
                    }
                    let holding = children.iter().filter(|(_, b)| *b).count();
                    let children = children.into_iter().map(|(r, _)| r).collect();
                    let requirement = Requirement::at_least(count, children);
                    Some((requirement, holding >= count))
                }
            ),
        ]
    })
}

/// Report where each property is unset, true or false
fn report_values() -> impl Strategy<Value = Vec<Option<bool>>> {
    prop::collection::vec(prop::option::of(any::<bool>()), PROPERTY_NAMES.len())
}

fn build_report(values: &[Option<bool>]) -> ReportData {
    let mut report = ReportData::new();
    let writer = ProbeId::new("writer");
    for (index, value) in values.iter().enumerate() {
        if let Some(value) = value {
            report.put_result(property(index), PropertyValue::from_bool(*value), &writer);
        }
    }
    report
}

#[test]
fn test_empty_composites() {
    let report = ReportData::new();
    assert!(Requirement::all(vec![]).evaluate(&report));
    assert!(!Requirement::any(vec![]).evaluate(&report));
    assert!((!Requirement::any(vec![])).evaluate(&report));
}

proptest! {
    #[test]
    fn prop_constant_trees_follow_truth_tables((requirement, expected) in constant_tree()) {
        let report = ReportData::new();
        prop_assert_eq!(requirement.evaluate(&report), expected);
        prop_assert!(requirement.validate().is_ok());
    }

    #[test]
    fn prop_combinators_preserve_semantics(
        (a, x) in constant_tree(),
        (b, y) in constant_tree(),
    ) {
        let report = ReportData::new();
        prop_assert_eq!(a.clone().and(b.clone()).evaluate(&report), x && y);
        prop_assert_eq!(a.clone().or(b.clone()).evaluate(&report), x || y);
        prop_assert_eq!(a.clone().negate().negate().evaluate(&report), x);
        prop_assert_eq!((!a).evaluate(&report), !x);
    }

    #[test]
    fn prop_evaluation_is_pure((requirement, _) in constant_tree(), values in report_values()) {
        let report = build_report(&values);
        let first = requirement.evaluate(&report);
        prop_assert_eq!(first, requirement.evaluate(&report));
        prop_assert_eq!(first, requirement.unfulfilled(&report).is_empty());
    }

    #[test]
    fn prop_boolean_leaves_need_every_property_true(
        values in report_values(),
        selected in prop::collection::btree_set(0usize..4, 0..4),
    ) {
        let report = build_report(&values);
        let properties: Vec<AnalyzedProperty> = selected.iter().map(|i| property(*i)).collect();

        let all_true = selected.iter().all(|i| values[*i] == Some(true));
        let all_false = selected.iter().all(|i| values[*i] == Some(false));
        let all_set = selected.iter().all(|i| values[*i].is_some());

        prop_assert_eq!(Requirement::property_true(properties.clone()).evaluate(&report), all_true);
        prop_assert_eq!(
            Requirement::property_false(properties.clone()).evaluate(&report),
            all_false
        );
        prop_assert_eq!(Requirement::assigned(properties).evaluate(&report), all_set);
    }
}

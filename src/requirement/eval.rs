//! Requirement evaluation against a report snapshot

use super::{Requirement, SizeOperator};
use crate::report::ReportData;

/// Evaluate `requirement` against `report`
///
/// Pure and total: a property without a value never satisfies a leaf.
pub fn evaluate(requirement: &Requirement, report: &ReportData) -> bool {
    match requirement {
        Requirement::AlwaysTrue => true,
        Requirement::AlwaysFalse => false,
        Requirement::BooleanProperty(properties) => {
            properties.iter().all(|p| report.value(p).is_true())
        }
        Requirement::PropertyValue {
            expected,
            properties,
        } => properties.iter().all(|p| report.value(p) == expected),
        Requirement::PropertyAssigned(properties) => {
            properties.iter().all(|p| report.value(p).is_terminal())
        }
        Requirement::PropertyComparator {
            operator,
            property,
            value,
        } => match report.value(property).as_collection() {
            Some(collection) => match operator {
                SizeOperator::Greater => collection.len() > *value,
                SizeOperator::Smaller => collection.len() < *value,
                SizeOperator::Equal => collection.len() == *value,
            },
            None => false,
        },
        Requirement::Parameter { name, accepted } => report
            .parameter(name)
            .map(|actual| accepted.iter().any(|a| a == actual))
            .unwrap_or(false),
        Requirement::Probe(probes) => probes.iter().all(|p| report.is_probe_executed(p)),
        Requirement::And(children) => children.iter().all(|c| evaluate(c, report)),
        Requirement::Or(children) => children.iter().any(|c| evaluate(c, report)),
        Requirement::Not(inner) => !evaluate(inner, report),
        Requirement::Xor(a, b) => evaluate(a, report) != evaluate(b, report),
        Requirement::AtLeast { count, children } => {
            children.iter().filter(|c| evaluate(c, report)).count() >= *count
        }
    }
}

/// Parts of `requirement` that keep it from holding on `report`
///
/// Empty when the requirement holds. Composite nodes are descended into
/// where the failing children explain the failure; negations and xor are
/// reported as a whole.
pub fn unfulfilled(requirement: &Requirement, report: &ReportData) -> Vec<Requirement> {
    if evaluate(requirement, report) {
        return Vec::new();
    }

    match requirement {
        Requirement::And(children)
        | Requirement::Or(children)
        | Requirement::AtLeast { children, .. } => {
            let blocking: Vec<Requirement> = children
                .iter()
                .flat_map(|c| unfulfilled(c, report))
                .collect();
            if blocking.is_empty() {
                // empty Or, or an AtLeast whose count exceeds the satisfied children
                vec![requirement.clone()]
            } else {
                blocking
            }
        }
        _ => vec![requirement.clone()],
    }
}

impl Requirement {
    pub fn evaluate(&self, report: &ReportData) -> bool {
        evaluate(self, report)
    }

    pub fn unfulfilled(&self, report: &ReportData) -> Vec<Requirement> {
        unfulfilled(self, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{AnalyzedProperty, ProbeId, PropertyCategory, PropertyValue};

    fn property(name: &str) -> AnalyzedProperty {
        AnalyzedProperty::new(name, PropertyCategory::new("test"))
    }

    fn report() -> ReportData {
        let mut report = ReportData::new();
        report.set_parameter("transport", "TCP");
        report.put_result(property("CBC"), PropertyValue::True, &ProbeId::new("cipher"));
        report.put_result(property("HEARTBEAT"), PropertyValue::False, &ProbeId::new("ext"));
        report.put_result(
            property("CIPHERS"),
            PropertyValue::Collection(vec![serde_json::json!("A"), serde_json::json!("B")]),
            &ProbeId::new("cipher"),
        );
        report.put_result(property("ERR"), PropertyValue::ErrorDuringProbe, &ProbeId::new("ext"));
        report.mark_executed(&ProbeId::new("cipher"));
        report
    }

    #[test]
    fn test_constant_leaves_and_empty_composites() {
        let report = ReportData::new();
        assert!(Requirement::AlwaysTrue.evaluate(&report));
        assert!(!Requirement::AlwaysFalse.evaluate(&report));
        assert!(Requirement::And(vec![]).evaluate(&report));
        assert!(!Requirement::Or(vec![]).evaluate(&report));
        assert!(Requirement::at_least(0, vec![]).evaluate(&report));
    }

    #[test]
    fn test_property_leaves() {
        let report = report();
        assert!(Requirement::property_true([property("CBC")]).evaluate(&report));
        assert!(
            !Requirement::property_true([property("CBC"), property("HEARTBEAT")]).evaluate(&report)
        );
        assert!(Requirement::property_false([property("HEARTBEAT")]).evaluate(&report));

        // unset and error values never satisfy boolean leaves
        assert!(!Requirement::property_true([property("UNKNOWN")]).evaluate(&report));
        assert!(!Requirement::property_false([property("UNKNOWN")]).evaluate(&report));
        assert!(!Requirement::property_true([property("ERR")]).evaluate(&report));

        assert!(Requirement::assigned([property("ERR"), property("CBC")]).evaluate(&report));
        assert!(!Requirement::assigned([property("UNKNOWN")]).evaluate(&report));
    }

    #[test]
    fn test_size_comparator() {
        let report = report();
        let ciphers = property("CIPHERS");
        assert!(Requirement::size(SizeOperator::Greater, ciphers.clone(), 1).evaluate(&report));
        assert!(Requirement::size(SizeOperator::Equal, ciphers.clone(), 2).evaluate(&report));
        assert!(!Requirement::size(SizeOperator::Smaller, ciphers, 2).evaluate(&report));
        assert!(!Requirement::size(SizeOperator::Equal, property("CBC"), 0).evaluate(&report));
    }

    #[test]
    fn test_parameter_and_probe_leaves() {
        let report = report();
        assert!(Requirement::parameter("transport", ["TCP", "UDP"]).evaluate(&report));
        assert!(!Requirement::parameter("transport", ["UDP"]).evaluate(&report));
        assert!(!Requirement::parameter("starttls", ["SMTP"]).evaluate(&report));

        assert!(Requirement::probe(["cipher"]).evaluate(&report));
        assert!(!Requirement::probe(["cipher", "ext"]).evaluate(&report));
    }

    #[test]
    fn test_composites() {
        let report = report();
        let t = Requirement::AlwaysTrue;
        let f = Requirement::AlwaysFalse;

        assert!(t.clone().xor(f.clone()).evaluate(&report));
        assert!(!t.clone().xor(t.clone()).evaluate(&report));
        assert!(Requirement::at_least(2, vec![t.clone(), f.clone(), t.clone()]).evaluate(&report));
        assert!(!Requirement::at_least(3, vec![t.clone(), f.clone(), t.clone()]).evaluate(&report));
        assert!((!f.clone()).evaluate(&report));
        assert!(t.clone().or(f.clone()).evaluate(&report));
        assert!(!t.and(f).evaluate(&report));
    }

    #[test]
    fn test_unfulfilled_leaves() {
        let report = report();
        let missing = Requirement::property_true([property("HEARTBEAT")]);
        let requirement = Requirement::property_true([property("CBC")])
            .and(missing.clone())
            .and(Requirement::probe(["ext"]));

        assert_eq!(
            requirement.unfulfilled(&report),
            vec![missing, Requirement::probe(["ext"])]
        );
        assert!(Requirement::AlwaysTrue.unfulfilled(&report).is_empty());
        assert_eq!(Requirement::Or(vec![]).unfulfilled(&report), vec![Requirement::Or(vec![])]);
    }
}

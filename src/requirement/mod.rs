//! Probe requirements
//!
//! A requirement is a boolean expression over what the scan has already
//! learned. It is a plain tree: leaves test properties, scan parameters or
//! executed probes; inner nodes combine children. Evaluation is a single
//! exhaustive match in [`eval`], pure and total.

use crate::probe::{AnalyzedProperty, ProbeId, PropertyValue};
use crate::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub mod eval;

/// Operator of a collection size requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeOperator {
    Greater,
    Smaller,
    Equal,
}

impl fmt::Display for SizeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeOperator::Greater => write!(f, "GREATER"),
            SizeOperator::Smaller => write!(f, "SMALLER"),
            SizeOperator::Equal => write!(f, "EQUAL"),
        }
    }
}

/// Precondition tree gating the execution of a probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Requirement {
    /// Always fulfilled
    #[default]
    AlwaysTrue,
    /// Never fulfilled
    AlwaysFalse,
    /// Every listed property is `True`
    BooleanProperty(Vec<AnalyzedProperty>),
    /// Every listed property equals `expected`
    PropertyValue {
        expected: PropertyValue,
        properties: Vec<AnalyzedProperty>,
    },
    /// Every listed property carries a terminal value
    PropertyAssigned(Vec<AnalyzedProperty>),
    /// The property holds a collection whose size compares to `value`
    PropertyComparator {
        operator: SizeOperator,
        property: AnalyzedProperty,
        value: usize,
    },
    /// The raw scan parameter `name` is one of `accepted`
    Parameter { name: String, accepted: Vec<String> },
    /// Every listed probe has run to completion
    Probe(Vec<ProbeId>),
    And(Vec<Requirement>),
    Or(Vec<Requirement>),
    Not(Box<Requirement>),
    Xor(Box<Requirement>, Box<Requirement>),
    /// At least `count` children hold
    AtLeast {
        count: usize,
        children: Vec<Requirement>,
    },
}

impl Requirement {
    pub fn property_true<I>(properties: I) -> Self
    where
        I: IntoIterator<Item = AnalyzedProperty>,
    {
        Requirement::BooleanProperty(properties.into_iter().collect())
    }

    pub fn property_false<I>(properties: I) -> Self
    where
        I: IntoIterator<Item = AnalyzedProperty>,
    {
        Self::property_value(PropertyValue::False, properties)
    }

    pub fn property_value<I>(expected: PropertyValue, properties: I) -> Self
    where
        I: IntoIterator<Item = AnalyzedProperty>,
    {
        Requirement::PropertyValue {
            expected,
            properties: properties.into_iter().collect(),
        }
    }

    pub fn assigned<I>(properties: I) -> Self
    where
        I: IntoIterator<Item = AnalyzedProperty>,
    {
        Requirement::PropertyAssigned(properties.into_iter().collect())
    }

    pub fn size(operator: SizeOperator, property: AnalyzedProperty, value: usize) -> Self {
        Requirement::PropertyComparator {
            operator,
            property,
            value,
        }
    }

    pub fn parameter<I, S>(name: impl Into<String>, accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Requirement::Parameter {
            name: name.into(),
            accepted: accepted.into_iter().map(Into::into).collect(),
        }
    }

    pub fn probe<I, P>(probes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProbeId>,
    {
        Requirement::Probe(probes.into_iter().map(Into::into).collect())
    }

    pub fn all(children: Vec<Requirement>) -> Self {
        Requirement::And(children)
    }

    pub fn any(children: Vec<Requirement>) -> Self {
        Requirement::Or(children)
    }

    pub fn at_least(count: usize, children: Vec<Requirement>) -> Self {
        Requirement::AtLeast { count, children }
    }

    /// Combine with a logical AND, flattening nested ANDs
    pub fn and(self, other: Requirement) -> Self {
        let mut children = Vec::new();
        for requirement in [self, other] {
            match requirement {
                Requirement::And(inner) => children.extend(inner),
                requirement => children.push(requirement),
            }
        }
        Requirement::And(children)
    }

    /// Combine with a logical OR, flattening nested ORs
    pub fn or(self, other: Requirement) -> Self {
        let mut children = Vec::new();
        for requirement in [self, other] {
            match requirement {
                Requirement::Or(inner) => children.extend(inner),
                requirement => children.push(requirement),
            }
        }
        Requirement::Or(children)
    }

    /// Logical negation; a double negation collapses
    pub fn negate(self) -> Self {
        match self {
            Requirement::Not(inner) => *inner,
            requirement => Requirement::Not(Box::new(requirement)),
        }
    }

    pub fn xor(self, other: Requirement) -> Self {
        Requirement::Xor(Box::new(self), Box::new(other))
    }

    /// Reject trees that can only come from programming errors
    pub fn validate(&self) -> Result<()> {
        match self {
            Requirement::AtLeast { count, children } => {
                if *count > children.len() {
                    return Err(ScanError::InvalidRequirement(format!(
                        "{} can never hold: only {} children",
                        self,
                        children.len()
                    )));
                }
                children.iter().try_for_each(Requirement::validate)
            }
            Requirement::And(children) | Requirement::Or(children) => {
                children.iter().try_for_each(Requirement::validate)
            }
            Requirement::Not(inner) => inner.validate(),
            Requirement::Xor(a, b) => {
                a.validate()?;
                b.validate()
            }
            Requirement::Parameter { name, accepted } => {
                if name.is_empty() || accepted.is_empty() {
                    return Err(ScanError::InvalidRequirement(format!(
                        "{} needs a parameter name and accepted values",
                        self
                    )));
                }
                Ok(())
            }
            Requirement::PropertyValue { expected, .. } if !expected.is_terminal() => {
                Err(ScanError::InvalidRequirement(format!(
                    "{} expects an unset value; use not(assigned) instead",
                    self
                )))
            }
            _ => Ok(()),
        }
    }

    /// Properties this requirement looks at
    pub fn referenced_properties(&self) -> BTreeSet<AnalyzedProperty> {
        let mut properties = BTreeSet::new();
        self.collect_properties(&mut properties);
        properties
    }

    fn collect_properties(&self, out: &mut BTreeSet<AnalyzedProperty>) {
        match self {
            Requirement::BooleanProperty(properties)
            | Requirement::PropertyAssigned(properties)
            | Requirement::PropertyValue { properties, .. } => {
                out.extend(properties.iter().cloned());
            }
            Requirement::PropertyComparator { property, .. } => {
                out.insert(property.clone());
            }
            Requirement::And(children)
            | Requirement::Or(children)
            | Requirement::AtLeast { children, .. } => {
                children.iter().for_each(|c| c.collect_properties(out));
            }
            Requirement::Not(inner) => inner.collect_properties(out),
            Requirement::Xor(a, b) => {
                a.collect_properties(out);
                b.collect_properties(out);
            }
            Requirement::AlwaysTrue
            | Requirement::AlwaysFalse
            | Requirement::Parameter { .. }
            | Requirement::Probe(_) => {}
        }
    }
}

impl std::ops::Not for Requirement {
    type Output = Requirement;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

fn join<T: fmt::Display>(items: &[T], separator: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::AlwaysTrue => write!(f, "FulfilledRequirement"),
            Requirement::AlwaysFalse => write!(f, "UnfulfillableRequirement"),
            Requirement::BooleanProperty(properties) => {
                write!(f, "PropertyTrueRequirement[{}]", join(properties, ", "))
            }
            Requirement::PropertyValue {
                expected,
                properties,
            } => write!(
                f,
                "PropertyValueRequirement[{}: {}]",
                expected,
                join(properties, ", ")
            ),
            Requirement::PropertyAssigned(properties) => {
                write!(f, "PropertyRequirement[{}]", join(properties, ", "))
            }
            Requirement::PropertyComparator {
                operator,
                property,
                value,
            } => write!(
                f,
                "PropertyComparatorRequirement[{} {} {}]",
                property, operator, value
            ),
            Requirement::Parameter { name, accepted } => {
                write!(f, "ParameterRequirement[{}: {}]", name, accepted.join(", "))
            }
            Requirement::Probe(probes) => write!(f, "ProbeRequirement[{}]", join(probes, ", ")),
            Requirement::And(children) => write!(f, "({})", join(children, " and ")),
            Requirement::Or(children) => write!(f, "({})", join(children, " or ")),
            Requirement::Not(inner) => write!(f, "not({})", inner),
            Requirement::Xor(a, b) => write!(f, "({} xor {})", a, b),
            Requirement::AtLeast { count, children } => {
                write!(f, "atLeast({} of [{}])", count, join(children, ", "))
            }
        }
    }
}

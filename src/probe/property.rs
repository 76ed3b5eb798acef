//! Analyzed properties and the values a scan assigns to them

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Coarse grouping of analyzed properties, e.g. "protocol version"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyCategory(Cow<'static, str>);

impl PropertyCategory {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single fact a scan can learn about a target
///
/// Identity is the name alone: two properties with the same name are the
/// same map key regardless of category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedProperty {
    name: Cow<'static, str>,
    category: PropertyCategory,
}

impl AnalyzedProperty {
    /// Declare a property in a `const` context
    pub const fn from_static(name: &'static str, category: PropertyCategory) -> Self {
        Self {
            name: Cow::Borrowed(name),
            category,
        }
    }

    pub fn new(name: impl Into<String>, category: PropertyCategory) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            category,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &PropertyCategory {
        &self.category
    }
}

impl PartialEq for AnalyzedProperty {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for AnalyzedProperty {}

impl Hash for AnalyzedProperty {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for AnalyzedProperty {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AnalyzedProperty {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for AnalyzedProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Value of an analyzed property in the report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyValue {
    /// Nothing known yet; never stored, only returned for missing keys
    #[default]
    Unset,
    True,
    False,
    /// The responsible probe failed or timed out
    ErrorDuringProbe,
    /// The target does not support what is needed to answer the question
    UnsupportedByTarget,
    /// The responsible probe never ran
    CouldNotTest,
    NotApplicable(String),
    Integer(i64),
    Text(String),
    Collection(Vec<serde_json::Value>),
}

impl PropertyValue {
    pub fn from_bool(value: bool) -> Self {
        if value {
            PropertyValue::True
        } else {
            PropertyValue::False
        }
    }

    /// Everything except `Unset` is a terminal value
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PropertyValue::Unset)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, PropertyValue::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, PropertyValue::False)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::True => Some(true),
            PropertyValue::False => Some(false),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[serde_json::Value]> {
        match self {
            PropertyValue::Collection(values) => Some(values),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::from_bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<Vec<serde_json::Value>> for PropertyValue {
    fn from(values: Vec<serde_json::Value>) -> Self {
        PropertyValue::Collection(values)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Unset => write!(f, "UNSET"),
            PropertyValue::True => write!(f, "TRUE"),
            PropertyValue::False => write!(f, "FALSE"),
            PropertyValue::ErrorDuringProbe => write!(f, "ERROR_DURING_PROBE"),
            PropertyValue::UnsupportedByTarget => write!(f, "UNSUPPORTED_BY_TARGET"),
            PropertyValue::CouldNotTest => write!(f, "COULD_NOT_TEST"),
            PropertyValue::NotApplicable(reason) => write!(f, "NOT_APPLICABLE({})", reason),
            PropertyValue::Integer(value) => write!(f, "{}", value),
            PropertyValue::Text(value) => write!(f, "{}", value),
            PropertyValue::Collection(values) => write!(f, "[{} entries]", values.len()),
        }
    }
}

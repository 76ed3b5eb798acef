//! Probe results handed back to the orchestrator for merging

use super::property::{AnalyzedProperty, PropertyValue};
use crate::vector::ResponseVector;
use std::collections::BTreeMap;

/// Everything a probe learned during one execution
///
/// Probes never write to the report themselves; the orchestrator merges
/// the result so all writes go through one place.
#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    values: BTreeMap<AnalyzedProperty, PropertyValue>,
    raw_outputs: Vec<serde_json::Value>,
    vectors: Vec<ResponseVector>,
}

impl ProbeResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property value; `Unset` removes a previously put value
    pub fn put(
        &mut self,
        property: AnalyzedProperty,
        value: impl Into<PropertyValue>,
    ) -> &mut Self {
        match value.into() {
            PropertyValue::Unset => {
                self.values.remove(&property);
            }
            value => {
                self.values.insert(property, value);
            }
        }
        self
    }

    pub fn put_bool(&mut self, property: AnalyzedProperty, value: bool) -> &mut Self {
        self.put(property, PropertyValue::from_bool(value))
    }

    /// Put `value` only if `determining` was put as `True` in this result,
    /// otherwise mark `property` as not applicable with `reason`
    pub fn put_if_true(
        &mut self,
        determining: &AnalyzedProperty,
        property: AnalyzedProperty,
        value: impl Into<PropertyValue>,
        reason: &str,
    ) -> &mut Self {
        self.put_if_equal(determining, property, value, reason, PropertyValue::True)
    }

    /// Put `value` only if `determining` was put as `False` in this result
    pub fn put_if_false(
        &mut self,
        determining: &AnalyzedProperty,
        property: AnalyzedProperty,
        value: impl Into<PropertyValue>,
        reason: &str,
    ) -> &mut Self {
        self.put_if_equal(determining, property, value, reason, PropertyValue::False)
    }

    fn put_if_equal(
        &mut self,
        determining: &AnalyzedProperty,
        property: AnalyzedProperty,
        value: impl Into<PropertyValue>,
        reason: &str,
        expected: PropertyValue,
    ) -> &mut Self {
        if self.value(determining) == &expected {
            self.put(property, value)
        } else {
            self.put(property, PropertyValue::NotApplicable(reason.to_string()))
        }
    }

    /// Attach an arbitrary structured output
    pub fn add_raw(&mut self, output: serde_json::Value) -> &mut Self {
        self.raw_outputs.push(output);
        self
    }

    /// Attach a captured response vector
    pub fn add_vector(&mut self, vector: ResponseVector) -> &mut Self {
        self.vectors.push(vector);
        self
    }

    pub fn add_vectors<I>(&mut self, vectors: I) -> &mut Self
    where
        I: IntoIterator<Item = ResponseVector>,
    {
        self.vectors.extend(vectors);
        self
    }

    pub fn value(&self, property: &AnalyzedProperty) -> &PropertyValue {
        static UNSET: PropertyValue = PropertyValue::Unset;
        self.values.get(property).unwrap_or(&UNSET)
    }

    pub fn values(&self) -> &BTreeMap<AnalyzedProperty, PropertyValue> {
        &self.values
    }

    pub fn raw_outputs(&self) -> &[serde_json::Value] {
        &self.raw_outputs
    }

    pub fn vectors(&self) -> &[ResponseVector] {
        &self.vectors
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        BTreeMap<AnalyzedProperty, PropertyValue>,
        Vec<serde_json::Value>,
        Vec<ResponseVector>,
    ) {
        (self.values, self.raw_outputs, self.vectors)
    }
}

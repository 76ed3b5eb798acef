//! Passive statistics
//!
//! Besides answering their own questions, probes observe values that are
//! only interesting across the whole scan, such as server random nonces or
//! session ids. Every probe gets its own [`StatsWriter`] through its
//! context. Once the probe phase is over the orchestrator merges the writers
//! per [`TrackableValue`] into the report, before any AfterProbe runs.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Kind of value tracked across connections, e.g. "SERVER_RANDOM"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackableValue(Cow<'static, str>);

impl TrackableValue {
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

impl fmt::Display for TrackableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Values of one [`TrackableValue`] in observation order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedValueContainer {
    values: Vec<serde_json::Value>,
}

impl ExtractedValueContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, value: impl Into<serde_json::Value>) {
        self.values.push(value.into());
    }

    pub fn values(&self) -> &[serde_json::Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True for zero or one value, or when every value equals the first
    pub fn are_all_values_identical(&self) -> bool {
        match self.values.split_first() {
            Some((first, rest)) => rest.iter().all(|v| v == first),
            None => true,
        }
    }

    /// True when no value was observed twice
    pub fn are_all_values_different(&self) -> bool {
        let distinct: BTreeSet<String> = self.values.iter().map(ToString::to_string).collect();
        distinct.len() == self.values.len()
    }

    pub fn extend<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = serde_json::Value>,
    {
        self.values.extend(values);
    }
}

/// Pulls trackable values out of a protocol state
///
/// `S` is whatever the probe's protocol stack exposes after a connection;
/// the core never looks inside it.
pub trait StatExtractor<S: ?Sized>: Send + Sync {
    fn value_type(&self) -> TrackableValue;

    /// Values observed in `state`, possibly none
    fn extract(&self, state: &S) -> Vec<serde_json::Value>;
}

/// Per-probe collection of passive statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsWriter {
    containers: BTreeMap<TrackableValue, ExtractedValueContainer>,
    state_counter: usize,
}

impl StatsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, value_type: TrackableValue, value: impl Into<serde_json::Value>) {
        self.containers.entry(value_type).or_default().put(value);
    }

    /// Run every extractor over one finished connection state
    pub fn extract<S: ?Sized>(&mut self, state: &S, extractors: &[&dyn StatExtractor<S>]) {
        for extractor in extractors {
            let values = extractor.extract(state);
            let container = self.containers.entry(extractor.value_type()).or_default();
            for value in values {
                container.put(value);
            }
        }
        self.state_counter += 1;
    }

    /// Count a connection that carried nothing worth extracting
    pub fn count_state(&mut self) {
        self.state_counter += 1;
    }

    pub fn state_counter(&self) -> usize {
        self.state_counter
    }

    pub fn containers(&self) -> &BTreeMap<TrackableValue, ExtractedValueContainer> {
        &self.containers
    }

    pub fn container(&self, value_type: &TrackableValue) -> Option<&ExtractedValueContainer> {
        self.containers.get(value_type)
    }

    pub fn is_empty(&self) -> bool {
        self.state_counter == 0 && self.containers.is_empty()
    }

    /// Append everything `other` collected; values keep their order
    pub fn merge(&mut self, other: StatsWriter) {
        for (value_type, container) in other.containers {
            self.containers.entry(value_type).or_default().extend(container.values);
        }
        self.state_counter += other.state_counter;
    }

    pub fn into_parts(self) -> (BTreeMap<TrackableValue, ExtractedValueContainer>, usize) {
        (self.containers, self.state_counter)
    }
}

/// [`StatsWriter`] shared between a running probe and the orchestrator
///
/// Survives the probe task, so statistics gathered before a failure or a
/// cancellation still reach the report.
#[derive(Debug, Clone, Default)]
pub struct SharedStatsWriter(Arc<Mutex<StatsWriter>>);

impl SharedStatsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the writer; a panicked probe leaves its values usable
    pub fn lock(&self) -> MutexGuard<'_, StatsWriter> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the collected statistics out, leaving an empty writer
    pub fn take(&self) -> StatsWriter {
        std::mem::take(&mut *self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SERVER_RANDOM: TrackableValue = TrackableValue::from_static("SERVER_RANDOM");
    const SESSION_ID: TrackableValue = TrackableValue::from_static("SESSION_ID");

    struct Handshake {
        random: &'static str,
        session: Option<&'static str>,
    }

    struct RandomExtractor;

    impl StatExtractor<Handshake> for RandomExtractor {
        fn value_type(&self) -> TrackableValue {
            SERVER_RANDOM
        }

        fn extract(&self, state: &Handshake) -> Vec<serde_json::Value> {
            vec![json!(state.random)]
        }
    }

    struct SessionExtractor;

    impl StatExtractor<Handshake> for SessionExtractor {
        fn value_type(&self) -> TrackableValue {
            SESSION_ID
        }

        fn extract(&self, state: &Handshake) -> Vec<serde_json::Value> {
            state.session.map(|s| json!(s)).into_iter().collect()
        }
    }

    #[test]
    fn test_container_identity_checks() {
        let mut container = ExtractedValueContainer::new();
        assert!(container.are_all_values_identical());
        assert!(container.are_all_values_different());

        container.put("aa");
        container.put("bb");
        assert!(!container.are_all_values_identical());
        assert!(container.are_all_values_different());

        container.put("aa");
        assert!(!container.are_all_values_different());
        assert_eq!(container.len(), 3);
    }

    #[test]
    fn test_extractors_run_per_state() {
        let extractors: [&dyn StatExtractor<Handshake>; 2] = [&RandomExtractor, &SessionExtractor];
        let mut writer = StatsWriter::new();

        writer.extract(&Handshake { random: "01", session: Some("s1") }, &extractors);
        writer.extract(&Handshake { random: "02", session: None }, &extractors);
        writer.count_state();

        assert_eq!(writer.state_counter(), 3);
        assert_eq!(writer.container(&SERVER_RANDOM).map(|c| c.len()), Some(2));
        assert_eq!(writer.container(&SESSION_ID).map(|c| c.len()), Some(1));
    }

    #[test]
    fn test_merge_keeps_order_per_value_type() {
        let mut first = StatsWriter::new();
        first.put(SERVER_RANDOM, "01");
        first.count_state();

        let mut second = StatsWriter::new();
        second.put(SERVER_RANDOM, "02");
        second.put(SESSION_ID, "s2");
        second.count_state();
        second.count_state();

        first.merge(second);
        assert_eq!(first.state_counter(), 3);
        assert_eq!(
            first.container(&SERVER_RANDOM).map(|c| c.values().to_vec()),
            Some(vec![json!("01"), json!("02")])
        );
        assert!(first.container(&SESSION_ID).is_some());
    }

    #[test]
    fn test_shared_writer_take() {
        let shared = SharedStatsWriter::new();
        shared.lock().put(SESSION_ID, "s1");

        let taken = shared.take();
        assert_eq!(taken.container(&SESSION_ID).map(|c| c.len()), Some(1));
        assert!(shared.lock().is_empty());
    }
}

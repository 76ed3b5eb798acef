//! Scan-scoped report
//!
//! [`ReportData`] holds everything a scan learned. [`ScanReport`] is the
//! shared handle the orchestrator mutates; [`ReportSnapshot`] is the
//! immutable view handed to probes for requirement evaluation and returned
//! to the caller once the scan is over.

use crate::passive::{ExtractedValueContainer, StatsWriter, TrackableValue};
use crate::probe::{AnalyzedProperty, ProbeId, ProbeResult, PropertyValue};
use crate::vector::ResponseVector;
use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

pub mod execution;

pub use execution::{PerformanceData, ProbeRecord, ProbeState, WriteConflict};

static UNSET: PropertyValue = PropertyValue::Unset;

/// Everything a scan learned about its target
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    scan_id: Uuid,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    parameters: BTreeMap<String, String>,
    #[serde(serialize_with = "serialize_properties")]
    properties: BTreeMap<AnalyzedProperty, PropertyValue>,
    raw_outputs: BTreeMap<ProbeId, Vec<serde_json::Value>>,
    vectors: BTreeMap<ProbeId, Vec<ResponseVector>>,
    extracted_values: BTreeMap<TrackableValue, ExtractedValueContainer>,
    performed_connections: usize,
    executed: BTreeSet<ProbeId>,
    unexecuted: BTreeSet<ProbeId>,
    probe_log: Vec<ProbeRecord>,
    performance: Vec<PerformanceData>,
    conflicts: Vec<WriteConflict>,
}

fn serialize_properties<S>(
    properties: &BTreeMap<AnalyzedProperty, PropertyValue>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(properties.len()))?;
    for (property, value) in properties {
        map.serialize_entry(property.name(), value)?;
    }
    map.end()
}

impl Default for ReportData {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportData {
    pub fn new() -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            started_at: None,
            finished_at: None,
            parameters: BTreeMap::new(),
            properties: BTreeMap::new(),
            raw_outputs: BTreeMap::new(),
            vectors: BTreeMap::new(),
            extracted_values: BTreeMap::new(),
            performed_connections: 0,
            executed: BTreeSet::new(),
            unexecuted: BTreeSet::new(),
            probe_log: Vec::new(),
            performance: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn scan_id(&self) -> Uuid {
        self.scan_id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn mark_started(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub fn mark_finished(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Set a raw scan parameter read by `Parameter` requirements
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(name.into(), value.into());
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Current value of a property, `Unset` when nothing was written
    pub fn value(&self, property: &AnalyzedProperty) -> &PropertyValue {
        self.properties.get(property).unwrap_or(&UNSET)
    }

    pub fn properties(&self) -> &BTreeMap<AnalyzedProperty, PropertyValue> {
        &self.properties
    }

    /// Terminal write with first-writer-wins semantics
    ///
    /// Returns whether the value was stored. A differing second write is
    /// rejected and kept as a [`WriteConflict`] diagnostic.
    pub fn put_result(
        &mut self,
        property: AnalyzedProperty,
        value: PropertyValue,
        writer: &ProbeId,
    ) -> bool {
        if !value.is_terminal() {
            return false;
        }

        match self.properties.get(&property) {
            None => {
                self.properties.insert(property, value);
                true
            }
            Some(kept) if kept == &value => false,
            Some(kept) => {
                let conflict = WriteConflict {
                    property,
                    kept: kept.clone(),
                    rejected: value,
                    writer: writer.clone(),
                };
                warn!("Conflicting write: {}", conflict);
                self.conflicts.push(conflict);
                false
            }
        }
    }

    /// Overwriting write for derived properties
    ///
    /// Only reachable through `&mut ReportData`, which outside the
    /// orchestrator is only handed to AfterProbes. `Unset` clears the value.
    pub fn put_derived(&mut self, property: AnalyzedProperty, value: PropertyValue) {
        if value.is_terminal() {
            self.properties.insert(property, value);
        } else {
            self.properties.remove(&property);
        }
    }

    /// Merge a probe result into the report
    ///
    /// Values for properties the probe did not declare are merged anyway but
    /// logged, since they point at a broken probe.
    pub fn merge_probe_result(
        &mut self,
        probe: &ProbeId,
        declared: &[AnalyzedProperty],
        result: ProbeResult,
    ) {
        let (values, raw_outputs, vectors) = result.into_parts();

        for (property, value) in values {
            if !declared.is_empty() && !declared.contains(&property) {
                error!(
                    "Probe {} set property {} it does not declare",
                    probe, property
                );
            }
            self.put_result(property, value, probe);
        }

        // declared but never answered
        for property in declared {
            if !self.value(property).is_terminal() {
                debug!("Probe {} left {} unset", probe, property);
            }
        }

        if !raw_outputs.is_empty() {
            self.raw_outputs
                .entry(probe.clone())
                .or_default()
                .extend(raw_outputs);
        }
        self.add_vectors(probe, vectors);
    }

    /// Give every still unset property in `properties` the value `value`
    pub fn fill_unset(
        &mut self,
        properties: &[AnalyzedProperty],
        value: PropertyValue,
        writer: &ProbeId,
    ) {
        for property in properties {
            if !self.value(property).is_terminal() {
                self.put_result(property.clone(), value.clone(), writer);
            }
        }
    }

    pub fn raw_outputs(&self, probe: &ProbeId) -> &[serde_json::Value] {
        self.raw_outputs.get(probe).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_vectors<I>(&mut self, probe: &ProbeId, vectors: I)
    where
        I: IntoIterator<Item = ResponseVector>,
    {
        let mut vectors = vectors.into_iter().peekable();
        if vectors.peek().is_some() {
            self.vectors.entry(probe.clone()).or_default().extend(vectors);
        }
    }

    /// Response vectors captured by `probe`
    pub fn vectors(&self, probe: &ProbeId) -> &[ResponseVector] {
        self.vectors.get(probe).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Merge the passive statistics of the probe phase
    ///
    /// Containers of the same value type are appended in merge order and
    /// the connection counts add up.
    pub fn put_statistics(&mut self, statistics: StatsWriter) {
        let (containers, connections) = statistics.into_parts();
        for (value_type, container) in containers {
            self.extracted_values
                .entry(value_type)
                .or_default()
                .extend(container.values().iter().cloned());
        }
        self.performed_connections += connections;
    }

    pub fn extracted_values(
        &self,
        value_type: &TrackableValue,
    ) -> Option<&ExtractedValueContainer> {
        self.extracted_values.get(value_type)
    }

    pub fn extracted_value_containers(
        &self,
    ) -> &BTreeMap<TrackableValue, ExtractedValueContainer> {
        &self.extracted_values
    }

    /// Connections the probes reported to their statistics writers
    pub fn performed_connections(&self) -> usize {
        self.performed_connections
    }

    /// Record a probe reaching a terminal state
    ///
    /// Done and failed probes both count as executed for `Probe`
    /// requirement leaves.
    pub fn record_probe(&mut self, record: ProbeRecord) {
        self.executed.insert(record.probe.clone());
        self.unexecuted.remove(&record.probe);
        self.probe_log.push(record);
    }

    /// Record the outcome of a probe that was never dispatched
    pub fn record_skipped(&mut self, record: ProbeRecord) {
        self.mark_unexecuted(&record.probe);
        self.probe_log.push(record);
    }

    /// Register a probe that has not run yet
    pub fn mark_unexecuted(&mut self, probe: &ProbeId) {
        if !self.executed.contains(probe) {
            self.unexecuted.insert(probe.clone());
        }
    }

    pub fn mark_executed(&mut self, probe: &ProbeId) {
        self.unexecuted.remove(probe);
        self.executed.insert(probe.clone());
    }

    pub fn is_probe_executed(&self, probe: &ProbeId) -> bool {
        self.executed.contains(probe)
    }

    pub fn executed_probes(&self) -> &BTreeSet<ProbeId> {
        &self.executed
    }

    pub fn unexecuted_probes(&self) -> &BTreeSet<ProbeId> {
        &self.unexecuted
    }

    pub fn probe_log(&self) -> &[ProbeRecord] {
        &self.probe_log
    }

    /// Latest record for `probe`
    pub fn probe_record(&self, probe: &ProbeId) -> Option<&ProbeRecord> {
        self.probe_log.iter().rev().find(|r| &r.probe == probe)
    }

    pub fn record_performance(&mut self, data: PerformanceData) {
        self.performance.push(data);
    }

    pub fn performance(&self) -> &[PerformanceData] {
        &self.performance
    }

    pub fn conflicts(&self) -> &[WriteConflict] {
        &self.conflicts
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Immutable, cheaply clonable view of a report
///
/// Used as the consistent snapshot for requirement evaluation and as the
/// frozen report once a scan is over.
#[derive(Debug, Clone, Default)]
pub struct ReportSnapshot(Arc<ReportData>);

impl ReportSnapshot {
    pub fn new(data: ReportData) -> Self {
        Self(Arc::new(data))
    }

    /// Copy of the underlying data, for callers that want to keep working on it
    pub fn to_data(&self) -> ReportData {
        self.0.as_ref().clone()
    }
}

impl Deref for ReportSnapshot {
    type Target = ReportData;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<ReportData> for ReportSnapshot {
    fn from(data: ReportData) -> Self {
        Self::new(data)
    }
}

impl Serialize for ReportSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Shared handle on the report of a running scan
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    inner: Arc<RwLock<ReportData>>,
}

impl ScanReport {
    pub fn new(data: ReportData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ReportData> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, ReportData> {
        self.inner.write().await
    }

    /// Run `f` with exclusive access to the report
    pub async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ReportData) -> R,
    {
        let mut data = self.inner.write().await;
        f(&mut data)
    }

    /// Consistent copy of the current state
    pub async fn snapshot(&self) -> ReportSnapshot {
        ReportSnapshot::new(self.inner.read().await.clone())
    }

    /// Immutable view handed to the consumer once the scan is over
    pub async fn freeze(&self) -> ReportSnapshot {
        let mut data = self.inner.write().await;
        if data.finished_at.is_none() {
            data.mark_finished();
        }
        ReportSnapshot::new(data.clone())
    }
}

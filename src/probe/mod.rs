//! Probe contract
//!
//! A probe gathers one or more facts about a target, usually through
//! network interaction. Concrete probes live outside this crate; this module
//! owns the contract they implement:
//! - a stable [`ProbeId`]
//! - a [`Requirement`] gating when the probe may run
//! - the set of [`AnalyzedProperty`] values it is responsible for
//! - an async `execute` returning a [`ProbeResult`] for the orchestrator to merge

use crate::config::ScannerDetail;
use crate::passive::{SharedStatsWriter, StatExtractor, TrackableValue};
use crate::report::ReportSnapshot;
use crate::requirement::Requirement;
use crate::{Result, ScanError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub mod property;
pub mod result;

pub use property::{AnalyzedProperty, PropertyCategory, PropertyValue};
pub use result::ProbeResult;

/// Identity of a probe within a scan
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProbeId(Cow<'static, str>);

impl ProbeId {
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

impl From<&str> for ProbeId {
    fn from(name: &str) -> Self {
        ProbeId::new(name)
    }
}

impl From<String> for ProbeId {
    fn from(name: String) -> Self {
        ProbeId::new(name)
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution context handed to a probe
///
/// Cancellation is cooperative: the orchestrator triggers the token on the
/// scan deadline, the probe's own bound or an abort, then gives the probe a
/// grace period to return before dropping it.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    probe: ProbeId,
    cancel: CancellationToken,
    deadline: Instant,
    detail: ScannerDetail,
    stats: SharedStatsWriter,
}

impl ProbeContext {
    pub fn new(probe: ProbeId, cancel: CancellationToken, timeout: Duration) -> Self {
        Self {
            probe,
            cancel,
            deadline: Instant::now() + timeout,
            detail: ScannerDetail::default(),
            stats: SharedStatsWriter::new(),
        }
    }

    /// Cap the deadline at `limit`, e.g. the global scan deadline
    pub fn bounded_by(mut self, limit: Option<Instant>) -> Self {
        if let Some(limit) = limit {
            self.deadline = self.deadline.min(limit);
        }
        self
    }

    pub fn with_detail(mut self, detail: ScannerDetail) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_stats(mut self, stats: SharedStatsWriter) -> Self {
        self.stats = stats;
        self
    }

    pub fn probe(&self) -> &ProbeId {
        &self.probe
    }

    /// How thorough the probe should be
    pub fn detail(&self) -> ScannerDetail {
        self.detail
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Check for cancellation at an I/O boundary
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the probe has been asked to stop
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Time left before the earlier of the probe's own bound and the scan
    /// deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Record a passively observed value
    pub fn extract(&self, value_type: TrackableValue, value: impl Into<serde_json::Value>) {
        self.stats.lock().put(value_type, value);
    }

    /// Run `extractors` over the state of one finished connection
    pub fn extract_state<S: ?Sized>(&self, state: &S, extractors: &[&dyn StatExtractor<S>]) {
        self.stats.lock().extract(state, extractors);
    }

    /// Count a connection without extracting anything from it
    pub fn count_connection(&self) {
        self.stats.lock().count_state();
    }
}

/// A unit of work that learns facts about a target
///
/// `T` is the opaque target handle supplied by the caller; the core never
/// looks inside it.
#[async_trait]
pub trait Probe<T>: Send + Sync
where
    T: Send + Sync + ?Sized,
{
    /// Stable identity, also used by `Requirement::Probe` leaves
    fn id(&self) -> ProbeId;

    /// Precondition that has to hold before the probe is dispatched
    fn requirement(&self) -> Requirement {
        Requirement::AlwaysTrue
    }

    /// Properties this probe is responsible for
    fn properties(&self) -> Vec<AnalyzedProperty> {
        Vec::new()
    }

    /// Whether the probe is registered when no explicit probe list is configured
    fn execute_by_default(&self) -> bool {
        true
    }

    /// Called right before dispatch with the snapshot the requirement held on
    fn adjust(&self, _snapshot: &ReportSnapshot) {}

    /// Run the probe against the target
    async fn execute(
        &self,
        target: &T,
        snapshot: &ReportSnapshot,
        ctx: &ProbeContext,
    ) -> anyhow::Result<ProbeResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_id_conversions() {
        const CIPHER: ProbeId = ProbeId::from_static("cipher_suite");
        assert_eq!(ProbeId::from("cipher_suite"), CIPHER);
        assert_eq!(ProbeId::from("x".to_string()).name(), "x");
        assert_eq!(CIPHER.to_string(), "cipher_suite");
    }

    #[tokio::test]
    async fn test_context_cancellation() {
        let token = CancellationToken::new();
        let ctx = ProbeContext::new(
            ProbeId::new("heartbleed"),
            token.child_token(),
            Duration::from_secs(5),
        );

        assert!(ctx.checkpoint().is_ok());
        assert!(ctx.remaining() <= Duration::from_secs(5));
        assert_eq!(ctx.detail(), ScannerDetail::Normal);

        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.checkpoint(), Err(ScanError::Cancelled)));
        ctx.cancelled().await;
    }

    #[tokio::test]
    async fn test_deadline_is_capped_by_scan_deadline() {
        let scan_deadline = Instant::now() + Duration::from_millis(100);
        let ctx = ProbeContext::new(
            ProbeId::new("cipher"),
            CancellationToken::new(),
            Duration::from_secs(60),
        )
        .bounded_by(Some(scan_deadline))
        .with_detail(ScannerDetail::Detailed);

        assert_eq!(ctx.deadline(), scan_deadline);
        assert!(ctx.remaining() <= Duration::from_millis(100));
        assert_eq!(ctx.detail(), ScannerDetail::Detailed);

        let unbounded = ProbeContext::new(
            ProbeId::new("cipher"),
            CancellationToken::new(),
            Duration::from_millis(10),
        )
        .bounded_by(Some(Instant::now() + Duration::from_secs(60)));
        assert!(unbounded.remaining() <= Duration::from_millis(10));
    }

    #[test]
    fn test_context_collects_statistics() {
        let stats = SharedStatsWriter::new();
        let ctx = ProbeContext::new(
            ProbeId::new("resumption"),
            CancellationToken::new(),
            Duration::from_secs(1),
        )
        .with_stats(stats.clone());

        ctx.extract(TrackableValue::new("SESSION_ID"), "0a0b");
        ctx.count_connection();

        let collected = stats.take();
        assert_eq!(collected.state_counter(), 1);
        assert_eq!(collected.containers().len(), 1);
    }
}

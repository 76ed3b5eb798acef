//! Execution log entries kept alongside the property map

use crate::error::FailureReason;
use crate::probe::{AnalyzedProperty, ProbeId, PropertyValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a probe within one scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeState {
    Pending,
    Runnable,
    Running,
    Done,
    Failed,
}

impl ProbeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProbeState::Done | ProbeState::Failed)
    }
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeState::Pending => "pending",
            ProbeState::Runnable => "runnable",
            ProbeState::Running => "running",
            ProbeState::Done => "done",
            ProbeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of one probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub probe: ProbeId,
    pub state: ProbeState,
    pub failure: Option<FailureReason>,
    pub duration_ms: Option<u64>,
}

impl ProbeRecord {
    pub fn done(probe: ProbeId, duration: Duration) -> Self {
        Self {
            probe,
            state: ProbeState::Done,
            failure: None,
            duration_ms: Some(duration.as_millis() as u64),
        }
    }

    pub fn failed(probe: ProbeId, reason: FailureReason, duration: Option<Duration>) -> Self {
        Self {
            probe,
            state: ProbeState::Failed,
            failure: Some(reason),
            duration_ms: duration.map(|d| d.as_millis() as u64),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ProbeState::Done
    }
}

/// Wall clock timing of one probe execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceData {
    pub probe: ProbeId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PerformanceData {
    pub fn new(probe: ProbeId, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self {
            probe,
            started_at,
            finished_at,
        }
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// A terminal write rejected because the property already had a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteConflict {
    pub property: AnalyzedProperty,
    pub kept: PropertyValue,
    pub rejected: PropertyValue,
    pub writer: ProbeId,
}

impl fmt::Display for WriteConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} kept {} and rejected {} from {}",
            self.property, self.kept, self.rejected, self.writer
        )
    }
}

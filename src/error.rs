//! Error handling for the scan core
//!
//! Target-induced failures never leave this crate as errors: they are
//! contained at the probe boundary and recorded in the report as a
//! [`FailureReason`]. Only misuse by the caller (malformed requirement trees,
//! duplicate probes, bad configuration) surfaces as a [`ScanError`]; bad
//! comparison input is a [`ComparisonError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for scan core operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("Duplicate probe registered: {0}")]
    DuplicateProbe(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Precondition violations of the response equality analyzer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComparisonError {
    #[error("response vector {index} is empty")]
    EmptyVector { index: usize },

    #[error("vector {index}: record {record} declares {declared} bytes but carries {actual}")]
    MalformedRecord {
        index: usize,
        record: usize,
        declared: usize,
        actual: usize,
    },

    #[error("at least two response vectors are required, got {0}")]
    NotEnoughVectors(usize),
}

/// Why a probe ended in the failed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The probe returned an error
    ExecutionError(String),
    /// The probe exceeded its own bound or the global scan deadline
    Timeout,
    /// Cancelled before completing, without a deadline being involved
    Cancelled,
    /// The requirement did not hold at the scheduling fixed point
    RequirementNeverSatisfied(String),
    /// The probe task panicked
    Panicked(String),
    /// Not dispatched because the scan aborted after another failure
    Aborted,
}

impl FailureReason {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FailureReason::Timeout)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ExecutionError(msg) => write!(f, "execution error: {}", msg),
            FailureReason::Timeout => write!(f, "timeout"),
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::RequirementNeverSatisfied(req) => {
                write!(f, "requirement never satisfied: {}", req)
            }
            FailureReason::Panicked(msg) => write!(f, "panicked: {}", msg),
            FailureReason::Aborted => write!(f, "aborted"),
        }
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(e: toml::de::Error) -> Self {
        ScanError::ConfigError(e.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(e: serde_json::Error) -> Self {
        ScanError::ParseError(e.to_string())
    }
}

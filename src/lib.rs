//! scancore - the analysis core of a protocol-security scanner
//!
//! Decides which probes may run against a target (requirement graph over
//! already observed properties), runs them on a bounded worker pool, merges
//! their findings into a scan-scoped report and derives secondary verdicts
//! afterwards, including response-oracle detection through the response
//! equality analyzer and an optional significance test over repeated
//! measurements.

pub mod afterprobe;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod passive;
pub mod probe;
pub mod report;
pub mod requirement;
pub mod utils;
pub mod vector;

// Re-export commonly used types
pub use afterprobe::{
    AfterProbe, AfterProbePipeline, DerivedPropertyAfterProbe, ResponseOracleAfterProbe,
};
pub use config::{ExecutorConfig, ScannerDetail};
pub use error::{ComparisonError, FailureReason, ScanError};
pub use orchestrator::{ScanHooks, ScanOrchestrator, ScanOutcome, Scanner};
pub use passive::{ExtractedValueContainer, StatExtractor, StatsWriter, TrackableValue};
pub use probe::{AnalyzedProperty, Probe, ProbeContext, ProbeId, ProbeResult, PropertyValue};
pub use report::{ReportData, ReportSnapshot, ScanReport};
pub use requirement::Requirement;
pub use utils::Logger;
pub use vector::{compare, EqualityError, ResponseVector};

pub type Result<T> = std::result::Result<T, ScanError>;

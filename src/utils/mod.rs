//! Logging and progress helpers shared by the orchestrator and the front door

use crate::orchestrator::OrchestratorStats;
use std::time::Duration;
use uuid::Uuid;

/// Progress over the probes of one scan
#[derive(Debug, Clone)]
pub struct ProbeProgress {
    total: usize,
    current: usize,
}

impl ProbeProgress {
    pub fn new(total: usize) -> Self {
        Self { total, current: 0 }
    }

    /// Count one more terminal probe
    pub fn increment(&mut self) -> usize {
        self.current = (self.current + 1).min(self.total);
        self.current
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// `[n/total]` prefix used in probe completion logs
    pub fn render(&self) -> String {
        format!("[{}/{}]", self.current, self.total)
    }
}

/// Logging utilities
pub struct Logger;

impl Logger {
    /// Initialize logger with specified level
    pub fn init(level: log::LevelFilter) {
        env_logger::Builder::from_default_env()
            .filter_level(level)
            .format_timestamp_secs()
            .init();
    }

    /// Like [`Logger::init`] but harmless when a logger is already installed
    pub fn try_init(level: log::LevelFilter) -> bool {
        env_logger::Builder::from_default_env()
            .filter_level(level)
            .format_timestamp_secs()
            .is_test(cfg!(test))
            .try_init()
            .is_ok()
    }

    /// Log scan start
    pub fn log_scan_start(scan_id: Uuid, probes: usize, after_probes: usize) {
        log::info!(
            "Starting scan {} with {} probes and {} after probes",
            scan_id,
            probes,
            after_probes
        );
    }

    /// Log scan completion
    pub fn log_scan_complete(duration: Duration, stats: &OrchestratorStats) {
        log::info!(
            "Scan completed in {:.2}s - {}/{} probes done, {} failed \
             ({} timed out, {} never runnable)",
            duration.as_secs_f64(),
            stats.completed,
            stats.total_probes,
            stats.failed,
            stats.timed_out,
            stats.never_runnable
        );
    }

    /// Log probe timing statistics
    pub fn log_performance(stats: &OrchestratorStats) {
        log::info!(
            "Performance: {} rounds, {:.1}% success, avg probe {}ms (min {}ms, max {}ms)",
            stats.rounds,
            stats.success_rate(),
            stats.average_duration().as_millis(),
            stats.min_duration.unwrap_or_default().as_millis(),
            stats.max_duration.unwrap_or_default().as_millis()
        );
    }
}

//! Execution statistics of one orchestrator run

use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct OrchestratorStats {
    pub total_probes: usize,
    /// Scheduling passes that dispatched at least one probe
    pub rounds: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub never_runnable: usize,
    pub aborted: usize,
    pub panicked: usize,
    pub total_duration: Duration,
    pub min_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
    measured: usize,
}

impl OrchestratorStats {
    pub fn new(total_probes: usize) -> Self {
        Self {
            total_probes,
            ..Self::default()
        }
    }

    /// Account the wall clock time of one executed probe
    pub fn record_duration(&mut self, duration: Duration) {
        self.measured += 1;
        self.total_duration += duration;
        self.min_duration = Some(self.min_duration.map_or(duration, |d| d.min(duration)));
        self.max_duration = Some(self.max_duration.map_or(duration, |d| d.max(duration)));
    }

    /// Calculate average probe execution time
    pub fn average_duration(&self) -> Duration {
        if self.measured > 0 {
            self.total_duration / self.measured as u32
        } else {
            Duration::from_secs(0)
        }
    }

    /// Share of probes that completed, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total_probes > 0 {
            self.completed as f64 / self.total_probes as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Every probe is accounted for as completed or failed
    pub fn is_settled(&self) -> bool {
        self.completed + self.failed == self.total_probes
    }
}

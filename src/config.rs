//! Configuration module for the scan executor

use crate::probe::ProbeId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// How thorough a scan or post analysis should be
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScannerDetail {
    Quick,
    #[default]
    Normal,
    Detailed,
    All,
}

impl ScannerDetail {
    pub fn level_value(&self) -> u8 {
        match self {
            ScannerDetail::Quick => 25,
            ScannerDetail::Normal => 50,
            ScannerDetail::Detailed => 75,
            ScannerDetail::All => 100,
        }
    }

    pub fn is_greater_equal_to(&self, other: ScannerDetail) -> bool {
        self.level_value() >= other.level_value()
    }
}

/// Main configuration structure for probe execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Number of probes executed concurrently
    pub parallel_probes: usize,

    /// Upper bound for a single probe in milliseconds
    pub probe_timeout_ms: u64,

    /// Deadline for the whole probe phase in milliseconds
    pub scan_timeout_ms: Option<u64>,

    /// Stop dispatching after the first failed probe
    pub abort_on_error: bool,

    /// Interval for re-evaluating requirements while probes are in flight
    pub reevaluation_interval_ms: u64,

    /// Time a cancelled probe gets to wind down before it is dropped
    pub cancellation_grace_ms: u64,

    /// How detailed the probes should scan
    pub scan_detail: ScannerDetail,

    /// How detailed the post analysis should be
    pub post_analysis_detail: ScannerDetail,

    /// Only these probes are registered when set
    pub probes: Option<Vec<ProbeId>>,

    /// Probes that are never registered
    pub excluded_probes: Vec<ProbeId>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallel_probes: default_parallelism(),
            probe_timeout_ms: 1_800_000, // 30 minutes
            scan_timeout_ms: None,
            abort_on_error: false,
            reevaluation_interval_ms: 250,
            cancellation_grace_ms: 2_000,
            scan_detail: ScannerDetail::Normal,
            post_analysis_detail: ScannerDetail::Normal,
            probes: None,
            excluded_probes: Vec::new(),
        }
    }
}

/// Worker count used when nothing is configured
pub fn default_parallelism() -> usize {
    num_cpus::get().clamp(1, 8)
}

impl ExecutorConfig {
    /// Create a new executor configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker pool size
    pub fn with_parallel_probes(mut self, parallel_probes: usize) -> Self {
        self.parallel_probes = parallel_probes;
        self
    }

    /// Set the per-probe timeout
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the global scan deadline
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Abort the scan on the first failed probe
    pub fn with_abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }

    /// Set the requirement re-evaluation interval
    pub fn with_reevaluation_interval(mut self, interval: Duration) -> Self {
        self.reevaluation_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set how long cancelled probes may clean up
    pub fn with_cancellation_grace(mut self, grace: Duration) -> Self {
        self.cancellation_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn with_scan_detail(mut self, detail: ScannerDetail) -> Self {
        self.scan_detail = detail;
        self
    }

    pub fn with_post_analysis_detail(mut self, detail: ScannerDetail) -> Self {
        self.post_analysis_detail = detail;
        self
    }

    /// Restrict the scan to the given probes
    pub fn with_probes<I, P>(mut self, probes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProbeId>,
    {
        self.probes = Some(probes.into_iter().map(Into::into).collect());
        self
    }

    /// Exclude a probe from the scan
    pub fn exclude_probe<P: Into<ProbeId>>(mut self, probe: P) -> Self {
        self.excluded_probes.push(probe.into());
        self
    }

    /// Get the per-probe timeout as Duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Get the global scan deadline as Duration
    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_ms.map(Duration::from_millis)
    }

    pub fn reevaluation_interval(&self) -> Duration {
        Duration::from_millis(self.reevaluation_interval_ms)
    }

    pub fn cancellation_grace(&self) -> Duration {
        Duration::from_millis(self.cancellation_grace_ms)
    }

    /// Whether a probe passes the allow and deny lists
    pub fn is_probe_selected(&self, id: &ProbeId, execute_by_default: bool) -> bool {
        let allowed = match &self.probes {
            Some(list) => list.contains(id),
            None => execute_by_default,
        };
        allowed && !self.excluded_probes.contains(id)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::ScanError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: ExecutorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location (~/.scancore.toml)
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let config_path = home_dir.join(".scancore.toml");

        if config_path.exists() {
            match Self::from_toml_file(&config_path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    log::warn!("Ignoring config at {}: {}", config_path.display(), e);
                }
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.parallel_probes == 0 {
            return Err(crate::ScanError::ConfigError(
                "parallel_probes must be greater than 0".to_string(),
            ));
        }

        if self.probe_timeout_ms == 0 {
            return Err(crate::ScanError::ConfigError(
                "probe_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.scan_timeout_ms == Some(0) {
            return Err(crate::ScanError::ConfigError(
                "scan_timeout_ms must be greater than 0 when set".to_string(),
            ));
        }

        if self.reevaluation_interval_ms == 0 {
            return Err(crate::ScanError::ConfigError(
                "reevaluation_interval_ms must be greater than 0".to_string(),
            ));
        }

        if let Some(probes) = &self.probes {
            if let Some(both) = probes.iter().find(|p| self.excluded_probes.contains(p)) {
                return Err(crate::ScanError::ConfigError(format!(
                    "probe {} is both selected and excluded",
                    both
                )));
            }
        }

        Ok(())
    }
}

//! Front door for running a complete scan

use super::{OrchestratorStats, ScanJob, ScanOrchestrator};
use crate::afterprobe::{AfterProbe, AfterProbePipeline, PipelineSummary};
use crate::config::ExecutorConfig;
use crate::probe::Probe;
use crate::report::{ReportData, ReportSnapshot, ScanReport};
use crate::utils::Logger;
use crate::Result;
use async_trait::async_trait;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle callbacks of a scan
///
/// Every method has a no-op default, so an implementation only overrides
/// what it needs.
#[async_trait]
pub trait ScanHooks<T>: Send + Sync
where
    T: Send + Sync + ?Sized,
{
    /// Called before anything else happens
    async fn on_scan_start(&self, _target: &T) {}

    /// Whether the target can be scanned at all, e.g. it is reachable
    ///
    /// When this returns false no probe or AfterProbe runs and the scan
    /// returns the empty report.
    async fn check_prerequisites(&self, _target: &T, _report: &ReportData) -> bool {
        true
    }

    /// Called with the frozen report once the scan completed
    async fn on_scan_end(&self, _report: &ReportSnapshot) {}
}

struct NoHooks;

#[async_trait]
impl<T> ScanHooks<T> for NoHooks where T: Send + Sync + ?Sized {}

/// What a finished scan hands back
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Frozen report
    pub report: ReportSnapshot,
    pub stats: OrchestratorStats,
    pub analysis: PipelineSummary,
    /// False when the prerequisite check stopped the scan before any probe ran
    pub prerequisites_met: bool,
}

/// Configured scan of one target
pub struct Scanner<T>
where
    T: Send + Sync + 'static,
{
    config: ExecutorConfig,
    target: Arc<T>,
    job: ScanJob<T>,
    parameters: BTreeMap<String, String>,
    hooks: Arc<dyn ScanHooks<T>>,
}

impl<T> Scanner<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(config: ExecutorConfig, target: T) -> Self {
        Self::with_shared_target(config, Arc::new(target))
    }

    pub fn with_shared_target(config: ExecutorConfig, target: Arc<T>) -> Self {
        Self {
            config,
            target,
            job: ScanJob::new(),
            parameters: BTreeMap::new(),
            hooks: Arc::new(NoHooks),
        }
    }

    /// Set a raw scan parameter visible to `Parameter` requirements
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Register a probe; returns whether the configuration selected it
    /// Install lifecycle callbacks and the prerequisite check
    pub fn with_hooks<H>(mut self, hooks: H) -> Self
    where
        H: ScanHooks<T> + 'static,
    {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn register_probe<P>(&mut self, probe: P) -> Result<bool>
    where
        P: Probe<T> + 'static,
    {
        self.job.register_probe(Arc::new(probe), &self.config)
    }

    pub fn register_after_probe<A>(&mut self, after_probe: A)
    where
        A: AfterProbe + 'static,
    {
        self.job.register_after_probe(Arc::new(after_probe));
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every probe, then every AfterProbe, and freeze the report
    ///
    /// Only a bad configuration is an error; probe and AfterProbe failures
    /// are recorded in the report.
    pub async fn scan(self) -> Result<ScanOutcome> {
        self.config.validate()?;
        let start = Instant::now();

        debug!("Calling scan start hook");
        self.hooks.on_scan_start(&*self.target).await;

        let mut data = ReportData::new();
        for (name, value) in &self.parameters {
            data.set_parameter(name.clone(), value.clone());
        }

        if !self.hooks.check_prerequisites(&*self.target, &data).await {
            info!("Scan prerequisites not fulfilled, skipping scan {}", data.scan_id());
            return Ok(ScanOutcome {
                report: ReportSnapshot::new(data),
                stats: OrchestratorStats::new(0),
                analysis: PipelineSummary::default(),
                prerequisites_met: false,
            });
        }

        data.mark_started();
        let scan_id = data.scan_id();
        let report = ScanReport::new(data);

        let (probes, after_probes) = self.job.into_parts();
        Logger::log_scan_start(scan_id, probes.len(), after_probes.len());

        let orchestrator =
            ScanOrchestrator::new(self.config.clone(), self.target.clone(), probes, report.clone());
        let stats = orchestrator.run().await;

        let pipeline = AfterProbePipeline::new(after_probes);
        let detail = self.config.post_analysis_detail;
        let analysis = report.update(|data| pipeline.run(data, detail)).await;

        let frozen = report.freeze().await;
        Logger::log_scan_complete(start.elapsed(), &stats);
        Logger::log_performance(&stats);

        debug!("Calling scan end hook");
        self.hooks.on_scan_end(&frozen).await;

        Ok(ScanOutcome {
            report: frozen,
            stats,
            analysis,
            prerequisites_met: true,
        })
    }
}

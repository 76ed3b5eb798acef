//! Probe and AfterProbe registration for one scan

use crate::afterprobe::AfterProbe;
use crate::config::ExecutorConfig;
use crate::probe::{Probe, ProbeId};
use crate::{Result, ScanError};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

/// The probes and AfterProbes a scan runs
pub struct ScanJob<T>
where
    T: Send + Sync,
{
    probes: Vec<Arc<dyn Probe<T>>>,
    after_probes: Vec<Arc<dyn AfterProbe>>,
    seen: HashSet<ProbeId>,
}

impl<T> Default for ScanJob<T>
where
    T: Send + Sync,
{
    fn default() -> Self {
        Self {
            probes: Vec::new(),
            after_probes: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<T> ScanJob<T>
where
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe if the configuration selects it
    ///
    /// Returns whether the probe will run. Duplicate ids and malformed
    /// requirements are rejected regardless of selection.
    pub fn register_probe(
        &mut self,
        probe: Arc<dyn Probe<T>>,
        config: &ExecutorConfig,
    ) -> Result<bool> {
        let id = probe.id();
        if !self.seen.insert(id.clone()) {
            return Err(ScanError::DuplicateProbe(id.to_string()));
        }
        probe.requirement().validate()?;

        if !config.is_probe_selected(&id, probe.execute_by_default()) {
            debug!("Probe {} is not selected for this scan", id);
            return Ok(false);
        }

        debug!("Registered probe {} requiring {}", id, probe.requirement());
        self.probes.push(probe);
        Ok(true)
    }

    /// AfterProbes run in registration order
    pub fn register_after_probe(&mut self, after_probe: Arc<dyn AfterProbe>) {
        self.after_probes.push(after_probe);
    }

    pub fn probes(&self) -> &[Arc<dyn Probe<T>>] {
        &self.probes
    }

    pub fn after_probes(&self) -> &[Arc<dyn AfterProbe>] {
        &self.after_probes
    }

    pub(crate) fn into_parts(self) -> (Vec<Arc<dyn Probe<T>>>, Vec<Arc<dyn AfterProbe>>) {
        (self.probes, self.after_probes)
    }
}

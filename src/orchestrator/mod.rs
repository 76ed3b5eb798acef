//! Scan orchestration
//!
//! The orchestrator drives every registered probe through
//! `Pending -> Runnable -> Running -> Done | Failed`. A single task owns the
//! dispatch and harvest loop; probes run on spawned tasks bounded by a
//! semaphore and report back through a completion stream. The loop ends at
//! the fixed point where nothing is running and no pending probe became
//! runnable. Passive statistics of every probe are merged into the report
//! before the orchestrator returns.

use crate::config::ExecutorConfig;
use crate::error::FailureReason;
use crate::passive::{SharedStatsWriter, StatsWriter};
use crate::probe::{AnalyzedProperty, Probe, ProbeContext, ProbeId, ProbeResult, PropertyValue};
use crate::report::{PerformanceData, ProbeRecord, ProbeState, ReportSnapshot, ScanReport};
use crate::utils::ProbeProgress;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

pub mod job;
pub mod scanner;
pub mod stats;

pub use job::ScanJob;
pub use scanner::{ScanHooks, ScanOutcome, Scanner};
pub use stats::OrchestratorStats;

/// How a probe task ended
enum Completion {
    Finished(anyhow::Result<ProbeResult>),
    TimedOut,
    Cancelled,
}

type Harvest = BoxFuture<'static, (usize, Result<Completion, JoinError>)>;

struct ProbeSlot<T>
where
    T: Send + Sync,
{
    probe: Arc<dyn Probe<T>>,
    id: ProbeId,
    properties: Vec<AnalyzedProperty>,
    state: ProbeState,
    started: Option<(Instant, DateTime<Utc>)>,
    stats: SharedStatsWriter,
}

/// Runs the probe phase of one scan
pub struct ScanOrchestrator<T>
where
    T: Send + Sync + 'static,
{
    config: ExecutorConfig,
    target: Arc<T>,
    slots: Vec<ProbeSlot<T>>,
    report: ScanReport,
    stats: OrchestratorStats,
    progress: ProbeProgress,
    cancel: CancellationToken,
    deadline: Option<tokio::time::Instant>,
    timed_out: bool,
    aborted: bool,
}

impl<T> ScanOrchestrator<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(
        config: ExecutorConfig,
        target: Arc<T>,
        probes: Vec<Arc<dyn Probe<T>>>,
        report: ScanReport,
    ) -> Self {
        let slots: Vec<ProbeSlot<T>> = probes
            .into_iter()
            .map(|probe| ProbeSlot {
                id: probe.id(),
                properties: probe.properties(),
                probe,
                state: ProbeState::Pending,
                started: None,
                stats: SharedStatsWriter::new(),
            })
            .collect();

        Self {
            config,
            target,
            stats: OrchestratorStats::new(slots.len()),
            progress: ProbeProgress::new(slots.len()),
            slots,
            report,
            cancel: CancellationToken::new(),
            deadline: None,
            timed_out: false,
            aborted: false,
        }
    }

    /// Token cancelling every running probe when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive all probes to a terminal state
    pub async fn run(mut self) -> OrchestratorStats {
        let semaphore = Arc::new(Semaphore::new(self.config.parallel_probes));
        let mut running: FuturesUnordered<Harvest> = FuturesUnordered::new();

        self.report
            .update(|data| {
                for slot in &self.slots {
                    data.mark_unexecuted(&slot.id);
                }
            })
            .await;

        let deadline = self.config.scan_timeout().map(|t| tokio::time::Instant::now() + t);
        self.deadline = deadline;
        let global_timeout = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(global_timeout);

        info!(
            "Executing {} probes with {} workers",
            self.slots.len(),
            self.config.parallel_probes
        );

        loop {
            if !self.is_stopping() {
                self.schedule(&semaphore, &mut running).await;
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                Some((index, joined)) = running.next() => {
                    self.harvest(index, joined).await;
                }
                _ = &mut global_timeout, if !self.timed_out => {
                    warn!("Scan deadline reached, cancelling {} running probes", running.len());
                    self.timed_out = true;
                    self.cancel.cancel();
                }
                _ = tokio::time::sleep(self.config.reevaluation_interval()) => {}
            }
        }

        self.settle_remaining().await;
        self.collect_statistics().await;

        info!(
            "Probe phase finished after {} rounds: {} done, {} failed",
            self.stats.rounds, self.stats.completed, self.stats.failed
        );
        self.stats
    }

    fn is_stopping(&self) -> bool {
        self.timed_out || self.aborted
    }

    /// One scheduling pass over a consistent snapshot
    async fn schedule(
        &mut self,
        semaphore: &Arc<Semaphore>,
        running: &mut FuturesUnordered<Harvest>,
    ) {
        let snapshot = self.report.snapshot().await;

        for slot in self.slots.iter_mut() {
            if slot.state == ProbeState::Pending && slot.probe.requirement().evaluate(&snapshot) {
                debug!("Probe {} is runnable", slot.id);
                slot.state = ProbeState::Runnable;
            }
        }

        let mut dispatched = 0;
        for index in 0..self.slots.len() {
            if self.slots[index].state != ProbeState::Runnable {
                continue;
            }
            let permit = match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => break,
            };
            running.push(self.dispatch(index, permit, &snapshot));
            dispatched += 1;
        }

        if dispatched > 0 {
            self.stats.rounds += 1;
            self.stats.dispatched += dispatched;
            debug!(
                "Round {}: dispatched {} probes, {} in flight",
                self.stats.rounds,
                dispatched,
                running.len()
            );
        }
    }

    fn dispatch(
        &mut self,
        index: usize,
        permit: tokio::sync::OwnedSemaphorePermit,
        snapshot: &ReportSnapshot,
    ) -> Harvest {
        let slot = &mut self.slots[index];
        slot.state = ProbeState::Running;
        slot.started = Some((Instant::now(), Utc::now()));
        slot.probe.adjust(snapshot);
        debug!("Dispatching probe {}", slot.id);

        let probe = Arc::clone(&slot.probe);
        let target = Arc::clone(&self.target);
        let snapshot = snapshot.clone();
        let cancel = self.cancel.child_token();
        let ctx = ProbeContext::new(slot.id.clone(), cancel.clone(), self.config.probe_timeout())
            .bounded_by(self.deadline)
            .with_detail(self.config.scan_detail)
            .with_stats(slot.stats.clone());
        let probe_timeout = self.config.probe_timeout();
        let grace = self.config.cancellation_grace();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            let execution = probe.execute(&*target, &snapshot, &ctx);
            tokio::pin!(execution);

            let interrupted = tokio::select! {
                biased;
                outcome = &mut execution => return Completion::Finished(outcome),
                _ = cancel.cancelled() => Completion::Cancelled,
                _ = tokio::time::sleep(probe_timeout) => {
                    cancel.cancel();
                    Completion::TimedOut
                }
            };

            // the probe sees the token through its context and may wind down
            if tokio::time::timeout(grace, &mut execution).await.is_err() {
                debug!("Probe {} ignored cancellation, dropping it", ctx.probe());
            }
            interrupted
        });

        Box::pin(async move { (index, handle.await) })
    }

    /// Merge one finished probe into the report
    async fn harvest(&mut self, index: usize, joined: Result<Completion, JoinError>) {
        let duration = self.slots[index].started.map(|(started, _)| started.elapsed());
        if let Some(duration) = duration {
            self.stats.record_duration(duration);
        }
        self.record_performance(index).await;

        let reason = match joined {
            Ok(Completion::Finished(Ok(result))) => {
                self.complete(index, result, duration.unwrap_or_default()).await;
                return;
            }
            Ok(Completion::Finished(Err(e))) => FailureReason::ExecutionError(format!("{:#}", e)),
            Ok(Completion::TimedOut) => FailureReason::Timeout,
            Ok(Completion::Cancelled) if self.timed_out => FailureReason::Timeout,
            Ok(Completion::Cancelled) => FailureReason::Cancelled,
            Err(e) if e.is_panic() => FailureReason::Panicked(panic_message(e)),
            Err(_) => FailureReason::Cancelled,
        };

        self.fail(index, reason, duration).await;
    }

    async fn complete(&mut self, index: usize, result: ProbeResult, duration: Duration) {
        let slot = &mut self.slots[index];
        slot.state = ProbeState::Done;
        let id = slot.id.clone();
        let properties = slot.properties.clone();

        self.report
            .update(|data| {
                data.merge_probe_result(&id, &properties, result);
                data.record_probe(ProbeRecord::done(id.clone(), duration));
            })
            .await;

        self.stats.completed += 1;
        self.progress.increment();
        info!(
            "{} Probe {} completed in {}ms",
            self.progress.render(),
            id,
            duration.as_millis()
        );
    }

    async fn fail(&mut self, index: usize, reason: FailureReason, duration: Option<Duration>) {
        let slot = &mut self.slots[index];
        slot.state = ProbeState::Failed;
        let id = slot.id.clone();
        let properties = slot.properties.clone();

        self.stats.failed += 1;
        if reason.is_timeout() {
            self.stats.timed_out += 1;
        } else if matches!(reason, FailureReason::Panicked(_)) {
            self.stats.panicked += 1;
        }
        self.progress.increment();
        warn!("{} Probe {} failed: {}", self.progress.render(), id, reason);

        let triggers_abort = self.config.abort_on_error && !self.is_stopping();

        self.report
            .update(|data| {
                data.fill_unset(&properties, PropertyValue::ErrorDuringProbe, &id);
                data.record_probe(ProbeRecord::failed(id.clone(), reason, duration));
            })
            .await;

        if triggers_abort {
            warn!("Aborting scan after failure of probe {}", id);
            self.aborted = true;
            self.cancel.cancel();
        }
    }

    async fn record_performance(&self, index: usize) {
        let slot = &self.slots[index];
        if let Some((_, started_at)) = slot.started {
            let data = PerformanceData::new(slot.id.clone(), started_at, Utc::now());
            self.report.update(|report| report.record_performance(data)).await;
        }
    }

    /// Fail every probe that never left the waiting states
    async fn settle_remaining(&mut self) {
        let snapshot = self.report.snapshot().await;
        let timed_out = self.timed_out;
        let aborted = self.aborted;
        let mut skipped = Vec::new();

        for slot in self.slots.iter_mut().filter(|s| !s.state.is_terminal()) {
            let reason = if timed_out {
                self.stats.timed_out += 1;
                FailureReason::Timeout
            } else if aborted {
                self.stats.aborted += 1;
                FailureReason::Aborted
            } else {
                self.stats.never_runnable += 1;
                let blocking: Vec<String> = slot
                    .probe
                    .requirement()
                    .unfulfilled(&snapshot)
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                FailureReason::RequirementNeverSatisfied(blocking.join(", "))
            };

            info!("Probe {} could not be executed: {}", slot.id, reason);
            slot.state = ProbeState::Failed;
            self.stats.failed += 1;
            skipped.push((slot.id.clone(), slot.properties.clone(), reason));
        }

        if skipped.is_empty() {
            return;
        }

        self.report
            .update(|data| {
                for (id, properties, reason) in skipped {
                    data.fill_unset(&properties, PropertyValue::CouldNotTest, &id);
                    data.record_skipped(ProbeRecord::failed(id, reason, None));
                }
            })
            .await;
    }

    /// Merge the statistics writers of all probes in registration order
    async fn collect_statistics(&self) {
        let mut collected = StatsWriter::new();
        for slot in &self.slots {
            collected.merge(slot.stats.take());
        }
        debug!(
            "Collected {} trackable values over {} connections",
            collected.containers().len(),
            collected.state_counter()
        );
        self.report.update(|data| data.put_statistics(collected)).await;
    }
}

fn panic_message(error: JoinError) -> String {
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

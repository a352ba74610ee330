// src/engine/orchestrator.rs
use crate::config::ProbeConfig;
use crate::metrics::MetricsCollector;
use crate::probe::{create_strategies, ChainPolicy, ProbeError, Strategy, StrategyChain};
use crate::registry::{Registry, Target};
use crate::state::{CycleId, OutcomeUpdate, ProbeOutcome, ProbeStatus, ResultTable, NO_METHOD};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

/// Result of a trigger.
#[derive(Debug)]
pub enum CycleRun {
    Completed(CycleReport),
    /// Another cycle held the engine; nothing was started.
    AlreadyRunning,
}

impl CycleRun {
    pub fn report(self) -> Option<CycleReport> {
        match self {
            CycleRun::Completed(report) => Some(report),
            CycleRun::AlreadyRunning => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: CycleId,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub timed_out: bool,
    /// Every registry target, url-less ones included.
    pub outcomes: HashMap<String, ProbeOutcome>,
}

/// Clears the running flag when the cycle ends, however it ends.
struct CycleGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Aborts the probes of a batch if the batch is abandoned before they
/// settle, e.g. when the global deadline drops it. A no-op for finished tasks.
struct InFlight(Vec<AbortHandle>);

impl InFlight {
    fn track(tasks: &[JoinHandle<()>]) -> Self {
        Self(tasks.iter().map(JoinHandle::abort_handle).collect())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

pub struct ProbeEngine {
    config: ProbeConfig,
    registry: Registry,
    chain: Arc<StrategyChain>,
    table: Arc<ResultTable>,
    metrics: Option<Arc<MetricsCollector>>,
    running: AtomicBool,
}

impl ProbeEngine {
    pub fn new(
        config: ProbeConfig,
        registry: Registry,
        strategies: Vec<Arc<dyn Strategy>>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let chain = StrategyChain::new(strategies, ChainPolicy::from(&config))
            .with_metrics(metrics.clone());
        let table = Arc::new(ResultTable::new(registry.clone()));

        Self {
            config,
            registry,
            chain: Arc::new(chain),
            table,
            metrics,
            running: AtomicBool::new(false),
        }
    }

    /// Engine wired to the HTTP strategies named in the config.
    pub fn from_config(
        config: ProbeConfig,
        registry: Registry,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let strategies = create_strategies(&config);
        Self::new(config, registry, strategies, metrics)
    }

    pub fn table(&self) -> Arc<ResultTable> {
        self.table.clone()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutcomeUpdate> {
        self.table.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &str) -> ProbeOutcome {
        self.table.get(id)
    }

    /// Check every pingable target once.
    ///
    /// Returns immediately with `AlreadyRunning` if another cycle is in
    /// flight. Never fails: a cycle that overruns the global timeout still
    /// produces a report, with unsettled targets forced to `Error`.
    pub async fn run_cycle(&self) -> CycleRun {
        let Some(_guard) = CycleGuard::acquire(&self.running) else {
            info!("{}, ignoring trigger", ProbeError::ConcurrentCycleRejected);
            if let Some(metrics) = &self.metrics {
                metrics.record_cycle("rejected", None);
            }
            return CycleRun::AlreadyRunning;
        };

        let targets = self.registry.pingable();
        let cycle = self.table.begin_cycle(&targets);
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            "Starting probe cycle {} for {} targets (batch size {}, deadline {:?})",
            cycle,
            targets.len(),
            self.batch_size(),
            self.config.global_timeout()
        );

        let timed_out = timeout(self.config.global_timeout(), self.run_batches(cycle, &targets))
            .await
            .is_err();

        if timed_out {
            let finalized = self
                .table
                .finalize_pending(cycle, &ProbeError::CycleTimeout.to_string());
            warn!(
                "Probe cycle {} hit the {:?} deadline, {} targets forced to error",
                cycle,
                self.config.global_timeout(),
                finalized.len()
            );
            if let Some(metrics) = &self.metrics {
                for id in &finalized {
                    metrics.record_outcome(id, ProbeStatus::Error);
                }
            }
        }

        let elapsed = clock.elapsed();
        let outcomes = self.table.outcomes();

        if let Some(metrics) = &self.metrics {
            let result = if timed_out { "timed_out" } else { "completed" };
            metrics.record_cycle(result, Some(elapsed));
            metrics.update_target_counts(outcomes.values().map(|o| &o.status));
        }

        info!("Probe cycle {} finished in {:?}", cycle, elapsed);

        CycleRun::Completed(CycleReport {
            cycle,
            started_at,
            elapsed,
            timed_out,
            outcomes,
        })
    }

    fn batch_size(&self) -> usize {
        self.config.concurrency_limit.max(1)
    }

    /// Fixed batches: probes inside a batch overlap, batch N+1 starts only
    /// once every probe of batch N has settled.
    async fn run_batches(&self, cycle: CycleId, targets: &[Arc<Target>]) {
        for (index, batch) in targets.chunks(self.batch_size()).enumerate() {
            debug!("Cycle {} batch {}: {} probes", cycle, index, batch.len());

            let (ids, tasks): (Vec<_>, Vec<JoinHandle<()>>) = batch
                .iter()
                .map(|target| (target.id.clone(), self.spawn_probe(cycle, target.clone())))
                .unzip();

            let in_flight = InFlight::track(&tasks);
            let results = join_all(tasks).await;
            drop(in_flight);

            for (id, result) in ids.into_iter().zip(results) {
                if let Err(e) = result {
                    error!("Probe task for {} failed: {}", id, e);
                    let detail = ProbeError::Unexpected("probe task panicked".to_string());
                    self.settle(cycle, &id, ProbeOutcome::error(NO_METHOD, detail.to_string()));
                }
            }
        }
    }

    /// Each probe records its own outcome as soon as it lands. A write that
    /// races a forced finalization is rejected by the table.
    fn spawn_probe(&self, cycle: CycleId, target: Arc<Target>) -> JoinHandle<()> {
        let chain = self.chain.clone();
        let table = self.table.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let outcome = chain.probe_one(&target).await;
            let status = outcome.status;
            debug!("{} -> {} ({})", target.id, status, outcome.detail);

            if table.record(cycle, &target.id, outcome) {
                if let Some(metrics) = &metrics {
                    metrics.record_outcome(&target.id, status);
                }
            }
        })
    }

    fn settle(&self, cycle: CycleId, id: &str, outcome: ProbeOutcome) {
        let status = outcome.status;
        if self.table.record(cycle, id, outcome) {
            if let Some(metrics) = &self.metrics {
                metrics.record_outcome(id, status);
            }
        }
    }
}

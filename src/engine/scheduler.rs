// src/engine/scheduler.rs
use super::orchestrator::{CycleRun, ProbeEngine};
use crate::config::SchedulerConfig;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Cloneable handle for on-demand refreshes.
#[derive(Clone)]
pub struct Trigger {
    tx: mpsc::Sender<()>,
}

impl Trigger {
    /// Ask for a cycle. Refreshes arriving while one is already queued are
    /// coalesced. Returns `false` once the scheduler is gone.
    pub fn refresh(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Drives the engine from a fixed interval and from manual triggers.
pub struct Scheduler {
    engine: Arc<ProbeEngine>,
    config: SchedulerConfig,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: Mutex<mpsc::Receiver<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(engine: Arc<ProbeEngine>, config: SchedulerConfig) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            engine,
            config,
            trigger_tx,
            trigger_rx: Mutex::new(trigger_rx),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn trigger(&self) -> Trigger {
        Trigger {
            tx: self.trigger_tx.clone(),
        }
    }

    pub async fn start(self: Arc<Self>) {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut triggers = self.trigger_rx.lock().await;

        info!(
            "Starting probe scheduler with interval: {:?}",
            self.config.interval()
        );

        // The first tick completes immediately.
        if !self.config.check_on_start {
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.spawn_cycle("interval");
                }
                Some(()) = triggers.recv() => {
                    self.spawn_cycle("manual");
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Probe scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Reads `true` once `shutdown` has been called.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Cycles run off the scheduler loop so it keeps ticking; overlapping
    /// triggers are turned away by the engine's own guard.
    fn spawn_cycle(&self, source: &'static str) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            match engine.run_cycle().await {
                CycleRun::Completed(report) if report.timed_out => {
                    warn!("{} probe cycle {} timed out", source, report.cycle);
                }
                CycleRun::Completed(report) => {
                    debug!("{} probe cycle {} completed", source, report.cycle);
                }
                CycleRun::AlreadyRunning => {
                    debug!("{} trigger skipped, cycle already running", source);
                }
            }
        });
    }
}

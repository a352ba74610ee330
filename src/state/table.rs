// src/state/table.rs
use super::outcome::{CycleId, OutcomeUpdate, ProbeOutcome, ProbeStatus, StatusView, NO_METHOD};
use crate::registry::{Registry, Target};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    cycle: CycleId,
    outcome: ProbeOutcome,
    last_known: Option<ProbeOutcome>,
}

/// Authoritative `id -> ProbeOutcome` mapping.
///
/// Only the orchestrator writes here, through `begin_cycle`, `record` and
/// `finalize_pending`. Readers get clones.
pub struct ResultTable {
    registry: Registry,
    entries: DashMap<String, Entry>,
    current_cycle: AtomicU64,
    updates: broadcast::Sender<OutcomeUpdate>,
}

impl ResultTable {
    pub fn new(registry: Registry) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            registry,
            entries: DashMap::new(),
            current_cycle: AtomicU64::new(0),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutcomeUpdate> {
        self.updates.subscribe()
    }

    pub fn current_cycle(&self) -> CycleId {
        CycleId(self.current_cycle.load(Ordering::SeqCst))
    }

    /// Open a new cycle and reset every given target to `Pending`.
    ///
    /// The previous settled outcome is kept as `last_known`.
    pub fn begin_cycle(&self, targets: &[Arc<Target>]) -> CycleId {
        let cycle = CycleId(self.current_cycle.fetch_add(1, Ordering::SeqCst) + 1);
        let pending = ProbeOutcome::pending();

        for target in targets {
            let mut entry = self
                .entries
                .entry(target.id.clone())
                .or_insert_with(|| Entry {
                    cycle,
                    outcome: pending.clone(),
                    last_known: None,
                });

            if entry.outcome.status.is_settled() {
                entry.last_known = Some(entry.outcome.clone());
            }
            entry.cycle = cycle;
            entry.outcome = pending.clone();
            drop(entry);

            self.publish(OutcomeUpdate::new(cycle, &target.id, &pending));
        }

        cycle
    }

    /// Record a settled outcome. Returns `false` and leaves the entry alone
    /// when the write is stale: the cycle is no longer current, or the
    /// target has already been settled in this cycle.
    pub fn record(&self, cycle: CycleId, id: &str, outcome: ProbeOutcome) -> bool {
        let accepted = match self.entries.get_mut(id) {
            Some(mut entry) => {
                if entry.cycle != cycle || entry.outcome.status != ProbeStatus::Pending {
                    false
                } else {
                    entry.outcome = outcome.clone();
                    true
                }
            }
            None => false,
        };

        if accepted {
            self.publish(OutcomeUpdate::new(cycle, id, &outcome));
        } else {
            debug!(
                "Discarding stale outcome for {} from cycle {} ({})",
                id, cycle, outcome.status
            );
        }
        accepted
    }

    /// Force every target still pending in `cycle` to `Error`.
    /// Returns the ids that were finalized.
    pub fn finalize_pending(&self, cycle: CycleId, detail: &str) -> Vec<String> {
        let forced = ProbeOutcome::error(NO_METHOD, detail);
        let mut finalized = Vec::new();

        for mut entry in self.entries.iter_mut() {
            if entry.cycle == cycle && entry.outcome.status == ProbeStatus::Pending {
                entry.outcome = forced.clone();
                finalized.push(entry.key().clone());
            }
        }

        for id in &finalized {
            self.publish(OutcomeUpdate::new(cycle, id, &forced));
        }
        finalized
    }

    /// Total: unknown, url-less and never-probed ids read as `NotApplicable`.
    pub fn get(&self, id: &str) -> ProbeOutcome {
        self.entries
            .get(id)
            .map(|entry| entry.outcome.clone())
            .unwrap_or_else(ProbeOutcome::not_applicable)
    }

    pub fn last_known(&self, id: &str) -> Option<ProbeOutcome> {
        self.entries.get(id).and_then(|entry| entry.last_known.clone())
    }

    /// Outcomes for every registry target, keyed by id.
    pub fn outcomes(&self) -> HashMap<String, ProbeOutcome> {
        self.registry
            .targets()
            .iter()
            .map(|t| (t.id.clone(), self.get(&t.id)))
            .collect()
    }

    /// Views in registry order.
    pub fn snapshot(&self) -> Vec<StatusView> {
        self.registry
            .targets()
            .iter()
            .map(|t| self.view(t))
            .collect()
    }

    pub fn view_of(&self, id: &str) -> Option<StatusView> {
        self.registry.get(id).map(|t| self.view(&t))
    }

    fn view(&self, target: &Target) -> StatusView {
        let (outcome, last_known) = match self.entries.get(&target.id) {
            Some(entry) => (entry.outcome.clone(), entry.last_known.clone()),
            None => (ProbeOutcome::not_applicable(), None),
        };
        StatusView {
            id: target.id.clone(),
            display_name: target.display_name.clone(),
            status: outcome.status,
            detail: outcome.detail,
            method: outcome.method,
            timestamp: outcome.timestamp,
            last_known,
        }
    }

    fn publish(&self, update: OutcomeUpdate) {
        // No subscribers is fine.
        let _ = self.updates.send(update);
    }
}

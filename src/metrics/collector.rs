// src/metrics/collector.rs
use crate::state::ProbeStatus;
use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    pub outcomes_total: IntCounterVec,
    pub strategy_duration_seconds: HistogramVec,
    pub cycles_total: IntCounterVec,
    pub cycle_duration_seconds: Histogram,
    pub targets: IntGaugeVec,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let outcomes_total = IntCounterVec::new(
            Opts::new("probe_outcomes_total", "Settled probe outcomes"),
            &["target", "status"],
        )?;
        registry.register(Box::new(outcomes_total.clone()))?;

        let strategy_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "probe_strategy_duration_seconds",
                "Duration of individual strategy attempts",
            ),
            &["strategy", "result"],
        )?;
        registry.register(Box::new(strategy_duration_seconds.clone()))?;

        let cycles_total = IntCounterVec::new(
            Opts::new(
                "probe_cycles_total",
                "Probe cycles by result (completed, timed_out, rejected)",
            ),
            &["result"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let cycle_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "probe_cycle_duration_seconds",
            "Wall time of a full probe cycle",
        ))?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;

        let targets = IntGaugeVec::new(
            Opts::new("probe_targets", "Targets by current status"),
            &["status"],
        )?;
        registry.register(Box::new(targets.clone()))?;

        Ok(Self {
            outcomes_total,
            strategy_duration_seconds,
            cycles_total,
            cycle_duration_seconds,
            targets,
        })
    }

    pub fn record_outcome(&self, target: &str, status: ProbeStatus) {
        self.outcomes_total
            .with_label_values(&[target, status.as_str()])
            .inc();
    }

    pub fn record_strategy_attempt(&self, strategy: &str, result: &str, duration: Duration) {
        self.strategy_duration_seconds
            .with_label_values(&[strategy, result])
            .observe(duration.as_secs_f64());
    }

    pub fn record_cycle(&self, result: &str, duration: Option<Duration>) {
        self.cycles_total.with_label_values(&[result]).inc();
        if let Some(duration) = duration {
            self.cycle_duration_seconds.observe(duration.as_secs_f64());
        }
    }

    /// Replace the per-status target gauges with fresh counts.
    pub fn update_target_counts<'a>(&self, statuses: impl IntoIterator<Item = &'a ProbeStatus>) {
        let all = [
            ProbeStatus::Pending,
            ProbeStatus::Online,
            ProbeStatus::Offline,
            ProbeStatus::Error,
            ProbeStatus::NotApplicable,
        ];
        let mut counts = [0i64; 5];
        for status in statuses {
            if let Some(i) = all.iter().position(|s| s == status) {
                counts[i] += 1;
            }
        }
        for (status, count) in all.iter().zip(counts) {
            self.targets.with_label_values(&[status.as_str()]).set(count);
        }
    }
}

// src/config/models.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// One entry of the target registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, alias = "status_url")]
    pub url: Option<String>,
}

/// Transport strategies, listed in the order the chain should try them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    HttpGet,
    OpaqueHead,
    Favicon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub per_probe_timeout_ms: u64,
    /// When set, a strategy that times out finalizes the target instead of
    /// handing over to the next strategy.
    pub per_probe_timeout_is_terminal: bool,
    /// Budget for the whole strategy chain of one target. Unset means the
    /// per-probe timeout, so a target never hangs past it; raise it to let
    /// later strategies run after a timed-out one.
    pub probe_deadline_ms: Option<u64>,
    pub concurrency_limit: usize,
    pub global_timeout_ms: u64,
    /// Whether a completed request whose HTTP status cannot be observed
    /// counts as `Online`.
    pub no_cors_counts_as_online: bool,
    pub strategies: Vec<StrategyKind>,
    pub log_failures: bool,
    pub user_agent: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            per_probe_timeout_ms: 5_000,
            per_probe_timeout_is_terminal: false,
            probe_deadline_ms: None,
            concurrency_limit: 3,
            global_timeout_ms: 45_000,
            no_cors_counts_as_online: true,
            strategies: vec![
                StrategyKind::HttpGet,
                StrategyKind::OpaqueHead,
                StrategyKind::Favicon,
            ],
            log_failures: true,
            user_agent: None,
        }
    }
}

impl ProbeConfig {
    pub fn per_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.per_probe_timeout_ms)
    }

    pub fn probe_deadline(&self) -> Duration {
        self.probe_deadline_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.per_probe_timeout())
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub auto_check_interval_ms: u64,
    pub check_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_check_interval_ms: 60_000,
            check_on_start: true,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.auto_check_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("concurrency_limit must be at least 1")]
    ZeroConcurrency,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("at least one probe strategy must be configured")]
    NoStrategies,

    #[error("target id must not be empty")]
    EmptyTargetId,

    #[error("duplicate target id: {0}")]
    DuplicateTarget(String),

    #[error("metrics path must start with '/': {0}")]
    InvalidMetricsPath(String),
}

impl Config {
    /// Structural checks only. Malformed target URLs are reported per target
    /// at probe time, not here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let probe = &self.probe;
        if probe.concurrency_limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if probe.per_probe_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("per_probe_timeout_ms"));
        }
        if probe.probe_deadline_ms == Some(0) {
            return Err(ConfigError::ZeroDuration("probe_deadline_ms"));
        }
        if probe.global_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("global_timeout_ms"));
        }
        if self.scheduler.auto_check_interval_ms == 0 {
            return Err(ConfigError::ZeroDuration("auto_check_interval_ms"));
        }
        if probe.strategies.is_empty() {
            return Err(ConfigError::NoStrategies);
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.id.trim().is_empty() {
                return Err(ConfigError::EmptyTargetId);
            }
            if !seen.insert(target.id.as_str()) {
                return Err(ConfigError::DuplicateTarget(target.id.clone()));
            }
        }

        if !self.metrics.path.starts_with('/') {
            return Err(ConfigError::InvalidMetricsPath(self.metrics.path.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, url: Option<&str>) -> TargetConfig {
        TargetConfig {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            url: url.map(str::to_string),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.probe.concurrency_limit, 3);
        assert_eq!(config.probe.global_timeout(), Duration::from_secs(45));
        assert!(!config.probe.per_probe_timeout_is_terminal);
        assert!(config.probe.no_cors_counts_as_online);
        assert_eq!(config.probe.strategies.len(), 3);
    }

    #[test]
    fn test_probe_deadline_defaults_to_per_probe_timeout() {
        let mut probe = ProbeConfig::default();
        assert_eq!(probe.probe_deadline(), Duration::from_secs(5));

        probe.probe_deadline_ms = Some(30_000);
        assert_eq!(probe.probe_deadline(), Duration::from_secs(30));

        let mut config = Config::default();
        config.probe.probe_deadline_ms = Some(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDuration("probe_deadline_ms"))
        );
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.probe.concurrency_limit = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));
    }

    #[test]
    fn test_rejects_empty_strategy_list() {
        let mut config = Config::default();
        config.probe.strategies.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoStrategies));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let mut config = Config::default();
        config.targets = vec![target("a", None), target("a", Some("https://a.test"))];
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateTarget("a".to_string()))
        );
    }

    #[test]
    fn test_malformed_url_is_not_a_config_error() {
        let mut config = Config::default();
        config.targets = vec![target("a", Some("not a url"))];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_relative_metrics_path() {
        let mut config = Config::default();
        config.metrics.path = "metrics".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMetricsPath(_))
        ));
    }
}

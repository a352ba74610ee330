// src/probe/chain.rs
use super::error::ProbeError;
use super::strategy::{Attempt, FailureKind, Strategy};
use crate::config::ProbeConfig;
use crate::metrics::MetricsCollector;
use crate::registry::Target;
use crate::state::{ProbeOutcome, NO_METHOD};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};
use url::Url;

/// The policy knobs the chain needs out of `ProbeConfig`.
#[derive(Debug, Clone)]
pub struct ChainPolicy {
    pub per_probe_timeout: Duration,
    /// Whole-chain budget for one target. Each attempt gets at most what
    /// is left of it.
    pub probe_deadline: Duration,
    /// Defaults to `false`: a timed-out strategy hands over to the next one.
    pub timeout_is_terminal: bool,
    /// Defaults to `true`: a completed request whose status cannot be
    /// observed is reported `Online`.
    pub no_cors_counts_as_online: bool,
    pub log_failures: bool,
}

impl From<&ProbeConfig> for ChainPolicy {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            per_probe_timeout: config.per_probe_timeout(),
            probe_deadline: config.probe_deadline(),
            timeout_is_terminal: config.per_probe_timeout_is_terminal,
            no_cors_counts_as_online: config.no_cors_counts_as_online,
            log_failures: config.log_failures,
        }
    }
}

/// Only absolute http(s) urls with a host are probed.
pub fn parse_probe_url(raw: &str) -> Result<Url, ProbeError> {
    let url = Url::parse(raw.trim()).map_err(|e| ProbeError::InvalidTarget(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ProbeError::InvalidTarget(format!(
                "unsupported scheme '{}'",
                other
            )))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ProbeError::InvalidTarget("missing host".to_string()));
    }
    Ok(url)
}

/// Ordered list of strategies tried until one gives a definitive answer.
pub struct StrategyChain {
    strategies: Vec<Arc<dyn Strategy>>,
    policy: ChainPolicy,
    metrics: Option<Arc<MetricsCollector>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Arc<dyn Strategy>>, policy: ChainPolicy) -> Self {
        Self {
            strategies,
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<MetricsCollector>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn policy(&self) -> &ChainPolicy {
        &self.policy
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Probe one target. Never fails: every problem is folded into the
    /// returned outcome, and nothing outside the outgoing requests is touched.
    pub async fn probe_one(&self, target: &Target) -> ProbeOutcome {
        let raw = match target.url.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw,
            _ => return ProbeOutcome::not_applicable(),
        };
        let url = match parse_probe_url(raw) {
            Ok(url) => url,
            Err(e) => {
                warn!("Not probing {}: {}", target.id, e);
                return ProbeOutcome::error(NO_METHOD, e.to_string());
            }
        };

        let deadline = Instant::now() + self.policy.probe_deadline;
        let mut rejection: Option<(&'static str, u16)> = None;
        let mut inconclusive: Option<&'static str> = None;
        let mut last_failure: Option<(&'static str, ProbeError)> = None;

        for strategy in &self.strategies {
            let name = strategy.name();
            if !strategy.is_available() {
                debug!("Skipping unavailable strategy {} for {}", name, target.id);
                continue;
            }

            let started = Instant::now();
            let remaining = deadline.saturating_duration_since(started);
            if remaining.is_zero() {
                debug!("Probe budget for {} spent before {}", target.id, name);
                break;
            }
            let limit = self.policy.per_probe_timeout.min(remaining);
            let attempt = match timeout(limit, strategy.attempt(&url, limit)).await {
                Ok(attempt) => attempt,
                Err(_) => Attempt::failed(
                    FailureKind::Timeout,
                    format!("no response after {}ms", limit.as_millis()),
                ),
            };
            let elapsed = started.elapsed();
            self.observe(name, &attempt, elapsed);

            match attempt {
                Attempt::Reachable {
                    http_status: Some(code),
                } => {
                    return ProbeOutcome::online(
                        name,
                        format!("HTTP {} in {}ms", code, elapsed.as_millis()),
                    );
                }
                Attempt::Reachable { http_status: None } => {
                    if self.policy.no_cors_counts_as_online {
                        return ProbeOutcome::online(
                            name,
                            format!(
                                "reachable (status not observable) in {}ms",
                                elapsed.as_millis()
                            ),
                        );
                    }
                    debug!(
                        "{} reached {} but cannot observe its status, trying next strategy",
                        name, target.id
                    );
                    inconclusive.get_or_insert(name);
                }
                Attempt::Rejected { http_status } => {
                    self.log_failure(target, name, &format!("HTTP {}", http_status));
                    rejection = Some((name, http_status));
                }
                Attempt::Failed { kind, message } => {
                    let failure = ProbeError::StrategyFailure {
                        strategy: name,
                        kind,
                        message,
                    };
                    self.log_failure(target, name, &failure.to_string());

                    if kind == FailureKind::Timeout && self.policy.timeout_is_terminal {
                        return ProbeOutcome::error(name, failure.to_string());
                    }
                    last_failure = Some((name, failure));
                }
            }
        }

        if let Some((name, code)) = rejection {
            return ProbeOutcome::offline(name, format!("HTTP {}", code));
        }
        if let Some(name) = inconclusive {
            let detail = ProbeError::Inconclusive { strategy: name }.to_string();
            return ProbeOutcome::error(name, detail);
        }
        match last_failure {
            Some((name, failure)) => ProbeOutcome::error(name, failure.to_string()),
            None => ProbeOutcome::error(NO_METHOD, ProbeError::NoStrategyAvailable.to_string()),
        }
    }

    fn log_failure(&self, target: &Target, strategy: &str, detail: &str) {
        if self.policy.log_failures {
            warn!("{} probe failed for {}: {}", strategy, target.id, detail);
        } else {
            debug!("{} probe failed for {}: {}", strategy, target.id, detail);
        }
    }

    fn observe(&self, strategy: &str, attempt: &Attempt, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_strategy_attempt(strategy, attempt.label(), elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ProbeStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed attempt after an optional delay and counts calls.
    struct Scripted {
        name: &'static str,
        available: bool,
        delay: Option<Duration>,
        result: Attempt,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, result: Attempt) -> Self {
            Self {
                name,
                available: true,
                delay: None,
                result,
                calls: AtomicUsize::new(0),
            }
        }

        fn hanging(name: &'static str) -> Self {
            Self {
                delay: Some(Duration::from_secs(3600)),
                ..Self::new(name, Attempt::Reachable { http_status: Some(200) })
            }
        }

        fn unavailable(name: &'static str) -> Self {
            Self {
                available: false,
                ..Self::new(name, Attempt::Reachable { http_status: Some(200) })
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Strategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn attempt(&self, _url: &Url, _timeout: Duration) -> Attempt {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.result.clone()
        }
    }

    fn policy() -> ChainPolicy {
        ChainPolicy {
            per_probe_timeout: Duration::from_millis(5_000),
            probe_deadline: Duration::from_millis(15_000),
            timeout_is_terminal: false,
            no_cors_counts_as_online: true,
            log_failures: false,
        }
    }

    fn chain(strategies: Vec<Arc<Scripted>>, policy: ChainPolicy) -> StrategyChain {
        let strategies = strategies
            .into_iter()
            .map(|s| s as Arc<dyn Strategy>)
            .collect();
        StrategyChain::new(strategies, policy)
    }

    fn target() -> Target {
        Target::new("bot", Some("https://bot.test/health"))
    }

    fn refused() -> Attempt {
        Attempt::failed(FailureKind::Network, "connection refused")
    }

    #[test]
    fn test_parse_probe_url() {
        assert!(parse_probe_url("https://bot.test/health").is_ok());
        assert!(parse_probe_url("  http://bot.test ").is_ok());
        assert!(matches!(
            parse_probe_url("/relative/path"),
            Err(ProbeError::InvalidTarget(_))
        ));
        assert!(matches!(
            parse_probe_url("ftp://bot.test"),
            Err(ProbeError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_url_makes_no_attempt() {
        let strategy = Arc::new(Scripted::new("a", Attempt::Reachable { http_status: Some(200) }));
        let chain = chain(vec![strategy.clone()], policy());

        let outcome = chain
            .probe_one(&Target::new("broken", Some("not a url")))
            .await;

        assert_eq!(outcome.status, ProbeStatus::Error);
        assert!(outcome.detail.starts_with("invalid url"));
        assert_eq!(strategy.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_url_is_not_applicable() {
        let strategy = Arc::new(Scripted::new("a", Attempt::Reachable { http_status: Some(200) }));
        let chain = chain(vec![strategy.clone()], policy());

        let outcome = chain.probe_one(&Target::new("channel", None)).await;

        assert_eq!(outcome.status, ProbeStatus::NotApplicable);
        assert_eq!(strategy.calls(), 0);
    }

    #[tokio::test]
    async fn test_first_success_wins_and_is_tagged() {
        let first = Arc::new(Scripted::new("first", refused()));
        let second = Arc::new(Scripted::new("second", Attempt::Reachable { http_status: Some(200) }));
        let third = Arc::new(Scripted::new("third", Attempt::Reachable { http_status: Some(200) }));
        let chain = chain(vec![first.clone(), second.clone(), third.clone()], policy());

        let outcome = chain.probe_one(&target()).await;

        assert_eq!(outcome.status, ProbeStatus::Online);
        assert_eq!(outcome.method, "second");
        assert!(outcome.detail.starts_with("HTTP 200 in "));
        assert_eq!((first.calls(), second.calls(), third.calls()), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_unavailable_strategy_is_skipped() {
        let missing = Arc::new(Scripted::unavailable("missing"));
        let fallback = Arc::new(Scripted::new("fallback", Attempt::Reachable { http_status: Some(204) }));
        let chain = chain(vec![missing.clone(), fallback], policy());

        let outcome = chain.probe_one(&target()).await;

        assert_eq!(outcome.method, "fallback");
        assert_eq!(missing.calls(), 0);
    }

    #[tokio::test]
    async fn test_rejection_yields_offline() {
        let a = Arc::new(Scripted::new("a", Attempt::Rejected { http_status: 503 }));
        let b = Arc::new(Scripted::new("b", refused()));
        let chain = chain(vec![a, b], policy());

        let outcome = chain.probe_one(&target()).await;

        assert_eq!(outcome.status, ProbeStatus::Offline);
        assert_eq!(outcome.method, "a");
        assert_eq!(outcome.detail, "HTTP 503");
    }

    #[tokio::test]
    async fn test_all_failures_yield_error_with_last_category() {
        let a = Arc::new(Scripted::new("a", refused()));
        let b = Arc::new(Scripted::new(
            "b",
            Attempt::failed(FailureKind::Unexpected, "boom"),
        ));
        let chain = chain(vec![a, b], policy());

        let outcome = chain.probe_one(&target()).await;

        assert_eq!(outcome.status, ProbeStatus::Error);
        assert_eq!(outcome.method, "b");
        assert_eq!(outcome.detail, "unexpected error: boom");
    }

    #[tokio::test]
    async fn test_no_available_strategy_is_error() {
        let chain = chain(vec![Arc::new(Scripted::unavailable("x"))], policy());

        let outcome = chain.probe_one(&target()).await;

        assert_eq!(outcome.status, ProbeStatus::Error);
        assert_eq!(outcome.detail, "no strategy available");
        assert_eq!(outcome.method, NO_METHOD);
    }

    #[tokio::test]
    async fn test_opaque_completion_counts_as_online_by_default() {
        let opaque = Arc::new(Scripted::new("opaque", Attempt::Reachable { http_status: None }));
        let chain = chain(vec![opaque], policy());

        let outcome = chain.probe_one(&target()).await;

        assert_eq!(outcome.status, ProbeStatus::Online);
        assert!(outcome.detail.starts_with("reachable (status not observable)"));
    }

    #[tokio::test]
    async fn test_opaque_completion_is_inconclusive_when_policy_disabled() {
        let opaque = Arc::new(Scripted::new("opaque", Attempt::Reachable { http_status: None }));
        let later = Arc::new(Scripted::new("later", refused()));
        let chain = chain(
            vec![opaque, later.clone()],
            ChainPolicy {
                no_cors_counts_as_online: false,
                ..policy()
            },
        );

        let outcome = chain.probe_one(&target()).await;

        assert_eq!(later.calls(), 1);
        assert_eq!(outcome.status, ProbeStatus::Error);
        assert_eq!(outcome.method, "opaque");
        assert!(outcome.detail.starts_with("inconclusive"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_through_while_budget_remains() {
        let stuck = Arc::new(Scripted::hanging("stuck"));
        let next = Arc::new(Scripted::new("next", Attempt::Reachable { http_status: Some(200) }));
        let chain = chain(vec![stuck, next.clone()], policy());

        let started = Instant::now();
        let outcome = chain.probe_one(&target()).await;

        assert_eq!(outcome.status, ProbeStatus::Online);
        assert_eq!(outcome.method, "next");
        assert_eq!(next.calls(), 1);
        assert!(started.elapsed() < Duration::from_millis(5_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_chain_settles_within_probe_deadline() {
        let strategies: Vec<_> = ["get", "head", "icon"]
            .into_iter()
            .map(|name| Arc::new(Scripted::hanging(name)))
            .collect();
        let chain = chain(
            strategies.clone(),
            ChainPolicy::from(&ProbeConfig::default()),
        );

        let started = Instant::now();
        let outcome = chain.probe_one(&target()).await;

        assert!(started.elapsed() <= Duration::from_millis(5_050));
        assert_eq!(outcome.status, ProbeStatus::Error);
        assert_eq!(outcome.method, "get");
        assert_eq!(outcome.detail, "timeout: no response after 5000ms");
        let calls: Vec<_> = strategies.iter().map(|s| s.calls()).collect();
        assert_eq!(calls, vec![1, 0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_attempt_only_gets_remaining_budget() {
        let strategies: Vec<_> = ["get", "head"]
            .into_iter()
            .map(|name| Arc::new(Scripted::hanging(name)))
            .collect();
        let chain = chain(
            strategies.clone(),
            ChainPolicy {
                probe_deadline: Duration::from_millis(7_000),
                ..policy()
            },
        );

        let started = Instant::now();
        let outcome = chain.probe_one(&target()).await;

        assert!(started.elapsed() <= Duration::from_millis(7_050));
        assert_eq!(outcome.method, "head");
        assert!(outcome.detail.starts_with("timeout: no response after"));
        assert_ne!(outcome.detail, "timeout: no response after 5000ms");
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_timeout_stops_the_chain() {
        let stuck = Arc::new(Scripted::hanging("stuck"));
        let next = Arc::new(Scripted::new("next", Attempt::Reachable { http_status: Some(200) }));
        let chain = chain(
            vec![stuck, next.clone()],
            ChainPolicy {
                timeout_is_terminal: true,
                ..policy()
            },
        );

        let started = Instant::now();
        let outcome = chain.probe_one(&target()).await;

        assert_eq!(outcome.status, ProbeStatus::Error);
        assert_eq!(outcome.method, "stuck");
        assert_eq!(outcome.detail, "timeout: no response after 5000ms");
        assert_eq!(next.calls(), 0);
        assert!(started.elapsed() < Duration::from_millis(5_100));
    }
}

// src/probe/http.rs
use super::strategy::{Attempt, FailureKind, Strategy};
use crate::config::{ProbeConfig, StrategyKind};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CACHE_CONTROL;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use url::Url;

/// Shared client for all HTTP strategies. `None` means the strategies
/// report themselves unavailable instead of failing every probe.
pub fn build_client(config: &ProbeConfig) -> Option<Client> {
    let mut builder = Client::builder().timeout(config.per_probe_timeout());
    if let Some(agent) = &config.user_agent {
        builder = builder.user_agent(agent.clone());
    }

    match builder.build() {
        Ok(client) => Some(client),
        Err(e) => {
            error!("Failed to create HTTP client, HTTP strategies disabled: {}", e);
            None
        }
    }
}

/// Instantiate the configured strategies in order.
pub fn create_strategies(config: &ProbeConfig) -> Vec<Arc<dyn Strategy>> {
    let client = build_client(config);
    config
        .strategies
        .iter()
        .map(|kind| -> Arc<dyn Strategy> {
            match kind {
                StrategyKind::HttpGet => Arc::new(HttpGetStrategy::new(client.clone())),
                StrategyKind::OpaqueHead => Arc::new(OpaqueHeadStrategy::new(client.clone())),
                StrategyKind::Favicon => Arc::new(FaviconStrategy::new(client.clone())),
            }
        })
        .collect()
}

fn classify(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_builder() {
        FailureKind::Unexpected
    } else {
        FailureKind::Network
    }
}

/// Favicon fetches only count a 2xx.
fn from_status(status: StatusCode) -> Attempt {
    if status.is_success() {
        Attempt::Reachable {
            http_status: Some(status.as_u16()),
        }
    } else {
        Attempt::Rejected {
            http_status: status.as_u16(),
        }
    }
}

/// A plain GET also accepts redirects reqwest did not follow, such as a
/// 304 or a 3xx without `Location`.
fn from_page_status(status: StatusCode) -> Attempt {
    if status.is_redirection() {
        Attempt::Reachable {
            http_status: Some(status.as_u16()),
        }
    } else {
        from_status(status)
    }
}

fn unavailable() -> Attempt {
    Attempt::failed(FailureKind::Unexpected, "http client unavailable")
}

/// Plain GET that observes the status code. Most informative, but the
/// endpoint must actually answer with a success status.
pub struct HttpGetStrategy {
    client: Option<Client>,
}

impl HttpGetStrategy {
    pub fn new(client: Option<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Strategy for HttpGetStrategy {
    fn name(&self) -> &'static str {
        "http_get"
    }

    fn is_available(&self) -> bool {
        self.client.is_some()
    }

    async fn attempt(&self, url: &Url, timeout: Duration) -> Attempt {
        let Some(client) = &self.client else {
            return unavailable();
        };

        match client
            .get(url.clone())
            .header(CACHE_CONTROL, "no-cache")
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => from_page_status(response.status()),
            Err(e) => Attempt::failed(classify(&e), e.to_string()),
        }
    }
}

/// HEAD request whose status is deliberately ignored: any completed
/// exchange counts as reachable-but-unverified.
pub struct OpaqueHeadStrategy {
    client: Option<Client>,
}

impl OpaqueHeadStrategy {
    pub fn new(client: Option<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Strategy for OpaqueHeadStrategy {
    fn name(&self) -> &'static str {
        "opaque_head"
    }

    fn is_available(&self) -> bool {
        self.client.is_some()
    }

    async fn attempt(&self, url: &Url, timeout: Duration) -> Attempt {
        let Some(client) = &self.client else {
            return unavailable();
        };

        match client
            .head(url.clone())
            .header(CACHE_CONTROL, "no-cache")
            .timeout(timeout)
            .send()
            .await
        {
            Ok(_) => Attempt::Reachable { http_status: None },
            Err(e) => Attempt::failed(classify(&e), e.to_string()),
        }
    }
}

/// Fetches `<url>/favicon.ico` with a cache-busting `ping` parameter.
/// Most compatible; only tells us that something answered.
pub struct FaviconStrategy {
    client: Option<Client>,
}

impl FaviconStrategy {
    pub fn new(client: Option<Client>) -> Self {
        Self { client }
    }

    pub fn favicon_url(url: &Url) -> Result<Url, String> {
        let mut favicon = url.clone();
        favicon
            .path_segments_mut()
            .map_err(|_| format!("{} cannot carry a path", url))?
            .pop_if_empty()
            .push("favicon.ico");
        favicon.set_query(None);
        favicon
            .query_pairs_mut()
            .append_pair("ping", &Utc::now().timestamp_millis().to_string());
        Ok(favicon)
    }
}

#[async_trait]
impl Strategy for FaviconStrategy {
    fn name(&self) -> &'static str {
        "favicon"
    }

    fn is_available(&self) -> bool {
        self.client.is_some()
    }

    async fn attempt(&self, url: &Url, timeout: Duration) -> Attempt {
        let Some(client) = &self.client else {
            return unavailable();
        };
        let favicon = match Self::favicon_url(url) {
            Ok(u) => u,
            Err(message) => return Attempt::failed(FailureKind::Unexpected, message),
        };

        match client.get(favicon).timeout(timeout).send().await {
            Ok(response) => from_status(response.status()),
            Err(e) => Attempt::failed(classify(&e), e.to_string()),
        }
    }
}

// src/probe/strategy.rs
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Network,
    Unexpected,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Network => "network error",
            FailureKind::Unexpected => "unexpected error",
        })
    }
}

/// What a single transport attempt observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// The request completed. `http_status` is `None` when the transport
    /// cannot observe the status code.
    Reachable { http_status: Option<u16> },
    /// The request completed with a non-success status.
    Rejected { http_status: u16 },
    /// The request never completed.
    Failed { kind: FailureKind, message: String },
}

impl Attempt {
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Attempt::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Attempt::Reachable { .. } => "reachable",
            Attempt::Rejected { .. } => "rejected",
            Attempt::Failed { .. } => "failed",
        }
    }
}

/// One transport-specific way of checking reachability.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Unavailable strategies are skipped by the chain without an attempt.
    fn is_available(&self) -> bool {
        true
    }

    async fn attempt(&self, url: &Url, timeout: Duration) -> Attempt;
}

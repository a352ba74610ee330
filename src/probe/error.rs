// src/probe/error.rs
use super::strategy::FailureKind;

/// Everything that can go wrong while probing. `Display` doubles as the
/// human-readable outcome detail, so the wording is kept stable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid url: {0}")]
    InvalidTarget(String),

    #[error("{kind}: {message}")]
    StrategyFailure {
        strategy: &'static str,
        kind: FailureKind,
        message: String,
    },

    #[error("inconclusive: {strategy} completed but status is not observable")]
    Inconclusive { strategy: &'static str },

    #[error("no strategy available")]
    NoStrategyAvailable,

    #[error("unexpected error: {0}")]
    Unexpected(String),

    #[error("cycle timed out")]
    CycleTimeout,

    #[error("a probe cycle is already running")]
    ConcurrentCycleRejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_strings_carry_category() {
        let timeout = ProbeError::StrategyFailure {
            strategy: "http_get",
            kind: FailureKind::Timeout,
            message: "no response after 5000ms".to_string(),
        };
        assert_eq!(timeout.to_string(), "timeout: no response after 5000ms");

        let network = ProbeError::StrategyFailure {
            strategy: "favicon",
            kind: FailureKind::Network,
            message: "connection refused".to_string(),
        };
        assert_eq!(network.to_string(), "network error: connection refused");

        assert_eq!(ProbeError::CycleTimeout.to_string(), "cycle timed out");
        assert!(ProbeError::InvalidTarget("empty host".into())
            .to_string()
            .starts_with("invalid url"));
    }
}

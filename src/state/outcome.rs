// src/state/outcome.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Method label for outcomes no strategy produced.
pub const NO_METHOD: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Pending,
    Online,
    Offline,
    Error,
    NotApplicable,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Pending => "pending",
            ProbeStatus::Online => "online",
            ProbeStatus::Offline => "offline",
            ProbeStatus::Error => "error",
            ProbeStatus::NotApplicable => "not_applicable",
        }
    }

    /// Online, Offline and Error are the only states a cycle may settle on.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ProbeStatus::Online | ProbeStatus::Offline | ProbeStatus::Error
        )
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic identifier of a probe cycle. Zero means "never started".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct CycleId(pub u64);

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    /// Advisory text for display; never parsed back.
    pub detail: String,
    pub method: String,
    pub timestamp: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn new(status: ProbeStatus, method: &str, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            method: method.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn pending() -> Self {
        Self::new(ProbeStatus::Pending, NO_METHOD, "checking")
    }

    pub fn not_applicable() -> Self {
        Self::new(ProbeStatus::NotApplicable, NO_METHOD, "no probe url")
    }

    pub fn online(method: &str, detail: impl Into<String>) -> Self {
        Self::new(ProbeStatus::Online, method, detail)
    }

    pub fn offline(method: &str, detail: impl Into<String>) -> Self {
        Self::new(ProbeStatus::Offline, method, detail)
    }

    pub fn error(method: &str, detail: impl Into<String>) -> Self {
        Self::new(ProbeStatus::Error, method, detail)
    }
}

/// One `(id, status, detail, method)` notification for renderers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeUpdate {
    pub cycle: CycleId,
    pub id: String,
    pub status: ProbeStatus,
    pub detail: String,
    pub method: String,
}

impl OutcomeUpdate {
    pub fn new(cycle: CycleId, id: &str, outcome: &ProbeOutcome) -> Self {
        Self {
            cycle,
            id: id.to_string(),
            status: outcome.status,
            detail: outcome.detail.clone(),
            method: outcome.method.clone(),
        }
    }
}

/// Read-only copy of a target's state handed to renderers.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub id: String,
    pub display_name: String,
    pub status: ProbeStatus,
    pub detail: String,
    pub method: String,
    pub timestamp: DateTime<Utc>,
    /// Settled outcome from an earlier cycle, shown as stale while the
    /// current cycle is still pending for this target.
    pub last_known: Option<ProbeOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ProbeStatus::NotApplicable).unwrap();
        assert_eq!(json, "\"not_applicable\"");
        assert_eq!(ProbeStatus::Offline.to_string(), "offline");
    }

    #[test]
    fn test_only_terminal_statuses_are_settled() {
        assert!(ProbeStatus::Online.is_settled());
        assert!(ProbeStatus::Error.is_settled());
        assert!(!ProbeStatus::Pending.is_settled());
        assert!(!ProbeStatus::NotApplicable.is_settled());
    }
}

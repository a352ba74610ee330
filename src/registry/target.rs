// src/registry/target.rs
use crate::config::TargetConfig;
use serde::Serialize;
use std::sync::Arc;

/// A probe candidate. Immutable once loaded; identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub id: String,
    pub display_name: String,
    pub url: Option<String>,
}

impl Target {
    pub fn new(id: impl Into<String>, url: Option<&str>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            url: url.map(str::to_string),
        }
    }

    /// Blank urls are treated the same as missing ones.
    pub fn is_pingable(&self) -> bool {
        self.url.as_deref().map_or(false, |u| !u.trim().is_empty())
    }
}

impl From<TargetConfig> for Target {
    fn from(config: TargetConfig) -> Self {
        let display_name = if config.display_name.is_empty() {
            config.id.clone()
        } else {
            config.display_name
        };
        Self {
            id: config.id,
            display_name,
            url: config.url,
        }
    }
}

/// Ordered, load-once set of targets.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    targets: Arc<Vec<Arc<Target>>>,
}

impl Registry {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets: Arc::new(targets.into_iter().map(Arc::new).collect()),
        }
    }

    pub fn from_config(configs: Vec<TargetConfig>) -> Self {
        Self::new(configs.into_iter().map(Target::from).collect())
    }

    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    pub fn pingable(&self) -> Vec<Arc<Target>> {
        self.targets
            .iter()
            .filter(|t| t.is_pingable())
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Target>> {
        self.targets.iter().find(|t| t.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

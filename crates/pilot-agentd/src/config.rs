use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use pilot_core::{ClusterSet, QueueConfig, Retry, RunnerConfig};
use pilot_exec::{Backend, SubprocessConfig};
use pilot_model::{BackoffStrategy, ClusterProfile};
use pilot_observe::LoggerConfig;
use pilot_store::CouchConfig;

/// Everything the `pilot` binary reads from its configuration file.
///
/// Every section is optional; an empty object runs against a local CouchDB with
/// default retry, queue and runner settings and no clusters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub store: CouchConfig,
    pub logger: LoggerConfig,
    pub retry: BackoffStrategy,
    pub queue: QueueConfig,
    pub runner: RunnerConfig,
    pub executor: SubprocessConfig,
    pub clusters: BTreeMap<String, ClusterProfile>,
    /// Write Prometheus text exposition here when `run` ends.
    pub metrics_file: Option<PathBuf>,
}

impl AgentConfig {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let cfg: AgentConfig = serde_json::from_str(raw).context("parse configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `path`, or fall back to defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read configuration {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("configuration {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.store.validate().context("store section")?;
        self.executor.validate().context("executor section")?;
        if !(self.runner.margin.is_finite() && self.runner.margin >= 0.0) {
            bail!("runner.margin must be a non-negative number");
        }
        for (name, profile) in &self.clusters {
            profile
                .validate()
                .with_context(|| format!("cluster '{name}'"))?;
        }
        Ok(())
    }

    /// Store call wrapper: backoff from `retry`, per-call timeout from the store section.
    pub fn retry(&self) -> Retry {
        Retry::new(self.retry, Duration::from_millis(self.store.timeout_ms))
    }

    pub fn cluster_set(&self) -> anyhow::Result<ClusterSet> {
        let mut set = ClusterSet::new();
        for (name, profile) in &self.clusters {
            let backend = Backend::for_profile(profile)
                .with_context(|| format!("cluster '{name}' backend"))?;
            set.insert(name.clone(), profile.clone(), Arc::new(backend));
        }
        Ok(set)
    }
}

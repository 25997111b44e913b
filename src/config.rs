use crate::domain::{CheckpointPolicy, RetryPolicy};
use crate::durable_paths;
use crate::planner::{AgentInstance, Topology};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Runtime configuration for the task service and the `durable` binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DurableConfig {
    /// Task store directory. Defaults to `<home>/tasks`.
    pub store_dir: Option<PathBuf>,
    pub checkpoint_policy: CheckpointPolicy,
    pub retry: RetryPolicy,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl DurableConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given. Otherwise loads `<home>/config.yaml` if it
    /// exists, falling back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default_path = durable_paths::default_config_path()?;
        if default_path.is_file() {
            return Self::load(&default_path);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;

        if let Some(filter) = &self.log_filter {
            EnvFilter::try_new(filter)
                .with_context(|| format!("Invalid log_filter '{}'", filter))?;
        }

        if let Some(dir) = &self.store_dir {
            if dir.as_os_str().is_empty() {
                anyhow::bail!("store_dir must not be empty");
            }
        }

        Ok(())
    }

    /// Resolves and creates the task store directory.
    pub fn resolve_store_dir(&self) -> Result<PathBuf> {
        durable_paths::resolve_store_dir(self.store_dir.as_deref())
    }
}

/// YAML description of a workflow's agent topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDefinition {
    pub agents: Vec<AgentInstance>,
}

impl WorkflowDefinition {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;
        let definition: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse workflow file as YAML: {}", path.display()))?;
        definition.validate()?;
        Ok(definition)
    }

    fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            anyhow::bail!("At least one agent must be configured");
        }

        let mut ids = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                anyhow::bail!("Agent with id '{}' has an empty name", agent.agent_id);
            }
            if agent.output_key.trim().is_empty() {
                anyhow::bail!("Agent '{}' has an empty output_key", agent.name);
            }
            if !ids.insert(agent.agent_id.as_str()) {
                anyhow::bail!("Duplicate agent_id '{}'", agent.agent_id);
            }
        }

        Ok(())
    }

    pub fn topology(&self) -> Topology {
        Topology::new(self.agents.clone())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

//! Home-based storage paths for durable-agent persistence.
//!
//! Everything lives under `~/.durable-agent/` unless `DURABLE_AGENT_HOME`
//! points elsewhere:
//! - `tasks/` - task store (one directory per task)
//! - `config.yaml` - optional default configuration

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// The name of the durable agent directory under the user's home.
const DURABLE_AGENT_DIR: &str = ".durable-agent";

/// Environment variable overriding the home directory.
pub const HOME_ENV_VAR: &str = "DURABLE_AGENT_HOME";

/// Returns the durable agent home directory.
///
/// `$DURABLE_AGENT_HOME` when set and non-empty, `~/.durable-agent/` otherwise.
/// Creates the directory if it doesn't exist.
pub fn durable_agent_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV_VAR) {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => dirs::home_dir()
            .context("Could not determine home directory for task storage")?
            .join(DURABLE_AGENT_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create durable agent directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the default task store directory: `<home>/tasks/`
///
/// Creates the directory if it doesn't exist.
pub fn tasks_dir() -> Result<PathBuf> {
    let dir = durable_agent_home_dir()?.join("tasks");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create tasks directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the default config file path: `<home>/config.yaml`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(durable_agent_home_dir()?.join("config.yaml"))
}

/// Picks the task store directory: `configured` when given, else [`tasks_dir`].
pub fn resolve_store_dir(configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
            Ok(dir.to_path_buf())
        }
        None => tasks_dir(),
    }
}

#[cfg(test)]
#[path = "durable_paths_tests.rs"]
mod tests;

//! Failure classification and the retry/checkpoint policies applied by the task service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Canonical failure types for agent invocations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network hiccup, rate limit, or anything likely to succeed on retry.
    Transient,
    /// Agent exceeded its time budget.
    Timeout,
    /// Agent produced output that could not be used.
    InvalidOutput,
    /// Unrecoverable error.
    Fatal,
}

impl FailureKind {
    /// Returns true if this failure type is potentially recoverable via retry.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Transient | FailureKind::Timeout)
    }

    /// Returns a human-readable name for this failure type.
    pub fn display_name(self) -> &'static str {
        match self {
            FailureKind::Transient => "Transient",
            FailureKind::Timeout => "Timeout",
            FailureKind::InvalidOutput => "Invalid Output",
            FailureKind::Fatal => "Fatal",
        }
    }
}

/// Retry policy for failed task attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first one. Default: 2
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry. Default: 500ms
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt. Default: 2.0
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay. Default: 30s
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Validates the policy configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            anyhow::bail!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            );
        }
        if self.initial_delay_ms > self.max_delay_ms {
            anyhow::bail!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.initial_delay_ms,
                self.max_delay_ms
            );
        }
        Ok(())
    }
}

/// When the task service snapshots the scope into a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicy {
    /// Never write checkpoints.
    None,
    /// Checkpoint after every completed agent invocation.
    #[default]
    AfterEachAgent,
    /// Checkpoint once, when the root call finishes.
    AfterRootCall,
}

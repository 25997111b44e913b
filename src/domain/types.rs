//! Strongly typed domain primitives for durable tasks.
//!
//! These newtypes give task identifiers, timestamps and lifecycle status a
//! single definition shared by the journal, the store and the task service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one durable task (one plan instance).
/// Used as the directory name in the file store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Creates a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a task ID from its string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UTC timestamp wrapper used by events, metadata and checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampUtc(pub DateTime<Utc>);

impl TimestampUtc {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the timestamp as an RFC3339 string.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for TimestampUtc {
    fn default() -> Self {
        Self::now()
    }
}

/// Lifecycle status of a durable task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal tasks are never executed again without an explicit resume.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Returns true if moving from `self` to `next` is a valid lifecycle step.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Paused)
                | (Running, Retrying)
                | (Running, Cancelled)
                | (Retrying, Running)
                | (Retrying, Paused)
                | (Retrying, Failed)
                | (Retrying, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
                | (Failed, Running)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "paused" => Ok(TaskStatus::Paused),
            "retrying" => Ok(TaskStatus::Retrying),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// Persisted metadata for a durable task, stored next to its journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub id: TaskId,
    /// Name of the root agent or workflow driving this task.
    pub agent_name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub status: TaskStatus,
    pub created_at: TimestampUtc,
    pub updated_at: TimestampUtc,
    /// Reason recorded with the last transition to `Failed`.
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl TaskMetadata {
    /// Creates metadata for a brand-new task in `Pending` status.
    pub fn create(id: TaskId, agent_name: &str, labels: BTreeMap<String, String>) -> Self {
        let now = TimestampUtc::now();
        Self {
            id,
            agent_name: agent_name.to_string(),
            labels,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            failure_reason: None,
        }
    }

    /// Moves to `next` only if the current status equals `expected` and the
    /// lifecycle allows the step. Returns false and leaves `self` untouched otherwise.
    pub fn compare_and_transition(
        &mut self,
        expected: TaskStatus,
        next: TaskStatus,
        failure_reason: Option<&str>,
    ) -> bool {
        if self.status != expected || !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = TimestampUtc::now();
        self.failure_reason = if next == TaskStatus::Failed {
            failure_reason.map(str::to_string)
        } else {
            None
        };
        true
    }
}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;

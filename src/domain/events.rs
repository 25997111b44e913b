//! Journal events for durable tasks.
//!
//! Events are facts that have happened to one task. They are appended to the
//! journal in order, never rewritten, and are the single source of truth used
//! by the replaying planner when a task is resumed.

use crate::domain::types::{TaskId, TimestampUtc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One journal record: which task, when, and what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub recorded_at: TimestampUtc,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Closed set of things that can happen to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Task was created. `input` seeds the scope of every run.
    TaskStarted {
        #[serde(default)]
        input: BTreeMap<String, Value>,
    },

    /// An agent instance produced an output.
    AgentInvocationCompleted {
        agent_name: String,
        #[serde(default)]
        agent_id: Option<String>,
        /// JSON-encoded output. Legacy records may hold non-JSON text.
        #[serde(default)]
        serialized_output: Option<String>,
    },

    /// Task was resumed, possibly with fresh user-supplied scope entries.
    TaskResumed {
        #[serde(default)]
        user_input: BTreeMap<String, Value>,
    },

    /// Task stopped and waits for input or an explicit resume.
    TaskPaused {
        reason: String,
        #[serde(default)]
        pending_output_key: Option<String>,
    },

    /// An attempt failed and will be retried after `delay_ms`.
    TaskRetry {
        attempt: u32,
        max_retries: u32,
        error: String,
        delay_ms: u64,
    },

    /// Task finished; the planner returned its terminal action.
    TaskCompleted {
        #[serde(default)]
        serialized_result: Option<String>,
    },

    /// Task failed and will not be retried.
    TaskFailed { error: String },

    /// Task was cancelled.
    TaskCancelled,
}

impl TaskEvent {
    /// Creates an event recorded now.
    pub fn now(task_id: TaskId, kind: EventKind) -> Self {
        Self {
            task_id,
            recorded_at: TimestampUtc::now(),
            kind,
        }
    }

    pub fn started(task_id: TaskId, input: BTreeMap<String, Value>) -> Self {
        Self::now(task_id, EventKind::TaskStarted { input })
    }

    pub fn invocation_completed(
        task_id: TaskId,
        agent_name: &str,
        agent_id: Option<&str>,
        serialized_output: Option<String>,
    ) -> Self {
        Self::now(
            task_id,
            EventKind::AgentInvocationCompleted {
                agent_name: agent_name.to_string(),
                agent_id: agent_id.map(str::to_string),
                serialized_output,
            },
        )
    }

    pub fn resumed(task_id: TaskId, user_input: BTreeMap<String, Value>) -> Self {
        Self::now(task_id, EventKind::TaskResumed { user_input })
    }

    /// Returns the serialized type tag of this event.
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

impl EventKind {
    /// Returns the serialized type tag of this event kind.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::TaskStarted { .. } => "task_started",
            EventKind::AgentInvocationCompleted { .. } => "agent_invocation_completed",
            EventKind::TaskResumed { .. } => "task_resumed",
            EventKind::TaskPaused { .. } => "task_paused",
            EventKind::TaskRetry { .. } => "task_retry",
            EventKind::TaskCompleted { .. } => "task_completed",
            EventKind::TaskFailed { .. } => "task_failed",
            EventKind::TaskCancelled => "task_cancelled",
        }
    }
}

#[cfg(test)]
#[path = "tests/events_tests.rs"]
mod tests;

//! Error types for planners, the task store, agents and the task service.

use crate::domain::failure::FailureKind;
use crate::domain::types::{TaskId, TaskStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by planners, including the replaying planner.
///
/// Only programmer errors end up here. Malformed journal data never does.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlannerError {
    /// Lifecycle method called out of order (double init, second first_action, ...).
    #[error("illegal planner state: {0}")]
    IllegalState(String),
    /// The planner asked for an agent the topology does not contain.
    #[error("unknown agent '{agent_name}'")]
    UnknownAgent { agent_name: String },
    /// Planner was built without a required collaborator.
    #[error("planner misconfigured: {0}")]
    Misconfigured(String),
}

/// Errors raised by a task store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record in {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("task {0} not found")]
    NotFound(TaskId),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serialization(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.into(),
            source,
        }
    }
}

/// Failure reported by an agent invocation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{} failure: {message}", kind.display_name())]
pub struct AgentError {
    pub kind: FailureKind,
    pub message: String,
}

impl AgentError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Fatal, message)
    }
}

/// Errors surfaced by the task service and execution driver.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    /// Operation not allowed in the task's current status.
    #[error("task {task_id} is {status}: {reason}")]
    InvalidState {
        task_id: TaskId,
        status: TaskStatus,
        reason: String,
    },
    #[error("task {0} not found")]
    NotFound(TaskId),
}

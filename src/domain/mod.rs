//! Domain model for durable, resumable agent tasks.
//!
//! # Architecture
//!
//! - **Types** (`types.rs`): Task identity, lifecycle status and metadata
//! - **Events** (`events.rs`): Facts journaled for each task
//! - **Failure** (`failure.rs`): Failure taxonomy, retry and checkpoint policies
//! - **Errors** (`errors.rs`): Error types shared by planners, stores and the service
//!
//! # Usage
//!
//! ```ignore
//! use durable_agent::domain::{TaskEvent, TaskId};
//!
//! let task_id = TaskId::new();
//! store.append_event(&TaskEvent::resumed(task_id, user_input))?;
//! ```

pub mod errors;
pub mod events;
pub mod failure;
pub mod types;

pub use errors::{AgentError, PlannerError, StoreError, TaskError};
pub use events::{EventKind, TaskEvent};
pub use failure::{CheckpointPolicy, FailureKind, RetryPolicy};
pub use types::{TaskId, TaskMetadata, TaskStatus, TimestampUtc};

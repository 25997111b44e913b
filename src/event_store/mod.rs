//! Persistence for durable tasks: metadata, the append-only journal and checkpoints.
//!
//! The journal is the source of truth for what already happened to a task.
//! Checkpoints are scope snapshots kept for inspection; replay never reads them.

pub mod file_store;
pub mod memory_store;

pub use file_store::FileTaskStore;
pub use memory_store::InMemoryTaskStore;

use crate::domain::{StoreError, TaskEvent, TaskId, TaskMetadata, TaskStatus, TimestampUtc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Snapshot of a task's scope at some point of its execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub task_id: TaskId,
    pub taken_at: TimestampUtc,
    pub status: TaskStatus,
    /// Number of journal events recorded when the checkpoint was taken.
    pub journal_len: usize,
    #[serde(default)]
    pub scope: Option<BTreeMap<String, Value>>,
}

/// Storage backend for task metadata, journals and checkpoints.
///
/// Implementations serialize all operations on one task, so
/// `compare_and_set_status` is atomic with respect to other callers.
pub trait TaskStore: Send + Sync {
    fn save_metadata(&self, metadata: &TaskMetadata) -> Result<(), StoreError>;

    fn load_metadata(&self, task_id: TaskId) -> Result<Option<TaskMetadata>, StoreError>;

    /// Appends one event to the end of the task's journal.
    fn append_event(&self, event: &TaskEvent) -> Result<(), StoreError>;

    /// Appends `event` only if the stored status equals `expected`, with the
    /// check and the write done under the same lock. Returns false, writing
    /// nothing, when the status differs or the task has no metadata.
    fn append_event_if_status(
        &self,
        event: &TaskEvent,
        expected: TaskStatus,
    ) -> Result<bool, StoreError>;

    /// Loads the task's journal in append order. Unknown tasks have an empty journal.
    fn load_events(&self, task_id: TaskId) -> Result<Vec<TaskEvent>, StoreError>;

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    fn load_checkpoint(&self, task_id: TaskId) -> Result<Option<Checkpoint>, StoreError>;

    /// All tasks with saved metadata.
    fn task_ids(&self) -> Result<Vec<TaskId>, StoreError>;

    /// Removes every record of the task. Returns false if nothing was stored.
    fn delete(&self, task_id: TaskId) -> Result<bool, StoreError>;

    /// Moves the stored status from `expected` to `next` if, and only if, the
    /// stored status still equals `expected` and the transition is allowed.
    /// Returns the updated metadata, or `None` when the swap did not happen.
    fn compare_and_set_status(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        failure_reason: Option<&str>,
    ) -> Result<Option<TaskMetadata>, StoreError>;

    /// Tasks whose stored status equals `status`.
    fn task_ids_by_status(&self, status: TaskStatus) -> Result<Vec<TaskId>, StoreError> {
        let mut matching = Vec::new();
        for task_id in self.task_ids()? {
            if let Some(metadata) = self.load_metadata(task_id)? {
                if metadata.status == status {
                    matching.push(task_id);
                }
            }
        }
        Ok(matching)
    }
}

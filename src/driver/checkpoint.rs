use crate::domain::{CheckpointPolicy, StoreError, TaskId, TaskStatus, TimestampUtc};
use crate::event_store::{Checkpoint, TaskStore};
use crate::scope::AgenticScope;
use std::sync::Arc;

/// Writes checkpoints for a task according to its checkpoint policy.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn TaskStore>,
    policy: CheckpointPolicy,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn TaskStore>, policy: CheckpointPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> CheckpointPolicy {
        self.policy
    }

    /// Snapshots `scope` (when given) at a journal of `journal_len` events.
    pub fn checkpoint(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        scope: Option<&AgenticScope>,
        journal_len: usize,
    ) -> Result<Checkpoint, StoreError> {
        let checkpoint = Checkpoint {
            task_id,
            taken_at: TimestampUtc::now(),
            status,
            journal_len,
            scope: scope.map(|s| s.state().clone()),
        };
        self.store.save_checkpoint(&checkpoint)?;
        tracing::debug!(
            "Checkpoint for task {} at journal length {}",
            task_id,
            journal_len
        );
        Ok(checkpoint)
    }

    /// Called after every completed agent invocation.
    pub fn after_agent(
        &self,
        task_id: TaskId,
        scope: &AgenticScope,
        journal_len: usize,
    ) -> Result<Option<Checkpoint>, StoreError> {
        match self.policy {
            CheckpointPolicy::AfterEachAgent => self
                .checkpoint(task_id, TaskStatus::Running, Some(scope), journal_len)
                .map(Some),
            CheckpointPolicy::None | CheckpointPolicy::AfterRootCall => Ok(None),
        }
    }

    /// Called once when the root call returns, whether it finished or paused.
    pub fn after_root_call(
        &self,
        task_id: TaskId,
        scope: &AgenticScope,
        journal_len: usize,
    ) -> Result<Option<Checkpoint>, StoreError> {
        match self.policy {
            CheckpointPolicy::AfterRootCall => self
                .checkpoint(task_id, TaskStatus::Running, Some(scope), journal_len)
                .map(Some),
            CheckpointPolicy::None | CheckpointPolicy::AfterEachAgent => Ok(None),
        }
    }

    /// Called on pause and retry transitions. Keeps the last scope snapshot.
    pub fn after_transition(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        journal_len: usize,
    ) -> Result<Option<Checkpoint>, StoreError> {
        if self.policy != CheckpointPolicy::AfterEachAgent {
            return Ok(None);
        }
        let scope = self
            .store
            .load_checkpoint(task_id)?
            .and_then(|previous| previous.scope);
        let checkpoint = Checkpoint {
            task_id,
            taken_at: TimestampUtc::now(),
            status,
            journal_len,
            scope,
        };
        self.store.save_checkpoint(&checkpoint)?;
        Ok(Some(checkpoint))
    }

    pub fn latest(&self, task_id: TaskId) -> Result<Option<Checkpoint>, StoreError> {
        self.store.load_checkpoint(task_id)
    }
}

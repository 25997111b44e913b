//! In-memory task store for tests and embedders that do not need persistence.

use crate::domain::{StoreError, TaskEvent, TaskId, TaskMetadata, TaskStatus};
use crate::event_store::{Checkpoint, TaskStore};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct TaskRecord {
    metadata: Option<TaskMetadata>,
    events: Vec<TaskEvent>,
    checkpoint: Option<Checkpoint>,
}

/// Task store backed by a mutex-guarded map. All operations are serialized.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<TaskId, TaskRecord>> {
        // A panic while holding the lock cannot leave a record half-written:
        // every mutation is a single assignment or push.
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TaskStore for InMemoryTaskStore {
    fn save_metadata(&self, metadata: &TaskMetadata) -> Result<(), StoreError> {
        self.tasks().entry(metadata.id).or_default().metadata = Some(metadata.clone());
        Ok(())
    }

    fn load_metadata(&self, task_id: TaskId) -> Result<Option<TaskMetadata>, StoreError> {
        Ok(self
            .tasks()
            .get(&task_id)
            .and_then(|record| record.metadata.clone()))
    }

    fn append_event(&self, event: &TaskEvent) -> Result<(), StoreError> {
        self.tasks()
            .entry(event.task_id)
            .or_default()
            .events
            .push(event.clone());
        Ok(())
    }

    fn append_event_if_status(
        &self,
        event: &TaskEvent,
        expected: TaskStatus,
    ) -> Result<bool, StoreError> {
        let mut tasks = self.tasks();
        let Some(record) = tasks.get_mut(&event.task_id) else {
            return Ok(false);
        };
        if record.metadata.as_ref().map(|m| m.status) != Some(expected) {
            return Ok(false);
        }
        record.events.push(event.clone());
        Ok(true)
    }

    fn load_events(&self, task_id: TaskId) -> Result<Vec<TaskEvent>, StoreError> {
        Ok(self
            .tasks()
            .get(&task_id)
            .map(|record| record.events.clone())
            .unwrap_or_default())
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.tasks().entry(checkpoint.task_id).or_default().checkpoint = Some(checkpoint.clone());
        Ok(())
    }

    fn load_checkpoint(&self, task_id: TaskId) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self
            .tasks()
            .get(&task_id)
            .and_then(|record| record.checkpoint.clone()))
    }

    fn task_ids(&self) -> Result<Vec<TaskId>, StoreError> {
        let mut ids: Vec<TaskId> = self
            .tasks()
            .iter()
            .filter(|(_, record)| record.metadata.is_some())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, task_id: TaskId) -> Result<bool, StoreError> {
        Ok(self.tasks().remove(&task_id).is_some())
    }

    fn compare_and_set_status(
        &self,
        task_id: TaskId,
        expected: TaskStatus,
        next: TaskStatus,
        failure_reason: Option<&str>,
    ) -> Result<Option<TaskMetadata>, StoreError> {
        let mut tasks = self.tasks();
        let Some(metadata) = tasks
            .get_mut(&task_id)
            .and_then(|record| record.metadata.as_mut())
        else {
            return Ok(None);
        };
        if !metadata.compare_and_transition(expected, next, failure_reason) {
            return Ok(None);
        }
        Ok(Some(metadata.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_events_are_isolated_per_task() {
        let store = InMemoryTaskStore::new();
        let a = TaskId::new();
        let b = TaskId::new();
        store
            .append_event(&TaskEvent::started(a, BTreeMap::new()))
            .unwrap();
        store
            .append_event(&TaskEvent::resumed(a, BTreeMap::new()))
            .unwrap();
        store
            .append_event(&TaskEvent::started(b, BTreeMap::new()))
            .unwrap();

        assert_eq!(store.load_events(a).unwrap().len(), 2);
        assert_eq!(store.load_events(b).unwrap().len(), 1);
        assert!(store.load_events(TaskId::new()).unwrap().is_empty());
    }

    #[test]
    fn test_task_ids_only_lists_tasks_with_metadata() {
        let store = InMemoryTaskStore::new();
        let with_metadata = TaskMetadata::create(TaskId::new(), "agent", BTreeMap::new());
        store.save_metadata(&with_metadata).unwrap();
        store
            .append_event(&TaskEvent::started(TaskId::new(), BTreeMap::new()))
            .unwrap();

        assert_eq!(store.task_ids().unwrap(), vec![with_metadata.id]);
    }

    #[test]
    fn test_compare_and_set_status() {
        let store = InMemoryTaskStore::new();
        let metadata = TaskMetadata::create(TaskId::new(), "agent", BTreeMap::new());
        store.save_metadata(&metadata).unwrap();

        assert!(store
            .compare_and_set_status(metadata.id, TaskStatus::Running, TaskStatus::Paused, None)
            .unwrap()
            .is_none());
        let running = store
            .compare_and_set_status(metadata.id, TaskStatus::Pending, TaskStatus::Running, None)
            .unwrap()
            .unwrap();
        assert_eq!(running.status, TaskStatus::Running);
        assert_eq!(
            store.task_ids_by_status(TaskStatus::Running).unwrap(),
            vec![metadata.id]
        );
    }

    #[test]
    fn test_delete() {
        let store = InMemoryTaskStore::new();
        let metadata = TaskMetadata::create(TaskId::new(), "agent", BTreeMap::new());
        store.save_metadata(&metadata).unwrap();

        assert!(store.delete(metadata.id).unwrap());
        assert!(!store.delete(metadata.id).unwrap());
        assert!(store.load_metadata(metadata.id).unwrap().is_none());
    }

    #[test]
    fn test_append_event_if_status_checks_stored_status() {
        let store = InMemoryTaskStore::new();
        let metadata = TaskMetadata::create(TaskId::new(), "agent", BTreeMap::new());
        store.save_metadata(&metadata).unwrap();
        let event = TaskEvent::resumed(metadata.id, BTreeMap::new());

        assert!(!store
            .append_event_if_status(&event, TaskStatus::Running)
            .unwrap());
        assert!(store
            .append_event_if_status(&event, TaskStatus::Pending)
            .unwrap());
        assert!(!store
            .append_event_if_status(
                &TaskEvent::resumed(TaskId::new(), BTreeMap::new()),
                TaskStatus::Pending
            )
            .unwrap());
        assert_eq!(store.load_events(metadata.id).unwrap().len(), 1);
    }
}

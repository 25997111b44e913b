use super::*;
use crate::domain::EventKind;
use serde_json::json;
use std::collections::BTreeMap;
use tempfile::tempdir;

fn store_in(dir: &tempfile::TempDir) -> FileTaskStore {
    FileTaskStore::new(dir.path().join("tasks")).expect("store")
}

fn saved_task(store: &FileTaskStore) -> TaskMetadata {
    let metadata = TaskMetadata::create(TaskId::new(), "story", BTreeMap::new());
    store.save_metadata(&metadata).unwrap();
    metadata
}

#[test]
fn test_metadata_roundtrip_and_layout() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let metadata = saved_task(&store);

    let loaded = store.load_metadata(metadata.id).unwrap().unwrap();
    assert_eq!(loaded, metadata);

    let task_dir = store.base_dir().join(metadata.id.to_string());
    assert!(task_dir.join("metadata.json").is_file());
    assert!(!task_dir.join("metadata.json.tmp").exists());
}

#[test]
fn test_missing_task_reads_as_empty() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let id = TaskId::new();

    assert!(store.load_metadata(id).unwrap().is_none());
    assert!(store.load_events(id).unwrap().is_empty());
    assert!(store.load_checkpoint(id).unwrap().is_none());
    assert!(!store.delete(id).unwrap());
    assert!(store
        .compare_and_set_status(id, TaskStatus::Pending, TaskStatus::Running, None)
        .unwrap()
        .is_none());
}

#[test]
fn test_journal_preserves_append_order() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let id = saved_task(&store).id;

    store
        .append_event(&TaskEvent::started(id, BTreeMap::new()))
        .unwrap();
    store
        .append_event(&TaskEvent::invocation_completed(
            id,
            "writer",
            Some("w1"),
            Some("\"story\"".to_string()),
        ))
        .unwrap();
    store
        .append_event(&TaskEvent::now(
            id,
            EventKind::TaskCompleted {
                serialized_result: None,
            },
        ))
        .unwrap();

    let types: Vec<&str> = store
        .load_events(id)
        .unwrap()
        .iter()
        .map(TaskEvent::event_type)
        .collect();
    assert_eq!(
        types,
        vec!["task_started", "agent_invocation_completed", "task_completed"]
    );
}

#[test]
fn test_torn_final_line_is_skipped() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let id = saved_task(&store).id;
    store
        .append_event(&TaskEvent::started(id, BTreeMap::new()))
        .unwrap();

    let journal = store.base_dir().join(id.to_string()).join("journal.jsonl");
    let mut content = std::fs::read_to_string(&journal).unwrap();
    content.push_str("{\"task_id\":\"");
    std::fs::write(&journal, content).unwrap();

    let events = store.load_events(id).unwrap();
    assert_eq!(events.len(), 1);
}

#[test]
fn test_corrupt_middle_line_is_an_error() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let id = saved_task(&store).id;
    store
        .append_event(&TaskEvent::started(id, BTreeMap::new()))
        .unwrap();

    let journal = store.base_dir().join(id.to_string()).join("journal.jsonl");
    let mut content = std::fs::read_to_string(&journal).unwrap();
    content.push_str("not json\n");
    std::fs::write(&journal, content).unwrap();
    store
        .append_event(&TaskEvent::resumed(id, BTreeMap::new()))
        .unwrap();

    let err = store.load_events(id).unwrap_err();
    assert!(matches!(err, StoreError::Serialization { .. }));
}

#[test]
fn test_checkpoint_overwrites_previous() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let id = saved_task(&store).id;

    for journal_len in [1, 2] {
        let mut scope = BTreeMap::new();
        scope.insert("step".to_string(), json!(journal_len));
        store
            .save_checkpoint(&Checkpoint {
                task_id: id,
                taken_at: crate::domain::TimestampUtc::now(),
                status: TaskStatus::Running,
                journal_len,
                scope: Some(scope),
            })
            .unwrap();
    }

    let checkpoint = store.load_checkpoint(id).unwrap().unwrap();
    assert_eq!(checkpoint.journal_len, 2);
    assert_eq!(checkpoint.scope.unwrap()["step"], json!(2));
}

#[test]
fn test_compare_and_set_status() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let id = saved_task(&store).id;

    let updated = store
        .compare_and_set_status(id, TaskStatus::Pending, TaskStatus::Running, None)
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, TaskStatus::Running);

    // Stale expectation loses.
    assert!(store
        .compare_and_set_status(id, TaskStatus::Pending, TaskStatus::Cancelled, None)
        .unwrap()
        .is_none());

    // Disallowed transition loses even with the right expectation.
    assert!(store
        .compare_and_set_status(id, TaskStatus::Running, TaskStatus::Pending, None)
        .unwrap()
        .is_none());

    let failed = store
        .compare_and_set_status(id, TaskStatus::Running, TaskStatus::Failed, Some("boom"))
        .unwrap()
        .unwrap();
    assert_eq!(failed.failure_reason.as_deref(), Some("boom"));
    assert_eq!(
        store.load_metadata(id).unwrap().unwrap().status,
        TaskStatus::Failed
    );
}

#[test]
fn test_concurrent_cas_has_single_winner() {
    let dir = tempdir().expect("temp dir");
    let store = std::sync::Arc::new(store_in(&dir));
    let id = saved_task(&store).id;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            std::thread::spawn(move || {
                store
                    .compare_and_set_status(id, TaskStatus::Pending, TaskStatus::Running, None)
                    .unwrap()
                    .is_some()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn test_task_ids_and_status_filter() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let a = saved_task(&store).id;
    let b = saved_task(&store).id;
    store
        .compare_and_set_status(b, TaskStatus::Pending, TaskStatus::Running, None)
        .unwrap();
    std::fs::create_dir_all(store.base_dir().join("not-a-task")).unwrap();

    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(store.task_ids().unwrap(), expected);
    assert_eq!(
        store.task_ids_by_status(TaskStatus::Running).unwrap(),
        vec![b]
    );
}

#[test]
fn test_delete_removes_task_directory() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let id = saved_task(&store).id;
    store
        .append_event(&TaskEvent::started(id, BTreeMap::new()))
        .unwrap();

    assert!(store.delete(id).unwrap());
    assert!(!store.base_dir().join(id.to_string()).exists());
    assert!(store.load_metadata(id).unwrap().is_none());
    assert!(store.task_ids().unwrap().is_empty());
}

#[test]
fn test_append_after_torn_line_keeps_journal_readable() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let id = saved_task(&store).id;
    store
        .append_event(&TaskEvent::started(id, BTreeMap::new()))
        .unwrap();

    let journal = store.base_dir().join(id.to_string()).join("journal.jsonl");
    let mut content = std::fs::read_to_string(&journal).unwrap();
    content.push_str("{\"task_id\":\"");
    std::fs::write(&journal, content).unwrap();

    store
        .append_event(&TaskEvent::resumed(id, BTreeMap::new()))
        .unwrap();

    let types: Vec<&str> = store
        .load_events(id)
        .unwrap()
        .iter()
        .map(TaskEvent::event_type)
        .collect();
    assert_eq!(types, vec!["task_started", "task_resumed"]);
    let content = std::fs::read_to_string(&journal).unwrap();
    assert_eq!(content.lines().count(), 2);
    assert!(content.ends_with('\n'));
}

#[test]
fn test_append_terminates_final_line_missing_its_newline() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let id = saved_task(&store).id;
    store
        .append_event(&TaskEvent::started(id, BTreeMap::new()))
        .unwrap();

    let journal = store.base_dir().join(id.to_string()).join("journal.jsonl");
    let content = std::fs::read_to_string(&journal).unwrap();
    std::fs::write(&journal, content.trim_end()).unwrap();
    assert_eq!(store.load_events(id).unwrap().len(), 1);

    store
        .append_event(&TaskEvent::resumed(id, BTreeMap::new()))
        .unwrap();

    assert_eq!(store.load_events(id).unwrap().len(), 2);
}

#[test]
fn test_append_event_if_status() {
    let dir = tempdir().expect("temp dir");
    let store = store_in(&dir);
    let id = saved_task(&store).id;
    let event = TaskEvent::resumed(id, BTreeMap::new());

    assert!(!store
        .append_event_if_status(&event, TaskStatus::Running)
        .unwrap());
    assert!(store.load_events(id).unwrap().is_empty());

    store
        .compare_and_set_status(id, TaskStatus::Pending, TaskStatus::Running, None)
        .unwrap();
    assert!(store
        .append_event_if_status(&event, TaskStatus::Running)
        .unwrap());
    assert_eq!(store.load_events(id).unwrap().len(), 1);

    let unknown = TaskEvent::resumed(TaskId::new(), BTreeMap::new());
    assert!(!store
        .append_event_if_status(&unknown, TaskStatus::Running)
        .unwrap());
}

#[test]
fn test_delete_racing_appends_never_fails() {
    let dir = tempdir().expect("temp dir");
    let store = std::sync::Arc::new(store_in(&dir));
    let id = saved_task(&store).id;

    let appender = {
        let store = store.clone();
        std::thread::spawn(move || {
            (0..50)
                .map(|_| store.append_event(&TaskEvent::resumed(id, BTreeMap::new())))
                .filter(Result::is_err)
                .count()
        })
    };
    let delete_errors = (0..20).filter(|_| store.delete(id).is_err()).count();

    assert_eq!(appender.join().unwrap(), 0);
    assert_eq!(delete_errors, 0);
    assert!(store.load_events(id).unwrap().len() <= 50);
}

//! Tests for the journal event wire format.

use super::*;
use serde_json::json;

#[test]
fn test_completed_event_serializes_with_type_tag() {
    let task_id = TaskId::new();
    let event =
        TaskEvent::invocation_completed(task_id, "writer", Some("w1"), Some("\"draft\"".into()));

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "agent_invocation_completed");
    assert_eq!(value["agent_name"], "writer");
    assert_eq!(value["agent_id"], "w1");
    assert_eq!(value["serialized_output"], "\"draft\"");
    assert_eq!(value["task_id"], task_id.to_string());
    assert_eq!(event.event_type(), "agent_invocation_completed");
}

#[test]
fn test_event_type_matches_serialized_tag_for_every_kind() {
    let task_id = TaskId::new();
    let kinds = vec![
        EventKind::TaskStarted {
            input: BTreeMap::new(),
        },
        EventKind::AgentInvocationCompleted {
            agent_name: "a".into(),
            agent_id: None,
            serialized_output: None,
        },
        EventKind::TaskResumed {
            user_input: BTreeMap::new(),
        },
        EventKind::TaskPaused {
            reason: "waiting".into(),
            pending_output_key: Some("approval".into()),
        },
        EventKind::TaskRetry {
            attempt: 1,
            max_retries: 2,
            error: "flaky".into(),
            delay_ms: 500,
        },
        EventKind::TaskCompleted {
            serialized_result: None,
        },
        EventKind::TaskFailed {
            error: "boom".into(),
        },
        EventKind::TaskCancelled,
    ];

    for kind in kinds {
        let event = TaskEvent::now(task_id, kind);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.event_type());
    }
}

#[test]
fn test_resumed_event_parses_user_input() {
    let task_id = TaskId::new();
    let line = json!({
        "task_id": task_id.to_string(),
        "recorded_at": "2026-01-01T00:00:00Z",
        "type": "task_resumed",
        "user_input": { "topic": "cats", "count": 3 }
    })
    .to_string();

    let event: TaskEvent = serde_json::from_str(&line).unwrap();
    match event.kind {
        EventKind::TaskResumed { user_input } => {
            assert_eq!(user_input["topic"], json!("cats"));
            assert_eq!(user_input["count"], json!(3));
        }
        other => panic!("unexpected kind: {:?}", other),
    }
}

#[test]
fn test_legacy_completed_event_without_optional_fields_parses() {
    let task_id = TaskId::new();
    let line = json!({
        "task_id": task_id.to_string(),
        "recorded_at": "2026-01-01T00:00:00Z",
        "type": "agent_invocation_completed",
        "agent_name": "researcher"
    })
    .to_string();

    let event: TaskEvent = serde_json::from_str(&line).unwrap();
    assert_eq!(
        event.kind,
        EventKind::AgentInvocationCompleted {
            agent_name: "researcher".into(),
            agent_id: None,
            serialized_output: None,
        }
    );
}

#[test]
fn test_unknown_event_type_is_rejected() {
    let line = json!({
        "task_id": TaskId::new().to_string(),
        "recorded_at": "2026-01-01T00:00:00Z",
        "type": "task_teleported"
    })
    .to_string();

    assert!(serde_json::from_str::<TaskEvent>(&line).is_err());
}

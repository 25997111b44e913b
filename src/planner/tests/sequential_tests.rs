//! Tests for the sequential reference planner.

use super::*;
use crate::planner::AgentInstance;
use serde_json::json;

fn topology() -> Topology {
    Topology::new(vec![
        AgentInstance::new("researcher", "r1", "research").with_inputs(["topic"]),
        AgentInstance::new("writer", "w1", "draft").with_inputs(["topic", "research"]),
    ])
}

fn invoked_agent(action: &Action) -> &str {
    match action {
        Action::Invoke(call) => &call.agent_name,
        Action::Done { .. } => panic!("expected invoke, got done"),
    }
}

#[test]
fn test_runs_agents_in_topology_order() {
    let mut planner = SequentialPlanner::new();
    planner.init(topology()).unwrap();
    let mut scope = AgenticScope::new("t");

    let first = planner.first_action(&mut scope).unwrap();
    assert_eq!(invoked_agent(&first), "researcher");

    let call = first.agent_call().unwrap().clone();
    scope.write_state("research", json!("facts"));
    let second = planner
        .next_action(
            &mut scope,
            &AgentInvocation::live(&call, Some(json!("facts"))),
        )
        .unwrap();
    assert_eq!(invoked_agent(&second), "writer");
    assert!(!planner.terminated());
}

#[test]
fn test_terminates_with_last_output() {
    let mut planner = SequentialPlanner::new();
    planner.init(topology()).unwrap();
    let mut scope = AgenticScope::new("t");

    planner.first_action(&mut scope).unwrap();
    planner
        .next_action(&mut scope, &AgentInvocation::replayed("researcher", None, None))
        .unwrap();
    scope.write_state("draft", json!("essay"));
    let last = planner
        .next_action(&mut scope, &AgentInvocation::replayed("writer", None, None))
        .unwrap();

    assert_eq!(last, Action::done(Some(json!("essay"))));
    assert!(planner.terminated());
}

#[test]
fn test_gathers_inputs_from_scope() {
    let mut planner = SequentialPlanner::new();
    planner.init(topology()).unwrap();
    let mut scope = AgenticScope::new("t");
    scope.write_state("topic", json!("cats"));
    scope.write_state("unrelated", json!(true));

    let first = planner.first_action(&mut scope).unwrap();
    let call = first.agent_call().unwrap();
    assert_eq!(call.inputs.len(), 1);
    assert_eq!(call.inputs["topic"], json!("cats"));
    assert_eq!(call.agent_id.as_deref(), Some("r1"));
}

#[test]
fn test_empty_topology_is_done_immediately() {
    let mut planner = SequentialPlanner::new();
    planner.init(Topology::default()).unwrap();
    let mut scope = AgenticScope::new("t");

    let action = planner.first_action(&mut scope).unwrap();
    assert_eq!(action, Action::done(None));
    assert!(planner.terminated());
}

#[test]
fn test_init_twice_is_illegal() {
    let mut planner = SequentialPlanner::new();
    planner.init(topology()).unwrap();
    let err = planner.init(topology()).unwrap_err();
    assert!(matches!(err, PlannerError::IllegalState(_)));
}

#[test]
fn test_first_action_twice_is_illegal() {
    let mut planner = SequentialPlanner::new();
    planner.init(topology()).unwrap();
    let mut scope = AgenticScope::new("t");
    planner.first_action(&mut scope).unwrap();

    let err = planner.first_action(&mut scope).unwrap_err();
    assert!(matches!(err, PlannerError::IllegalState(_)));
}

#[test]
fn test_first_action_before_init_is_illegal() {
    let mut planner = SequentialPlanner::new();
    let mut scope = AgenticScope::new("t");
    let err = planner.first_action(&mut scope).unwrap_err();
    assert!(matches!(err, PlannerError::IllegalState(_)));
}

#[test]
fn test_next_action_after_termination_is_illegal() {
    let mut planner = SequentialPlanner::new();
    planner.init(Topology::default()).unwrap();
    let mut scope = AgenticScope::new("t");
    planner.first_action(&mut scope).unwrap();

    let err = planner
        .next_action(&mut scope, &AgentInvocation::replayed("x", None, None))
        .unwrap_err();
    assert!(matches!(err, PlannerError::IllegalState(_)));
}

#[test]
fn test_boxed_planner_delegates() {
    let mut planner: Box<dyn Planner> = Box::new(SequentialPlanner::new());
    planner.init(topology()).unwrap();
    assert_eq!(planner.topology().map(Topology::len), Some(2));
    assert!(!planner.terminated());
}

//! Replaying planner: resumes a plan from its journal without re-running agents.
//!
//! On the first call to `first_action`, the replaying planner:
//! 1. Writes the user input of every `TaskResumed` event into the scope
//! 2. Asks the wrapped planner for its first action
//! 3. For every `AgentInvocationCompleted` event, in journal order, writes the
//!    recorded output under the agent's output key and feeds a synthetic
//!    invocation to the wrapped planner's `next_action`
//! 4. Hands back the action the wrapped planner lands on
//!
//! After that every call is a straight passthrough. Replay reads the journal
//! but never appends to it, so it can be rerun from scratch after a crash.

use crate::domain::{EventKind, PlannerError, TaskEvent};
use crate::planner::{Action, AgentInvocation, Planner, Topology};
use crate::scope::AgenticScope;
use serde_json::Value;
use std::collections::BTreeMap;

/// Completed invocation extracted from the journal.
#[derive(Debug, Clone)]
struct CompletedInvocation {
    agent_name: String,
    agent_id: Option<String>,
    serialized_output: Option<String>,
}

/// Wraps a planner and fast-forwards it through journaled history.
///
/// Counters are plain fields: one caller drives a planner at a time.
#[derive(Debug)]
pub struct ReplayingPlanner<P> {
    delegate: P,
    completed: Vec<CompletedInvocation>,
    resumed_inputs: Vec<BTreeMap<String, Value>>,
    topology: Option<Topology>,
    replayed_count: usize,
    replay_complete: bool,
}

impl<P: Planner> ReplayingPlanner<P> {
    pub fn builder() -> ReplayingPlannerBuilder<P> {
        ReplayingPlannerBuilder {
            delegate: None,
            journal_events: Vec::new(),
        }
    }

    /// Wraps `delegate`, replaying the given journal on the first action.
    pub fn new(delegate: P, journal_events: &[TaskEvent]) -> Self {
        let mut completed = Vec::new();
        let mut resumed_inputs = Vec::new();

        for event in journal_events {
            match &event.kind {
                EventKind::AgentInvocationCompleted {
                    agent_name,
                    agent_id,
                    serialized_output,
                } => completed.push(CompletedInvocation {
                    agent_name: agent_name.clone(),
                    agent_id: agent_id.clone(),
                    serialized_output: serialized_output.clone(),
                }),
                EventKind::TaskResumed { user_input } => resumed_inputs.push(user_input.clone()),
                EventKind::TaskStarted { .. }
                | EventKind::TaskPaused { .. }
                | EventKind::TaskRetry { .. }
                | EventKind::TaskCompleted { .. }
                | EventKind::TaskFailed { .. }
                | EventKind::TaskCancelled => {}
            }
        }

        let replay_complete = completed.is_empty() && resumed_inputs.is_empty();
        Self {
            delegate,
            completed,
            resumed_inputs,
            topology: None,
            replayed_count: 0,
            replay_complete,
        }
    }

    /// Number of completed invocations consumed from the journal so far.
    pub fn replayed_count(&self) -> usize {
        self.replayed_count
    }

    /// True once the planner has switched to live passthrough.
    pub fn is_replay_complete(&self) -> bool {
        self.replay_complete
    }

    /// Number of completed invocations found in the journal.
    pub fn completed_event_count(&self) -> usize {
        self.completed.len()
    }

    /// Number of resume events found in the journal.
    pub fn resume_event_count(&self) -> usize {
        self.resumed_inputs.len()
    }

    pub fn delegate(&self) -> &P {
        &self.delegate
    }

    pub fn into_inner(self) -> P {
        self.delegate
    }

    fn replay(&mut self, scope: &mut AgenticScope) -> Result<Action, PlannerError> {
        tracing::info!(
            "Replaying {} completed invocations and {} resume events from journal",
            self.completed.len(),
            self.resumed_inputs.len()
        );

        // Resume input goes in first: recorded outputs may have been computed against it.
        for user_input in &self.resumed_inputs {
            for (key, value) in user_input {
                scope.write_state(key.clone(), value.clone());
                tracing::debug!("Wrote user input to scope key '{}'", key);
            }
        }

        let mut current = self.delegate.first_action(scope)?;

        while self.replayed_count < self.completed.len() {
            let event = &self.completed[self.replayed_count];
            let output = deserialize_output(event.serialized_output.as_deref());

            write_output_to_scope(scope, self.topology.as_ref(), event, output.as_ref());

            let invocation =
                AgentInvocation::replayed(&event.agent_name, event.agent_id.as_deref(), output);

            current = self.delegate.next_action(scope, &invocation)?;
            self.replayed_count += 1;
            tracing::debug!(
                "Replayed invocation {}/{}: agent={}",
                self.replayed_count,
                self.completed.len(),
                invocation.agent_name
            );

            if current.is_done() {
                tracing::info!(
                    "Delegate planner terminated after {} replayed invocations",
                    self.replayed_count
                );
                break;
            }
        }

        self.replay_complete = true;
        tracing::info!(
            "Replay complete. {} invocations replayed. Switching to live execution.",
            self.replayed_count
        );
        Ok(current)
    }
}

impl<P: Planner> Planner for ReplayingPlanner<P> {
    fn init(&mut self, topology: Topology) -> Result<(), PlannerError> {
        self.delegate.init(topology.clone())?;
        self.topology = Some(topology);
        Ok(())
    }

    fn first_action(&mut self, scope: &mut AgenticScope) -> Result<Action, PlannerError> {
        if self.replay_complete {
            return self.delegate.first_action(scope);
        }
        self.replay(scope)
    }

    fn next_action(
        &mut self,
        scope: &mut AgenticScope,
        invocation: &AgentInvocation,
    ) -> Result<Action, PlannerError> {
        self.delegate.next_action(scope, invocation)
    }

    fn topology(&self) -> Option<&Topology> {
        self.delegate.topology()
    }

    fn terminated(&self) -> bool {
        self.delegate.terminated()
    }
}

/// Builder for [`ReplayingPlanner`]. The delegate is required.
#[derive(Debug)]
pub struct ReplayingPlannerBuilder<P> {
    delegate: Option<P>,
    journal_events: Vec<TaskEvent>,
}

impl<P: Planner> ReplayingPlannerBuilder<P> {
    /// Sets the planner to wrap.
    pub fn delegate(mut self, delegate: P) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Sets the ordered journal of the plan instance. May be empty.
    pub fn journal_events(mut self, journal_events: Vec<TaskEvent>) -> Self {
        self.journal_events = journal_events;
        self
    }

    /// Builds the planner. Fails if no delegate was set.
    pub fn build(self) -> Result<ReplayingPlanner<P>, PlannerError> {
        let delegate = self.delegate.ok_or_else(|| {
            PlannerError::Misconfigured("delegate planner must be set".to_string())
        })?;
        Ok(ReplayingPlanner::new(delegate, &self.journal_events))
    }
}

/// Parses a journaled output. Falls back to the raw text when it is not JSON.
fn deserialize_output(serialized: Option<&str>) -> Option<Value> {
    let raw = serialized?;
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                "Failed to deserialize replayed output, using raw string: {}",
                e
            );
            Some(Value::String(raw.to_string()))
        }
    }
}

fn write_output_to_scope(
    scope: &mut AgenticScope,
    topology: Option<&Topology>,
    event: &CompletedInvocation,
    output: Option<&Value>,
) {
    let output_key =
        topology.and_then(|t| t.output_key(event.agent_id.as_deref(), &event.agent_name));

    match (output_key, output) {
        (Some(key), Some(value)) => {
            scope.write_state(key, value.clone());
            tracing::debug!(
                "Wrote replayed output to scope key '{}' for agent '{}'",
                key,
                event.agent_name
            );
        }
        (Some(_), None) => {}
        (None, _) => tracing::debug!(
            "No output key found for agent '{}' (id={:?}), skipping scope write",
            event.agent_name,
            event.agent_id
        ),
    }
}

#[cfg(test)]
#[path = "tests/replay_tests.rs"]
mod tests;

//! Reference planner that runs every agent of the topology once, in order.

use crate::domain::PlannerError;
use crate::planner::{Action, AgentCall, AgentInvocation, Planner, Topology};
use crate::scope::AgenticScope;
use std::collections::BTreeMap;

/// Invokes the topology's agents one after another.
///
/// Each agent receives the scope entries named by its `input_keys`. When the
/// last agent has run, the plan finishes with the last agent's output as result.
#[derive(Debug, Default)]
pub struct SequentialPlanner {
    topology: Option<Topology>,
    cursor: usize,
    started: bool,
    terminated: bool,
}

impl SequentialPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the agent the planner is currently waiting on.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn action_at(&mut self, scope: &AgenticScope) -> Result<Action, PlannerError> {
        let topology = self.topology.as_ref().ok_or_else(|| {
            PlannerError::IllegalState("planner used before init".to_string())
        })?;

        if let Some(agent) = topology.get(self.cursor) {
            let inputs: BTreeMap<_, _> = agent
                .input_keys
                .iter()
                .filter_map(|key| scope.read_state(key).map(|v| (key.clone(), v.clone())))
                .collect();
            return Ok(Action::Invoke(AgentCall::for_agent(agent, inputs)));
        }

        let result = topology
            .agents()
            .last()
            .and_then(|agent| scope.read_state(&agent.output_key))
            .cloned();
        self.terminated = true;
        Ok(Action::done(result))
    }
}

impl Planner for SequentialPlanner {
    fn init(&mut self, topology: Topology) -> Result<(), PlannerError> {
        if self.topology.is_some() {
            return Err(PlannerError::IllegalState(
                "init called more than once".to_string(),
            ));
        }
        self.topology = Some(topology);
        Ok(())
    }

    fn first_action(&mut self, scope: &mut AgenticScope) -> Result<Action, PlannerError> {
        if self.started {
            return Err(PlannerError::IllegalState(
                "first_action called more than once".to_string(),
            ));
        }
        let action = self.action_at(scope)?;
        self.started = true;
        Ok(action)
    }

    fn next_action(
        &mut self,
        scope: &mut AgenticScope,
        invocation: &AgentInvocation,
    ) -> Result<Action, PlannerError> {
        if !self.started {
            return Err(PlannerError::IllegalState(
                "next_action called before first_action".to_string(),
            ));
        }
        if self.terminated {
            return Err(PlannerError::IllegalState(
                "next_action called after termination".to_string(),
            ));
        }

        tracing::debug!(
            "Sequential planner advancing past agent '{}' (step {})",
            invocation.agent_name,
            self.cursor + 1
        );
        self.cursor += 1;
        self.action_at(scope)
    }

    fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    fn terminated(&self) -> bool {
        self.terminated
    }
}

#[cfg(test)]
#[path = "tests/sequential_tests.rs"]
mod tests;

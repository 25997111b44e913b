//! Planner decisions and the invocation records fed back into planners.

use crate::planner::topology::AgentInstance;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Request to run one agent with the given inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCall {
    pub agent_name: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
}

impl AgentCall {
    pub fn for_agent(agent: &AgentInstance, inputs: BTreeMap<String, Value>) -> Self {
        Self {
            agent_name: agent.name.clone(),
            agent_id: Some(agent.agent_id.clone()),
            inputs,
        }
    }
}

/// What a planner wants to happen next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Run the named agent.
    Invoke(AgentCall),
    /// The plan is finished.
    Done {
        #[serde(default)]
        result: Option<Value>,
    },
}

impl Action {
    pub fn done(result: Option<Value>) -> Self {
        Action::Done { result }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Action::Done { .. })
    }

    /// The agent call, if this action invokes one.
    pub fn agent_call(&self) -> Option<&AgentCall> {
        match self {
            Action::Invoke(call) => Some(call),
            Action::Done { .. } => None,
        }
    }
}

/// Record of one agent run, handed to [`crate::planner::Planner::next_action`].
///
/// Replayed invocations only carry the agent identity and its output;
/// request and arguments are not journaled.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInvocation {
    pub request: Option<AgentCall>,
    pub agent_name: String,
    pub agent_id: Option<String>,
    pub arguments: BTreeMap<String, Value>,
    pub output: Option<Value>,
}

impl AgentInvocation {
    /// Invocation that just ran live for `call`.
    pub fn live(call: &AgentCall, output: Option<Value>) -> Self {
        Self {
            request: Some(call.clone()),
            agent_name: call.agent_name.clone(),
            agent_id: call.agent_id.clone(),
            arguments: call.inputs.clone(),
            output,
        }
    }

    /// Invocation synthesized from a journal record.
    pub fn replayed(agent_name: &str, agent_id: Option<&str>, output: Option<Value>) -> Self {
        Self {
            request: None,
            agent_name: agent_name.to_string(),
            agent_id: agent_id.map(str::to_string),
            arguments: BTreeMap::new(),
            output,
        }
    }

    pub fn is_replayed(&self) -> bool {
        self.request.is_none()
    }
}

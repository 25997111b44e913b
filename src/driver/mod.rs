//! Executes plans against registered agents and manages long-lived tasks.
//!
//! [`ExecutionDriver`] runs one attempt of a plan: it asks the planner for
//! actions, invokes agents, writes their outputs into the scope and journals
//! every completed invocation. [`TaskService`] owns the task lifecycle around
//! it: status transitions, retries, pause/resume and crash recovery.

mod checkpoint;
mod execution;
mod service;

pub use checkpoint::CheckpointManager;
pub use execution::{ExecutionDriver, RunOutcome};
pub use service::{ReplayPreview, TaskConfiguration, TaskOutcome, TaskRun, TaskService};

use crate::domain::AgentError;
use crate::planner::{AgentInstance, Planner, SequentialPlanner, Topology};
use crate::scope::AgenticScope;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Result of a single agent invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    Completed(Value),
    /// The agent needs external input before it can finish. The task pauses
    /// and the agent is invoked again once the task is resumed.
    Paused {
        reason: String,
        pending_output_key: Option<String>,
    },
}

/// A unit of work the planner can schedule.
pub trait Agent: Send + Sync {
    fn invoke(
        &self,
        scope: &AgenticScope,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<AgentOutcome, AgentError>;
}

impl<F> Agent for F
where
    F: Fn(&AgenticScope, &BTreeMap<String, Value>) -> Result<AgentOutcome, AgentError>
        + Send
        + Sync,
{
    fn invoke(
        &self,
        scope: &AgenticScope,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<AgentOutcome, AgentError> {
        self(scope, inputs)
    }
}

/// Agent implementations keyed by the topology entries they back.
#[derive(Default)]
pub struct AgentRegistry {
    agents: Vec<Box<dyn Agent>>,
    topology: Topology,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an agent. Registration order is topology order.
    pub fn register(mut self, instance: AgentInstance, agent: impl Agent + 'static) -> Self {
        let mut instances = self.topology.agents().to_vec();
        instances.push(instance);
        self.topology = Topology::new(instances);
        self.agents.push(Box::new(agent));
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Looks an agent up by id, then by name. The first registration wins.
    pub fn resolve(&self, agent_id: Option<&str>, agent_name: &str) -> Option<&dyn Agent> {
        let index = self.topology.index_of(agent_id, agent_name)?;
        self.agents.get(index).map(|agent| agent.as_ref())
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}

type PlannerFactory = Box<dyn Fn() -> Box<dyn Planner> + Send + Sync>;

/// Everything needed to (re)build a task's execution: the agents and a
/// factory producing a fresh planner for every attempt.
pub struct Workflow {
    registry: AgentRegistry,
    planner_factory: PlannerFactory,
}

impl Workflow {
    pub fn new<F>(registry: AgentRegistry, planner_factory: F) -> Self
    where
        F: Fn() -> Box<dyn Planner> + Send + Sync + 'static,
    {
        Self {
            registry,
            planner_factory: Box::new(planner_factory),
        }
    }

    /// Runs the registered agents one after another.
    pub fn sequential(registry: AgentRegistry) -> Self {
        Self::new(registry, || Box::new(SequentialPlanner::new()))
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn planner(&self) -> Box<dyn Planner> {
        (self.planner_factory)()
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

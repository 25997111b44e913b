use crate::domain::{PlannerError, TaskError, TaskEvent, TaskId, TaskStatus};
use crate::driver::{AgentOutcome, AgentRegistry, CheckpointManager};
use crate::event_store::TaskStore;
use crate::planner::{Action, AgentInvocation, Planner};
use crate::scope::AgenticScope;
use serde_json::Value;

/// How one run of a plan ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Option<Value>),
    Paused {
        reason: String,
        pending_output_key: Option<String>,
    },
    /// The task left `Running` (cancelled, or recovered elsewhere) mid-run.
    /// The invocation in flight, if any, was not journaled.
    Interrupted {
        status: TaskStatus,
    },
}

/// Drives a planner to completion against an agent registry, journaling every
/// completed invocation as it goes.
pub struct ExecutionDriver<'a> {
    store: &'a dyn TaskStore,
    checkpoints: &'a CheckpointManager,
}

impl<'a> ExecutionDriver<'a> {
    pub fn new(store: &'a dyn TaskStore, checkpoints: &'a CheckpointManager) -> Self {
        Self { store, checkpoints }
    }

    /// Initializes `planner` with the registry topology and runs it until it is
    /// done, an agent pauses or the task stops being `Running`.
    ///
    /// `journal_len` is the number of events already journaled for the task;
    /// checkpoints count on from it. Agent failures and planner errors are
    /// returned as-is; nothing is journaled for the failing invocation.
    pub fn run(
        &self,
        task_id: TaskId,
        registry: &AgentRegistry,
        planner: &mut dyn Planner,
        scope: &mut AgenticScope,
        mut journal_len: usize,
    ) -> Result<RunOutcome, TaskError> {
        planner.init(registry.topology().clone())?;
        let mut action = planner.first_action(scope)?;

        loop {
            let call = match action {
                Action::Done { result } => {
                    self.checkpoints
                        .after_root_call(task_id, scope, journal_len)?;
                    return Ok(RunOutcome::Completed(result));
                }
                Action::Invoke(call) => call,
            };

            let agent = registry
                .resolve(call.agent_id.as_deref(), &call.agent_name)
                .ok_or_else(|| PlannerError::UnknownAgent {
                    agent_name: call.agent_name.clone(),
                })?;

            let status = self.stored_status(task_id)?;
            if status != TaskStatus::Running {
                tracing::info!(
                    "Task {} is {}, not invoking agent '{}'",
                    task_id,
                    status,
                    call.agent_name
                );
                return Ok(RunOutcome::Interrupted { status });
            }

            tracing::debug!("Task {}: invoking agent '{}'", task_id, call.agent_name);
            let output = match agent.invoke(scope, &call.inputs)? {
                AgentOutcome::Completed(Value::Null) => None,
                AgentOutcome::Completed(value) => Some(value),
                AgentOutcome::Paused {
                    reason,
                    pending_output_key,
                } => {
                    self.checkpoints
                        .after_root_call(task_id, scope, journal_len)?;
                    return Ok(RunOutcome::Paused {
                        reason,
                        pending_output_key,
                    });
                }
            };

            let output_key = registry
                .topology()
                .output_key(call.agent_id.as_deref(), &call.agent_name);
            if let (Some(key), Some(value)) = (output_key, output.as_ref()) {
                scope.write_state(key, value.clone());
            }

            let completed = TaskEvent::invocation_completed(
                task_id,
                &call.agent_name,
                call.agent_id.as_deref(),
                output.as_ref().map(Value::to_string),
            );
            if !self
                .store
                .append_event_if_status(&completed, TaskStatus::Running)?
            {
                let status = self.stored_status(task_id)?;
                tracing::info!(
                    "Task {} became {} while agent '{}' ran, dropping its output",
                    task_id,
                    status,
                    call.agent_name
                );
                return Ok(RunOutcome::Interrupted { status });
            }
            journal_len += 1;
            self.checkpoints.after_agent(task_id, scope, journal_len)?;

            action = planner.next_action(scope, &AgentInvocation::live(&call, output))?;
        }
    }

    fn stored_status(&self, task_id: TaskId) -> Result<TaskStatus, TaskError> {
        self.store
            .load_metadata(task_id)?
            .map(|metadata| metadata.status)
            .ok_or(TaskError::NotFound(task_id))
    }
}

#[cfg(test)]
#[path = "tests/execution_tests.rs"]
mod tests;

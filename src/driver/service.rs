//! Lifecycle management for long-lived tasks.
//!
//! Every attempt (first run, retry or resume) rebuilds the planner from the
//! workflow, seeds a fresh scope from the task's start input and wraps the
//! planner in a [`ReplayingPlanner`] over the journal recorded so far. Agents
//! that already completed are therefore never invoked twice.
//!
//! Status changes always go through the store's compare-and-set, so a cancel
//! issued by another process is never overwritten by a finishing run.

use crate::domain::{
    CheckpointPolicy, EventKind, RetryPolicy, TaskError, TaskEvent, TaskId, TaskMetadata,
    TaskStatus,
};
use crate::driver::{CheckpointManager, ExecutionDriver, RunOutcome, Workflow};
use crate::event_store::TaskStore;
use crate::planner::{Action, Planner, ReplayingPlanner, Topology};
use crate::scope::AgenticScope;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

const RECOVERED_REASON: &str = "Recovered after process restart";

/// Parameters for starting a task.
#[derive(Debug, Clone, Default)]
pub struct TaskConfiguration {
    pub agent_name: String,
    pub labels: BTreeMap<String, String>,
    /// Initial scope entries, journaled with `TaskStarted`.
    pub input: BTreeMap<String, Value>,
    /// Falls back to the service default when unset.
    pub checkpoint_policy: Option<CheckpointPolicy>,
    /// Falls back to the service default when unset.
    pub retry_policy: Option<RetryPolicy>,
}

impl TaskConfiguration {
    pub fn new(agent_name: &str) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_input(mut self, key: &str, value: Value) -> Self {
        self.input.insert(key.to_string(), value);
        self
    }

    pub fn with_checkpoint_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoint_policy = Some(policy);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

/// How a call to `start` or `resume` ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed {
        result: Option<Value>,
    },
    Paused {
        reason: String,
        pending_output_key: Option<String>,
    },
    Failed {
        error: String,
    },
    /// Another caller moved the task to `status` while this run was in flight.
    /// Nothing about the run's ending was recorded.
    Interrupted {
        status: TaskStatus,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRun {
    pub task_id: TaskId,
    pub outcome: TaskOutcome,
}

/// What a resumed task would look like, computed without invoking any agent.
#[derive(Debug, Clone)]
pub struct ReplayPreview {
    pub scope: AgenticScope,
    pub replayed_count: usize,
    pub completed_event_count: usize,
    pub next_action: Action,
}

/// Starts, resumes, cancels and recovers durable tasks.
///
/// Execution is synchronous: `start` and `resume` return once the task
/// completes, pauses or fails. One caller drives a given task at a time.
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    checkpoint_policy: CheckpointPolicy,
    retry_policy: RetryPolicy,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            checkpoint_policy: CheckpointPolicy::default(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_checkpoint_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoint_policy = policy;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Creates a task, journals its start input and runs it.
    pub fn start(
        &self,
        configuration: TaskConfiguration,
        workflow: &Workflow,
    ) -> Result<TaskRun, TaskError> {
        let task_id = TaskId::new();
        let metadata =
            TaskMetadata::create(task_id, &configuration.agent_name, configuration.labels.clone());
        self.store.save_metadata(&metadata)?;
        self.store
            .append_event(&TaskEvent::started(task_id, configuration.input.clone()))?;
        tracing::info!(
            "Task {} started with agent '{}'",
            task_id,
            configuration.agent_name
        );

        let (checkpoint_policy, retry_policy) = self.policies(configuration);
        let outcome = self.execute(task_id, workflow, checkpoint_policy, &retry_policy)?;
        Ok(TaskRun { task_id, outcome })
    }

    /// Resumes a paused, failed or interrupted task with the service defaults.
    ///
    /// Completed and cancelled tasks cannot be resumed, and neither can tasks
    /// that are still running or waiting to retry.
    pub fn resume(&self, task_id: TaskId, workflow: &Workflow) -> Result<TaskRun, TaskError> {
        self.resume_with(task_id, workflow, None)
    }

    /// Like [`TaskService::resume`], with the checkpoint and retry policies of
    /// `configuration` taking precedence over the service defaults. Its other
    /// fields are ignored: the task keeps its stored name, labels and input.
    pub fn resume_with(
        &self,
        task_id: TaskId,
        workflow: &Workflow,
        configuration: Option<TaskConfiguration>,
    ) -> Result<TaskRun, TaskError> {
        let current = self.require_metadata(task_id)?.status;
        match current {
            TaskStatus::Completed | TaskStatus::Cancelled => {
                return Err(invalid_state(task_id, current, "cannot resume"));
            }
            TaskStatus::Running | TaskStatus::Retrying => {
                return Err(invalid_state(
                    task_id,
                    current,
                    "cancel it first or wait for it to finish",
                ));
            }
            TaskStatus::Pending | TaskStatus::Paused | TaskStatus::Failed => {}
        }

        if self
            .store
            .compare_and_set_status(task_id, current, TaskStatus::Running, None)?
            .is_none()
        {
            return Err(invalid_state(
                task_id,
                current,
                "concurrent transition already in progress",
            ));
        }
        self.store
            .append_event(&TaskEvent::resumed(task_id, BTreeMap::new()))?;
        tracing::info!("Task {} resumed", task_id);

        let (checkpoint_policy, retry_policy) = match configuration {
            Some(configuration) => self.policies(configuration),
            None => (self.checkpoint_policy, self.retry_policy.clone()),
        };
        let outcome = self.execute(task_id, workflow, checkpoint_policy, &retry_policy)?;
        Ok(TaskRun { task_id, outcome })
    }

    /// Records external input for a paused task. It lands in the scope on the
    /// next resume.
    pub fn provide_input(&self, task_id: TaskId, key: &str, value: Value) -> Result<(), TaskError> {
        let status = self.require_metadata(task_id)?.status;
        if status != TaskStatus::Paused {
            return Err(invalid_state(task_id, status, "task is not paused"));
        }

        let mut user_input = BTreeMap::new();
        user_input.insert(key.to_string(), value);
        self.store
            .append_event(&TaskEvent::resumed(task_id, user_input))?;
        tracing::info!("External input provided for task {} at key '{}'", task_id, key);
        Ok(())
    }

    /// Cancels a non-terminal task. Returns false if the task is unknown,
    /// already terminal, or another transition won the race.
    pub fn cancel(&self, task_id: TaskId) -> Result<bool, TaskError> {
        let mut cancelled = None;
        for _ in 0..2 {
            let Some(metadata) = self.store.load_metadata(task_id)? else {
                return Ok(false);
            };
            if metadata.status.is_terminal() {
                return Ok(false);
            }
            cancelled = self.store.compare_and_set_status(
                task_id,
                metadata.status,
                TaskStatus::Cancelled,
                None,
            )?;
            if cancelled.is_some() {
                break;
            }
        }
        if cancelled.is_none() {
            return Ok(false);
        }

        self.store
            .append_event(&TaskEvent::now(task_id, EventKind::TaskCancelled))?;
        tracing::info!("Task {} cancelled", task_id);
        Ok(true)
    }

    /// Moves tasks left running or retrying by a dead process to `Paused`, so
    /// they can be resumed. Returns the recovered task ids.
    pub fn recover_interrupted_tasks(&self) -> Result<Vec<TaskId>, TaskError> {
        let mut interrupted = self.store.task_ids_by_status(TaskStatus::Running)?;
        interrupted.extend(self.store.task_ids_by_status(TaskStatus::Retrying)?);

        let mut recovered = Vec::new();
        for task_id in interrupted {
            let Some(metadata) = self.store.load_metadata(task_id)? else {
                continue;
            };
            let paused = self.store.compare_and_set_status(
                task_id,
                metadata.status,
                TaskStatus::Paused,
                None,
            )?;
            if paused.is_none() {
                tracing::warn!(
                    "Task {} could not be recovered (concurrent status transition)",
                    task_id
                );
                continue;
            }
            self.store.append_event(&TaskEvent::now(
                task_id,
                EventKind::TaskPaused {
                    reason: RECOVERED_REASON.to_string(),
                    pending_output_key: None,
                },
            ))?;
            tracing::info!("Task {} recovered from interrupted state, now paused", task_id);
            recovered.push(task_id);
        }
        Ok(recovered)
    }

    pub fn status(&self, task_id: TaskId) -> Result<Option<TaskStatus>, TaskError> {
        Ok(self.store.load_metadata(task_id)?.map(|m| m.status))
    }

    pub fn metadata(&self, task_id: TaskId) -> Result<Option<TaskMetadata>, TaskError> {
        Ok(self.store.load_metadata(task_id)?)
    }

    pub fn events(&self, task_id: TaskId) -> Result<Vec<TaskEvent>, TaskError> {
        Ok(self.store.load_events(task_id)?)
    }

    /// All tasks, or only those in `status`.
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<TaskId>, TaskError> {
        let ids = match status {
            Some(status) => self.store.task_ids_by_status(status)?,
            None => self.store.task_ids()?,
        };
        Ok(ids)
    }

    /// Deletes a terminal task. Returns false if nothing was stored.
    pub fn cleanup(&self, task_id: TaskId) -> Result<bool, TaskError> {
        if let Some(metadata) = self.store.load_metadata(task_id)? {
            if !metadata.status.is_terminal() {
                return Err(invalid_state(
                    task_id,
                    metadata.status,
                    "only terminal tasks can be cleaned up",
                ));
            }
        }
        Ok(self.store.delete(task_id)?)
    }

    /// Replays the journal into `delegate` and reports the action it would take
    /// next. No agent is invoked and nothing is written to the store.
    pub fn preview_replay(
        &self,
        task_id: TaskId,
        topology: Topology,
        delegate: Box<dyn Planner>,
    ) -> Result<ReplayPreview, TaskError> {
        self.require_metadata(task_id)?;
        let (mut planner, mut scope, _) = self.prepare_attempt(task_id, delegate)?;
        planner.init(topology)?;
        let next_action = planner.first_action(&mut scope)?;

        Ok(ReplayPreview {
            replayed_count: planner.replayed_count(),
            completed_event_count: planner.completed_event_count(),
            scope,
            next_action,
        })
    }

    /// Policies of `configuration`, falling back to the service defaults.
    fn policies(&self, configuration: TaskConfiguration) -> (CheckpointPolicy, RetryPolicy) {
        (
            configuration
                .checkpoint_policy
                .unwrap_or(self.checkpoint_policy),
            configuration
                .retry_policy
                .unwrap_or_else(|| self.retry_policy.clone()),
        )
    }

    fn require_metadata(&self, task_id: TaskId) -> Result<TaskMetadata, TaskError> {
        self.store
            .load_metadata(task_id)?
            .ok_or(TaskError::NotFound(task_id))
    }

    /// Builds the planner and scope for one attempt from the current journal,
    /// along with the journal's length.
    fn prepare_attempt(
        &self,
        task_id: TaskId,
        delegate: Box<dyn Planner>,
    ) -> Result<(ReplayingPlanner<Box<dyn Planner>>, AgenticScope, usize), TaskError> {
        let events = self.store.load_events(task_id)?;
        let journal_len = events.len();

        let mut scope = AgenticScope::new(task_id.to_string());
        for event in &events {
            if let EventKind::TaskStarted { input } = &event.kind {
                scope.write_states(input.clone());
            }
        }

        let planner = ReplayingPlanner::builder()
            .delegate(delegate)
            .journal_events(events)
            .build()?;
        Ok((planner, scope, journal_len))
    }

    fn execute(
        &self,
        task_id: TaskId,
        workflow: &Workflow,
        checkpoint_policy: CheckpointPolicy,
        retry_policy: &RetryPolicy,
    ) -> Result<TaskOutcome, TaskError> {
        let checkpoints = CheckpointManager::new(self.store.clone(), checkpoint_policy);
        let driver = ExecutionDriver::new(self.store.as_ref(), &checkpoints);
        let max_attempts = retry_policy.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            if let Some(status) = self.enter_running(task_id)? {
                return Ok(TaskOutcome::Interrupted { status });
            }

            let (mut planner, mut scope, journal_len) =
                self.prepare_attempt(task_id, workflow.planner())?;
            let run = driver.run(
                task_id,
                workflow.registry(),
                &mut planner,
                &mut scope,
                journal_len,
            );
            let error = match run {
                Ok(RunOutcome::Completed(result)) => return self.finish_completed(task_id, result),
                Ok(RunOutcome::Paused {
                    reason,
                    pending_output_key,
                }) => return self.finish_paused(task_id, &checkpoints, reason, pending_output_key),
                Ok(RunOutcome::Interrupted { status }) => {
                    return Ok(TaskOutcome::Interrupted { status })
                }
                // Storage is broken: leave the task running for crash recovery.
                Err(e @ TaskError::Store(_)) => return Err(e),
                Err(e) => e,
            };

            let stored = self.require_metadata(task_id)?.status;
            if stored.is_terminal() {
                tracing::debug!(
                    "Task {} caught error but is already {}: {}",
                    task_id,
                    stored,
                    error
                );
                return Ok(TaskOutcome::Interrupted { status: stored });
            }

            let retryable = matches!(&error, TaskError::Agent(e) if e.kind.is_retryable());
            if !retryable || attempt >= max_attempts {
                return self.finish_failed(task_id, &error.to_string());
            }

            let delay = retry_policy.delay_for_attempt(attempt);
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            self.store.append_event(&TaskEvent::now(
                task_id,
                EventKind::TaskRetry {
                    attempt,
                    max_retries: retry_policy.max_retries,
                    error: error.to_string(),
                    delay_ms,
                },
            ))?;
            tracing::warn!(
                "Task {} attempt {}/{} failed ({}), retrying in {}ms",
                task_id,
                attempt,
                max_attempts,
                error,
                delay_ms
            );

            if self
                .store
                .compare_and_set_status(task_id, TaskStatus::Running, TaskStatus::Retrying, None)?
                .is_some()
            {
                self.checkpoint_transition(&checkpoints, task_id, TaskStatus::Retrying)?;
            }
            std::thread::sleep(delay);
            attempt += 1;
        }
    }

    /// Moves the task to `Running` for a new attempt. Returns the blocking
    /// status when the task must not run.
    fn enter_running(&self, task_id: TaskId) -> Result<Option<TaskStatus>, TaskError> {
        for _ in 0..2 {
            let current = self.require_metadata(task_id)?.status;
            if current == TaskStatus::Running {
                return Ok(None);
            }
            if current.is_terminal() {
                tracing::debug!(
                    "Task {} is already in terminal state {}, aborting execution",
                    task_id,
                    current
                );
                return Ok(Some(current));
            }
            if self
                .store
                .compare_and_set_status(task_id, current, TaskStatus::Running, None)?
                .is_some()
            {
                return Ok(None);
            }
        }

        let current = self.require_metadata(task_id)?.status;
        tracing::warn!(
            "Task {} transition to running failed twice (current: {}), aborting attempt",
            task_id,
            current
        );
        Ok(Some(current))
    }

    /// Transitions are rare, so the journal length is read back from the store.
    fn checkpoint_transition(
        &self,
        checkpoints: &CheckpointManager,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<(), TaskError> {
        if checkpoints.policy() == CheckpointPolicy::AfterEachAgent {
            let journal_len = self.store.load_events(task_id)?.len();
            checkpoints.after_transition(task_id, status, journal_len)?;
        }
        Ok(())
    }

    fn finish_completed(
        &self,
        task_id: TaskId,
        result: Option<Value>,
    ) -> Result<TaskOutcome, TaskError> {
        if self
            .store
            .compare_and_set_status(task_id, TaskStatus::Running, TaskStatus::Completed, None)?
            .is_none()
        {
            let status = self.require_metadata(task_id)?.status;
            tracing::info!(
                "Task {} finished but cannot transition to completed (current: {})",
                task_id,
                status
            );
            return Ok(TaskOutcome::Interrupted { status });
        }

        self.store.append_event(&TaskEvent::now(
            task_id,
            EventKind::TaskCompleted {
                serialized_result: result.as_ref().map(Value::to_string),
            },
        ))?;
        tracing::info!("Task {} completed successfully", task_id);
        Ok(TaskOutcome::Completed { result })
    }

    fn finish_paused(
        &self,
        task_id: TaskId,
        checkpoints: &CheckpointManager,
        reason: String,
        pending_output_key: Option<String>,
    ) -> Result<TaskOutcome, TaskError> {
        if self
            .store
            .compare_and_set_status(task_id, TaskStatus::Running, TaskStatus::Paused, None)?
            .is_none()
        {
            let status = self.require_metadata(task_id)?.status;
            tracing::info!(
                "Task {} paused but status already changed to {}",
                task_id,
                status
            );
            return Ok(TaskOutcome::Interrupted { status });
        }

        self.store.append_event(&TaskEvent::now(
            task_id,
            EventKind::TaskPaused {
                reason: reason.clone(),
                pending_output_key: pending_output_key.clone(),
            },
        ))?;
        self.checkpoint_transition(checkpoints, task_id, TaskStatus::Paused)?;
        tracing::info!("Task {} paused: {}", task_id, reason);
        Ok(TaskOutcome::Paused {
            reason,
            pending_output_key,
        })
    }

    fn finish_failed(&self, task_id: TaskId, error: &str) -> Result<TaskOutcome, TaskError> {
        if self
            .store
            .compare_and_set_status(task_id, TaskStatus::Running, TaskStatus::Failed, Some(error))?
            .is_none()
        {
            let status = self.require_metadata(task_id)?.status;
            return Ok(TaskOutcome::Interrupted { status });
        }

        self.store.append_event(&TaskEvent::now(
            task_id,
            EventKind::TaskFailed {
                error: error.to_string(),
            },
        ))?;
        tracing::error!("Task {} failed: {}", task_id, error);
        Ok(TaskOutcome::Failed {
            error: error.to_string(),
        })
    }
}

fn invalid_state(task_id: TaskId, status: TaskStatus, reason: &str) -> TaskError {
    TaskError::InvalidState {
        task_id,
        status,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;

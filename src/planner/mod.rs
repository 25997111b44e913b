//! Planners decide which agent runs next.
//!
//! A planner moves through `uninitialized -> ready -> action cycle -> terminated`:
//! `init` once, `first_action` once, then `next_action` after every agent run
//! until a terminal [`Action::Done`] comes back. Decisions must depend only on
//! the scope and the invocations fed in, so that [`ReplayingPlanner`] can drive a
//! fresh planner through a recorded history and land on the same cursor.
//!
//! One caller drives a planner at a time. None of these types lock.

mod action;
mod replay;
mod sequential;
mod topology;

pub use action::{Action, AgentCall, AgentInvocation};
pub use replay::{ReplayingPlanner, ReplayingPlannerBuilder};
pub use sequential::SequentialPlanner;
pub use topology::{AgentInstance, Topology};

use crate::domain::PlannerError;
use crate::scope::AgenticScope;

pub trait Planner {
    /// Receives the agents participating in the plan. Fails if called twice.
    fn init(&mut self, topology: Topology) -> Result<(), PlannerError>;

    /// Returns the first action. May only be called once, after `init`.
    fn first_action(&mut self, scope: &mut AgenticScope) -> Result<Action, PlannerError>;

    /// Returns the action following the most recently completed invocation.
    fn next_action(
        &mut self,
        scope: &mut AgenticScope,
        invocation: &AgentInvocation,
    ) -> Result<Action, PlannerError>;

    /// Topology received in `init`, if any.
    fn topology(&self) -> Option<&Topology>;

    /// True once a terminal action has been returned.
    fn terminated(&self) -> bool;
}

impl<P: Planner + ?Sized> Planner for Box<P> {
    fn init(&mut self, topology: Topology) -> Result<(), PlannerError> {
        (**self).init(topology)
    }

    fn first_action(&mut self, scope: &mut AgenticScope) -> Result<Action, PlannerError> {
        (**self).first_action(scope)
    }

    fn next_action(
        &mut self,
        scope: &mut AgenticScope,
        invocation: &AgentInvocation,
    ) -> Result<Action, PlannerError> {
        (**self).next_action(scope, invocation)
    }

    fn topology(&self) -> Option<&Topology> {
        (**self).topology()
    }

    fn terminated(&self) -> bool {
        (**self).terminated()
    }
}

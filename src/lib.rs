//! Durable execution for agent plans.
//!
//! Tasks journal every completed agent invocation. After a crash, a pause or a
//! failed attempt, the [`planner::ReplayingPlanner`] fast-forwards a fresh
//! planner through that journal so execution continues where it stopped,
//! without running any finished agent again.

pub mod config;
pub mod domain;
pub mod driver;
pub mod durable_paths;
pub mod event_store;
pub mod logging;
pub mod planner;
pub mod scope;

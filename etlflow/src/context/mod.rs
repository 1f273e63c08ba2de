//! Context management for pipeline execution.
//!
//! This module provides:
//! - Run identity for correlating log entries and events
//! - Stage inputs: the output streams of a stage's dependencies
//! - Run and action contexts handed to stage actions

mod execution;
mod identity;
mod inputs;

pub use execution::{ActionContext, RunContext};
pub use identity::RunIdentity;
pub use inputs::StageInputs;

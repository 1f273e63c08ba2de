//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications and retry policies
//! - Pipeline builder with validation
//! - The stage executor and the graph scheduler
//! - Declarative definitions and schedule expressions

mod builder;
mod definition;
mod executor;
mod graph;
mod retry;
mod run;
mod schedule;
mod scheduler;
mod spec;


pub use builder::PipelineBuilder;
pub use definition::{ActionRegistry, PipelineDefinition, StageDefaults, StageDefinition};
pub use executor::{StageExecutor, StageOutcome};
pub use graph::PipelineGraph;
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use run::{PipelineRun, StageRecord};
pub use schedule::Schedule;
pub use scheduler::{FailureMode, Scheduler, SchedulerConfig};
pub use spec::StageSpec;

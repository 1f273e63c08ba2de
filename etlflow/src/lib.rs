//! # Etlflow
//!
//! A staged batch ETL engine.
//!
//! Etlflow runs a pipeline of named stages arranged in a dependency graph:
//!
//! - **Dependency-ordered execution**: a stage starts only after every stage
//!   it depends on has finished, independent stages run concurrently
//! - **Retries and timeouts**: per-stage retry policies with fixed delay and
//!   optional backoff, per-attempt timeouts
//! - **Failure isolation**: critical failures skip dependents, non-critical
//!   failures can be tolerated
//! - **Progress log**: a durable, human-readable start/end line per stage
//! - **Adapters**: shell commands, delimited and fixed-width extraction,
//!   HTML tables, currency conversion, CSV and SQLite sinks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use etlflow::prelude::*;
//!
//! let graph = PipelineBuilder::new("toll_data")
//!     .stage("unzip", Arc::new(ShellCommand::new("tar").args(["-zxvf", "tolldata.tgz"])), &[])?
//!     .stage("extract_csv", extract_csv, &["unzip"])?
//!     .build()?;
//!
//! let run = Scheduler::default().execute(&graph).await?;
//! println!("{}", run.report());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapters;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod progress;
pub mod runner;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapters::{
        ActionConfig, CsvFileLoad, CurrencyConversion, DelimitedExtract, FixedColumn,
        FixedWidthExtract, HtmlColumn, HtmlSource, HtmlTableExtract, PasteColumns, ShellCommand,
        SqlQuery, SqliteLoad, SqliteStore, StripCarriageReturns, UppercaseField,
    };
    pub use crate::config::{EngineConfig, PipelineFile, ReferenceConfig};
    pub use crate::context::{ActionContext, RunContext, RunIdentity, StageInputs};
    pub use crate::core::{
        ExchangeTable, Field, FieldType, Money, Record, RecordStream, ReferenceTables, RunStatus,
        Schema, StageKind, StageStatus, Value,
    };
    pub use crate::errors::{
        ActionError, ConfigError, ContractErrorInfo, CycleDetectedError, EtlflowError,
        PipelineValidationError, RetryExhaustedError, UnknownDependencyError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, LoggingNotifier, NoOpEventSink, Notifier};
    pub use crate::pipeline::{
        ActionRegistry, BackoffStrategy, FailureMode, PipelineBuilder, PipelineDefinition,
        PipelineGraph, PipelineRun, RetryPolicy, Schedule, Scheduler, SchedulerConfig,
        StageExecutor, StageSpec,
    };
    pub use crate::progress::{FileProgressLog, MemoryProgressLog, ProgressLog};
    pub use crate::runner::PipelineRunner;
    pub use crate::stages::{Action, ActionResult, FnAction};
    pub use crate::utils::{now_utc, Timestamp};
}

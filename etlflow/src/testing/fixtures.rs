//! Test fixtures for pipeline testing.

use std::sync::Arc;
use std::time::Duration;

use crate::context::{RunContext, RunIdentity};
use crate::core::{ReferenceTables, Schema, Value, RecordStream};
use crate::errors::EtlflowError;
use crate::events::{CollectingEventSink, CollectingNotifier};
use crate::pipeline::{FailureMode, PipelineGraph, PipelineRun, Scheduler, SchedulerConfig, StageExecutor};
use crate::progress::MemoryProgressLog;

/// A scheduler wired to in-memory collectors.
///
/// Every run goes through the same progress log, notifier and event sink,
/// so a test can inspect what was written after the fact.
#[derive(Debug)]
pub struct TestHarness {
    /// Captured progress log.
    pub progress: Arc<MemoryProgressLog>,
    /// Captured notifications.
    pub notifier: Arc<CollectingNotifier>,
    /// Captured lifecycle events.
    pub events: Arc<CollectingEventSink>,
    config: SchedulerConfig,
    default_timeout: Option<Duration>,
    references: Arc<ReferenceTables>,
    owner: Option<String>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Creates a harness with default scheduler settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            progress: Arc::new(MemoryProgressLog::new()),
            notifier: Arc::new(CollectingNotifier::new()),
            events: Arc::new(CollectingEventSink::new()),
            config: SchedulerConfig::default(),
            default_timeout: None,
            references: Arc::new(ReferenceTables::new()),
            owner: None,
        }
    }

    /// Sets the worker limit.
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.config = self.config.with_max_workers(max_workers);
        self
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.config = self.config.with_failure_mode(mode);
        self
    }

    /// Sets a per-attempt timeout for stages that declare none.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Makes reference tables available to actions.
    #[must_use]
    pub fn with_references(mut self, references: ReferenceTables) -> Self {
        self.references = Arc::new(references);
        self
    }

    /// Overrides the graph's owner in the run identity.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Builds the scheduler.
    #[must_use]
    pub fn scheduler(&self) -> Scheduler {
        let executor = StageExecutor::new(self.progress.clone())
            .with_notifier(self.notifier.clone())
            .with_default_timeout(self.default_timeout);
        Scheduler::new(executor).with_config(self.config)
    }

    /// Runs `graph` once.
    ///
    /// # Errors
    ///
    /// Propagates scheduler errors.
    pub async fn run(&self, graph: &PipelineGraph) -> Result<PipelineRun, EtlflowError> {
        let owner = self.owner.as_deref().unwrap_or(graph.owner());
        let run = RunContext::new(RunIdentity::new(graph.name(), owner))
            .with_references(Arc::clone(&self.references))
            .with_event_sink(self.events.clone());
        self.scheduler().run(graph, Arc::new(run)).await
    }
}

/// Builds an all-text stream from string rows.
///
/// # Panics
///
/// Panics if a row's arity does not match `columns`.
#[must_use]
#[allow(clippy::expect_used)]
pub fn text_stream(columns: &[&str], rows: &[&[&str]]) -> RecordStream {
    let schema = Schema::text(columns.iter().copied()).expect("distinct column names");
    let rows = rows
        .iter()
        .map(|r| r.iter().map(|v| Value::text(*v)).collect())
        .collect();
    RecordStream::from_rows(schema, rows).expect("rows match the columns")
}

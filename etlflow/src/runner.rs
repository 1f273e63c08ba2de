//! Runs a configured pipeline once or on its schedule.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::{load_references, EngineConfig, PipelineFile, ReferenceConfig};
use crate::context::{RunContext, RunIdentity};
use crate::core::ReferenceTables;
use crate::errors::EtlflowError;
use crate::events::{EventSink, LoggingEventSink, LoggingNotifier};
use crate::pipeline::{PipelineGraph, PipelineRun, Schedule, Scheduler, StageExecutor};
use crate::progress::FileProgressLog;

/// A validated graph bound to a scheduler and its run environment.
pub struct PipelineRunner {
    graph: PipelineGraph,
    scheduler: Scheduler,
    schedule: Schedule,
    engine: EngineConfig,
    references: ReferenceTables,
    reference_configs: BTreeMap<String, ReferenceConfig>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("pipeline", &self.graph.name())
            .field("schedule", &self.schedule)
            .field("working_dir", &self.engine.working_dir)
            .finish_non_exhaustive()
    }
}

impl PipelineRunner {
    /// Creates a runner for an already built graph.
    #[must_use]
    pub fn new(graph: PipelineGraph, scheduler: Scheduler) -> Self {
        Self {
            graph,
            scheduler,
            schedule: Schedule::Once,
            engine: EngineConfig::default(),
            references: ReferenceTables::new(),
            reference_configs: BTreeMap::new(),
            event_sink: Arc::new(LoggingEventSink::debug()),
        }
    }

    /// Builds a runner from a pipeline file.
    ///
    /// The progress log is opened in append mode and failure
    /// notifications go to `tracing`.
    ///
    /// # Errors
    ///
    /// Returns configuration, validation or IO errors.
    pub fn from_file(file: &PipelineFile) -> Result<Self, EtlflowError> {
        let graph = file.build_graph()?;
        let progress = FileProgressLog::open(file.engine.log_file_path())?;
        let executor = StageExecutor::new(Arc::new(progress))
            .with_notifier(Arc::new(LoggingNotifier))
            .with_default_timeout(file.engine.stage_timeout());
        let scheduler = Scheduler::new(executor).with_config(file.engine.scheduler_config());

        Ok(Self {
            schedule: file.pipeline.schedule,
            engine: file.engine.clone(),
            reference_configs: file.references.clone(),
            ..Self::new(graph, scheduler)
        })
    }

    /// Sets the trigger schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Sets the working directory stages resolve paths against.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.engine.working_dir = dir.into();
        self
    }

    /// Sets reference tables used by every run.
    #[must_use]
    pub fn with_references(mut self, references: ReferenceTables) -> Self {
        self.references = references;
        self
    }

    /// Sets the lifecycle event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the graph.
    #[must_use]
    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Returns the schedule.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    async fn references(&self) -> Result<Arc<ReferenceTables>, EtlflowError> {
        if self.reference_configs.is_empty() {
            return Ok(Arc::new(self.references.clone()));
        }
        let mut tables = self.references.clone();
        tables.merge(load_references(&self.reference_configs, &self.engine).await?);
        Ok(Arc::new(tables))
    }

    /// Runs the pipeline once.
    ///
    /// Configured reference tables are reloaded for every run.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference table cannot be loaded or the
    /// scheduler fails internally. Stage failures are reported in the run.
    pub async fn run_once(&self) -> Result<PipelineRun, EtlflowError> {
        let references = self.references().await?;
        let identity = RunIdentity::new(self.graph.name(), self.graph.owner());
        let ctx = RunContext::new(identity)
            .with_working_dir(&self.engine.working_dir)
            .with_references(references)
            .with_event_sink(Arc::clone(&self.event_sink));
        self.scheduler.run(&self.graph, Arc::new(ctx)).await
    }

    /// Runs now and then on every schedule tick.
    ///
    /// A one-shot schedule runs exactly once. `max_runs` caps the number of
    /// runs; `on_run` sees each finished run. A run that fails to start is
    /// logged and the loop waits for the next tick.
    ///
    /// # Errors
    ///
    /// Returns the error of the first run when it fails to start.
    pub async fn run_scheduled<F>(&self, max_runs: Option<usize>, mut on_run: F) -> Result<usize, EtlflowError>
    where
        F: FnMut(&PipelineRun),
    {
        let Some(period) = self.schedule.interval() else {
            let run = self.run_once().await?;
            on_run(&run);
            return Ok(1);
        };

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut runs = 0;
        while max_runs.map_or(true, |max| runs < max) {
            ticker.tick().await;
            match self.run_once().await {
                Ok(run) => on_run(&run),
                Err(err) if runs == 0 => return Err(err),
                Err(err) => warn!(pipeline = %self.graph.name(), error = %err, "scheduled run did not start"),
            }
            runs += 1;
            if let Some(next) = self.schedule.next_after(crate::utils::now_utc()) {
                info!(pipeline = %self.graph.name(), runs, next = %next.to_rfc3339(), "waiting for next run");
            }
        }
        Ok(runs)
    }
}

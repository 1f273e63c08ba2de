//! Execution contexts for pipeline runs and stage actions.

use super::RunIdentity;
use crate::core::{ExchangeTable, ReferenceTables};
use crate::errors::ActionError;
use crate::events::{EventKind, EventSink, NoOpEventSink, PipelineEvent};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// The shared context for one pipeline run.
///
/// Created once per run and shared by every stage task.
pub struct RunContext {
    identity: RunIdentity,
    working_dir: PathBuf,
    references: Arc<ReferenceTables>,
    event_sink: Arc<dyn EventSink>,
    halted: Arc<AtomicBool>,
}

impl RunContext {
    /// Creates a new run context.
    #[must_use]
    pub fn new(identity: RunIdentity) -> Self {
        Self {
            identity,
            working_dir: PathBuf::from("."),
            references: Arc::new(ReferenceTables::new()),
            event_sink: Arc::new(NoOpEventSink),
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the working directory that relative action paths resolve against.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Sets the reference tables loaded for this run.
    #[must_use]
    pub fn with_references(mut self, references: Arc<ReferenceTables>) -> Self {
        self.references = references;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the run ID.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.identity.run_id
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Returns the reference tables.
    #[must_use]
    pub fn references(&self) -> &Arc<ReferenceTables> {
        &self.references
    }

    /// Returns the event sink.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Emits a run-level event without blocking.
    pub fn emit_run_event(&self, kind: EventKind, data: serde_json::Value) {
        self.event_sink
            .try_emit(PipelineEvent::run(kind, self.run_id()).with_data(data));
    }

    /// Emits a stage-level event without blocking.
    pub fn emit_stage_event(&self, kind: EventKind, stage: &str, data: serde_json::Value) {
        self.event_sink
            .try_emit(PipelineEvent::stage(kind, self.run_id(), stage).with_data(data));
    }

    /// Stops further stage dispatch and retries for this run.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    /// Checks whether dispatch has been stopped.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Creates the context handed to one stage attempt.
    #[must_use]
    pub fn action_context(&self, stage: &str, attempt: usize) -> ActionContext {
        ActionContext {
            stage: stage.to_string(),
            attempt,
            run_id: self.run_id(),
            pipeline: self.identity.pipeline.clone(),
            working_dir: self.working_dir.clone(),
            references: Arc::clone(&self.references),
            halted: Arc::clone(&self.halted),
        }
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("identity", &self.identity)
            .field("working_dir", &self.working_dir)
            .field("references", &self.references.len())
            .field("halted", &self.is_halted())
            .finish_non_exhaustive()
    }
}

/// What a stage action sees of its run.
#[derive(Debug, Clone)]
pub struct ActionContext {
    stage: String,
    attempt: usize,
    run_id: Uuid,
    pipeline: String,
    working_dir: PathBuf,
    references: Arc<ReferenceTables>,
    halted: Arc<AtomicBool>,
}

impl ActionContext {
    /// Creates a standalone context, for invoking actions outside a run.
    #[must_use]
    pub fn detached(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            attempt: 1,
            run_id: Uuid::nil(),
            pipeline: String::new(),
            working_dir: PathBuf::from("."),
            references: Arc::new(ReferenceTables::new()),
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Sets the reference tables.
    #[must_use]
    pub fn with_references(mut self, references: Arc<ReferenceTables>) -> Self {
        self.references = references;
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns the 1-based attempt number.
    #[must_use]
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Returns the run ID.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Resolves a path against the working directory.
    #[must_use]
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Returns true once the run has been halted.
    ///
    /// Long-running actions may poll this and stop early; their result is
    /// still recorded.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Looks up a reference table by name.
    pub fn reference(&self, name: &str) -> Result<Arc<ExchangeTable>, ActionError> {
        self.references.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    #[test]
    fn test_action_context_from_run() {
        let tables = ReferenceTables::new()
            .with_table("rates", ExchangeTable::from_pairs([("GBP", 0.8)]));
        let run = RunContext::new(RunIdentity::new("banks", "ops"))
            .with_working_dir("/data")
            .with_references(Arc::new(tables));

        let ctx = run.action_context("transform", 2);

        assert_eq!(ctx.stage(), "transform");
        assert_eq!(ctx.attempt(), 2);
        assert_eq!(ctx.run_id(), run.run_id());
        assert_eq!(ctx.pipeline(), "banks");
        assert_eq!(ctx.resolve("a.csv"), PathBuf::from("/data/a.csv"));
        assert_eq!(ctx.resolve("/abs/b.csv"), PathBuf::from("/abs/b.csv"));
        assert!((ctx.reference("rates").unwrap().rate("GBP").unwrap() - 0.8).abs() < f64::EPSILON);
        assert!(matches!(ctx.reference("missing"), Err(ActionError::MissingReference(_))));
    }

    #[test]
    fn test_halt_flag() {
        let run = RunContext::new(RunIdentity::new("p", "o"));
        let ctx = run.action_context("load", 1);
        assert!(!run.is_halted());
        assert!(!ctx.is_halted());
        run.halt();
        assert!(run.is_halted());
        assert!(ctx.is_halted());
        assert!(!ActionContext::detached("load").is_halted());
    }

    #[test]
    fn test_emit_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let run = RunContext::new(RunIdentity::new("p", "o")).with_event_sink(sink.clone());

        run.emit_run_event(EventKind::RunStarted, serde_json::json!({"stages": 3}));
        run.emit_stage_event(EventKind::StageSkipped, "load", serde_json::Value::Null);

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events()[1].stage.as_deref(), Some("load"));
    }
}

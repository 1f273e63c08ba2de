//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn, Level};
use uuid::Uuid;

/// The kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A run started.
    #[serde(rename = "run.started")]
    RunStarted,
    /// A run reached its terminal state.
    #[serde(rename = "run.completed")]
    RunCompleted,
    /// A stage attempt started.
    #[serde(rename = "stage.started")]
    StageStarted,
    /// A stage attempt failed and will be retried.
    #[serde(rename = "stage.retrying")]
    StageRetrying,
    /// A stage succeeded.
    #[serde(rename = "stage.succeeded")]
    StageSucceeded,
    /// A stage failed on its final attempt.
    #[serde(rename = "stage.failed")]
    StageFailed,
    /// A stage was skipped.
    #[serde(rename = "stage.skipped")]
    StageSkipped,
}

impl EventKind {
    /// Returns the dotted event name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStarted => "run.started",
            Self::RunCompleted => "run.completed",
            Self::StageStarted => "stage.started",
            Self::StageRetrying => "stage.retrying",
            Self::StageSucceeded => "stage.succeeded",
            Self::StageFailed => "stage.failed",
            Self::StageSkipped => "stage.skipped",
        }
    }

    fn is_problem(self) -> bool {
        matches!(self, Self::StageRetrying | Self::StageFailed)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// What happened.
    pub kind: EventKind,
    /// The run the event belongs to.
    pub run_id: Uuid,
    /// The stage, for stage events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Event-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PipelineEvent {
    /// Creates a run-level event.
    #[must_use]
    pub fn run(kind: EventKind, run_id: Uuid) -> Self {
        Self {
            kind,
            run_id,
            stage: None,
            data: serde_json::Value::Null,
        }
    }

    /// Creates a stage-level event.
    #[must_use]
    pub fn stage(kind: EventKind, run_id: Uuid, stage: impl Into<String>) -> Self {
        Self {
            kind,
            run_id,
            stage: Some(stage.into()),
            data: serde_json::Value::Null,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Trait for event sinks that receive lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync + fmt::Debug {
    /// Emits an event asynchronously.
    async fn emit(&self, event: PipelineEvent);

    /// Emits an event without blocking.
    ///
    /// Must never fail; problems are logged and dropped.
    fn try_emit(&self, event: PipelineEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: PipelineEvent) {}

    fn try_emit(&self, _event: PipelineEvent) {}
}

/// An event sink that logs events using the tracing framework.
///
/// Retry and failure events are always logged at `WARN`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &PipelineEvent) {
        let stage = event.stage.as_deref().unwrap_or("-");
        if event.kind.is_problem() {
            warn!(event = %event.kind, run_id = %event.run_id, stage, data = %event.data, "pipeline event");
        } else if self.level == Level::DEBUG {
            debug!(event = %event.kind, run_id = %event.run_id, stage, data = %event.data, "pipeline event");
        } else {
            info!(event = %event.kind, run_id = %event.run_id, stage, data = %event.data, "pipeline event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        self.log_event(&event);
    }

    fn try_emit(&self, event: PipelineEvent) {
        self.log_event(&event);
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events of one kind.
    #[must_use]
    pub fn events_of_kind(&self, kind: EventKind) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_and_logging_sinks_do_not_panic() {
        let run_id = Uuid::new_v4();
        NoOpEventSink.emit(PipelineEvent::run(EventKind::RunStarted, run_id)).await;

        let sink = LoggingEventSink::debug();
        sink.emit(PipelineEvent::stage(EventKind::StageFailed, run_id, "load")).await;
        sink.try_emit(PipelineEvent::stage(EventKind::StageSucceeded, run_id, "load"));
    }

    #[tokio::test]
    async fn test_collecting_sink_filter() {
        let sink = CollectingEventSink::new();
        let run_id = Uuid::new_v4();
        sink.emit(PipelineEvent::stage(EventKind::StageStarted, run_id, "a")).await;
        sink.try_emit(PipelineEvent::stage(EventKind::StageSucceeded, run_id, "a"));
        sink.try_emit(PipelineEvent::run(EventKind::RunCompleted, run_id));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_kind(EventKind::StageStarted).len(), 1);
        assert_eq!(sink.events()[2].stage, None);
    }

    #[test]
    fn test_event_serializes_dotted_kind() {
        let event = PipelineEvent::stage(EventKind::StageSkipped, Uuid::nil(), "transform")
            .with_data(serde_json::json!({"reason": "upstream failed"}));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["kind"], "stage.skipped");
        assert_eq!(json["stage"], "transform");
        assert_eq!(json["data"]["reason"], "upstream failed");
    }
}

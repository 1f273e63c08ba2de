//! Pipeline run reports.

use crate::core::{RecordStream, RunStatus, StageKind, StageStatus};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// The recorded outcome of one stage within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Stage kind.
    pub kind: StageKind,
    /// Whether the stage is critical.
    pub critical: bool,
    /// Current or terminal status.
    pub status: StageStatus,
    /// Attempts made (0 if never started).
    pub attempts: usize,
    /// Failure cause or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the first attempt started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// When the stage reached a terminal state after running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,
    /// Rows in the output stream, if one was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}

impl StageRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn pending(name: impl Into<String>, kind: StageKind, critical: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            critical,
            status: StageStatus::Pending,
            attempts: 0,
            error: None,
            started_at: None,
            ended_at: None,
            rows: None,
        }
    }

    /// Returns how long the stage ran, if it ran.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }
}

/// One execution of a pipeline graph.
///
/// Immutable once returned by the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    /// The run ID.
    pub run_id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// Terminal status.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run finished.
    pub ended_at: Timestamp,
    /// Stage records in declaration order.
    pub stages: Vec<StageRecord>,
    /// Output streams of succeeded stages.
    #[serde(skip)]
    pub outputs: HashMap<String, RecordStream>,
}

impl PipelineRun {
    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns a stage record by name.
    #[must_use]
    pub fn record(&self, stage: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.name == stage)
    }

    /// Returns a stage's status.
    #[must_use]
    pub fn stage_status(&self, stage: &str) -> Option<StageStatus> {
        self.record(stage).map(|r| r.status)
    }

    /// Returns a succeeded stage's output stream.
    #[must_use]
    pub fn output(&self, stage: &str) -> Option<&RecordStream> {
        self.outputs.get(stage)
    }

    /// Returns the names of stages with the given status.
    #[must_use]
    pub fn stages_with_status(&self, status: StageStatus) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Returns the names of failed stages.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<&str> {
        self.stages_with_status(StageStatus::Failed)
    }

    /// Returns the names of skipped stages.
    #[must_use]
    pub fn skipped_stages(&self) -> Vec<&str> {
        self.stages_with_status(StageStatus::Skipped)
    }

    /// Returns the wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at).to_std().unwrap_or_default()
    }

    /// Renders a one-line-per-stage text report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = format!(
            "pipeline '{}' run {} {} in {:.3}s\n",
            self.pipeline,
            self.run_id,
            self.status,
            self.duration().as_secs_f64()
        );
        for record in &self.stages {
            out.push_str(&format!(
                "  {:<24} {:<10} attempts={}",
                record.name,
                record.status.to_string(),
                record.attempts
            ));
            if let Some(rows) = record.rows {
                out.push_str(&format!(" rows={rows}"));
            }
            if let Some(error) = &record.error {
                out.push_str(&format!(" error=\"{error}\""));
            }
            out.push('\n');
        }
        out
    }
}

//! Progress log entries.

use crate::utils::{log_timestamp, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The lifecycle event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    /// A run or stage attempt started.
    Started,
    /// A run or stage attempt ended successfully.
    Ended,
    /// A run or stage attempt failed.
    Failed,
}

impl fmt::Display for LogEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Ended => write!(f, "ended"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One line of the progress log.
///
/// `stage` is `None` for run-level entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the event happened.
    pub timestamp: Timestamp,
    /// The pipeline run the event belongs to.
    pub run_id: Uuid,
    /// The stage, for stage-level entries.
    pub stage: Option<String>,
    /// What happened.
    pub kind: LogEventKind,
    /// Human-readable message.
    pub message: String,
}

impl LogEntry {
    /// Creates a stage-level entry stamped with the current time.
    #[must_use]
    pub fn stage(run_id: Uuid, stage: impl Into<String>, kind: LogEventKind, detail: impl AsRef<str>) -> Self {
        let stage = stage.into();
        let message = compose(run_id, &format!("stage '{stage}'"), kind, detail.as_ref());
        Self {
            timestamp: now_utc(),
            run_id,
            stage: Some(stage),
            kind,
            message,
        }
    }

    /// Creates a run-level entry stamped with the current time.
    #[must_use]
    pub fn run(run_id: Uuid, pipeline: &str, kind: LogEventKind, detail: impl AsRef<str>) -> Self {
        Self {
            timestamp: now_utc(),
            run_id,
            stage: None,
            kind,
            message: compose(run_id, &format!("pipeline '{pipeline}'"), kind, detail.as_ref()),
        }
    }

    /// Formats the entry as `<timestamp> : <message>` without a newline.
    #[must_use]
    pub fn line(&self) -> String {
        format!("{} : {}", log_timestamp(&self.timestamp), self.message)
    }
}

fn compose(run_id: Uuid, subject: &str, kind: LogEventKind, detail: &str) -> String {
    let subject = single_line(subject);
    let detail = single_line(detail);
    if detail.is_empty() {
        format!("[run {run_id}] {subject} {kind}")
    } else {
        format!("[run {run_id}] {subject} {kind} - {detail}")
    }
}

/// Joins multi-line text with ` | ` so an entry always fits on one line.
fn single_line(text: &str) -> String {
    if !text.contains(['\n', '\r']) {
        return text.to_string();
    }
    text.split(['\n', '\r'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_entry_message() {
        let run_id = Uuid::new_v4();
        let entry = LogEntry::stage(run_id, "extract_csv", LogEventKind::Started, "attempt 1/2");

        assert_eq!(entry.stage.as_deref(), Some("extract_csv"));
        assert_eq!(
            entry.message,
            format!("[run {run_id}] stage 'extract_csv' started - attempt 1/2")
        );
    }

    #[test]
    fn test_run_entry_has_no_stage() {
        let entry = LogEntry::run(Uuid::new_v4(), "banks", LogEventKind::Ended, "");
        assert!(entry.stage.is_none());
        assert!(entry.message.ends_with("pipeline 'banks' ended"));
    }

    #[test]
    fn test_multi_line_detail_is_flattened() {
        let entry = LogEntry::stage(
            Uuid::new_v4(),
            "unzip",
            LogEventKind::Failed,
            "tar: x.tgz: Cannot open\r\ntar: Error is not recoverable\n",
        );
        assert!(!entry.line().contains(['\n', '\r']));
        assert!(entry
            .message
            .ends_with("failed - tar: x.tgz: Cannot open | tar: Error is not recoverable"));
    }

    #[test]
    fn test_line_format() {
        let entry = LogEntry::run(Uuid::new_v4(), "banks", LogEventKind::Started, "");
        let line = entry.line();
        let (timestamp, message) = line.split_once(" : ").unwrap();

        assert_eq!(timestamp.len(), "2024-Jan-05-14:03:59".len());
        assert_eq!(message, entry.message);
        assert!(!line.contains('\n'));
    }
}

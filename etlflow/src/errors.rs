//! Error types for the etlflow engine.
//!
//! Construction-time errors ([`PipelineValidationError`] and the specific
//! errors that convert into it) abort before any stage runs. Run-time errors
//! raised by stage actions are [`ActionError`]s; once a stage's retries are
//! spent the last one is wrapped in a [`RetryExhaustedError`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// The main error type for etlflow operations.
#[derive(Debug, Error)]
pub enum EtlflowError {
    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A cycle was detected in the pipeline.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A stage depends on a stage that does not exist.
    #[error("{0}")]
    UnknownDependency(#[from] UnknownDependencyError),

    /// A stage action failed.
    #[error("{0}")]
    Action(#[from] ActionError),

    /// A stage failed on every permitted attempt.
    #[error("{0}")]
    RetryExhausted(#[from] RetryExhaustedError),

    /// A record did not fit its stream's schema.
    #[error("{0}")]
    Schema(#[from] SchemaError),

    /// A configuration file could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A schedule expression could not be parsed.
    #[error("{0}")]
    Schedule(#[from] ScheduleError),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    /// Returns true if this error was caused by a dependency cycle.
    #[must_use]
    pub fn is_cycle(&self) -> bool {
        self.code() == Some(CycleDetectedError::CODE)
    }

    /// Returns true if this error was caused by an unknown dependency.
    #[must_use]
    pub fn is_unknown_dependency(&self) -> bool {
        self.code() == Some(UnknownDependencyError::CODE)
    }
}

/// Error raised when a cycle is detected in the pipeline graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", .cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Contract code for cycles.
    pub const CODE: &'static str = "CONTRACT-004-CYCLE";

    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            Self::CODE,
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            stages: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Error raised when a stage depends on a stage absent from the graph.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
pub struct UnknownDependencyError {
    /// The stage declaring the dependency.
    pub stage: String,
    /// The missing dependency name.
    pub dependency: String,
}

impl UnknownDependencyError {
    /// Contract code for unknown dependencies.
    pub const CODE: &'static str = "CONTRACT-004-MISSING_DEP";

    /// Creates a new unknown dependency error.
    #[must_use]
    pub fn new(stage: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            dependency: dependency.into(),
        }
    }
}

impl From<UnknownDependencyError> for PipelineValidationError {
    fn from(err: UnknownDependencyError) -> Self {
        Self {
            message: err.to_string(),
            stages: vec![err.stage.clone(), err.dependency.clone()],
            error_info: Some(
                ContractErrorInfo::new(
                    UnknownDependencyError::CODE,
                    format!("Dependency '{}' not found", err.dependency),
                )
                .with_fix_hint("Check the dependency name for typos or add the missing stage.")
                .with_context_entry("stage", err.stage),
            ),
        }
    }
}

/// Error raised when two stages share a name.
#[derive(Debug, Clone, Error)]
#[error("Duplicate stage name '{stage}'")]
pub struct DuplicateStageError {
    /// The repeated name.
    pub stage: String,
}

impl DuplicateStageError {
    /// Contract code for duplicate stage names.
    pub const CODE: &'static str = "CONTRACT-004-DUPLICATE";

    /// Creates a new duplicate stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>) -> Self {
        Self { stage: stage.into() }
    }
}

impl From<DuplicateStageError> for PipelineValidationError {
    fn from(err: DuplicateStageError) -> Self {
        Self {
            message: err.to_string(),
            stages: vec![err.stage.clone()],
            error_info: Some(
                ContractErrorInfo::new(DuplicateStageError::CODE, "Stage names must be unique")
                    .with_fix_hint("Rename one of the stages.")
                    .with_context_entry("stage", err.stage),
            ),
        }
    }
}

/// Error raised when accessing an input that was not declared as a dependency.
#[derive(Debug, Clone, Error)]
#[error("Undeclared dependency: stage '{stage}' attempted to access '{key}' which was not declared as a dependency")]
pub struct UndeclaredDependencyError {
    /// The stage attempting access.
    pub stage: String,
    /// The undeclared key.
    pub key: String,
}

impl UndeclaredDependencyError {
    /// Creates a new undeclared dependency error.
    #[must_use]
    pub fn new(stage: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            key: key.into(),
        }
    }
}

/// Error raised when a record does not fit a stream's schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// The record has the wrong number of fields.
    #[error("record has {actual} fields, schema declares {expected}")]
    Arity {
        /// Fields in the schema.
        expected: usize,
        /// Fields in the record.
        actual: usize,
    },

    /// A value does not match its field's declared type.
    #[error("field '{field}' expects {expected}, got {actual}")]
    TypeMismatch {
        /// The field name.
        field: String,
        /// The declared type.
        expected: String,
        /// The type of the offending value.
        actual: String,
    },

    /// The schema declares the same field twice.
    #[error("duplicate field '{0}' in schema")]
    DuplicateField(String),

    /// A field name was looked up that the schema does not declare.
    #[error("unknown field '{0}'")]
    UnknownField(String),
}

/// A classified failure raised by a stage action.
///
/// Every external collaborator maps its failures onto one of these
/// variants; the executor never sees raw exit codes or driver errors.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    /// Source data could not be parsed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A named input stream was not provided.
    #[error("missing input stream '{0}'")]
    MissingInput(String),

    /// A reference table or key was not available.
    #[error("missing reference data: {0}")]
    MissingReference(String),

    /// An external command exited unsuccessfully.
    #[error("command '{command}' failed with status {}: {stderr}", .code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// A file could not be read or written.
    #[error("i/o error: {0}")]
    Io(String),

    /// A relational store operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// A network fetch failed.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The attempt exceeded its configured timeout.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The action panicked.
    #[error("action panicked: {0}")]
    Panicked(String),

    /// A record violated its schema.
    #[error("schema violation: {0}")]
    Schema(#[from] SchemaError),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl ActionError {
    /// Creates a malformed input error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    /// Creates a generic action error.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Returns a short machine-readable name for the error class.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "malformed_input",
            Self::MissingInput(_) => "missing_input",
            Self::MissingReference(_) => "missing_reference",
            Self::CommandFailed { .. } => "command_failed",
            Self::Io(_) => "io",
            Self::Store(_) => "store",
            Self::Fetch(_) => "fetch",
            Self::Timeout(_) => "timeout",
            Self::Panicked(_) => "panicked",
            Self::Schema(_) => "schema",
            Self::Other(_) => "other",
        }
    }
}

impl From<std::io::Error> for ActionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<csv::Error> for ActionError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            Self::Io(err.to_string())
        } else {
            Self::MalformedInput(err.to_string())
        }
    }
}

impl From<rusqlite::Error> for ActionError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<UndeclaredDependencyError> for ActionError {
    fn from(err: UndeclaredDependencyError) -> Self {
        Self::MissingInput(err.key)
    }
}

/// A stage failed on every permitted attempt.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed after {attempts} attempt(s): {last_error}")]
pub struct RetryExhaustedError {
    /// The stage name.
    pub stage: String,
    /// Number of attempts made.
    pub attempts: usize,
    /// The error raised by the final attempt.
    pub last_error: ActionError,
}

impl RetryExhaustedError {
    /// Creates a new retry exhausted error.
    #[must_use]
    pub fn new(stage: impl Into<String>, attempts: usize, last_error: ActionError) -> Self {
        Self {
            stage: stage.into(),
            attempts,
            last_error,
        }
    }
}

/// Errors loading engine or pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config '{path}': {source}")]
    Read {
        /// The file path.
        path: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The document could not be parsed.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A stage references an action that was never defined.
    #[error("stage '{stage}' references unknown action '{action}'")]
    UnknownAction {
        /// The stage name.
        stage: String,
        /// The action reference.
        action: String,
    },

    /// A value is out of range or inconsistent.
    #[error("invalid value for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why it is invalid.
        reason: String,
    },
}

/// Error raised for an unparseable schedule expression.
#[derive(Debug, Clone, Error)]
#[error("invalid schedule expression '{0}'")]
pub struct ScheduleError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "my_stage");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"my_stage".to_string()));
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> c -> a"));
        assert_eq!(err.error_info.code, "CONTRACT-004-CYCLE");

        let validation: PipelineValidationError = err.into();
        assert!(validation.is_cycle());
        assert_eq!(validation.stages.len(), 4);
    }

    #[test]
    fn test_unknown_dependency_converts() {
        let err: PipelineValidationError =
            UnknownDependencyError::new("consolidate", "extract_xml").into();

        assert!(err.is_unknown_dependency());
        assert!(!err.is_cycle());
        assert_eq!(err.stages, vec!["consolidate", "extract_xml"]);
        assert!(err.message.contains("extract_xml"));
    }

    #[test]
    fn test_duplicate_stage_converts() {
        let err: PipelineValidationError = DuplicateStageError::new("extract").into();
        assert_eq!(err.code(), Some("CONTRACT-004-DUPLICATE"));
        assert_eq!(err.stages, vec!["extract"]);
    }

    #[test]
    fn test_command_failed_display() {
        let err = ActionError::CommandFailed {
            command: "tar -zxvf tolldata.tgz".to_string(),
            code: Some(2),
            stderr: "not found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("status 2"), "got: {msg}");
        assert_eq!(err.kind(), "command_failed");

        let killed = ActionError::CommandFailed {
            command: "sleep".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("signal"));
    }

    #[test]
    fn test_retry_exhausted_display() {
        let err = RetryExhaustedError::new("extract", 2, ActionError::malformed("bad row 3"));
        assert_eq!(
            err.to_string(),
            "Stage 'extract' failed after 2 attempt(s): malformed input: bad row 3"
        );
    }

    #[test]
    fn test_io_error_classified() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ActionError = io.into();
        assert_eq!(err.kind(), "io");
    }
}

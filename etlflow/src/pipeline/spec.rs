//! Stage specifications.

use super::RetryPolicy;
use crate::core::StageKind;
use crate::errors::PipelineValidationError;
use crate::stages::Action;
use std::sync::Arc;
use std::time::Duration;

/// Specification for a single stage in a pipeline.
///
/// Immutable once the graph is built; the graph shares the action by
/// reference and never copies its state.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The wrapped action.
    pub action: Arc<dyn Action>,
    /// Names of stages this stage depends on, in declaration order.
    pub dependencies: Vec<String>,
    /// Retry policy for the action.
    pub retry: RetryPolicy,
    /// Whether a terminal failure fails the run and skips dependents.
    pub critical: bool,
    /// For non-critical stages: whether dependents still run after a failure.
    pub tolerated: bool,
    /// The kind of stage, for reporting.
    pub kind: StageKind,
    /// Optional per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Whether each retried failure notifies the owner.
    pub notify_on_retry: bool,
}

impl StageSpec {
    /// Creates a new stage specification.
    ///
    /// Stages are non-critical, tolerated and attempted once by default.
    #[must_use]
    pub fn new(name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        let kind = action.kind();
        Self {
            name: name.into(),
            action,
            dependencies: Vec::new(),
            retry: RetryPolicy::default(),
            critical: false,
            tolerated: true,
            kind,
            timeout: None,
            notify_on_retry: false,
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Marks the stage as critical.
    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Sets criticality.
    #[must_use]
    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Makes a non-critical failure skip dependents instead of feeding them
    /// an absent input.
    #[must_use]
    pub fn untolerated(mut self) -> Self {
        self.tolerated = false;
        self
    }

    /// Sets whether a non-critical failure is tolerated by dependents.
    #[must_use]
    pub fn with_tolerated(mut self, tolerated: bool) -> Self {
        self.tolerated = tolerated;
        self
    }

    /// Sets the stage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Notifies the owner on every retried failure.
    #[must_use]
    pub fn notify_on_retry(mut self) -> Self {
        self.notify_on_retry = true;
        self
    }

    /// Returns true if a terminal failure of this stage blocks its dependents.
    #[must_use]
    pub fn failure_blocks_dependents(&self) -> bool {
        self.critical || !self.tolerated
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank, or the stage depends on itself
    /// or lists a dependency twice.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty"));
        }
        if self.dependencies.contains(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()]));
        }
        for (i, dep) in self.dependencies.iter().enumerate() {
            if self.dependencies[..i].contains(dep) {
                return Err(PipelineValidationError::new(format!(
                    "Stage '{}' lists dependency '{}' more than once",
                    self.name, dep
                ))
                .with_stages(vec![self.name.clone(), dep.clone()]));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpAction;

    fn noop() -> Arc<dyn Action> {
        Arc::new(NoOpAction)
    }

    #[test]
    fn test_stage_spec_creation() {
        let spec = StageSpec::new("consolidate", noop())
            .with_dependencies(["extract_csv", "extract_tsv"])
            .with_dependency("extract_fixed")
            .with_dependency("extract_csv")
            .with_kind(StageKind::Transform)
            .critical();

        assert_eq!(spec.name, "consolidate");
        assert_eq!(spec.dependencies, vec!["extract_csv", "extract_tsv", "extract_fixed"]);
        assert!(spec.critical);
        assert!(spec.failure_blocks_dependents());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_stage_spec_defaults() {
        let spec = StageSpec::new("s", noop());
        assert!(!spec.critical);
        assert!(spec.tolerated);
        assert!(!spec.failure_blocks_dependents());
        assert_eq!(spec.retry.max_attempts, 1);
        assert!(spec.untolerated().failure_blocks_dependents());
    }

    #[test]
    fn test_stage_spec_self_dependency() {
        let spec = StageSpec::new("test", noop()).with_dependency("test");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_stage_spec_repeated_dependency() {
        let spec = StageSpec::new("t", noop()).with_dependencies(["a", "a"]);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_stage_spec_blank_name() {
        assert!(StageSpec::new("  ", noop()).validate().is_err());
    }
}

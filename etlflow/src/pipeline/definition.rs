//! Declarative pipeline definitions.
//!
//! A [`PipelineDefinition`] names its stages' actions by reference; an
//! [`ActionRegistry`] resolves those references when the graph is built.

use super::{BackoffStrategy, PipelineBuilder, PipelineGraph, RetryPolicy, Schedule, StageSpec};
use crate::core::StageKind;
use crate::errors::{ConfigError, EtlflowError};
use crate::stages::Action;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Named actions available to definitions.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action under a reference name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
        self.actions.insert(name.into(), action);
    }

    /// Registers an action and returns the registry.
    #[must_use]
    pub fn with_action(mut self, name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        self.register(name, action);
        self
    }

    /// Looks up an action.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    /// Checks whether a reference is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    /// Returns the number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn default_true() -> bool {
    true
}

/// Settings applied to every stage that does not override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefaults {
    /// Retries after the first attempt.
    #[serde(default)]
    pub retries: usize,
    /// Fixed delay between attempts, in seconds.
    #[serde(default)]
    pub retry_delay_secs: u64,
    /// Backoff applied to the delay.
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Whether stages are critical.
    #[serde(default)]
    pub critical: bool,
    /// Whether non-critical failures let dependents run.
    #[serde(default = "default_true")]
    pub tolerated: bool,
    /// Whether retried failures notify the owner.
    #[serde(default)]
    pub notify_on_retry: bool,
    /// Per-attempt timeout, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for StageDefaults {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_delay_secs: 0,
            backoff: BackoffStrategy::Constant,
            critical: false,
            tolerated: true,
            notify_on_retry: false,
            timeout_secs: None,
        }
    }
}

/// One stage of a declarative definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Unique stage name.
    pub name: String,
    /// Action reference resolved through the registry.
    pub action: String,
    /// Dependency names.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Overrides `defaults.retries`.
    #[serde(default)]
    pub retries: Option<usize>,
    /// Overrides `defaults.retry_delay_secs`.
    #[serde(default)]
    pub retry_delay_secs: Option<u64>,
    /// Overrides `defaults.critical`.
    #[serde(default)]
    pub critical: Option<bool>,
    /// Overrides `defaults.tolerated`.
    #[serde(default)]
    pub tolerated: Option<bool>,
    /// Overrides `defaults.notify_on_retry`.
    #[serde(default)]
    pub notify_on_retry: Option<bool>,
    /// Overrides `defaults.timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Overrides the action's reported kind.
    #[serde(default)]
    pub kind: Option<StageKind>,
}

impl StageDefinition {
    /// Creates a stage definition with no overrides.
    #[must_use]
    pub fn new(name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: action.into(),
            depends_on: Vec::new(),
            retries: None,
            retry_delay_secs: None,
            critical: None,
            tolerated: None,
            notify_on_retry: None,
            timeout_secs: None,
            kind: None,
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets criticality.
    #[must_use]
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = Some(critical);
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    fn to_spec(&self, action: Arc<dyn Action>, defaults: &StageDefaults) -> StageSpec {
        let retry = RetryPolicy::from_retries(
            self.retries.unwrap_or(defaults.retries),
            Duration::from_secs(self.retry_delay_secs.unwrap_or(defaults.retry_delay_secs)),
        )
        .with_backoff(defaults.backoff);

        let mut spec = StageSpec::new(&self.name, action)
            .with_dependencies(self.depends_on.iter().cloned())
            .with_retry(retry)
            .with_critical(self.critical.unwrap_or(defaults.critical))
            .with_tolerated(self.tolerated.unwrap_or(defaults.tolerated));

        if self.notify_on_retry.unwrap_or(defaults.notify_on_retry) {
            spec = spec.notify_on_retry();
        }
        if let Some(secs) = self.timeout_secs.or(defaults.timeout_secs) {
            spec = spec.with_timeout(Duration::from_secs(secs));
        }
        if let Some(kind) = self.kind {
            spec = spec.with_kind(kind);
        }
        spec
    }
}

/// A declarative pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name.
    pub name: String,
    /// Owner identity for notifications.
    #[serde(default)]
    pub owner: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// When the pipeline is triggered.
    #[serde(default)]
    pub schedule: Schedule,
    /// Stage defaults.
    #[serde(default)]
    pub defaults: StageDefaults,
    /// Stages in declaration order.
    #[serde(default, rename = "stage")]
    pub stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
    /// Creates an empty definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: String::new(),
            description: String::new(),
            schedule: Schedule::Once,
            defaults: StageDefaults::default(),
            stages: Vec::new(),
        }
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Sets the defaults.
    #[must_use]
    pub fn with_defaults(mut self, defaults: StageDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: StageDefinition) -> Self {
        self.stages.push(stage);
        self
    }

    /// Resolves action references and builds a validated graph.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownAction` for an unregistered reference,
    /// or a validation error from the builder.
    pub fn build(&self, registry: &ActionRegistry) -> Result<PipelineGraph, EtlflowError> {
        let mut builder = PipelineBuilder::new(&self.name).with_owner(&self.owner);
        for stage in &self.stages {
            let action = registry.get(&stage.action).ok_or_else(|| ConfigError::UnknownAction {
                stage: stage.name.clone(),
                action: stage.action.clone(),
            })?;
            builder.add_stage_spec(stage.to_spec(action, &self.defaults))?;
        }
        Ok(builder.build()?)
    }
}

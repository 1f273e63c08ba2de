//! Pipeline builder with validation.

use super::{PipelineGraph, StageSpec};
use crate::errors::{
    ContractErrorInfo, CycleDetectedError, DuplicateStageError, PipelineValidationError,
    UnknownDependencyError,
};
use crate::stages::Action;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builder for creating validated pipeline graphs.
///
/// Stages may be added in any order; dependency names are resolved and the
/// graph is checked for cycles when [`build`](Self::build) is called.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// Owner identity for failure notifications.
    owner: String,
    /// The stage specifications.
    stages: HashMap<String, StageSpec>,
    /// Insertion order for stages.
    stage_order: Vec<String>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: String::new(),
            stages: HashMap::new(),
            stage_order: Vec::new(),
        }
    }

    /// Sets the owner identity.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Adds a stage with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is invalid or its name is taken.
    pub fn stage(
        self,
        name: impl Into<String>,
        action: Arc<dyn Action>,
        dependencies: &[&str],
    ) -> Result<Self, PipelineValidationError> {
        let spec = StageSpec::new(name, action).with_dependencies(dependencies.iter().copied());
        self.with_stage(spec)
    }

    /// Adds a fully configured stage.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is invalid or its name is taken.
    pub fn with_stage(mut self, spec: StageSpec) -> Result<Self, PipelineValidationError> {
        self.add_stage_spec(spec)?;
        Ok(self)
    }

    /// Adds a stage with a specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is invalid or its name is taken.
    pub fn add_stage_spec(&mut self, spec: StageSpec) -> Result<(), PipelineValidationError> {
        spec.validate()?;

        if self.stages.contains_key(&spec.name) {
            return Err(DuplicateStageError::new(&spec.name).into());
        }

        self.stage_order.push(spec.name.clone());
        self.stages.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Builds the pipeline graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder has no stages, a dependency names an
    /// unknown stage, or the dependency relation has a cycle.
    pub fn build(self) -> Result<PipelineGraph, PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages")
                .with_error_info(
                    ContractErrorInfo::new("CONTRACT-004-EMPTY", "Cannot build an empty pipeline")
                        .with_fix_hint("Add at least one stage to the pipeline before building."),
                ));
        }

        self.check_dependencies()?;
        self.detect_cycles()?;

        Ok(PipelineGraph::new(
            self.name,
            self.owner,
            self.stages,
            self.stage_order,
        ))
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn check_dependencies(&self) -> Result<(), UnknownDependencyError> {
        for name in &self.stage_order {
            let spec = &self.stages[name];
            if let Some(dep) = spec.dependencies.iter().find(|d| !self.stages.contains_key(*d)) {
                return Err(UnknownDependencyError::new(&spec.name, dep));
            }
        }
        Ok(())
    }

    /// Detects cycles in the dependency graph.
    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for name in &self.stage_order {
            if !visited.contains(name) {
                if let Some(cycle) = self.dfs_cycle(name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(spec) = self.stages.get(node) {
            for dep in &spec.dependencies {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let cycle_start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }
}

//! Validated pipeline graph.

use super::StageSpec;
use std::collections::{HashMap, HashSet};

/// A directed acyclic graph of stages.
///
/// Only [`PipelineBuilder`](super::PipelineBuilder) constructs graphs, so
/// every instance has unique stage names, resolvable dependencies and no
/// cycles.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    /// The pipeline name.
    name: String,
    /// Owner identity for notifications.
    owner: String,
    /// Stage specifications.
    stages: HashMap<String, StageSpec>,
    /// Declaration order.
    stage_order: Vec<String>,
    /// Execution order (topologically sorted).
    execution_order: Vec<String>,
    /// Reverse edges, each list in declaration order.
    dependents: HashMap<String, Vec<String>>,
}

impl PipelineGraph {
    pub(super) fn new(
        name: String,
        owner: String,
        stages: HashMap<String, StageSpec>,
        stage_order: Vec<String>,
    ) -> Self {
        let execution_order = topological_sort(&stages, &stage_order);

        let mut dependents: HashMap<String, Vec<String>> =
            stage_order.iter().map(|n| (n.clone(), Vec::new())).collect();
        for name in &stage_order {
            for dep in &stages[name].dependencies {
                if let Some(children) = dependents.get_mut(dep) {
                    children.push(name.clone());
                }
            }
        }

        Self {
            name,
            owner,
            stages,
            stage_order,
            execution_order,
            dependents,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owner identity.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.get(name)
    }

    /// Iterates stages in declaration order.
    pub fn stages(&self) -> impl Iterator<Item = &StageSpec> + '_ {
        self.stage_order.iter().filter_map(|n| self.stages.get(n))
    }

    /// Returns stage names in declaration order.
    #[must_use]
    pub fn declaration_order(&self) -> &[String] {
        &self.stage_order
    }

    /// Returns the execution order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Returns the stages that directly depend on `name`.
    #[must_use]
    pub fn dependents(&self, name: &str) -> &[String] {
        self.dependents.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns every stage reachable from `name` along dependency edges.
    #[must_use]
    pub fn downstream(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = vec![name];
        while let Some(node) = stack.pop() {
            for child in self.dependents(node) {
                if seen.insert(child.clone()) {
                    stack.push(child);
                }
            }
        }
        self.stage_order
            .iter()
            .filter(|n| seen.contains(*n))
            .cloned()
            .collect()
    }

    /// Returns the stages with no dependencies.
    #[must_use]
    pub fn roots(&self) -> Vec<&str> {
        self.stages()
            .filter(|s| s.dependencies.is_empty())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Returns the position of a stage in declaration order.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.stage_order.iter().position(|n| n == name)
    }
}

/// Performs topological sort on the stage graph.
fn topological_sort(stages: &HashMap<String, StageSpec>, stage_order: &[String]) -> Vec<String> {
    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut temp_visited = HashSet::new();

    fn visit(
        node: &str,
        stages: &HashMap<String, StageSpec>,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if visited.contains(node) || temp_visited.contains(node) {
            return;
        }

        temp_visited.insert(node.to_string());

        if let Some(spec) = stages.get(node) {
            for dep in &spec.dependencies {
                visit(dep, stages, visited, temp_visited, result);
            }
        }

        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());
    }

    // Visit in insertion order for determinism
    for name in stage_order {
        visit(name, stages, &mut visited, &mut temp_visited, &mut result);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::super::PipelineBuilder;
    use crate::stages::{Action, NoOpAction};
    use std::sync::Arc;

    fn noop() -> Arc<dyn Action> {
        Arc::new(NoOpAction)
    }

    fn toll_graph() -> super::PipelineGraph {
        PipelineBuilder::new("toll")
            .stage("unzip", noop(), &[])
            .unwrap()
            .stage("extract_csv", noop(), &["unzip"])
            .unwrap()
            .stage("extract_tsv", noop(), &["unzip"])
            .unwrap()
            .stage("extract_fixed", noop(), &["unzip"])
            .unwrap()
            .stage("consolidate", noop(), &["extract_csv", "extract_tsv", "extract_fixed"])
            .unwrap()
            .stage("transform", noop(), &["consolidate"])
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_topological_order() {
        let graph = toll_graph();
        assert_eq!(
            graph.execution_order(),
            &["unzip", "extract_csv", "extract_tsv", "extract_fixed", "consolidate", "transform"]
        );
    }

    #[test]
    fn test_dependents_and_downstream() {
        let graph = toll_graph();
        assert_eq!(graph.dependents("unzip"), &["extract_csv", "extract_tsv", "extract_fixed"]);
        assert_eq!(graph.downstream("extract_tsv"), vec!["consolidate", "transform"]);
        assert!(graph.downstream("transform").is_empty());
        assert!(graph.dependents("nope").is_empty());
    }

    #[test]
    fn test_roots_and_positions() {
        let graph = toll_graph();
        assert_eq!(graph.roots(), vec!["unzip"]);
        assert_eq!(graph.position("consolidate"), Some(4));
        assert_eq!(graph.stages().count(), 6);
        assert!(graph.stage("transform").is_some());
    }
}

//! Stage inputs with strictness enforcement.

use crate::core::RecordStream;
use crate::errors::{ActionError, UndeclaredDependencyError};
use std::collections::HashMap;

/// The named input streams of one stage invocation.
///
/// Holds the output of every dependency that succeeded and produced a
/// stream. Dependencies that failed (tolerated) or produced no stream have
/// no entry. Access to names that are not declared dependencies is an error.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    streams: HashMap<String, RecordStream>,
    declared: Vec<String>,
    stage_name: String,
}

impl StageInputs {
    /// Creates new stage inputs.
    #[must_use]
    pub fn new(
        streams: HashMap<String, RecordStream>,
        declared: Vec<String>,
        stage_name: impl Into<String>,
    ) -> Self {
        Self {
            streams,
            declared,
            stage_name: stage_name.into(),
        }
    }

    /// Creates inputs for a root stage.
    #[must_use]
    pub fn root(stage_name: impl Into<String>) -> Self {
        Self::new(HashMap::new(), Vec::new(), stage_name)
    }

    /// Creates inputs where every provided stream counts as declared.
    #[must_use]
    pub fn permissive(streams: HashMap<String, RecordStream>, stage_name: impl Into<String>) -> Self {
        let mut declared: Vec<String> = streams.keys().cloned().collect();
        declared.sort_unstable();
        Self {
            declared,
            streams,
            stage_name: stage_name.into(),
        }
    }

    /// Gets the stream produced by a dependency.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependencyError` if `name` is not a declared
    /// dependency.
    pub fn get(&self, name: &str) -> Result<Option<&RecordStream>, UndeclaredDependencyError> {
        if !self.declared.iter().any(|d| d == name) {
            return Err(UndeclaredDependencyError::new(&self.stage_name, name));
        }
        Ok(self.streams.get(name))
    }

    /// Gets a dependency's stream, failing if it is absent.
    pub fn require(&self, name: &str) -> Result<&RecordStream, ActionError> {
        self.get(name)?
            .ok_or_else(|| ActionError::MissingInput(name.to_string()))
    }

    /// Gets a dependency's stream, or an empty stream if it is absent.
    pub fn get_or_empty(&self, name: &str) -> Result<RecordStream, UndeclaredDependencyError> {
        Ok(self.get(name)?.cloned().unwrap_or_default())
    }

    /// Returns the single provided stream, for stages with one dependency.
    pub fn single(&self) -> Result<&RecordStream, ActionError> {
        match self.declared.len() {
            1 => {
                self.require(&self.declared[0])
            }
            0 => Err(ActionError::MissingInput("<none declared>".to_string())),
            n => Err(ActionError::malformed(format!(
                "stage '{}' has {n} inputs, expected exactly one",
                self.stage_name
            ))),
        }
    }

    /// Checks if a stream was provided for a name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }

    /// Returns the names of the provided streams, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.streams.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of provided streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Returns true if no stream was provided.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Returns the declared dependencies, in declaration order.
    #[must_use]
    pub fn declared(&self) -> &[String] {
        &self.declared
    }

    /// Returns the name of the stage receiving these inputs.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Schema, Value};

    fn stream(values: &[&str]) -> RecordStream {
        RecordStream::from_rows(
            Schema::text(["v"]).unwrap(),
            values.iter().map(|v| vec![Value::text(*v)]).collect(),
        )
        .unwrap()
    }

    fn two_declared() -> StageInputs {
        let mut streams = HashMap::new();
        streams.insert("a".to_string(), stream(&["1", "2"]));
        let declared = vec!["a".to_string(), "b".to_string()];
        StageInputs::new(streams, declared, "consumer")
    }

    #[test]
    fn test_get_declared_and_undeclared() {
        let inputs = two_declared();

        assert_eq!(inputs.get("a").unwrap().map(RecordStream::len), Some(2));
        assert!(inputs.get("b").unwrap().is_none());

        let err = inputs.get("c").unwrap_err();
        assert_eq!(err.stage, "consumer");
        assert_eq!(err.key, "c");
    }

    #[test]
    fn test_require_and_get_or_empty() {
        let inputs = two_declared();

        assert!(matches!(inputs.require("b"), Err(ActionError::MissingInput(name)) if name == "b"));
        assert!(inputs.get_or_empty("b").unwrap().is_empty());
        assert_eq!(inputs.get_or_empty("a").unwrap().len(), 2);
    }

    #[test]
    fn test_single() {
        let inputs = StageInputs::permissive(
            HashMap::from([("only".to_string(), stream(&["x"]))]),
            "s",
        );
        assert_eq!(inputs.single().unwrap().len(), 1);

        assert!(StageInputs::root("s").single().is_err());
        assert!(two_declared().single().is_err());
    }

    #[test]
    fn test_names_sorted() {
        let inputs = StageInputs::permissive(
            HashMap::from([
                ("tsv".to_string(), stream(&[])),
                ("csv".to_string(), stream(&[])),
            ]),
            "consolidate",
        );
        assert_eq!(inputs.names(), vec!["csv", "tsv"]);
        assert_eq!(inputs.len(), 2);
    }
}

//! Record stream transforms.

use async_trait::async_trait;

use crate::context::{ActionContext, StageInputs};
use crate::core::{Field, FieldType, RecordStream, Schema, Value};
use crate::errors::ActionError;
use crate::stages::{Action, ActionResult};

/// Joins input streams column-wise, like `paste -d,`.
///
/// Streams are joined in the configured order, or in the stage's
/// dependency declaration order when none is configured.
#[derive(Debug, Clone, Default)]
pub struct PasteColumns {
    order: Vec<String>,
}

impl PasteColumns {
    /// Pastes inputs in declaration order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pastes the named inputs in the given order.
    #[must_use]
    pub fn in_order(order: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            order: order.into_iter().map(Into::into).collect(),
        }
    }

    /// Joins the named streams.
    pub fn paste(&self, inputs: &StageInputs) -> Result<RecordStream, ActionError> {
        let order = if self.order.is_empty() {
            inputs.declared()
        } else {
            self.order.as_slice()
        };
        let streams = order
            .iter()
            .map(|name| inputs.require(name).map(|s| (name.as_str(), s)))
            .collect::<Result<Vec<_>, _>>()?;

        let Some((first_name, first)) = streams.first() else {
            return Err(ActionError::MissingInput("<none declared>".to_string()));
        };
        if let Some((name, stream)) = streams.iter().find(|(_, s)| s.len() != first.len()) {
            return Err(ActionError::malformed(format!(
                "'{name}' has {} record(s), '{first_name}' has {}",
                stream.len(),
                first.len()
            )));
        }

        let fields: Vec<Field> = streams
            .iter()
            .flat_map(|(_, s)| s.schema().fields().iter().cloned())
            .collect();
        let schema = Schema::new(fields).map_err(|e| ActionError::malformed(e.to_string()))?;

        let mut out = RecordStream::new(schema);
        for row in 0..first.len() {
            let values = streams
                .iter()
                .flat_map(|(_, s)| s.rows()[row].iter().cloned())
                .collect();
            out.push(values)?;
        }
        Ok(out)
    }
}

#[async_trait]
impl Action for PasteColumns {
    async fn execute(&self, inputs: &StageInputs, _ctx: &ActionContext) -> ActionResult {
        self.paste(inputs).map(Some)
    }
}

/// Removes carriage returns from every text value.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripCarriageReturns;

impl StripCarriageReturns {
    /// Strips `\r` from a stream.
    pub fn apply(stream: &RecordStream) -> Result<RecordStream, ActionError> {
        Ok(stream.map_values(|_, value| match value {
            Value::Text(s) if s.contains('\r') => Value::Text(s.replace('\r', "")),
            other => other.clone(),
        })?)
    }
}

#[async_trait]
impl Action for StripCarriageReturns {
    async fn execute(&self, inputs: &StageInputs, _ctx: &ActionContext) -> ActionResult {
        Self::apply(inputs.single()?).map(Some)
    }
}

/// Upper-cases one text field.
#[derive(Debug, Clone)]
pub struct UppercaseField {
    field: String,
}

impl UppercaseField {
    /// Creates a transform for `field`.
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }

    /// Upper-cases the field in a stream.
    pub fn apply(&self, stream: &RecordStream) -> Result<RecordStream, ActionError> {
        let field = stream
            .schema()
            .field(&self.field)
            .ok_or_else(|| ActionError::malformed(format!("no field '{}' to upper-case", self.field)))?;
        if field.ty != FieldType::Text {
            return Err(ActionError::malformed(format!(
                "field '{}' is {}, not text",
                self.field, field.ty
            )));
        }
        Ok(stream.map_values(|f, value| match value {
            Value::Text(s) if f.name == self.field => Value::Text(s.to_uppercase()),
            other => other.clone(),
        })?)
    }
}

#[async_trait]
impl Action for UppercaseField {
    async fn execute(&self, inputs: &StageInputs, _ctx: &ActionContext) -> ActionResult {
        self.apply(inputs.single()?).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::text_stream;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn toll_inputs() -> StageInputs {
        let streams = HashMap::from([
            ("csv".to_string(), text_stream(&["id", "type"], &[&["1", "car"], &["2", "van"]])),
            ("tsv".to_string(), text_stream(&["axles"], &[&["2"], &["4"]])),
            ("fixed".to_string(), text_stream(&["code"], &[&["PTE"], &["PTP"]])),
        ]);
        StageInputs::new(
            streams,
            vec!["csv".to_string(), "tsv".to_string(), "fixed".to_string()],
            "consolidate",
        )
    }

    #[test]
    fn test_paste_in_declaration_order() {
        let out = PasteColumns::new().paste(&toll_inputs()).unwrap();

        assert_eq!(out.schema().names(), vec!["id", "type", "axles", "code"]);
        assert_eq!(
            out.rows()[1],
            vec![Value::text("2"), Value::text("van"), Value::text("4"), Value::text("PTP")]
        );
    }

    #[test]
    fn test_paste_explicit_order() {
        let out = PasteColumns::in_order(["fixed", "csv"]).paste(&toll_inputs()).unwrap();
        assert_eq!(out.schema().names(), vec!["code", "id", "type"]);
    }

    #[test]
    fn test_paste_rejects_uneven_streams() {
        let streams = HashMap::from([
            ("a".to_string(), text_stream(&["x"], &[&["1"], &["2"]])),
            ("b".to_string(), text_stream(&["y"], &[&["1"]])),
        ]);
        let inputs = StageInputs::new(streams, vec!["a".to_string(), "b".to_string()], "merge");

        let err = PasteColumns::new().paste(&inputs).unwrap_err();
        assert_eq!(err.kind(), "malformed_input");
    }

    #[test]
    fn test_paste_rejects_duplicate_fields() {
        let streams = HashMap::from([
            ("a".to_string(), text_stream(&["x"], &[&["1"]])),
            ("b".to_string(), text_stream(&["x"], &[&["2"]])),
        ]);
        let inputs = StageInputs::new(streams, vec!["a".to_string(), "b".to_string()], "merge");

        assert_eq!(PasteColumns::new().paste(&inputs).unwrap_err().kind(), "malformed_input");
    }

    #[test]
    fn test_paste_missing_input() {
        let streams = HashMap::from([("a".to_string(), text_stream(&["x"], &[&["1"]]))]);
        let inputs = StageInputs::new(streams, vec!["a".to_string(), "b".to_string()], "merge");

        let err = PasteColumns::new().paste(&inputs).unwrap_err();
        assert!(matches!(err, ActionError::MissingInput(ref n) if n == "b"));
    }

    #[test]
    fn test_strip_carriage_returns() {
        let stream = text_stream(&["a", "b"], &[&["x", "PTE\r"]]);
        let out = StripCarriageReturns::apply(&stream).unwrap();
        assert_eq!(out.rows()[0], vec![Value::text("x"), Value::text("PTE")]);
    }

    #[test]
    fn test_uppercase_field() {
        let stream = text_stream(&["id", "type"], &[&["a1", "car"], &["b2", "truck"]]);
        let out = UppercaseField::new("type").apply(&stream).unwrap();

        assert_eq!(out.column("type").unwrap(), vec![&Value::text("CAR"), &Value::text("TRUCK")]);
        assert_eq!(out.column("id").unwrap(), vec![&Value::text("a1"), &Value::text("b2")]);
    }

    #[test]
    fn test_uppercase_unknown_field() {
        let stream = text_stream(&["id"], &[&["a"]]);
        assert_eq!(UppercaseField::new("type").apply(&stream).unwrap_err().kind(), "malformed_input");
    }

    #[tokio::test]
    async fn test_actions_take_single_input() {
        let streams = HashMap::from([("consolidate".to_string(), text_stream(&["type"], &[&["car\r"]]))]);
        let inputs = StageInputs::new(streams, vec!["consolidate".to_string()], "cleanup");
        let ctx = ActionContext::detached("cleanup");

        let cleaned = StripCarriageReturns.execute(&inputs, &ctx).await.unwrap().unwrap();
        assert_eq!(cleaned.rows()[0], vec![Value::text("car")]);
    }
}

//! Fixed-width text extraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::context::{ActionContext, StageInputs};
use crate::core::{RecordStream, Schema, StageKind, Value};
use crate::errors::ActionError;
use crate::stages::{Action, ActionResult};

/// A column slice: `width` characters starting at 1-based `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedColumn {
    /// Field name.
    pub name: String,
    /// 1-based start position.
    pub start: usize,
    /// Number of characters.
    pub width: usize,
}

impl FixedColumn {
    /// Creates a column.
    #[must_use]
    pub fn new(name: impl Into<String>, start: usize, width: usize) -> Self {
        Self {
            name: name.into(),
            start,
            width,
        }
    }
}

/// Slices fixed character ranges out of every line of a text file.
///
/// A slice running past the end of the line is truncated; a line that ends
/// before a column starts is malformed.
#[derive(Debug, Clone)]
pub struct FixedWidthExtract {
    path: PathBuf,
    columns: Vec<FixedColumn>,
}

impl FixedWidthExtract {
    /// Creates an extract.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, columns: Vec<FixedColumn>) -> Self {
        Self {
            path: path.into(),
            columns,
        }
    }

    /// Parses text into a stream.
    pub fn parse(&self, text: &str) -> Result<RecordStream, ActionError> {
        if let Some(bad) = self.columns.iter().find(|c| c.start == 0) {
            return Err(ActionError::malformed(format!(
                "column '{}' start position is 1-based",
                bad.name
            )));
        }
        let schema = Schema::text(self.columns.iter().map(|c| c.name.clone()))?;
        let mut stream = RecordStream::new(schema);

        for (index, line) in text.lines().enumerate() {
            let chars: Vec<char> = line.chars().collect();
            let mut values = Vec::with_capacity(self.columns.len());
            for column in &self.columns {
                let from = column.start - 1;
                if from >= chars.len() {
                    return Err(ActionError::malformed(format!(
                        "line {} is {} character(s) long, column '{}' starts at {}",
                        index + 1,
                        chars.len(),
                        column.name,
                        column.start
                    )));
                }
                let to = (from + column.width).min(chars.len());
                values.push(Value::Text(chars[from..to].iter().collect()));
            }
            stream.push(values)?;
        }
        Ok(stream)
    }
}

#[async_trait]
impl Action for FixedWidthExtract {
    async fn execute(&self, _inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        let path = ctx.resolve(&self.path);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ActionError::Io(format!("{}: {e}", path.display())))?;
        self.parse(&text).map(Some)
    }

    fn kind(&self) -> StageKind {
        StageKind::Extract
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payment_columns() -> Vec<FixedColumn> {
        vec![FixedColumn::new("payment_code", 59, 3), FixedColumn::new("vehicle_code", 63, 5)]
    }

    #[test]
    fn test_slices_columns() {
        let line = format!("{}PTE VC965", " ".repeat(58));
        let stream = FixedWidthExtract::new("payment-data.txt", payment_columns())
            .parse(&format!("{line}\n{line}\n"))
            .unwrap();

        assert_eq!(stream.len(), 2);
        assert_eq!(stream.rows()[0], vec![Value::text("PTE"), Value::text("VC965")]);
    }

    #[test]
    fn test_slice_truncated_at_line_end() {
        let stream = FixedWidthExtract::new("f.txt", vec![FixedColumn::new("tail", 3, 10)])
            .parse("abcde")
            .unwrap();
        assert_eq!(stream.rows()[0], vec![Value::text("cde")]);
    }

    #[test]
    fn test_short_line_is_malformed() {
        let err = FixedWidthExtract::new("f.txt", payment_columns())
            .parse("too short")
            .unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert_eq!(err.kind(), "malformed_input");
    }

    #[test]
    fn test_zero_start_rejected() {
        let err = FixedWidthExtract::new("f.txt", vec![FixedColumn::new("x", 0, 1)])
            .parse("abc")
            .unwrap_err();
        assert_eq!(err.kind(), "malformed_input");
    }
}

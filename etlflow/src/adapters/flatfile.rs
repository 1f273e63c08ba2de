//! CSV file sink.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::context::{ActionContext, StageInputs};
use crate::core::{RecordStream, Schema, StageKind, Value};
use crate::errors::ActionError;
use crate::stages::{Action, ActionResult};

/// Renders a stream as CSV with a header row.
pub fn write_csv(stream: &RecordStream) -> Result<Vec<u8>, ActionError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(stream.schema().names())?;
    for row in stream.rows() {
        writer.write_record(row.iter().map(Value::to_cell))?;
    }
    writer
        .into_inner()
        .map_err(|e| ActionError::Io(e.to_string()))
}

/// Parses CSV with a header row into a stream of the given schema.
///
/// Columns are matched by header name, so their order in the file does not
/// need to follow the schema.
pub fn parse_csv(data: &[u8], schema: &Schema) -> Result<RecordStream, ActionError> {
    let mut reader = csv::Reader::from_reader(data);
    let headers = reader.headers()?.clone();
    let positions = schema
        .fields()
        .iter()
        .map(|f| {
            headers
                .iter()
                .position(|h| h == f.name)
                .ok_or_else(|| ActionError::malformed(format!("CSV has no column '{}'", f.name)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut stream = RecordStream::new(schema.clone());
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        let values = positions
            .iter()
            .zip(schema.fields())
            .map(|(&at, field)| {
                let raw = row.get(at).unwrap_or_default();
                Value::parse(raw, &field.ty).ok_or_else(|| {
                    ActionError::malformed(format!(
                        "line {}: '{raw}' in column '{}' is not a {}",
                        index + 2,
                        field.name,
                        field.ty
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        stream.push(values)?;
    }
    Ok(stream)
}

/// Reads a CSV file written by [`CsvFileLoad`] back into a stream.
pub fn read_csv(path: &Path, schema: &Schema) -> Result<RecordStream, ActionError> {
    let data = std::fs::read(path).map_err(|e| ActionError::Io(format!("{}: {e}", path.display())))?;
    parse_csv(&data, schema)
}

/// Writes its single input stream to a CSV file, replacing the file.
#[derive(Debug, Clone)]
pub struct CsvFileLoad {
    path: PathBuf,
}

impl CsvFileLoad {
    /// Creates a load into `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Action for CsvFileLoad {
    async fn execute(&self, inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        let stream = inputs.single()?;
        let path = ctx.resolve(&self.path);
        let bytes = write_csv(stream)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ActionError::Io(format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ActionError::Io(format!("{}: {e}", path.display())))?;

        info!(stage = ctx.stage(), path = %path.display(), rows = stream.len(), "wrote CSV file");
        Ok(None)
    }

    fn kind(&self) -> StageKind {
        StageKind::Load
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Field, FieldType, Money};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn banks() -> RecordStream {
        RecordStream::from_rows(
            Schema::new(vec![
                Field::text("Name"),
                Field::number("MC_USD_Billion"),
                Field::new("MC_GBP_Billion", FieldType::Currency("GBP".to_string())),
            ])
            .unwrap(),
            vec![
                vec![Value::text("Bank, of Commas"), Value::Number(432.92), Value::Currency(Money::new(346.34, "GBP"))],
                vec![Value::text("Plain"), Value::Number(100.0), Value::Currency(Money::new(80.0, "GBP"))],
                vec![Value::Null, Value::Number(1.0), Value::Null],
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_load_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ActionContext::detached("load_csv").with_working_dir(dir.path());
        let inputs = StageInputs::permissive(HashMap::from([("transform".to_string(), banks())]), "load_csv");

        let out = CsvFileLoad::new("out/Largest_banks_data.csv")
            .execute(&inputs, &ctx)
            .await
            .unwrap();
        assert!(out.is_none());

        let path = dir.path().join("out/Largest_banks_data.csv");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Name,MC_USD_Billion,MC_GBP_Billion\n"));
        assert!(text.contains("Plain,100.0,80.0"));
        assert!(text.ends_with(",1.0,\n"));

        let read = read_csv(&path, banks().schema()).unwrap();
        assert_eq!(read, banks());
    }

    #[test]
    fn test_parse_matches_columns_by_name() {
        let schema = Schema::new(vec![Field::number("b"), Field::text("a")]).unwrap();
        let stream = parse_csv(b"a,b\nx,1.5\n", &schema).unwrap();
        assert_eq!(stream.rows()[0], vec![Value::Number(1.5), Value::text("x")]);
    }

    #[test]
    fn test_parse_rejects_bad_number() {
        let schema = Schema::new(vec![Field::number("n")]).unwrap();
        let err = parse_csv(b"n\nabc\n", &schema).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_missing_column() {
        let schema = Schema::new(vec![Field::text("missing")]).unwrap();
        assert_eq!(parse_csv(b"a\n1\n", &schema).unwrap_err().kind(), "malformed_input");
    }
}

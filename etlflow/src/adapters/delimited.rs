//! Delimited text extraction.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::context::{ActionContext, StageInputs};
use crate::core::{RecordStream, Schema, StageKind, Value};
use crate::errors::ActionError;
use crate::stages::{Action, ActionResult};

/// Reads a delimited text file and keeps selected columns.
///
/// Columns are 1-based positions, as `cut -f` counts them. Each selected
/// column becomes a text field under the matching name.
#[derive(Debug, Clone)]
pub struct DelimitedExtract {
    path: PathBuf,
    delimiter: u8,
    columns: Vec<usize>,
    names: Vec<String>,
    has_header: bool,
}

impl DelimitedExtract {
    /// Creates a comma-delimited extract.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, columns: Vec<usize>, names: Vec<String>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            columns,
            names,
            has_header: false,
        }
    }

    /// Sets the field delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Skips the first line of the file.
    #[must_use]
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Parses delimited bytes into a stream.
    pub fn parse(&self, data: &[u8]) -> Result<RecordStream, ActionError> {
        if self.columns.len() != self.names.len() {
            return Err(ActionError::malformed(format!(
                "{} column(s) selected but {} name(s) given",
                self.columns.len(),
                self.names.len()
            )));
        }
        let positions = self
            .columns
            .iter()
            .map(|c| {
                c.checked_sub(1)
                    .ok_or_else(|| ActionError::malformed("column positions are 1-based"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut stream = RecordStream::new(Schema::text(self.names.iter().cloned())?);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_header)
            .flexible(true)
            .from_reader(data);

        for (line, row) in reader.records().enumerate() {
            let row = row?;
            let values = positions
                .iter()
                .zip(&self.columns)
                .map(|(&at, column)| {
                    row.get(at).map(Value::text).ok_or_else(|| {
                        ActionError::malformed(format!(
                            "line {} has {} field(s), column {column} requested",
                            line + 1 + usize::from(self.has_header),
                            row.len()
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            stream.push(values)?;
        }
        Ok(stream)
    }
}

#[async_trait]
impl Action for DelimitedExtract {
    async fn execute(&self, _inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        let path = ctx.resolve(&self.path);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| ActionError::Io(format!("{}: {e}", path.display())))?;
        self.parse(&data).map(Some)
    }

    fn kind(&self) -> StageKind {
        StageKind::Extract
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_selects_one_based_columns() {
        let extract = DelimitedExtract::new("vehicle-data.csv", vec![1, 2, 4], names(&["id", "ts", "type"]));
        let stream = extract
            .parse(b"1,Thu Aug 19,3,car,x\n2,Fri Aug 20,4,van,y\n")
            .unwrap();

        assert_eq!(stream.schema().names(), vec!["id", "ts", "type"]);
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.rows()[1], vec![Value::text("2"), Value::text("Fri Aug 20"), Value::text("van")]);
    }

    #[test]
    fn test_tab_delimited() {
        let extract = DelimitedExtract::new("tollplaza-data.tsv", vec![5, 6, 7], names(&["axles", "plaza", "code"]))
            .with_delimiter(b'\t');
        let stream = extract.parse(b"a\tb\tc\td\t2\t4856\tPC7C042B7\n").unwrap();

        assert_eq!(stream.column("plaza").unwrap(), vec![&Value::text("4856")]);
    }

    #[test]
    fn test_short_row_is_malformed() {
        let extract = DelimitedExtract::new("f.csv", vec![1, 3], names(&["a", "c"]));
        let err = extract.parse(b"1,2,3\n4,5\n").unwrap_err();

        assert_eq!(err.kind(), "malformed_input");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_zero_column_rejected() {
        let extract = DelimitedExtract::new("f.csv", vec![0], names(&["a"]));
        assert!(matches!(extract.parse(b"x\n"), Err(ActionError::MalformedInput(_))));
    }

    #[test]
    fn test_header_skipped() {
        let extract = DelimitedExtract::new("f.csv", vec![2], names(&["b"])).with_header(true);
        let stream = extract.parse(b"a,b\n1,2\n").unwrap();
        assert_eq!(stream.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ActionContext::detached("extract").with_working_dir(dir.path());
        let err = DelimitedExtract::new("absent.csv", vec![1], names(&["a"]))
            .execute(&StageInputs::root("extract"), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "io");
    }
}

//! Declarative action configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::{
    CsvFileLoad, CurrencyConversion, DelimitedExtract, FixedColumn, FixedWidthExtract, HtmlColumn,
    HtmlSource, HtmlTableExtract, PasteColumns, ShellCommand, SqlQuery, SqliteLoad, SqliteStore,
    StripCarriageReturns, UppercaseField, DEFAULT_FIELD_PATTERN,
};
use crate::errors::ConfigError;
use crate::stages::{Action, NoOpAction};

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_field_pattern() -> String {
    DEFAULT_FIELD_PATTERN.to_string()
}

fn default_decimals() -> u32 {
    2
}

/// One `[actions.<ref>]` entry, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    /// Does nothing.
    Noop,
    /// Runs an external program.
    Command {
        /// Program to run.
        program: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Directory override.
        #[serde(default)]
        current_dir: Option<PathBuf>,
    },
    /// Extracts 1-based columns from a delimited file.
    Delimited {
        /// Source file.
        path: PathBuf,
        /// Single-byte delimiter.
        #[serde(default = "default_delimiter")]
        delimiter: String,
        /// 1-based column positions.
        columns: Vec<usize>,
        /// Field names, one per column.
        names: Vec<String>,
        /// Whether to skip the first line.
        #[serde(default)]
        has_header: bool,
    },
    /// Slices fixed-width columns out of each line.
    FixedWidth {
        /// Source file.
        path: PathBuf,
        /// Column slices.
        columns: Vec<FixedColumn>,
    },
    /// Joins input streams column-wise.
    Paste {
        /// Input order; empty means declaration order.
        #[serde(default)]
        inputs: Vec<String>,
    },
    /// Removes carriage returns.
    StripCarriageReturns,
    /// Upper-cases one field.
    Uppercase {
        /// Field to upper-case.
        field: String,
    },
    /// Extracts a table from an HTML document.
    HtmlTable {
        /// Document URL.
        #[serde(default)]
        url: Option<String>,
        /// Document file.
        #[serde(default)]
        path: Option<PathBuf>,
        /// 0-based table index.
        #[serde(default)]
        table_index: usize,
        /// Header renames.
        #[serde(default)]
        rename: BTreeMap<String, String>,
        /// Columns to keep.
        columns: Vec<HtmlColumn>,
    },
    /// Adds converted currency amounts.
    CurrencyConversion {
        /// Numeric source field.
        source_field: String,
        /// Reference table name.
        reference: String,
        /// Target currency codes.
        targets: Vec<String>,
        /// Output field pattern.
        #[serde(default = "default_field_pattern")]
        field_pattern: String,
        /// Rounding precision.
        #[serde(default = "default_decimals")]
        decimals: u32,
    },
    /// Writes a CSV file.
    CsvLoad {
        /// Target file.
        path: PathBuf,
    },
    /// Replaces a table in the engine database.
    SqliteLoad {
        /// Table name.
        table: String,
    },
    /// Queries the engine database.
    SqlQuery {
        /// Query text.
        sql: String,
    },
}

impl ActionConfig {
    /// Returns true if the action needs the engine database.
    #[must_use]
    pub fn needs_store(&self) -> bool {
        matches!(self, Self::SqliteLoad { .. } | Self::SqlQuery { .. })
    }

    /// Builds the configured action.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for inconsistent settings, or when a
    /// database action is configured without a store.
    pub fn build(&self, name: &str, store: Option<&Arc<SqliteStore>>) -> Result<Arc<dyn Action>, ConfigError> {
        let invalid = |field: &str, reason: String| ConfigError::Invalid {
            field: format!("actions.{name}.{field}"),
            reason,
        };
        let require_store = || {
            store
                .cloned()
                .ok_or_else(|| invalid("type", "requires engine.database to be set".to_string()))
        };

        let action: Arc<dyn Action> = match self {
            Self::Noop => Arc::new(NoOpAction),
            Self::Command {
                program,
                args,
                current_dir,
            } => {
                let mut command = ShellCommand::new(program).args(args.iter().cloned());
                if let Some(dir) = current_dir {
                    command = command.current_dir(dir);
                }
                Arc::new(command)
            }
            Self::Delimited {
                path,
                delimiter,
                columns,
                names,
                has_header,
            } => {
                let &[byte] = delimiter.as_bytes() else {
                    return Err(invalid("delimiter", format!("'{delimiter}' is not a single byte")));
                };
                if columns.len() != names.len() {
                    return Err(invalid(
                        "names",
                        format!("{} column(s) but {} name(s)", columns.len(), names.len()),
                    ));
                }
                if columns.contains(&0) {
                    return Err(invalid("columns", "positions are 1-based".to_string()));
                }
                Arc::new(
                    DelimitedExtract::new(path, columns.clone(), names.clone())
                        .with_delimiter(byte)
                        .with_header(*has_header),
                )
            }
            Self::FixedWidth { path, columns } => {
                if let Some(bad) = columns.iter().find(|c| c.start == 0 || c.width == 0) {
                    return Err(invalid("columns", format!("column '{}' needs start >= 1 and width >= 1", bad.name)));
                }
                Arc::new(FixedWidthExtract::new(path, columns.clone()))
            }
            Self::Paste { inputs } if inputs.is_empty() => Arc::new(PasteColumns::new()),
            Self::Paste { inputs } => Arc::new(PasteColumns::in_order(inputs.iter().cloned())),
            Self::StripCarriageReturns => Arc::new(StripCarriageReturns),
            Self::Uppercase { field } => Arc::new(UppercaseField::new(field)),
            Self::HtmlTable {
                url,
                path,
                table_index,
                rename,
                columns,
            } => {
                let source = match (url, path) {
                    (Some(url), None) => HtmlSource::Url(url.clone()),
                    (None, Some(path)) => HtmlSource::Path(path.clone()),
                    _ => return Err(invalid("url", "exactly one of 'url' or 'path' is required".to_string())),
                };
                Arc::new(HtmlTableExtract::new(source, *table_index, columns.clone()).with_renames(rename.clone()))
            }
            Self::CurrencyConversion {
                source_field,
                reference,
                targets,
                field_pattern,
                decimals,
            } => {
                if targets.len() > 1 && !field_pattern.contains(super::currency::CODE_PLACEHOLDER) {
                    return Err(invalid("field_pattern", "must contain '{code}' for several targets".to_string()));
                }
                Arc::new(
                    CurrencyConversion::new(source_field, reference, targets.iter().cloned())
                        .with_field_pattern(field_pattern)
                        .with_decimals(*decimals),
                )
            }
            Self::CsvLoad { path } => Arc::new(CsvFileLoad::new(path)),
            Self::SqliteLoad { table } => Arc::new(SqliteLoad::new(require_store()?, table)),
            Self::SqlQuery { sql } => Arc::new(SqlQuery::new(require_store()?, sql)),
        };
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageKind;
    use pretty_assertions::assert_eq;

    fn parse(toml_str: &str) -> ActionConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_parse_tagged_configs() {
        let tsv = parse(
            r#"
            type = "delimited"
            path = "tollplaza-data.tsv"
            delimiter = "\t"
            columns = [5, 6, 7]
            names = ["axles", "plaza_id", "plaza_code"]
            "#,
        );
        assert!(matches!(tsv, ActionConfig::Delimited { ref delimiter, .. } if delimiter == "\t"));

        let fx = parse(
            r#"
            type = "currency_conversion"
            source_field = "MC_USD_Billion"
            reference = "exchange_rates"
            targets = ["GBP", "EUR", "INR"]
            "#,
        );
        assert_eq!(
            fx,
            ActionConfig::CurrencyConversion {
                source_field: "MC_USD_Billion".to_string(),
                reference: "exchange_rates".to_string(),
                targets: vec!["GBP".to_string(), "EUR".to_string(), "INR".to_string()],
                field_pattern: "MC_{code}_Billion".to_string(),
                decimals: 2,
            }
        );
        assert_eq!(parse("type = \"noop\""), ActionConfig::Noop);

        let html = parse(
            r#"
            type = "html_table"
            path = "banks.html"
            table_index = 1
            columns = [{ name = "Name" }, { name = "MC_USD_Billion", type = "number" }]
            "#,
        );
        assert!(matches!(
            html,
            ActionConfig::HtmlTable { ref columns, .. }
                if columns == &vec![HtmlColumn::text("Name"), HtmlColumn::number("MC_USD_Billion")]
        ));
    }

    #[test]
    fn test_build_reports_kind() {
        let config = parse("type = \"fixed_width\"\npath = \"payment-data.txt\"\ncolumns = [{ name = \"code\", start = 59, width = 3 }]");
        let action = config.build("extract_fixed", None).unwrap();
        assert_eq!(action.kind(), StageKind::Extract);

        let command = parse("type = \"command\"\nprogram = \"tar\"\nargs = [\"-zxvf\", \"tolldata.tgz\"]");
        assert_eq!(command.build("unzip", None).unwrap().kind(), StageKind::Command);
    }

    #[test]
    fn test_database_actions_need_store() {
        let config = ActionConfig::SqlQuery {
            sql: "SELECT 1".to_string(),
        };
        assert!(config.needs_store());
        let err = config.build("query", None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "actions.query.type"));

        let store = Arc::new(SqliteStore::in_memory().unwrap());
        assert_eq!(config.build("query", Some(&store)).unwrap().kind(), StageKind::Query);
    }

    #[test]
    fn test_invalid_settings() {
        let bad_delimiter = ActionConfig::Delimited {
            path: "f".into(),
            delimiter: "::".to_string(),
            columns: vec![1],
            names: vec!["a".to_string()],
            has_header: false,
        };
        assert!(bad_delimiter.build("x", None).is_err());

        let both_sources = ActionConfig::HtmlTable {
            url: Some("https://example.com".to_string()),
            path: Some("page.html".into()),
            table_index: 0,
            rename: BTreeMap::new(),
            columns: vec![],
        };
        assert!(both_sources.build("x", None).is_err());

        let bad_pattern = ActionConfig::CurrencyConversion {
            source_field: "usd".to_string(),
            reference: "rates".to_string(),
            targets: vec!["GBP".to_string(), "EUR".to_string()],
            field_pattern: "converted".to_string(),
            decimals: 2,
        };
        assert!(bad_pattern.build("x", None).is_err());
    }
}

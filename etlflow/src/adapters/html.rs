//! HTML table extraction.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::debug;

use crate::context::{ActionContext, StageInputs};
use crate::core::{Field, FieldType, RecordStream, Schema, StageKind, Value};
use crate::errors::ActionError;
use crate::stages::{Action, ActionResult};

#[allow(clippy::expect_used)]
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").expect("valid table selector"));
#[allow(clippy::expect_used)]
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid row selector"));
#[allow(clippy::expect_used)]
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").expect("valid cell selector"));

/// Where the HTML document comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HtmlSource {
    /// A local file, resolved against the working directory.
    Path(PathBuf),
    /// A URL, fetched over HTTP (requires the `web` feature).
    Url(String),
    /// The document itself.
    Inline(String),
}

/// A column to keep, with its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlColumn {
    /// Header name after renaming.
    pub name: String,
    /// Type the cell text is parsed into.
    #[serde(default = "default_column_type", rename = "type")]
    pub ty: FieldType,
}

fn default_column_type() -> FieldType {
    FieldType::Text
}

impl HtmlColumn {
    /// A text column.
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: FieldType::Text,
        }
    }

    /// A number column.
    #[must_use]
    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: FieldType::Number,
        }
    }
}

/// Extracts one table of an HTML document into a stream.
///
/// The first row of the table is its header. Header names are trimmed and
/// whitespace-collapsed, then renamed; the requested columns are picked by
/// name and typed. Rows with fewer cells than the header get nulls.
#[derive(Debug, Clone)]
pub struct HtmlTableExtract {
    source: HtmlSource,
    table_index: usize,
    rename: BTreeMap<String, String>,
    columns: Vec<HtmlColumn>,
}

impl HtmlTableExtract {
    /// Creates an extract of the `table_index`-th (0-based) table.
    #[must_use]
    pub fn new(source: HtmlSource, table_index: usize, columns: Vec<HtmlColumn>) -> Self {
        Self {
            source,
            table_index,
            rename: BTreeMap::new(),
            columns,
        }
    }

    /// Renames a header column.
    #[must_use]
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.insert(from.into(), to.into());
        self
    }

    /// Replaces the rename map.
    #[must_use]
    pub fn with_renames(mut self, rename: BTreeMap<String, String>) -> Self {
        self.rename = rename;
        self
    }

    async fn fetch(&self, ctx: &ActionContext) -> Result<String, ActionError> {
        match &self.source {
            HtmlSource::Inline(html) => Ok(html.clone()),
            HtmlSource::Path(path) => {
                let path = ctx.resolve(path);
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| ActionError::Io(format!("{}: {e}", path.display())))
            }
            HtmlSource::Url(url) => fetch_url(url).await,
        }
    }

    /// Parses a document into a stream.
    pub fn parse(&self, html: &str) -> Result<RecordStream, ActionError> {
        let document = Html::parse_document(html);
        let table = document.select(&TABLE).nth(self.table_index).ok_or_else(|| {
            ActionError::malformed(format!("document has no table at index {}", self.table_index))
        })?;

        let mut rows = table.select(&ROW).filter(|r| is_own_row(table, *r));
        let header: Vec<String> = rows
            .next()
            .ok_or_else(|| ActionError::malformed("table has no rows"))?
            .select(&CELL)
            .map(|c| {
                let name = cell_text(c);
                self.rename.get(&name).cloned().unwrap_or(name)
            })
            .collect();

        let positions = self
            .columns
            .iter()
            .map(|col| {
                header.iter().position(|h| *h == col.name).ok_or_else(|| {
                    ActionError::malformed(format!("table has no column '{}' (header: {header:?})", col.name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let schema = Schema::new(
            self.columns
                .iter()
                .map(|c| Field::new(&c.name, c.ty.clone()))
                .collect(),
        )?;
        let mut stream = RecordStream::new(schema);

        for row in rows {
            let cells: Vec<String> = row.select(&CELL).map(cell_text).collect();
            if cells.is_empty() {
                continue;
            }
            let values = positions
                .iter()
                .zip(&self.columns)
                .map(|(&at, col)| match cells.get(at) {
                    None => Ok(Value::Null),
                    Some(raw) => Value::parse(raw, &col.ty).ok_or_else(|| {
                        ActionError::malformed(format!("'{raw}' in column '{}' is not a {}", col.name, col.ty))
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?;
            stream.push(values)?;
        }
        Ok(stream)
    }
}

/// Keeps rows that belong to `table` itself rather than a nested table.
fn is_own_row(table: ElementRef<'_>, row: ElementRef<'_>) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "table")
        .is_some_and(|t| t.id() == table.id())
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(feature = "web")]
pub(crate) async fn fetch_url(url: &str) -> Result<String, ActionError> {
    debug!(url, "fetching document");
    let response = reqwest::get(url)
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| ActionError::Fetch(format!("{url}: {e}")))?;
    response
        .text()
        .await
        .map_err(|e| ActionError::Fetch(format!("{url}: {e}")))
}

#[cfg(not(feature = "web"))]
pub(crate) async fn fetch_url(url: &str) -> Result<String, ActionError> {
    debug!(url, "web feature disabled");
    Err(ActionError::Fetch(format!(
        "cannot fetch '{url}': built without the `web` feature"
    )))
}

#[async_trait]
impl Action for HtmlTableExtract {
    async fn execute(&self, _inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        let html = self.fetch(ctx).await?;
        self.parse(&html).map(Some)
    }

    fn kind(&self) -> StageKind {
        StageKind::Extract
    }
}

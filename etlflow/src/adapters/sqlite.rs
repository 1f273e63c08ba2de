//! SQLite-backed store, load and query actions.
//!
//! Uses a single mutex-guarded connection, so stages that share a store
//! serialize their statements.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::context::{ActionContext, StageInputs};
use crate::core::{Field, FieldType, RecordStream, Schema, StageKind, Value};
use crate::errors::ActionError;
use crate::stages::{Action, ActionResult};

/// A relational store holding named tables.
pub struct SqliteStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens or creates a database file.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::Io` if the directory can't be created, or
    /// `ActionError::Store` if the database can't be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ActionError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(Connection::open(path)?),
        })
    }

    /// Creates an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ActionError::Store` if the database can't be initialized.
    pub fn in_memory() -> Result<Self, ActionError> {
        Ok(Self {
            path: None,
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Returns the database path, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replaces a table's contents with a stream.
    ///
    /// Drops, recreates and fills the table in one transaction, so readers
    /// see either the old or the new contents.
    pub fn replace_table(&self, table: &str, stream: &RecordStream) -> Result<usize, ActionError> {
        let fields = stream.schema().fields();
        if fields.is_empty() {
            return Err(ActionError::malformed(format!("cannot store table '{table}' without columns")));
        }
        let name = quote_ident(table);
        let columns = fields
            .iter()
            .map(|f| format!("{} {}", quote_ident(&f.name), column_type(&f.ty)))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=fields.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {name}; CREATE TABLE {name} ({columns});"))?;
        {
            let mut insert = tx.prepare(&format!("INSERT INTO {name} VALUES ({placeholders})"))?;
            for row in stream.rows() {
                insert.execute(params_from_iter(row.iter().map(to_sql)))?;
            }
        }
        tx.commit()?;
        Ok(stream.len())
    }

    /// Runs a query and returns its result set.
    ///
    /// A column is numeric when every non-null value in it is numeric,
    /// otherwise text.
    pub fn query(&self, sql: &str) -> Result<RecordStream, ActionError> {
        let conn = self.conn.lock();
        let mut statement = conn.prepare(sql)?;
        let names: Vec<String> = statement.column_names().into_iter().map(String::from).collect();

        let mut rows: Vec<Vec<Value>> = Vec::new();
        let mut result = statement.query([])?;
        while let Some(row) = result.next()? {
            let values = (0..names.len())
                .map(|i| row.get_ref(i).map(from_sql))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(values);
        }

        let numeric: Vec<bool> = (0..names.len())
            .map(|i| rows.iter().all(|r| matches!(r[i], Value::Null | Value::Number(_))))
            .collect();
        for row in &mut rows {
            for (value, &is_numeric) in row.iter_mut().zip(&numeric) {
                if !is_numeric && matches!(value, Value::Number(_)) {
                    *value = Value::Text(value.to_cell());
                }
            }
        }

        let fields = names
            .into_iter()
            .zip(numeric)
            .map(|(name, is_numeric)| if is_numeric { Field::number(name) } else { Field::text(name) })
            .collect();
        Ok(RecordStream::from_rows(Schema::new(fields)?, rows)?)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_type(ty: &FieldType) -> &'static str {
    match ty {
        FieldType::Text => "TEXT",
        FieldType::Number | FieldType::Currency(_) => "REAL",
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Number(n) => SqlValue::Real(*n),
        Value::Currency(money) => SqlValue::Real(money.amount),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

#[allow(clippy::cast_precision_loss)]
fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i as f64),
        ValueRef::Real(f) => Value::Number(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Text(format!("<{} byte blob>", bytes.len())),
    }
}

/// Renders a stream as an aligned text table, for logs.
#[must_use]
pub fn render_table(stream: &RecordStream) -> String {
    let names = stream.schema().names();
    let cells: Vec<Vec<String>> = stream
        .rows()
        .iter()
        .map(|row| row.iter().map(Value::to_cell).collect())
        .collect();
    let widths: Vec<usize> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let line = |values: Vec<&str>| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, &w)| format!("{v:<w$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![line(names.clone())];
    out.extend(cells.iter().map(|r| line(r.iter().map(String::as_str).collect())));
    out.join("\n")
}

/// Runs a blocking store operation off the async runtime.
async fn blocking<T, F>(store: &Arc<SqliteStore>, f: F) -> Result<T, ActionError>
where
    T: Send + 'static,
    F: FnOnce(&SqliteStore) -> Result<T, ActionError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| ActionError::Store(format!("store task failed: {e}")))?
}

/// Replaces a table with the stage's single input stream.
#[derive(Debug, Clone)]
pub struct SqliteLoad {
    store: Arc<SqliteStore>,
    table: String,
}

impl SqliteLoad {
    /// Creates a load into `table`.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }
}

#[async_trait]
impl Action for SqliteLoad {
    async fn execute(&self, inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        let stream = inputs.single()?.clone();
        let table = self.table.clone();
        let rows = blocking(&self.store, move |store| store.replace_table(&table, &stream)).await?;
        info!(stage = ctx.stage(), table = %self.table, rows, "replaced table");
        Ok(None)
    }

    fn kind(&self) -> StageKind {
        StageKind::Load
    }
}

/// Runs a query and logs its result.
///
/// The result set is also the stage's output.
#[derive(Debug, Clone)]
pub struct SqlQuery {
    store: Arc<SqliteStore>,
    sql: String,
}

impl SqlQuery {
    /// Creates a query action.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, sql: impl Into<String>) -> Self {
        Self {
            store,
            sql: sql.into(),
        }
    }
}

#[async_trait]
impl Action for SqlQuery {
    async fn execute(&self, _inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        let sql = self.sql.clone();
        let result = blocking(&self.store, move |store| store.query(&sql)).await?;
        info!(
            stage = ctx.stage(),
            query = %self.sql,
            rows = result.len(),
            "query result:\n{}",
            render_table(&result)
        );
        Ok(Some(result))
    }

    fn kind(&self) -> StageKind {
        StageKind::Query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Money;
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
                vec![Value::text("JPMorgan Chase"), Value::Number(432.92), Value::Currency(Money::new(346.34, "GBP"))],
                vec![Value::text("Bank of America"), Value::Number(231.52), Value::Currency(Money::new(185.22, "GBP"))],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_replace_and_query() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.replace_table("Largest_banks", &banks()).unwrap(), 2);

        let all = store.query("SELECT * FROM Largest_banks").unwrap();
        assert_eq!(all.schema().names(), vec!["Name", "MC_USD_Billion", "MC_GBP_Billion"]);
        assert_eq!(all.rows()[1][0], Value::text("Bank of America"));
        assert_eq!(all.rows()[0][2], Value::Number(346.34));

        let avg = store.query("SELECT AVG(MC_GBP_Billion) FROM Largest_banks").unwrap();
        assert_eq!(avg.len(), 1);
        let Value::Number(mean) = avg.rows()[0][0] else {
            panic!("expected a number");
        };
        assert!((mean - 265.78).abs() < 1e-9);
    }

    #[test]
    fn test_replace_drops_previous_rows() {
        let store = SqliteStore::in_memory().unwrap();
        store.replace_table("t", &banks()).unwrap();
        store.replace_table("t", &banks()).unwrap();

        let count = store.query("SELECT COUNT(*) AS n FROM t").unwrap();
        assert_eq!(count.rows()[0][0], Value::Number(2.0));
    }

    #[test]
    fn test_mixed_column_becomes_text() {
        let store = SqliteStore::in_memory().unwrap();
        let mixed = store.query("SELECT 1 AS v UNION ALL SELECT 'x'").unwrap();

        assert_eq!(mixed.schema().field("v").unwrap().ty, FieldType::Text);
        assert_eq!(mixed.rows()[0][0], Value::text("1.0"));
    }

    #[test]
    fn test_bad_sql_is_store_error() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.query("SELECT * FROM missing").unwrap_err().kind(), "store");
    }

    #[test]
    fn test_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db/Banks.db");
        SqliteStore::open(&path).unwrap().replace_table("b", &banks()).unwrap();

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
        assert_eq!(reopened.query("SELECT Name FROM b LIMIT 5").unwrap().len(), 2);
    }

    #[test]
    fn test_render_table() {
        let stream = crate::testing::text_stream(&["Name", "n"], &[&["Alpha", "1"], &["B", "22"]]);
        assert_eq!(render_table(&stream), "Name  | n\nAlpha | 1\nB     | 22");
    }

    #[tokio::test]
    async fn test_load_and_query_actions() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let inputs = StageInputs::permissive(HashMap::from([("transform".to_string(), banks())]), "load_db");

        let loaded = SqliteLoad::new(Arc::clone(&store), "Largest_banks")
            .execute(&inputs, &ActionContext::detached("load_db"))
            .await
            .unwrap();
        assert!(loaded.is_none());

        let names = SqlQuery::new(store, "SELECT Name FROM Largest_banks LIMIT 5")
            .execute(&StageInputs::root("query"), &ActionContext::detached("query"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names.schema().names(), vec!["Name"]);
    }
}

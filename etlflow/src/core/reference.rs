//! Read-only reference tables shared by transform actions.

use super::records::RecordStream;
use crate::errors::ActionError;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// A key to rate mapping, e.g. currency code to exchange rate.
///
/// Loaded once per run and then only read, so it is shared across
/// concurrently running stages without locking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeTable {
    rates: BTreeMap<String, f64>,
}

impl ExchangeTable {
    /// Creates a table from `(key, rate)` pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            rates: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Builds a table from two columns of a record stream.
    pub fn from_stream(stream: &RecordStream, key_field: &str, rate_field: &str) -> Result<Self, ActionError> {
        let mut rates = BTreeMap::new();
        for record in stream.records() {
            let key = record
                .get(key_field)
                .ok_or_else(|| ActionError::MissingReference(format!("column '{key_field}'")))?
                .to_cell();
            let rate = record
                .get(rate_field)
                .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
                .ok_or_else(|| ActionError::malformed(format!("rate for '{key}' is not numeric")))?;
            rates.insert(key, rate);
        }
        Ok(Self { rates })
    }

    /// Reads a table from CSV with a header row.
    pub fn from_csv_reader<R: Read>(reader: R, key_column: &str, rate_column: &str) -> Result<Self, ActionError> {
        let mut csv = csv::Reader::from_reader(reader);
        let headers = csv.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| ActionError::MissingReference(format!("column '{name}'")))
        };
        let key_at = position(key_column)?;
        let rate_at = position(rate_column)?;

        let mut rates = BTreeMap::new();
        for row in csv.records() {
            let row = row?;
            let key = row.get(key_at).unwrap_or_default().trim().to_string();
            let raw = row.get(rate_at).unwrap_or_default().trim();
            let rate = raw
                .parse::<f64>()
                .map_err(|_| ActionError::malformed(format!("rate '{raw}' for '{key}' is not numeric")))?;
            rates.insert(key, rate);
        }
        Ok(Self { rates })
    }

    /// Reads a table from a CSV file.
    pub fn from_csv_path(path: &Path, key_column: &str, rate_column: &str) -> Result<Self, ActionError> {
        let file = std::fs::File::open(path)
            .map_err(|e| ActionError::Io(format!("{}: {e}", path.display())))?;
        Self::from_csv_reader(file, key_column, rate_column)
    }

    /// Returns the rate for a key.
    pub fn rate(&self, key: &str) -> Result<f64, ActionError> {
        self.rates
            .get(key)
            .copied()
            .ok_or_else(|| ActionError::MissingReference(format!("no rate for '{key}'")))
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Named reference tables available to a run.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    tables: HashMap<String, Arc<ExchangeTable>>,
}

impl ReferenceTables {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table under a name.
    #[must_use]
    pub fn with_table(mut self, name: impl Into<String>, table: ExchangeTable) -> Self {
        self.insert(name, table);
        self
    }

    /// Inserts a table under a name.
    pub fn insert(&mut self, name: impl Into<String>, table: ExchangeTable) {
        self.tables.insert(name.into(), Arc::new(table));
    }

    /// Adds every table of `other`, replacing tables with the same name.
    pub fn merge(&mut self, other: ReferenceTables) {
        self.tables.extend(other.tables);
    }

    /// Returns a table by name.
    pub fn get(&self, name: &str) -> Result<Arc<ExchangeTable>, ActionError> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| ActionError::MissingReference(format!("reference table '{name}' not loaded")))
    }

    /// Returns the number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no tables are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

//! Engine configuration and pipeline files.
//!
//! A pipeline file is a single TOML document:
//!
//! ```toml
//! [engine]
//! log_file = "log_file.txt"
//! max_workers = 4
//!
//! [pipeline]
//! name = "toll_data"
//! schedule = "@daily"
//!
//! [[pipeline.stage]]
//! name = "unzip"
//! action = "unzip"
//!
//! [actions.unzip]
//! type = "command"
//! program = "tar"
//! args = ["-zxvf", "tolldata.tgz"]
//!
//! [references.exchange_rates]
//! path = "exchange_rate.csv"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::adapters::{fetch_url, ActionConfig, SqliteStore};
use crate::core::{ExchangeTable, ReferenceTables};
use crate::errors::{ActionError, ConfigError, EtlflowError};
use crate::pipeline::{ActionRegistry, FailureMode, PipelineDefinition, PipelineGraph, SchedulerConfig};

/// Environment variable that replaces `engine.log_file`.
pub const LOG_FILE_ENV: &str = "ETLFLOW_LOG_FILE";

fn default_log_file() -> PathBuf {
    PathBuf::from("log_file.txt")
}

fn default_max_workers() -> usize {
    4
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_key_column() -> String {
    "Currency".to_string()
}

fn default_value_column() -> String {
    "Rate".to_string()
}

/// Engine settings shared by every stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Progress log file, relative to `working_dir` unless absolute.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Maximum stages running at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Directory that relative stage paths resolve against.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// SQLite database for `sqlite_load` and `sql_query` actions.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Reaction to critical failures.
    #[serde(default)]
    pub failure_mode: FailureMode,
    /// Per-attempt timeout for stages that do not set their own.
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            max_workers: default_max_workers(),
            working_dir: default_working_dir(),
            database: None,
            failure_mode: FailureMode::default(),
            stage_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a zero worker limit or timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.max_workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.stage_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "engine.stage_timeout_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Resolves a path against the working directory.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Returns the resolved progress log path.
    #[must_use]
    pub fn log_file_path(&self) -> PathBuf {
        self.resolve(&self.log_file)
    }

    /// Returns the resolved database path, if one is configured.
    #[must_use]
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.as_deref().map(|p| self.resolve(p))
    }

    /// Returns the default per-attempt timeout.
    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }

    /// Returns the scheduler settings.
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_max_workers(self.max_workers)
            .with_failure_mode(self.failure_mode)
    }

    /// Applies `ETLFLOW_LOG_FILE` if it is set.
    pub fn apply_env_overrides(&mut self) {
        self.override_log_file(std::env::var_os(LOG_FILE_ENV));
    }

    fn override_log_file(&mut self, value: Option<OsString>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            debug!(log_file = ?value, "log file overridden from environment");
            self.log_file = PathBuf::from(value);
        }
    }
}

/// Where a reference table is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// CSV file, relative to the working directory unless absolute.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// CSV URL; requires the `web` feature.
    #[serde(default)]
    pub url: Option<String>,
    /// Column holding the keys.
    #[serde(default = "default_key_column")]
    pub key_column: String,
    /// Column holding the rates.
    #[serde(default = "default_value_column")]
    pub value_column: String,
}

impl ReferenceConfig {
    /// A reference read from a CSV file with the default columns.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            url: None,
            key_column: default_key_column(),
            value_column: default_value_column(),
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.path.is_some() == self.url.is_some() {
            return Err(ConfigError::Invalid {
                field: format!("references.{name}"),
                reason: "exactly one of 'path' or 'url' is required".to_string(),
            });
        }
        Ok(())
    }

    /// Loads the table.
    ///
    /// # Errors
    ///
    /// Returns the `ActionError` raised while reading or parsing the CSV.
    pub async fn load(&self, engine: &EngineConfig) -> Result<ExchangeTable, ActionError> {
        match (&self.path, &self.url) {
            (Some(path), _) => {
                let path = engine.resolve(path);
                let data = tokio::fs::read(&path)
                    .await
                    .map_err(|e| ActionError::Io(format!("{}: {e}", path.display())))?;
                ExchangeTable::from_csv_reader(data.as_slice(), &self.key_column, &self.value_column)
            }
            (None, Some(url)) => {
                let text = fetch_url(url).await?;
                ExchangeTable::from_csv_reader(text.as_bytes(), &self.key_column, &self.value_column)
            }
            (None, None) => Err(ActionError::MissingReference("no path or url configured".to_string())),
        }
    }
}

/// A complete pipeline file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFile {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Stage definitions.
    pub pipeline: PipelineDefinition,
    /// Actions by reference name.
    #[serde(default)]
    pub actions: BTreeMap<String, ActionConfig>,
    /// Reference tables by name.
    #[serde(default)]
    pub references: BTreeMap<String, ReferenceConfig>,
}

impl PipelineFile {
    /// Reads a pipeline file.
    ///
    /// A relative `engine.working_dir` is taken relative to the file's
    /// directory, and `ETLFLOW_LOG_FILE` is applied.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read, or any error
    /// from [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut file = Self::from_toml_str(&text)?;

        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if file.engine.working_dir.is_relative() {
                file.engine.working_dir = base.join(&file.engine.working_dir);
            }
        }
        file.engine.apply_env_overrides();
        info!(path = %path.display(), pipeline = %file.pipeline.name, "loaded pipeline file");
        Ok(file)
    }

    /// Parses and validates a pipeline document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML, `ConfigError::Invalid`
    /// for out-of-range settings, or `ConfigError::UnknownAction` when a
    /// stage names an action missing from `[actions]`.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: Self = toml::from_str(text)?;
        file.engine.validate()?;
        for (name, reference) in &file.references {
            reference.validate(name)?;
        }
        if let Some(stage) = file.pipeline.stages.iter().find(|s| !file.actions.contains_key(&s.action)) {
            return Err(ConfigError::UnknownAction {
                stage: stage.name.clone(),
                action: stage.action.clone(),
            });
        }
        Ok(file)
    }

    /// Returns true if any action reads or writes the database.
    #[must_use]
    pub fn needs_store(&self) -> bool {
        self.actions.values().any(ActionConfig::needs_store)
    }

    /// Opens the configured database.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if database actions are configured
    /// without `engine.database`, or the store error if it cannot be opened.
    pub fn open_store(&self) -> Result<Option<Arc<SqliteStore>>, EtlflowError> {
        match self.engine.database_path() {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Ok(Some(Arc::new(SqliteStore::open(path)?)))
            }
            None if self.needs_store() => Err(ConfigError::Invalid {
                field: "engine.database".to_string(),
                reason: "required by sqlite_load and sql_query actions".to_string(),
            }
            .into()),
            None => Ok(None),
        }
    }

    /// Builds every configured action.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` raised by an action.
    pub fn registry(&self, store: Option<&Arc<SqliteStore>>) -> Result<ActionRegistry, ConfigError> {
        let mut registry = ActionRegistry::new();
        for (name, config) in &self.actions {
            registry.register(name, config.build(name, store)?);
        }
        Ok(registry)
    }

    /// Opens the store, builds the actions and validates the graph.
    ///
    /// # Errors
    ///
    /// Returns any configuration or validation error.
    pub fn build_graph(&self) -> Result<PipelineGraph, EtlflowError> {
        let store = self.open_store()?;
        let registry = self.registry(store.as_ref())?;
        self.pipeline.build(&registry)
    }

    /// Loads every reference table.
    ///
    /// # Errors
    ///
    /// Returns the first table that fails to load.
    pub async fn load_references(&self) -> Result<ReferenceTables, EtlflowError> {
        load_references(&self.references, &self.engine).await
    }
}

pub(crate) async fn load_references(
    configs: &BTreeMap<String, ReferenceConfig>,
    engine: &EngineConfig,
) -> Result<ReferenceTables, EtlflowError> {
    let mut tables = ReferenceTables::new();
    for (name, config) in configs {
        let table = config.load(engine).await?;
        debug!(reference = %name, entries = table.len(), "loaded reference table");
        tables.insert(name, table);
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Schedule;
    use pretty_assertions::assert_eq;

    const TOLL: &str = r#"
        [engine]
        max_workers = 2
        failure_mode = "fail_fast"

        [pipeline]
        name = "toll_data"
        owner = "data-team"
        schedule = "@daily"

        [pipeline.defaults]
        retries = 1

        [[pipeline.stage]]
        name = "unzip"
        action = "unzip"

        [[pipeline.stage]]
        name = "extract_csv"
        action = "noop"
        depends_on = ["unzip"]

        [actions.unzip]
        type = "command"
        program = "tar"
        args = ["-zxvf", "tolldata.tgz"]

        [actions.noop]
        type = "noop"
    "#;

    #[test]
    fn test_engine_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.log_file, PathBuf::from("log_file.txt"));
        assert_eq!(engine.max_workers, 4);
        assert_eq!(engine.failure_mode, FailureMode::ContinueIndependent);
        assert_eq!(engine.stage_timeout(), None);
        assert_eq!(engine.log_file_path(), PathBuf::from("./log_file.txt"));

        let parsed: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(parsed, engine);
    }

    #[test]
    fn test_parse_pipeline_file() {
        let file = PipelineFile::from_toml_str(TOLL).unwrap();
        assert_eq!(file.engine.max_workers, 2);
        assert_eq!(file.engine.scheduler_config().failure_mode, FailureMode::FailFast);
        assert_eq!(file.pipeline.schedule, Schedule::DAILY);
        assert_eq!(file.pipeline.stages.len(), 2);
        assert!(!file.needs_store());

        let graph = file.build_graph().unwrap();
        assert_eq!(graph.execution_order(), ["unzip", "extract_csv"]);
        assert_eq!(graph.owner(), "data-team");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = PipelineFile::from_toml_str("[engine]\nmax_workers = 0\n[pipeline]\nname = \"p\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "engine.max_workers"));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let text = "[pipeline]\nname = \"p\"\n[[pipeline.stage]]\nname = \"a\"\naction = \"missing\"";
        let err = PipelineFile::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAction { ref action, .. } if action == "missing"));
    }

    #[test]
    fn test_database_required_for_queries() {
        let text = "[pipeline]\nname = \"p\"\n[actions.q]\ntype = \"sql_query\"\nsql = \"SELECT 1\"";
        let file = PipelineFile::from_toml_str(text).unwrap();
        assert!(file.needs_store());
        assert!(matches!(
            file.open_store().unwrap_err(),
            EtlflowError::Config(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_reference_needs_one_source() {
        let text = "[pipeline]\nname = \"p\"\n[references.rates]\nkey_column = \"Currency\"";
        assert!(PipelineFile::from_toml_str(text).is_err());
    }

    #[test]
    fn test_env_override() {
        let mut engine = EngineConfig::default();
        engine.override_log_file(Some(OsString::new()));
        assert_eq!(engine.log_file, PathBuf::from("log_file.txt"));
        engine.override_log_file(Some(OsString::from("/var/log/etl.txt")));
        assert_eq!(engine.log_file_path(), PathBuf::from("/var/log/etl.txt"));
    }

    #[test]
    fn test_load_resolves_against_file_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toll.toml");
        std::fs::write(&path, TOLL).unwrap();

        let file = PipelineFile::load(&path).unwrap();
        assert_eq!(file.engine.working_dir, dir.path().join("."));

        let missing = PipelineFile::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn test_demo_pipelines_build() {
        let toll = PipelineFile::from_toml_str(include_str!("../../demos/toll_data.toml")).unwrap();
        let graph = toll.build_graph().unwrap();
        assert_eq!(graph.stage_count(), 8);
        assert_eq!(graph.roots(), vec!["unzip_data"]);
        assert_eq!(graph.owner(), "this_is_task");

        let banks = PipelineFile::from_toml_str(include_str!("../../demos/largest_banks.toml")).unwrap();
        assert!(banks.needs_store());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let graph = banks.pipeline.build(&banks.registry(Some(&store)).unwrap()).unwrap();
        assert_eq!(graph.dependents("load_to_db").len(), 3);
        assert_eq!(banks.references["exchange_rates"].key_column, "Currency");
    }

    #[tokio::test]
    async fn test_load_references_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("exchange_rate.csv"), "Currency,Rate\nGBP,0.8\nEUR,0.93\n").unwrap();
        let engine = EngineConfig {
            working_dir: dir.path().to_path_buf(),
            ..EngineConfig::default()
        };
        let configs = BTreeMap::from([(
            "exchange_rates".to_string(),
            ReferenceConfig::from_path("exchange_rate.csv"),
        )]);

        let tables = load_references(&configs, &engine).await.unwrap();
        let rates = tables.get("exchange_rates").unwrap();
        assert_eq!(rates.rate("EUR").unwrap(), 0.93);
        assert_eq!(rates.len(), 2);
    }
}

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use etlflow::adapters::SqliteStore;
use etlflow::config::PipelineFile;
use etlflow::errors::EtlflowError;

/// Execute the `check` command: validate a pipeline file without running it.
///
/// Database actions are built against an in-memory store so checking never
/// creates the configured database file.
pub fn execute(pipeline_path: &Path) -> Result<()> {
    let file = PipelineFile::load(pipeline_path)
        .with_context(|| format!("Failed to load pipeline: {}", pipeline_path.display()))?;

    let store = if file.needs_store() {
        Some(Arc::new(SqliteStore::in_memory().context("Failed to open scratch store")?))
    } else {
        None
    };
    let registry = file.registry(store.as_ref())?;
    let graph = match file.pipeline.build(&registry) {
        Ok(graph) => graph,
        Err(err) => {
            if let Some(hint) = fix_hint(&err) {
                eprintln!("hint: {hint}");
            }
            return Err(anyhow::Error::new(err)
                .context(format!("Pipeline '{}' is invalid", file.pipeline.name)));
        }
    };

    println!("Pipeline structure: OK");
    println!("{:18} {}", "Name:", graph.name());
    println!("{:18} {}", "Schedule:", file.pipeline.schedule);
    println!("{:18} {}", "Stages:", graph.stage_count());
    println!("{:18} {}", "References:", file.references.len());
    println!("\nExecution order:");
    for (i, name) in graph.execution_order().iter().enumerate() {
        let deps = graph
            .stage(name)
            .map(|spec| spec.dependencies.join(", "))
            .unwrap_or_default();
        if deps.is_empty() {
            println!("  {:>2}. {name}", i + 1);
        } else {
            println!("  {:>2}. {name} <- {deps}", i + 1);
        }
    }
    Ok(())
}

fn fix_hint(err: &EtlflowError) -> Option<&str> {
    match err {
        EtlflowError::Validation(err) => err.error_info.as_ref()?.fix_hint.as_deref(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE: &str = r#"
        [engine]
        database = "Banks.db"

        [pipeline]
        name = "banks"

        [[pipeline.stage]]
        name = "query"
        action = "avg"

        [actions.avg]
        type = "sql_query"
        sql = "SELECT 1"
    "#;

    #[test]
    fn check_does_not_create_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("banks.toml");
        std::fs::write(&path, PIPELINE).unwrap();

        execute(&path).unwrap();
        assert!(!dir.path().join("Banks.db").exists());
    }

    #[test]
    fn check_rejects_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cycle.toml");
        std::fs::write(
            &path,
            r#"
            [pipeline]
            name = "cycle"
            [[pipeline.stage]]
            name = "a"
            action = "noop"
            depends_on = ["b"]
            [[pipeline.stage]]
            name = "b"
            action = "noop"
            depends_on = ["a"]
            [actions.noop]
            type = "noop"
            "#,
        )
        .unwrap();

        let err = execute(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Cycle detected"));

        let cause = err.downcast_ref::<EtlflowError>().unwrap();
        assert!(fix_hint(cause).unwrap().contains("cycle"));
    }
}

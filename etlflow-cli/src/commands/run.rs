use std::path::Path;

use anyhow::{Context, Result};

/// Execute the `run` command: load, validate and run a pipeline once.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let (file, runner) = super::load_runner(pipeline_path)?;

    tracing::info!(
        pipeline = %file.pipeline.name,
        stages = runner.graph().stage_count(),
        log_file = %file.engine.log_file_path().display(),
        "Pipeline validated"
    );

    let run = runner
        .run_once()
        .await
        .with_context(|| format!("Pipeline '{}' could not start", file.pipeline.name))?;

    print!("{}", run.report());
    if run.is_success() {
        Ok(())
    } else {
        anyhow::bail!(
            "Pipeline '{}' failed: {}",
            run.pipeline,
            run.failed_stages().join(", ")
        )
    }
}

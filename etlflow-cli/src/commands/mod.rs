pub mod check;
pub mod run;
pub mod schedule;

use std::path::Path;

use anyhow::{Context, Result};
use etlflow::config::PipelineFile;
use etlflow::runner::PipelineRunner;

/// Loads a pipeline file and builds its runner.
fn load_runner(pipeline_path: &Path) -> Result<(PipelineFile, PipelineRunner)> {
    let file = PipelineFile::load(pipeline_path)
        .with_context(|| format!("Failed to load pipeline: {}", pipeline_path.display()))?;
    let runner = PipelineRunner::from_file(&file)
        .with_context(|| format!("Failed to build pipeline '{}'", file.pipeline.name))?;
    Ok((file, runner))
}

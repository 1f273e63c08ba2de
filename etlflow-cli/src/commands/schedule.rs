use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

/// Execute the `schedule` command: run now, then on every schedule tick.
pub async fn execute(pipeline_path: &Path, max_runs: Option<usize>) -> Result<()> {
    let (file, runner) = super::load_runner(pipeline_path)?;

    println!(
        "Scheduling '{}' ({}){}",
        file.pipeline.name,
        runner.schedule(),
        max_runs.map_or_else(String::new, |n| format!(", at most {n} run(s)"))
    );

    let mut failed = 0usize;
    let runs = runner
        .run_scheduled(max_runs, |run| {
            println!("[{}]", run.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"));
            print!("{}", run.report());
            if !run.is_success() {
                failed += 1;
            }
        })
        .await
        .with_context(|| format!("Pipeline '{}' could not start", file.pipeline.name))?;

    println!("{runs} run(s), {failed} failed");
    if failed > 0 {
        anyhow::bail!("{failed} of {runs} run(s) failed");
    }
    Ok(())
}

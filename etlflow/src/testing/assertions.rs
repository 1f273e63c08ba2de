//! Test assertions for pipeline runs.

use crate::core::{RunStatus, StageStatus};
use crate::pipeline::PipelineRun;

/// Asserts that the run succeeded.
pub fn assert_run_succeeded(run: &PipelineRun) {
    assert!(
        run.is_success(),
        "Expected run to succeed, got {:?}\n{}",
        run.status,
        run.report()
    );
}

/// Asserts that the run failed.
pub fn assert_run_failed(run: &PipelineRun) {
    assert_eq!(
        run.status,
        RunStatus::Failed,
        "Expected run to fail\n{}",
        run.report()
    );
}

/// Asserts that a stage ended with the expected status.
pub fn assert_stage_status(run: &PipelineRun, stage: &str, expected: StageStatus) {
    let actual = run.stage_status(stage);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage '{stage}' to be {expected:?}, got {actual:?}"
    );
}

/// Asserts that `before` ended no later than `after` started.
pub fn assert_ran_before(run: &PipelineRun, before: &str, after: &str) {
    let ended = run.record(before).and_then(|r| r.ended_at);
    let started = run.record(after).and_then(|r| r.started_at);
    match (ended, started) {
        (Some(ended), Some(started)) => assert!(
            ended <= started,
            "Expected '{before}' (ended {ended}) to finish before '{after}' (started {started})"
        ),
        _ => panic!("Expected both '{before}' and '{after}' to have run"),
    }
}

/// Asserts that a stage produced exactly `rows` records.
pub fn assert_output_rows(run: &PipelineRun, stage: &str, rows: usize) {
    let actual = run.output(stage).map(|s| s.len());
    assert_eq!(
        actual,
        Some(rows),
        "Expected stage '{stage}' to emit {rows} record(s), got {actual:?}"
    );
}

//! Testing utilities for etlflow pipelines.
//!
//! This module provides:
//! - Fake actions with call counting and recording
//! - A scheduler harness with in-memory collectors
//! - Assertions over pipeline runs

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_output_rows, assert_ran_before, assert_run_failed, assert_run_succeeded,
    assert_stage_status,
};
pub use fixtures::{text_stream, TestHarness};
pub use mocks::{
    FailingAction, FlakyAction, MockAction, PanickingAction, RecordedCall, RecordingAction,
    SlowAction,
};

//! Fake actions for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::{ActionContext, StageInputs};
use crate::core::{RecordStream, StageKind};
use crate::errors::ActionError;
use crate::stages::{Action, ActionResult};
use crate::utils::{now_utc, Timestamp};

/// An action that counts calls and returns a configurable result.
#[derive(Debug)]
pub struct MockAction {
    result: Mutex<ActionResult>,
    kind: StageKind,
    call_count: AtomicUsize,
}

impl Default for MockAction {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAction {
    /// Creates a mock that succeeds without output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            result: Mutex::new(Ok(None)),
            kind: StageKind::Transform,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Creates a mock that emits a stream.
    #[must_use]
    pub fn returning(stream: RecordStream) -> Self {
        let mock = Self::new();
        mock.set_result(Ok(Some(stream)));
        mock
    }

    /// Sets the reported kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the result to return.
    pub fn set_result(&self, result: ActionResult) {
        *self.result.lock() = result;
    }

    /// Returns the number of times the action was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for MockAction {
    async fn execute(&self, _inputs: &StageInputs, _ctx: &ActionContext) -> ActionResult {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.result.lock().clone()
    }

    fn kind(&self) -> StageKind {
        self.kind
    }
}

/// An action that fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyAction {
    failures: usize,
    output: Option<RecordStream>,
    call_count: AtomicUsize,
}

impl FlakyAction {
    /// Fails the first `failures` calls.
    #[must_use]
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            output: None,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Emits `stream` once it succeeds.
    #[must_use]
    pub fn with_output(mut self, stream: RecordStream) -> Self {
        self.output = Some(stream);
        self
    }

    /// Returns the number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for FlakyAction {
    async fn execute(&self, _inputs: &StageInputs, _ctx: &ActionContext) -> ActionResult {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(ActionError::other(format!("transient failure {call}/{}", self.failures)))
        } else {
            Ok(self.output.clone())
        }
    }
}

/// An action that always fails.
#[derive(Debug)]
pub struct FailingAction {
    error: ActionError,
    call_count: AtomicUsize,
}

impl FailingAction {
    /// Fails with a generic error message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_error(ActionError::other(message))
    }

    /// Fails with a specific error.
    #[must_use]
    pub fn with_error(error: ActionError) -> Self {
        Self {
            error,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Returns the number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for FailingAction {
    async fn execute(&self, _inputs: &StageInputs, _ctx: &ActionContext) -> ActionResult {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A recorded invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Stage name from the context.
    pub stage: String,
    /// Attempt number.
    pub attempt: usize,
    /// Names of the provided input streams, sorted.
    pub inputs: Vec<String>,
    /// Row count of each provided input, in `inputs` order.
    pub input_rows: Vec<usize>,
    /// When the call started.
    pub started_at: Timestamp,
    /// When the call returned.
    pub ended_at: Timestamp,
}

/// An action that records every invocation.
#[derive(Debug)]
pub struct RecordingAction {
    output: Option<RecordStream>,
    delay: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for RecordingAction {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingAction {
    /// Creates a recorder that succeeds without output.
    #[must_use]
    pub fn new() -> Self {
        Self {
            output: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Emits `stream` on every call.
    #[must_use]
    pub fn with_output(mut self, stream: RecordStream) -> Self {
        self.output = Some(stream);
        self
    }

    /// Sleeps for `delay` inside every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns all recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Action for RecordingAction {
    async fn execute(&self, inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        let started_at = now_utc();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let names: Vec<String> = inputs.names().into_iter().map(String::from).collect();
        let input_rows = names
            .iter()
            .map(|n| inputs.get(n).ok().flatten().map_or(0, RecordStream::len))
            .collect();
        self.calls.lock().push(RecordedCall {
            stage: ctx.stage().to_string(),
            attempt: ctx.attempt(),
            inputs: names,
            input_rows,
            started_at,
            ended_at: now_utc(),
        });
        Ok(self.output.clone())
    }
}

/// An action that takes time to execute.
#[derive(Debug)]
pub struct SlowAction {
    delay: Duration,
}

impl SlowAction {
    /// Creates a new slow action.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Creates a slow action with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

#[async_trait]
impl Action for SlowAction {
    async fn execute(&self, _inputs: &StageInputs, _ctx: &ActionContext) -> ActionResult {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }
}

/// An action that panics.
#[derive(Debug)]
pub struct PanickingAction {
    message: String,
}

impl PanickingAction {
    /// Panics with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Action for PanickingAction {
    async fn execute(&self, _inputs: &StageInputs, _ctx: &ActionContext) -> ActionResult {
        std::panic::panic_any(self.message.clone())
    }
}

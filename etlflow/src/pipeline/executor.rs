//! Single-stage execution under a retry policy.

use super::StageSpec;
use crate::context::{ActionContext, RunContext, StageInputs};
use crate::core::{RecordStream, StageStatus};
use crate::errors::{ActionError, RetryExhaustedError};
use crate::events::{EventKind, NoOpNotifier, Notification, NotificationKind, Notifier};
use crate::progress::{LogEntry, LogEventKind, NoOpProgressLog, ProgressLog};
use crate::stages::ActionResult;
use crate::utils::{now_utc, Timestamp};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The terminal outcome of one stage's execution.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// `Succeeded` or `Failed`.
    pub status: StageStatus,
    /// Attempts made.
    pub attempts: usize,
    /// The output stream of the successful attempt, if any.
    pub output: Option<RecordStream>,
    /// The final error, when the stage failed.
    pub error: Option<RetryExhaustedError>,
    /// When the first attempt started.
    pub started_at: Timestamp,
    /// When the last attempt finished.
    pub ended_at: Timestamp,
}

impl StageOutcome {
    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Succeeded
    }
}

/// Runs one stage's action under its retry policy.
///
/// Every attempt writes a `started` entry followed by an `ended` or `failed`
/// entry to the progress log. Failed attempts wait the policy's delay before
/// the next attempt; the retry loop is sequential. A halted run gets no
/// further attempts.
#[derive(Debug, Clone)]
pub struct StageExecutor {
    progress: Arc<dyn ProgressLog>,
    notifier: Arc<dyn Notifier>,
    default_timeout: Option<Duration>,
}

impl Default for StageExecutor {
    fn default() -> Self {
        Self::new(Arc::new(NoOpProgressLog))
    }
}

impl StageExecutor {
    /// Creates an executor writing to the given progress log.
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressLog>) -> Self {
        Self {
            progress,
            notifier: Arc::new(NoOpNotifier),
            default_timeout: None,
        }
    }

    /// Sets the notification channel.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Sets the per-attempt timeout used by stages that declare none.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Returns the progress log.
    #[must_use]
    pub fn progress(&self) -> &Arc<dyn ProgressLog> {
        &self.progress
    }

    /// Returns the notifier.
    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Appends an entry, logging rather than propagating write failures.
    pub fn record(&self, entry: &LogEntry) {
        if let Err(e) = self.progress.record(entry) {
            warn!(error = %e, message = %entry.message, "failed to write progress log entry");
        }
    }

    /// Executes a stage until it succeeds or its attempts are exhausted.
    pub async fn execute(&self, spec: &StageSpec, inputs: &StageInputs, run: &RunContext) -> StageOutcome {
        let run_id = run.run_id();
        let max_attempts = spec.retry.max_attempts.max(1);
        let started_at = now_utc();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.record(&LogEntry::stage(
                run_id,
                &spec.name,
                LogEventKind::Started,
                format!("attempt {attempt}/{max_attempts}"),
            ));
            run.emit_stage_event(
                EventKind::StageStarted,
                &spec.name,
                serde_json::json!({ "attempt": attempt, "max_attempts": max_attempts }),
            );
            debug!(stage = %spec.name, attempt, "invoking action");

            let ctx = run.action_context(&spec.name, attempt);
            match self.invoke(spec, inputs, &ctx).await {
                Ok(output) => {
                    let rows = output.as_ref().map(RecordStream::len);
                    let detail = rows.map_or_else(String::new, |n| format!("{n} record(s)"));
                    self.record(&LogEntry::stage(run_id, &spec.name, LogEventKind::Ended, detail));
                    run.emit_stage_event(
                        EventKind::StageSucceeded,
                        &spec.name,
                        serde_json::json!({ "attempts": attempt, "rows": rows }),
                    );
                    info!(stage = %spec.name, attempts = attempt, rows, "stage succeeded");

                    return StageOutcome {
                        status: StageStatus::Succeeded,
                        attempts: attempt,
                        output,
                        error: None,
                        started_at,
                        ended_at: now_utc(),
                    };
                }
                Err(error) => {
                    self.record(&LogEntry::stage(
                        run_id,
                        &spec.name,
                        LogEventKind::Failed,
                        error.to_string(),
                    ));

                    if spec.retry.allows_retry_after(attempt) && !run.is_halted() {
                        let delay = spec.retry.delay_after(attempt);
                        warn!(
                            stage = %spec.name,
                            attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %error,
                            "stage attempt failed, retrying"
                        );
                        run.emit_stage_event(
                            EventKind::StageRetrying,
                            &spec.name,
                            serde_json::json!({
                                "attempt": attempt,
                                "error": error.to_string(),
                                "error_kind": error.kind(),
                            }),
                        );
                        if spec.notify_on_retry {
                            self.notify(NotificationKind::Retry, spec, run, attempt, &error).await;
                        }
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let exhausted = RetryExhaustedError::new(&spec.name, attempt, error);
                    warn!(stage = %spec.name, critical = spec.critical, error = %exhausted, "stage failed");
                    run.emit_stage_event(
                        EventKind::StageFailed,
                        &spec.name,
                        serde_json::json!({
                            "attempts": attempt,
                            "critical": spec.critical,
                            "error": exhausted.last_error.to_string(),
                            "error_kind": exhausted.last_error.kind(),
                        }),
                    );
                    if spec.critical {
                        self.notify(NotificationKind::Failure, spec, run, attempt, &exhausted.last_error)
                            .await;
                    }

                    return StageOutcome {
                        status: StageStatus::Failed,
                        attempts: attempt,
                        output: None,
                        error: Some(exhausted),
                        started_at,
                        ended_at: now_utc(),
                    };
                }
            }
        }
    }

    /// Runs one attempt, converting panics and timeouts into action errors.
    async fn invoke(&self, spec: &StageSpec, inputs: &StageInputs, ctx: &ActionContext) -> ActionResult {
        let attempt = AssertUnwindSafe(spec.action.execute(inputs, ctx)).catch_unwind();

        let caught = match spec.timeout.or(self.default_timeout) {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(caught) => caught,
                Err(_) => return Err(ActionError::Timeout(limit)),
            },
            None => attempt.await,
        };

        caught.unwrap_or_else(|payload| Err(ActionError::Panicked(panic_message(payload.as_ref()))))
    }

    async fn notify(
        &self,
        kind: NotificationKind,
        spec: &StageSpec,
        run: &RunContext,
        attempt: usize,
        cause: &ActionError,
    ) {
        let identity = run.identity();
        let notification = Notification {
            kind,
            owner: identity.owner.clone(),
            pipeline: identity.pipeline.clone(),
            run_id: identity.run_id,
            stage: spec.name.clone(),
            attempt,
            cause: cause.to_string(),
        };
        self.notifier.notify(&notification).await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunIdentity;
    use crate::events::{CollectingEventSink, CollectingNotifier};
    use crate::pipeline::RetryPolicy;
    use crate::progress::MemoryProgressLog;
    use crate::stages::{Action, FnAction, NoOpAction};
    use crate::testing::{FlakyAction, PanickingAction, SlowAction};

    struct Harness {
        log: Arc<MemoryProgressLog>,
        notifier: Arc<CollectingNotifier>,
        sink: Arc<CollectingEventSink>,
        executor: StageExecutor,
        run: RunContext,
    }

    fn harness() -> Harness {
        let log = Arc::new(MemoryProgressLog::new());
        let notifier = Arc::new(CollectingNotifier::new());
        let sink = Arc::new(CollectingEventSink::new());
        let executor = StageExecutor::new(log.clone()).with_notifier(notifier.clone());
        let run = RunContext::new(RunIdentity::new("toll", "data-team")).with_event_sink(sink.clone());
        Harness {
            log,
            notifier,
            sink,
            executor,
            run,
        }
    }

    fn spec(name: &str, action: Arc<dyn Action>) -> StageSpec {
        StageSpec::new(name, action)
    }

    #[tokio::test]
    async fn test_success_logs_start_and_end() {
        let h = harness();
        let outcome = h
            .executor
            .execute(&spec("s", Arc::new(NoOpAction)), &StageInputs::root("s"), &h.run)
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.output.is_none());
        assert_eq!(h.log.count("s", LogEventKind::Started), 1);
        assert_eq!(h.log.count("s", LogEventKind::Ended), 1);
        assert_eq!(h.sink.events_of_kind(EventKind::StageSucceeded).len(), 1);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let h = harness();
        let flaky = Arc::new(FlakyAction::new(2));
        let s = spec("flaky", flaky.clone())
            .with_retry(RetryPolicy::from_retries(2, Duration::from_millis(1)))
            .notify_on_retry();

        let outcome = h.executor.execute(&s, &StageInputs::root("flaky"), &h.run).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(flaky.call_count(), 3);
        assert_eq!(h.log.count("flaky", LogEventKind::Started), 3);
        assert_eq!(h.log.count("flaky", LogEventKind::Failed), 2);
        assert_eq!(h.log.count("flaky", LogEventKind::Ended), 1);
        assert_eq!(h.notifier.of_kind(NotificationKind::Retry).len(), 2);
        assert_eq!(h.sink.events_of_kind(EventKind::StageRetrying).len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_critical_failure_notifies_owner() {
        let h = harness();
        let s = spec("consolidate", Arc::new(FlakyAction::new(10)))
            .with_retry(RetryPolicy::from_retries(1, Duration::from_millis(1)))
            .critical();

        let outcome = h.executor.execute(&s, &StageInputs::root("consolidate"), &h.run).await;

        assert_eq!(outcome.status, StageStatus::Failed);
        assert_eq!(outcome.attempts, 2);
        let error = outcome.error.unwrap();
        assert_eq!(error.attempts, 2);

        let failures = h.notifier.of_kind(NotificationKind::Failure);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].owner, "data-team");
        assert_eq!(failures[0].stage, "consolidate");
        assert!(h.notifier.of_kind(NotificationKind::Retry).is_empty());
    }

    #[tokio::test]
    async fn test_halted_run_gets_no_retries() {
        let h = harness();
        let flaky = Arc::new(FlakyAction::new(2));
        let s = spec("extract", flaky.clone()).with_retry(RetryPolicy::from_retries(3, Duration::ZERO));
        h.run.halt();

        let outcome = h.executor.execute(&s, &StageInputs::root("extract"), &h.run).await;

        assert_eq!(outcome.status, StageStatus::Failed);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(flaky.call_count(), 1);
        assert_eq!(h.log.count("extract", LogEventKind::Failed), 1);
    }

    #[tokio::test]
    async fn test_non_critical_failure_does_not_notify() {
        let h = harness();
        let s = spec("optional", Arc::new(FlakyAction::new(1)));

        let outcome = h.executor.execute(&s, &StageInputs::root("optional"), &h.run).await;

        assert_eq!(outcome.status, StageStatus::Failed);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure_cause() {
        let h = harness();
        let s = spec("slow", Arc::new(SlowAction::new(Duration::from_secs(5))))
            .with_timeout(Duration::from_millis(10));

        let outcome = h.executor.execute(&s, &StageInputs::root("slow"), &h.run).await;

        assert_eq!(outcome.status, StageStatus::Failed);
        assert!(matches!(outcome.error.unwrap().last_error, ActionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_panic_is_classified() {
        let h = harness();
        let s = spec("boom", Arc::new(PanickingAction::new("kaboom")));

        let outcome = h.executor.execute(&s, &StageInputs::root("boom"), &h.run).await;

        match outcome.error.unwrap().last_error {
            ActionError::Panicked(msg) => assert_eq!(msg, "kaboom"),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(h.log.count("boom", LogEventKind::Failed), 1);
    }

    #[tokio::test]
    async fn test_empty_output_is_success() {
        let h = harness();
        let action = FnAction::new("empty", |_: &StageInputs, _: &ActionContext| {
            Ok(Some(RecordStream::empty()))
        });
        let outcome = h
            .executor
            .execute(&spec("empty", Arc::new(action)), &StageInputs::root("empty"), &h.run)
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.output.unwrap().len(), 0);
    }

    #[test]
    fn test_panic_message_payloads() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "non-string panic payload");
    }
}

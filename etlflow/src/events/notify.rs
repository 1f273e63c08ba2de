//! Failure notification channel.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

/// Why a notification was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A critical stage failed on its final attempt.
    Failure,
    /// A stage attempt failed and will be retried.
    Retry,
}

/// A message for the pipeline owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Why the notification was sent.
    pub kind: NotificationKind,
    /// Owner identity of the pipeline.
    pub owner: String,
    /// The pipeline name.
    pub pipeline: String,
    /// The run.
    pub run_id: Uuid,
    /// The stage that failed.
    pub stage: String,
    /// The failed attempt number (1-based).
    pub attempt: usize,
    /// Failure cause.
    pub cause: String,
}

/// Delivers notifications to an external channel (e-mail, chat, pager).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    /// Delivers one notification. Delivery problems are the notifier's to log.
    async fn notify(&self, notification: &Notification);
}

/// Discards notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn notify(&self, _notification: &Notification) {}
}

/// Writes notifications to the `tracing` log at `ERROR` (failures) or
/// `WARN` (retries).
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, n: &Notification) {
        match n.kind {
            NotificationKind::Failure => tracing::error!(
                owner = %n.owner,
                pipeline = %n.pipeline,
                run_id = %n.run_id,
                stage = %n.stage,
                attempt = n.attempt,
                cause = %n.cause,
                "critical stage failed"
            ),
            NotificationKind::Retry => tracing::warn!(
                owner = %n.owner,
                pipeline = %n.pipeline,
                run_id = %n.run_id,
                stage = %n.stage,
                attempt = n.attempt,
                cause = %n.cause,
                "stage attempt failed, retrying"
            ),
        }
    }
}

/// Keeps notifications in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every notification received.
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    /// Returns notifications of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.sent.lock().iter().filter(|n| n.kind == kind).cloned().collect()
    }
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(&self, notification: &Notification) {
        self.sent.lock().push(notification.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: NotificationKind) -> Notification {
        Notification {
            kind,
            owner: "data-team".to_string(),
            pipeline: "ETL_toll_data".to_string(),
            run_id: Uuid::nil(),
            stage: "consolidate_data".to_string(),
            attempt: 2,
            cause: "paste failed".to_string(),
        }
    }

    #[tokio::test]
    async fn test_collecting_notifier() {
        let notifier = CollectingNotifier::new();
        notifier.notify(&sample(NotificationKind::Retry)).await;
        notifier.notify(&sample(NotificationKind::Failure)).await;

        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(notifier.of_kind(NotificationKind::Failure)[0].owner, "data-team");
    }

    #[tokio::test]
    async fn test_logging_notifier_does_not_panic() {
        LoggingNotifier.notify(&sample(NotificationKind::Failure)).await;
        NoOpNotifier.notify(&sample(NotificationKind::Retry)).await;
    }

    #[tokio::test]
    async fn test_mock_notifier_expectation() {
        let mut mock = MockNotifier::new();
        mock.expect_notify()
            .withf(|n| n.kind == NotificationKind::Failure && n.stage == "consolidate_data")
            .times(1)
            .return_const(());

        mock.notify(&sample(NotificationKind::Failure)).await;
    }
}

//! Lifecycle events and failure notifications.
//!
//! Events are diagnostics for monitoring: the scheduler and executor emit one
//! for every run and stage transition. Notifications are the operator-facing
//! channel for final critical failures (and optionally retries); delivery
//! transport is up to the [`Notifier`] implementation.

mod notify;
mod sink;

pub use notify::{
    CollectingNotifier, LoggingNotifier, Notification, NotificationKind, Notifier, NoOpNotifier,
};
pub use sink::{CollectingEventSink, EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};

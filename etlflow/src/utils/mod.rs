//! Timestamp helpers shared by the progress log and run reports.

use chrono::{DateTime, Local, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// `strftime` pattern for progress log lines, e.g. `2024-Jan-05-14:03:59`.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%b-%d-%H:%M:%S";

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp for a progress log line in local time.
#[must_use]
pub fn log_timestamp(ts: &Timestamp) -> String {
    ts.with_timezone(&Local).format(LOG_TIMESTAMP_FORMAT).to_string()
}

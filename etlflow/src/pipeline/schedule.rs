//! Schedule expressions.

use crate::errors::ScheduleError;
use crate::utils::Timestamp;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

/// When a pipeline should be triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Schedule {
    /// Run a single time.
    #[default]
    Once,
    /// Run repeatedly at a fixed interval.
    Every(Duration),
}

#[allow(clippy::expect_used)]
static INTERVAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^every\s+(\d+)\s*([smhd])$").expect("valid interval regex"));

impl Schedule {
    /// Every hour.
    pub const HOURLY: Self = Self::Every(Duration::from_secs(3600));
    /// Every day.
    pub const DAILY: Self = Self::Every(Duration::from_secs(86_400));
    /// Every week.
    pub const WEEKLY: Self = Self::Every(Duration::from_secs(7 * 86_400));

    /// Parses a schedule expression.
    ///
    /// Accepts `@once`, `@hourly`, `@daily`, `@weekly` and
    /// `every <n><s|m|h|d>` (for example `every 30m`).
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError` for any other expression or a zero interval.
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let expr = expr.trim();
        match expr.to_ascii_lowercase().as_str() {
            "@once" => return Ok(Self::Once),
            "@hourly" => return Ok(Self::HOURLY),
            "@daily" => return Ok(Self::DAILY),
            "@weekly" => return Ok(Self::WEEKLY),
            _ => {}
        }

        let caps = INTERVAL_RE
            .captures(expr)
            .ok_or_else(|| ScheduleError(expr.to_string()))?;
        let n: u64 = caps[1].parse().map_err(|_| ScheduleError(expr.to_string()))?;
        let unit = match &caps[2] {
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            _ => 86_400,
        };
        let secs = n.checked_mul(unit).filter(|s| *s > 0).ok_or_else(|| ScheduleError(expr.to_string()))?;
        Ok(Self::Every(Duration::from_secs(secs)))
    }

    /// Returns the interval between runs, if the schedule repeats.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Once => None,
            Self::Every(d) => Some(*d),
        }
    }

    /// Returns the next trigger after `instant`, or `None` for one-shot schedules.
    #[must_use]
    pub fn next_after(&self, instant: Timestamp) -> Option<Timestamp> {
        let interval = chrono::Duration::from_std(self.interval()?).ok()?;
        instant.checked_add_signed(interval)
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Schedule {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Schedule> for String {
    fn from(schedule: Schedule) -> Self {
        schedule.to_string()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Once => write!(f, "@once"),
            s if s == Self::HOURLY => write!(f, "@hourly"),
            s if s == Self::DAILY => write!(f, "@daily"),
            s if s == Self::WEEKLY => write!(f, "@weekly"),
            Self::Every(d) => {
                let secs = d.as_secs();
                if secs % 86_400 == 0 {
                    write!(f, "every {}d", secs / 86_400)
                } else if secs % 3600 == 0 {
                    write!(f, "every {}h", secs / 3600)
                } else if secs % 60 == 0 {
                    write!(f, "every {}m", secs / 60)
                } else {
                    write!(f, "every {secs}s")
                }
            }
        }
    }
}

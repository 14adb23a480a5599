//! Look-back windows for filtering a snapshot for display.

use crate::source::Reading;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A relative look-back duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeWindow {
    #[default]
    #[serde(rename = "24h")]
    Last24h,
    #[serde(rename = "7d")]
    Last7d,
    #[serde(rename = "30d")]
    Last30d,
}

impl TimeWindow {
    /// Every selectable window, shortest first.
    pub const ALL: [TimeWindow; 3] = [TimeWindow::Last24h, TimeWindow::Last7d, TimeWindow::Last30d];

    /// Length of the window.
    pub fn duration(self) -> Duration {
        match self {
            TimeWindow::Last24h => Duration::hours(24),
            TimeWindow::Last7d => Duration::days(7),
            TimeWindow::Last30d => Duration::days(30),
        }
    }

    /// Earliest timestamp kept when the window ends at `now`.
    pub fn start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }

    /// Short label, also the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Last24h => "24h",
            TimeWindow::Last7d => "7d",
            TimeWindow::Last30d => "30d",
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "24h" | "1d" | "day" => Ok(TimeWindow::Last24h),
            "7d" | "week" => Ok(TimeWindow::Last7d),
            "30d" | "month" => Ok(TimeWindow::Last30d),
            other => Err(format!("unknown time window '{other}' (expected 24h, 7d or 30d)")),
        }
    }
}

/// Keep readings with `time >= now - window`, preserving source order.
///
/// The lower boundary is inclusive. Readings after `now` are kept.
pub fn filter_by_window(readings: &[Reading], window: TimeWindow, now: DateTime<Utc>) -> Vec<Reading> {
    let start = window.start(now);
    readings.iter().filter(|r| r.time >= start).copied().collect()
}

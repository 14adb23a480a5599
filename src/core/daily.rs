//! Calendar-day bucketing in the display timezone.

use crate::source::Reading;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Timezone used to decide which calendar day a reading belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Zone {
    /// The local timezone of the device running the monitor
    #[default]
    Local,
    /// A named IANA timezone
    Named(Tz),
}

impl Zone {
    /// Parse `local` or an IANA timezone name such as `Europe/Berlin`.
    pub fn parse(name: &str) -> Result<Self, String> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("local") {
            return Ok(Zone::Local);
        }
        name.parse::<Tz>()
            .map(Zone::Named)
            .map_err(|e| format!("unknown timezone '{name}': {e}"))
    }

    /// Wall-clock date and time of `time` in this zone.
    pub fn local_datetime(&self, time: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Zone::Local => time.with_timezone(&chrono::Local).naive_local(),
            Zone::Named(tz) => time.with_timezone(tz).naive_local(),
        }
    }

    /// Calendar date of `time` in this zone.
    pub fn date_of(&self, time: DateTime<Utc>) -> NaiveDate {
        self.local_datetime(time).date()
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Local => f.write_str("local"),
            Zone::Named(tz) => write!(f, "{}", tz.name()),
        }
    }
}

/// Mean level for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyAverage {
    pub day: NaiveDate,
    pub avg: f64,
    /// Number of readings on this day
    pub count: usize,
}

/// Group readings by calendar day in `zone` and average each group.
///
/// Output is sorted ascending by day with one entry per distinct day,
/// independent of input order. Empty input yields an empty result.
pub fn bucket_by_day(readings: &[Reading], zone: Zone) -> Vec<DailyAverage> {
    let mut buckets: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();

    for reading in readings {
        let entry = buckets.entry(zone.date_of(reading.time)).or_insert((0.0, 0));
        entry.0 += reading.level;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(day, (sum, count))| DailyAverage {
            day,
            avg: sum / count as f64,
            count,
        })
        .collect()
}

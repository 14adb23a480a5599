//! Per-point labels for charting a series.
//!
//! The date is emitted only when it changes from the previously emitted
//! label's date; otherwise only the time is emitted.

use crate::core::daily::Zone;
use crate::source::Reading;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Build one label per reading, in reading order.
pub fn format_labels(readings: &[Reading], zone: Zone) -> Vec<String> {
    let mut last_date = None;

    readings
        .iter()
        .map(|reading| {
            let local = zone.local_datetime(reading.time);
            let date = local.date();
            let time = local.format(TIME_FORMAT);

            if last_date != Some(date) {
                last_date = Some(date);
                format!("{} {}", date.format(DATE_FORMAT), time)
            } else {
                time.to_string()
            }
        })
        .collect()
}

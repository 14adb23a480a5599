//! Pure computation over snapshots.
//!
//! This module contains:
//! - Summary statistics over a whole snapshot
//! - Look-back window filtering
//! - Calendar-day averages in the display timezone
//! - Chart labels
//! - The threshold alert state machine

pub mod alert;
pub mod daily;
pub mod labels;
pub mod stats;
pub mod windowing;

// Re-export commonly used types
pub use alert::{AlertEvent, AlertMachine, AlertState, AlertTransition, DRUNK_THRESHOLD};
pub use daily::{bucket_by_day, DailyAverage, Zone};
pub use labels::format_labels;
pub use stats::{compute_stats, EmptyDataError, Stats};
pub use windowing::{filter_by_window, TimeWindow};

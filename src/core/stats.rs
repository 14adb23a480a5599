//! Summary statistics over a snapshot.

use crate::source::Reading;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use thiserror::Error;

/// Raised when statistics are requested for a snapshot with no readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no readings available")]
pub struct EmptyDataError;

/// Summary of all readings in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    /// Highest level
    pub max: f64,
    /// Lowest level
    pub min: f64,
    /// Arithmetic mean of all levels
    pub avg: f64,
    /// Level of the last reading in source order
    pub current: f64,
    /// Number of readings summarised
    pub count: usize,
}

/// Compute statistics over `readings`.
///
/// `current` is the level of the last element as delivered, not of the
/// reading with the greatest timestamp. Non-finite levels are left out of
/// `max`, `min` and `avg`; a snapshot with no finite level has no stats.
pub fn compute_stats(readings: &[Reading]) -> Result<Stats, EmptyDataError> {
    let last = readings.last().ok_or(EmptyDataError)?;
    let levels: Vec<f64> = readings
        .iter()
        .map(|r| r.level)
        .filter(|level| level.is_finite())
        .collect();
    if levels.is_empty() {
        return Err(EmptyDataError);
    }

    let min = Statistics::min(&levels);
    let max = Statistics::max(&levels);
    // Rounding in the mean must not escape [min, max].
    let avg = Statistics::mean(&levels).clamp(min, max);

    Ok(Stats {
        max,
        min,
        avg,
        current: last.level,
        count: readings.len(),
    })
}

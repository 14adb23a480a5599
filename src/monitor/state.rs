//! The monitor's single state record.
//!
//! All derived output (stats, filtered series, labels, daily averages) and
//! the alert machine live here and are only mutated through the apply
//! methods, one completed fetch at a time.

use crate::core::{
    bucket_by_day, compute_stats, filter_by_window, format_labels, AlertMachine, AlertState,
    AlertTransition, DailyAverage, Stats, TimeWindow, Zone,
};
use crate::source::{Reading, Snapshot, SourceError};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// The last fetch failure, as shown to presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchFailure {
    /// Sequence number of the failed fetch
    pub seq: u64,
    /// Error kind code
    pub code: &'static str,
    /// Error description
    pub message: String,
    /// When the failure was recorded
    pub at: DateTime<Utc>,
    #[serde(skip)]
    pub error: SourceError,
}

impl FetchFailure {
    fn new(seq: u64, error: SourceError, at: DateTime<Utc>) -> Self {
        Self {
            seq,
            code: error.code(),
            message: error.to_string(),
            at,
            error,
        }
    }
}

/// Everything presentation needs, computed from the latest applied snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorView {
    /// Statistics over the whole snapshot; absent when it held no readings
    pub stats: Option<Stats>,
    /// Selected look-back window
    pub window: TimeWindow,
    /// Readings inside the selected window, in source order
    pub series: Vec<Reading>,
    /// One chart label per entry in `series`
    pub labels: Vec<String>,
    /// Per-day averages over the whole snapshot
    pub daily: Vec<DailyAverage>,
    /// Current alert state
    pub alert: AlertState,
    /// Threshold in effect
    pub threshold: f64,
    /// Most recent fetch failure, cleared by the next applied snapshot
    pub last_error: Option<FetchFailure>,
    /// Sequence number of the last applied snapshot (0 before the first)
    pub seq: u64,
    /// When the view was last recomputed
    pub updated_at: Option<DateTime<Utc>>,
}

/// Internal state record behind the monitor lock.
#[derive(Debug)]
pub(crate) struct MonitorState {
    zone: Zone,
    windows: Vec<TimeWindow>,
    /// Latest snapshot, kept only so window changes can be recomputed
    snapshot: Option<Snapshot>,
    alert: AlertMachine,
    /// Highest sequence number whose snapshot has been applied
    last_seq: u64,
    view: MonitorView,
}

impl MonitorState {
    pub(crate) fn new(threshold: f64, windows: Vec<TimeWindow>, window: TimeWindow, zone: Zone) -> Self {
        Self {
            zone,
            windows,
            snapshot: None,
            alert: AlertMachine::new(threshold),
            last_seq: 0,
            view: MonitorView {
                stats: None,
                window,
                series: Vec::new(),
                labels: Vec::new(),
                daily: Vec::new(),
                alert: AlertState::Normal,
                threshold,
                last_error: None,
                seq: 0,
                updated_at: None,
            },
        }
    }

    pub(crate) fn view(&self) -> &MonitorView {
        &self.view
    }

    pub(crate) fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }

    /// Whether a snapshot with this sequence number is older than the applied one.
    pub(crate) fn is_stale(&self, seq: u64) -> bool {
        seq <= self.last_seq
    }

    /// Whether a failure with this sequence number is older than the applied
    /// snapshot or the failure already on record.
    pub(crate) fn is_stale_failure(&self, seq: u64) -> bool {
        self.is_stale(seq)
            || self
                .view
                .last_error
                .as_ref()
                .is_some_and(|failure| seq <= failure.seq)
    }

    /// Replace the snapshot, recompute every output, then feed the alert machine.
    ///
    /// An empty snapshot clears stats and series and leaves the alert state alone.
    /// A failure from a later-issued fetch stays on record.
    pub(crate) fn apply_snapshot(
        &mut self,
        seq: u64,
        snapshot: Snapshot,
        now: DateTime<Utc>,
    ) -> AlertTransition {
        self.last_seq = seq;

        self.view.stats = compute_stats(snapshot.readings()).ok();
        self.view.daily = bucket_by_day(snapshot.readings(), self.zone);
        self.snapshot = Some(snapshot);
        self.recompute_series(now);
        if self
            .view
            .last_error
            .as_ref()
            .is_some_and(|failure| failure.seq < seq)
        {
            self.view.last_error = None;
        }
        self.view.seq = seq;
        self.view.updated_at = Some(now);

        let transition = match self.view.stats {
            Some(stats) => self.alert.observe(stats.current),
            None => AlertTransition::Unchanged,
        };
        self.view.alert = self.alert.state();
        transition
    }

    /// Record a failed fetch without touching stats or alert state.
    ///
    /// Snapshots issued before the failure may still be applied afterwards.
    pub(crate) fn apply_failure(&mut self, seq: u64, error: SourceError, now: DateTime<Utc>) {
        self.view.last_error = Some(FetchFailure::new(seq, error, now));
    }

    /// Switch the selected window and refilter the current snapshot.
    pub(crate) fn select_window(&mut self, window: TimeWindow, now: DateTime<Utc>) -> bool {
        if !self.windows.contains(&window) {
            return false;
        }
        self.view.window = window;
        self.recompute_series(now);
        self.view.updated_at = Some(now);
        true
    }

    fn recompute_series(&mut self, now: DateTime<Utc>) {
        let series = match &self.snapshot {
            Some(snapshot) => filter_by_window(snapshot.readings(), self.view.window, now),
            None => Vec::new(),
        };
        self.view.labels = format_labels(&series, self.zone);
        self.view.series = series;
    }
}

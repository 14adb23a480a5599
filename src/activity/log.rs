//! Monitor activity counters.
//!
//! Tracks what the poll loop has done during this session: fetches issued
//! and applied, failures, results dropped by the recency guard, and alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity statistics for the current session.
#[derive(Debug)]
pub struct ActivityLog {
    /// Fetches issued (scheduled and manual)
    fetches_issued: AtomicU64,
    /// Snapshots applied to the monitor state
    snapshots_applied: AtomicU64,
    /// Applied snapshots that held no readings
    empty_snapshots: AtomicU64,
    /// Fetches that failed with a transport, status or parse error
    fetch_failures: AtomicU64,
    /// Completions dropped because a newer fetch had already been applied
    stale_dropped: AtomicU64,
    /// Completions dropped because the monitor was stopped after issuing them
    discarded_after_stop: AtomicU64,
    /// Alerts raised
    alerts_raised: AtomicU64,
    /// Alert deliveries that failed
    notify_failures: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            fetches_issued: AtomicU64::new(0),
            snapshots_applied: AtomicU64::new(0),
            empty_snapshots: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            stale_dropped: AtomicU64::new(0),
            discarded_after_stop: AtomicU64::new(0),
            alerts_raised: AtomicU64::new(0),
            notify_failures: AtomicU64::new(0),
            session_start: Utc::now(),
        }
    }

    pub fn record_fetch_issued(&self) {
        self.fetches_issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an applied snapshot; `empty` marks one with no readings.
    pub fn record_snapshot_applied(&self, empty: bool) {
        self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
        if empty {
            self.empty_snapshots.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_dropped(&self) {
        self.stale_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded_after_stop(&self) {
        self.discarded_after_stop.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_raised(&self) {
        self.alerts_raised.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notify_failure(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> ActivityStats {
        ActivityStats {
            fetches_issued: self.fetches_issued.load(Ordering::Relaxed),
            snapshots_applied: self.snapshots_applied.load(Ordering::Relaxed),
            empty_snapshots: self.empty_snapshots.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
            discarded_after_stop: self.discarded_after_stop.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            notify_failures: self.notify_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Fetches issued: {}\n\
             - Snapshots applied: {} ({} empty)\n\
             - Fetch failures: {}\n\
             - Stale results dropped: {}\n\
             - Results discarded after stop: {}\n\
             - Alerts raised: {}\n\
             - Notification failures: {}\n\
             - Session duration: {} seconds",
            stats.fetches_issued,
            stats.snapshots_applied,
            stats.empty_snapshots,
            stats.fetch_failures,
            stats.stale_dropped,
            stats.discarded_after_stop,
            stats.alerts_raised,
            stats.notify_failures,
            stats.session_duration_secs
        )
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of activity statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub fetches_issued: u64,
    pub snapshots_applied: u64,
    pub empty_snapshots: u64,
    pub fetch_failures: u64,
    pub stale_dropped: u64,
    pub discarded_after_stop: u64,
    pub alerts_raised: u64,
    pub notify_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Thread-safe shared activity log.
pub type SharedActivityLog = Arc<ActivityLog>;

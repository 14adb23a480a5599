//! The polling monitor.
//!
//! A [`Monitor`] fetches a snapshot immediately on [`start`](Monitor::start)
//! and then on a fixed-rate schedule. Each tick spawns its own fetch, so a
//! slow source can have several fetches outstanding at once. Completions are
//! applied under a single lock, guarded two ways:
//!
//! - **Recency**: every fetch takes a sequence number when it is issued. A
//!   completion older than the last applied one is dropped.
//! - **Epoch**: [`stop`](Monitor::stop) advances an epoch counter. A
//!   completion issued under an earlier epoch is discarded, even if its
//!   network call finishes after the stop.
//!
//! ```text
//!  tick ──► issue(seq, epoch) ──► fetch ──► lock ──► epoch ok? ──► newer? ──► apply
//!                                                     │             │
//!                                                     ▼             ▼
//!                                                 discarded       stale
//! ```

mod state;

pub use state::{FetchFailure, MonitorView};

use crate::activity::{ActivityLog, ActivityStats, SharedActivityLog};
use crate::config::{Config, ConfigError};
use crate::core::{AlertEvent, AlertState, AlertTransition, DailyAverage, Stats, TimeWindow};
use crate::notify::{self, Notifier, NotifyError};
use crate::source::{self, Reading, ReadingSource, Snapshot, SourceError};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use state::MonitorState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Capacity of the update broadcast channel.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Monitor errors.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("time window {0} is not selectable")]
    WindowUnavailable(TimeWindow),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// What happened to a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// The snapshot was applied
    Applied,
    /// The snapshot was applied but held no readings
    Empty,
    /// A newer fetch had already been applied
    Stale,
    /// The monitor was stopped after this fetch was issued
    Discarded,
}

/// Change notifications for presentation, in the order they were computed.
#[derive(Debug, Clone)]
pub enum MonitorUpdate {
    /// A snapshot was applied
    Refreshed(MonitorView),
    /// A fetch failed; previous output is unchanged
    FetchFailed { seq: u64, error: SourceError },
    /// The selected window changed
    WindowChanged(MonitorView),
    /// The level crossed the threshold
    AlertRaised(AlertEvent),
    /// The level dropped back below the threshold
    AlertCleared { level: f64 },
}

/// Identity of an issued fetch.
#[derive(Debug, Clone, Copy)]
struct Ticket {
    seq: u64,
    epoch: u64,
}

struct Shared {
    source: Arc<dyn ReadingSource>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    state: Mutex<MonitorState>,
    next_seq: AtomicU64,
    epoch: AtomicU64,
    updates: broadcast::Sender<MonitorUpdate>,
    activity: SharedActivityLog,
    /// Alert deliveries still in flight
    deliveries: Mutex<JoinSet<()>>,
}

impl Shared {
    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Issue a ticket for a fetch belonging to `epoch`.
    fn issue(&self, epoch: u64) -> Ticket {
        self.activity.record_fetch_issued();
        Ticket {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst) + 1,
            epoch,
        }
    }

    async fn fetch_and_apply(&self, ticket: Ticket) -> Result<RefreshOutcome, SourceError> {
        tracing::debug!(seq = ticket.seq, source = self.source.description(), "fetching snapshot");
        let result = self.source.fetch_snapshot().await;
        self.complete(ticket, result)
    }

    fn complete(
        &self,
        ticket: Ticket,
        result: Result<Snapshot, SourceError>,
    ) -> Result<RefreshOutcome, SourceError> {
        let (outcome, raised) = {
            let mut state = self.state.lock();

            if ticket.epoch != self.epoch.load(Ordering::SeqCst) {
                tracing::debug!(seq = ticket.seq, "discarding result issued before stop");
                self.activity.record_discarded_after_stop();
                return result.map(|_| RefreshOutcome::Discarded);
            }

            let stale = match &result {
                Ok(_) => state.is_stale(ticket.seq),
                Err(_) => state.is_stale_failure(ticket.seq),
            };
            if stale {
                tracing::warn!(seq = ticket.seq, "dropping stale result; a newer fetch was applied");
                self.activity.record_stale_dropped();
                return result.map(|_| RefreshOutcome::Stale);
            }

            let snapshot = match result {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    tracing::warn!(seq = ticket.seq, "fetch failed: {}", error);
                    self.activity.record_fetch_failure();
                    state.apply_failure(ticket.seq, error.clone(), Utc::now());
                    let _ = self.updates.send(MonitorUpdate::FetchFailed {
                        seq: ticket.seq,
                        error: error.clone(),
                    });
                    return Err(error);
                }
            };

            let outcome = if snapshot.is_empty() {
                RefreshOutcome::Empty
            } else {
                RefreshOutcome::Applied
            };
            let transition = state.apply_snapshot(ticket.seq, snapshot, Utc::now());
            self.activity
                .record_snapshot_applied(outcome == RefreshOutcome::Empty);

            let view = state.view();
            match &view.stats {
                Some(stats) => tracing::debug!(
                    seq = ticket.seq,
                    readings = stats.count,
                    current = stats.current,
                    "snapshot applied"
                ),
                None => tracing::debug!(seq = ticket.seq, "snapshot applied with no readings"),
            }
            let _ = self.updates.send(MonitorUpdate::Refreshed(view.clone()));

            let raised = match transition {
                AlertTransition::Raised(event) => {
                    tracing::info!(
                        current_level = event.level,
                        threshold = event.threshold,
                        "alert raised"
                    );
                    self.activity.record_alert_raised();
                    let _ = self.updates.send(MonitorUpdate::AlertRaised(event.clone()));
                    Some(event)
                }
                AlertTransition::Cleared => {
                    let level = view.stats.map(|s| s.current).unwrap_or_default();
                    tracing::info!(current_level = level, "alert cleared");
                    let _ = self.updates.send(MonitorUpdate::AlertCleared { level });
                    None
                }
                AlertTransition::Unchanged => None,
            };

            (outcome, raised)
        };

        if let Some(event) = raised {
            self.dispatch(event);
        }
        Ok(outcome)
    }

    /// Hand an alert to the notifier without waiting for delivery.
    fn dispatch(&self, event: AlertEvent) {
        let notifier = self.notifier.clone();
        let activity = self.activity.clone();
        let mut deliveries = self.deliveries.lock();
        // Reap finished deliveries so the set does not grow over a long session.
        while deliveries.try_join_next().is_some() {}
        deliveries.spawn(async move {
            if let Err(e) = notifier.notify(&event).await {
                tracing::warn!(notifier = notifier.name(), "alert delivery failed: {}", e);
                activity.record_notify_failure();
            }
        });
    }
}

struct Ticker {
    shutdown_tx: watch::Sender<bool>,
}

/// Periodic fetch-and-refresh engine with presentation accessors.
pub struct Monitor {
    shared: Arc<Shared>,
    ticker: Mutex<Option<Ticker>>,
}

impl Monitor {
    /// Create a monitor over the given source and notifier.
    pub fn new(
        config: &Config,
        source: Arc<dyn ReadingSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let zone = config.zone()?;
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Ok(Self {
            shared: Arc::new(Shared {
                source,
                notifier,
                poll_interval: config.poll_interval,
                state: Mutex::new(MonitorState::new(
                    config.threshold,
                    config.windows.clone(),
                    config.default_window,
                    zone,
                )),
                next_seq: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                updates,
                activity: Arc::new(ActivityLog::new()),
                deliveries: Mutex::new(JoinSet::new()),
            }),
            ticker: Mutex::new(None),
        })
    }

    /// Create a monitor with the source and notifier described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, MonitorError> {
        let source = source::from_config(&config.source)?;
        let notifier = notify::from_config(&config.notifier)?;
        Self::new(config, source, notifier)
    }

    /// Start polling: fetch now, then every poll interval.
    ///
    /// Must be called from within a tokio runtime. Calling it while already
    /// running does nothing.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            tracing::debug!("monitor already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let shared = self.shared.clone();
        // Every scheduled fetch belongs to the epoch this schedule started in.
        let epoch = shared.current_epoch();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(shared.poll_interval);
            // Fixed-rate: ticks follow the wall clock, not fetch completion.
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let ticket = shared.issue(epoch);
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            let _ = shared.fetch_and_apply(ticket).await;
                        });
                    }
                }
            }
            tracing::debug!("poll schedule stopped");
        });

        tracing::info!(
            source = self.shared.source.description(),
            interval_ms = self.shared.poll_interval.as_millis() as u64,
            "monitor started"
        );
        *ticker = Some(Ticker { shutdown_tx });
    }

    /// Stop polling.
    ///
    /// Cancels future ticks and discards the results of every fetch issued
    /// before this call, including ones still in flight.
    pub fn stop(&self) {
        let ticker = self.ticker.lock().take();

        {
            let _state = self.shared.state.lock();
            self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        }

        if let Some(ticker) = ticker {
            let _ = ticker.shutdown_tx.send(true);
            tracing::info!("monitor stopped");
        }
    }

    /// Whether the poll schedule is running.
    pub fn is_running(&self) -> bool {
        self.ticker.lock().is_some()
    }

    /// Fetch once outside the schedule and wait for the result to be applied.
    ///
    /// Does not reset the schedule. Fetch failures are returned as well as
    /// recorded as the last error.
    pub async fn manual_refresh(&self) -> Result<RefreshOutcome, SourceError> {
        let ticket = self.shared.issue(self.shared.current_epoch());
        self.shared.fetch_and_apply(ticket).await
    }

    /// Wait for every alert delivery dispatched so far to finish.
    pub async fn flush_notifications(&self) {
        let mut deliveries = std::mem::take(&mut *self.shared.deliveries.lock());
        while let Some(joined) = deliveries.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("alert delivery task failed: {}", e);
            }
        }
    }

    /// Change the selected window and refilter the current snapshot.
    pub fn select_window(&self, window: TimeWindow) -> Result<MonitorView, MonitorError> {
        let mut state = self.shared.state.lock();
        if !state.select_window(window, Utc::now()) {
            return Err(MonitorError::WindowUnavailable(window));
        }
        let view = state.view().clone();
        let _ = self.shared.updates.send(MonitorUpdate::WindowChanged(view.clone()));
        Ok(view)
    }

    /// Subscribe to updates computed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorUpdate> {
        self.shared.updates.subscribe()
    }

    /// Everything presentation needs in one consistent copy.
    pub fn view(&self) -> MonitorView {
        self.shared.state.lock().view().clone()
    }

    pub fn stats(&self) -> Option<Stats> {
        self.shared.state.lock().view().stats
    }

    pub fn series(&self) -> Vec<Reading> {
        self.shared.state.lock().view().series.clone()
    }

    pub fn daily(&self) -> Vec<DailyAverage> {
        self.shared.state.lock().view().daily.clone()
    }

    pub fn alert_state(&self) -> AlertState {
        self.shared.state.lock().view().alert
    }

    pub fn last_error(&self) -> Option<FetchFailure> {
        self.shared.state.lock().view().last_error.clone()
    }

    pub fn selected_window(&self) -> TimeWindow {
        self.shared.state.lock().view().window
    }

    /// Windows that may be selected.
    pub fn windows(&self) -> Vec<TimeWindow> {
        self.shared.state.lock().windows().to_vec()
    }

    /// Activity counters for this session.
    pub fn activity(&self) -> ActivityStats {
        self.shared.activity.stats()
    }

    /// Printable activity summary.
    pub fn activity_summary(&self) -> String {
        self.shared.activity.summary()
    }

    /// Description of the reading source.
    pub fn source_description(&self) -> &str {
        self.shared.source.description()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            let _ = ticker.shutdown_tx.send(true);
        }
    }
}

//! Integration tests for the polling monitor

use async_trait::async_trait;
use biosensor_monitor::monitor::{Monitor, MonitorError, MonitorUpdate, RefreshOutcome};
use biosensor_monitor::notify::{Notifier, NotifyError};
use biosensor_monitor::source::{Reading, ReadingSource, Snapshot, SourceError};
use biosensor_monitor::{AlertEvent, AlertState, Config, TimeWindow};
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scripted fetch: wait, then return the result.
#[derive(Debug)]
struct Step {
    delay: Duration,
    result: Result<Vec<Reading>, SourceError>,
}

/// Source that replays a script, then repeats a low reading forever.
#[derive(Debug, Default)]
struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Self::new(vec![Step {
            delay,
            result: Ok(readings(&[0.2])),
        }])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadingSource for ScriptedSource {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().pop_front().unwrap_or(Step {
            delay: Duration::ZERO,
            result: Ok(readings(&[0.01])),
        });
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.result.map(Snapshot::new)
    }

    fn description(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Default)]
struct CountingNotifier {
    events: Mutex<Vec<AlertEvent>>,
    fail: bool,
    delay: Duration,
}

impl CountingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn count(&self) -> usize {
        self.events.lock().len()
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.events.lock().push(event.clone());
        if self.fail {
            return Err(NotifyError::Network("unreachable".into()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Readings one minute apart ending one minute ago, in the given order.
fn readings(levels: &[f64]) -> Vec<Reading> {
    let now = Utc::now();
    let n = levels.len() as i64;
    levels
        .iter()
        .enumerate()
        .map(|(i, &level)| Reading::new(now - ChronoDuration::minutes(n - i as i64), level))
        .collect()
}

fn ok(levels: &[f64]) -> Step {
    Step {
        delay: Duration::ZERO,
        result: Ok(readings(levels)),
    }
}

fn config(interval_ms: u64) -> Config {
    Config {
        poll_interval: Duration::from_millis(interval_ms),
        timezone: Some("UTC".to_string()),
        ..Config::default()
    }
}

fn monitor(
    config: &Config,
    source: &Arc<ScriptedSource>,
    notifier: &Arc<CountingNotifier>,
) -> Monitor {
    Monitor::new(config, source.clone(), notifier.clone()).expect("valid config")
}

/// Let detached notification tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_alert_raised_once_per_crossing() {
    let source = ScriptedSource::new(vec![
        ok(&[0.01, 0.05]),
        ok(&[0.05, 0.09]),
        ok(&[0.09, 0.09]),
        ok(&[0.09, 0.07]),
        ok(&[0.07, 0.09]),
    ]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);

    let mut states = Vec::new();
    for _ in 0..5 {
        let outcome = monitor.manual_refresh().await.expect("refresh succeeds");
        assert_eq!(outcome, RefreshOutcome::Applied);
        states.push(monitor.alert_state());
    }
    settle().await;

    assert_eq!(
        states,
        vec![
            AlertState::Normal,
            AlertState::Alerting,
            AlertState::Alerting,
            AlertState::Normal,
            AlertState::Alerting,
        ]
    );
    assert_eq!(notifier.count(), 2);
    let levels: Vec<f64> = notifier.events.lock().iter().map(|e| e.level).collect();
    assert_eq!(levels, vec![0.09, 0.09]);
    assert_eq!(monitor.activity().alerts_raised, 2);
}

#[tokio::test(start_paused = true)]
async fn test_threshold_is_inclusive() {
    let source = ScriptedSource::new(vec![ok(&[0.08])]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);

    monitor.manual_refresh().await.expect("refresh succeeds");
    settle().await;

    assert_eq!(monitor.alert_state(), AlertState::Alerting);
    assert_eq!(notifier.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stats_use_last_reading_in_source_order() {
    let now = Utc::now();
    // Out of timestamp order: the newest reading is first
    let source = ScriptedSource::new(vec![Step {
        delay: Duration::ZERO,
        result: Ok(vec![
            Reading::new(now - ChronoDuration::minutes(1), 0.12),
            Reading::new(now - ChronoDuration::minutes(30), 0.02),
        ]),
    }]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);

    monitor.manual_refresh().await.expect("refresh succeeds");
    let stats = monitor.stats().expect("stats present");
    assert_eq!(stats.current, 0.02);
    assert_eq!(stats.max, 0.12);
    assert_eq!(stats.min, 0.02);
    assert!((stats.avg - 0.07).abs() < 1e-9);
    assert_eq!(monitor.alert_state(), AlertState::Normal);
}

#[tokio::test(start_paused = true)]
async fn test_stop_right_after_start_fetches_nothing() {
    let source = ScriptedSource::new(vec![]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(1000), &source, &notifier);

    monitor.start();
    monitor.stop();
    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert_eq!(source.calls(), 0);
    assert_eq!(monitor.activity().fetches_issued, 0);
    assert!(!monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_fetches_follow_interval() {
    let source = ScriptedSource::new(vec![]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(1000), &source, &notifier);

    monitor.start();
    // Immediate fetch, then at 1000ms and 2000ms
    tokio::time::sleep(Duration::from_millis(2500)).await;
    monitor.stop();

    assert_eq!(source.calls(), 3);
    assert_eq!(monitor.activity().snapshots_applied, 3);
    assert_eq!(monitor.view().seq, 3);

    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(source.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_fetches_overlap() {
    // Each fetch takes longer than the interval
    let source = ScriptedSource::new(
        (0..4)
            .map(|_| Step {
                delay: Duration::from_millis(2500),
                result: Ok(readings(&[0.01])),
            })
            .collect(),
    );
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(1000), &source, &notifier);

    monitor.start();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    // Three ticks issued while none has completed
    assert_eq!(source.calls(), 3);
    assert!(monitor.stats().is_none());
    monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let source = ScriptedSource::new(vec![]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(1000), &source, &notifier);

    monitor.start();
    monitor.start();
    assert!(monitor.is_running());
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(source.calls(), 1);

    monitor.stop();
    assert!(!monitor.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let source = ScriptedSource::new(vec![]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(1000), &source, &notifier);

    monitor.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    monitor.stop();
    monitor.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    monitor.stop();

    assert_eq!(source.calls(), 2);
    assert_eq!(monitor.activity().snapshots_applied, 2);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_completion_keeps_newest() {
    let source = ScriptedSource::new(vec![
        Step {
            delay: Duration::from_millis(500),
            result: Ok(readings(&[0.03])),
        },
        Step {
            delay: Duration::from_millis(10),
            result: Ok(readings(&[0.06])),
        },
    ]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);

    let (first, second) = tokio::join!(monitor.manual_refresh(), monitor.manual_refresh());

    assert_eq!(first, Ok(RefreshOutcome::Stale));
    assert_eq!(second, Ok(RefreshOutcome::Applied));
    assert_eq!(monitor.stats().expect("stats present").current, 0.06);
    assert_eq!(monitor.view().seq, 2);
    assert_eq!(monitor.activity().stale_dropped, 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_failure_does_not_override_newer_success() {
    let source = ScriptedSource::new(vec![
        Step {
            delay: Duration::from_millis(500),
            result: Err(SourceError::Fetch("timed out".into())),
        },
        ok(&[0.04]),
    ]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);

    let (first, second) = tokio::join!(monitor.manual_refresh(), monitor.manual_refresh());

    assert!(first.is_err());
    assert_eq!(second, Ok(RefreshOutcome::Applied));
    assert!(monitor.last_error().is_none());
    assert_eq!(monitor.stats().expect("stats present").current, 0.04);
}

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_previous_output() {
    let source = ScriptedSource::new(vec![
        ok(&[0.02, 0.10]),
        Step {
            delay: Duration::ZERO,
            result: Err(SourceError::Status {
                status: 503,
                message: "unavailable".into(),
            }),
        },
        ok(&[0.01]),
    ]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);

    monitor.manual_refresh().await.expect("first refresh succeeds");
    let before = monitor.view();

    let err = monitor.manual_refresh().await.unwrap_err();
    assert_eq!(err.code(), "STATUS_ERROR");

    let after = monitor.view();
    assert_eq!(after.stats, before.stats);
    assert_eq!(after.series, before.series);
    assert_eq!(after.daily, before.daily);
    assert_eq!(after.alert, AlertState::Alerting);
    let failure = after.last_error.expect("failure recorded");
    assert_eq!(failure.seq, 2);
    assert_eq!(failure.code, "STATUS_ERROR");

    monitor.manual_refresh().await.expect("third refresh succeeds");
    assert!(monitor.last_error().is_none());
    assert_eq!(monitor.alert_state(), AlertState::Normal);
    assert_eq!(monitor.activity().fetch_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_fetch_discarded_after_stop() {
    let source = ScriptedSource::slow(Duration::from_millis(500));
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);

    monitor.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.calls(), 1);

    monitor.stop();
    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert!(monitor.stats().is_none());
    assert_eq!(monitor.alert_state(), AlertState::Normal);
    assert_eq!(notifier.count(), 0);
    let activity = monitor.activity();
    assert_eq!(activity.discarded_after_stop, 1);
    assert_eq!(activity.snapshots_applied, 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_while_stopped_is_applied() {
    let source = ScriptedSource::new(vec![ok(&[0.03])]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);

    monitor.start();
    monitor.stop();

    assert_eq!(monitor.manual_refresh().await, Ok(RefreshOutcome::Applied));
    assert_eq!(monitor.stats().expect("stats present").current, 0.03);
}

#[tokio::test(start_paused = true)]
async fn test_empty_snapshot_clears_stats_and_keeps_alert() {
    let source = ScriptedSource::new(vec![ok(&[0.2]), ok(&[])]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);

    monitor.manual_refresh().await.expect("refresh succeeds");
    assert_eq!(monitor.manual_refresh().await, Ok(RefreshOutcome::Empty));
    settle().await;

    assert!(monitor.stats().is_none());
    assert!(monitor.series().is_empty());
    assert!(monitor.daily().is_empty());
    assert_eq!(monitor.alert_state(), AlertState::Alerting);
    assert_eq!(notifier.count(), 1);
    assert_eq!(monitor.activity().empty_snapshots, 1);
}

#[tokio::test(start_paused = true)]
async fn test_select_window() {
    let now = Utc::now();
    let source = ScriptedSource::new(vec![Step {
        delay: Duration::ZERO,
        result: Ok(vec![
            Reading::new(now - ChronoDuration::days(20), 0.01),
            Reading::new(now - ChronoDuration::days(3), 0.02),
            Reading::new(now - ChronoDuration::hours(1), 0.03),
        ]),
    }]);
    let notifier = Arc::new(CountingNotifier::default());
    let config = Config {
        windows: vec![TimeWindow::Last24h, TimeWindow::Last7d],
        ..config(5000)
    };
    let monitor = monitor(&config, &source, &notifier);

    monitor.manual_refresh().await.expect("refresh succeeds");
    assert_eq!(monitor.selected_window(), TimeWindow::Last24h);
    assert_eq!(monitor.series().len(), 1);

    let view = monitor.select_window(TimeWindow::Last7d).expect("7d selectable");
    assert_eq!(view.series.len(), 2);
    assert_eq!(view.labels.len(), 2);
    // Stats and daily averages are over the whole snapshot
    assert_eq!(view.stats.expect("stats present").count, 3);
    assert_eq!(view.daily.len(), 3);

    let err = monitor.select_window(TimeWindow::Last30d).unwrap_err();
    assert!(matches!(err, MonitorError::WindowUnavailable(TimeWindow::Last30d)));
    assert_eq!(monitor.selected_window(), TimeWindow::Last7d);
    assert_eq!(monitor.windows(), vec![TimeWindow::Last24h, TimeWindow::Last7d]);
}

#[tokio::test(start_paused = true)]
async fn test_updates_arrive_in_order() {
    let source = ScriptedSource::new(vec![
        ok(&[0.09]),
        ok(&[0.01]),
        Step {
            delay: Duration::ZERO,
            result: Err(SourceError::Parse("bad json".into())),
        },
    ]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);
    let mut updates = monitor.subscribe();

    monitor.manual_refresh().await.expect("refresh succeeds");
    monitor.manual_refresh().await.expect("refresh succeeds");
    monitor.manual_refresh().await.unwrap_err();
    monitor.select_window(TimeWindow::Last7d).expect("7d selectable");

    match updates.recv().await.expect("update") {
        MonitorUpdate::Refreshed(view) => assert_eq!(view.seq, 1),
        other => panic!("unexpected update: {other:?}"),
    }
    match updates.recv().await.expect("update") {
        MonitorUpdate::AlertRaised(event) => assert_eq!(event.level, 0.09),
        other => panic!("unexpected update: {other:?}"),
    }
    match updates.recv().await.expect("update") {
        MonitorUpdate::Refreshed(view) => assert_eq!(view.seq, 2),
        other => panic!("unexpected update: {other:?}"),
    }
    match updates.recv().await.expect("update") {
        MonitorUpdate::AlertCleared { level } => assert_eq!(level, 0.01),
        other => panic!("unexpected update: {other:?}"),
    }
    match updates.recv().await.expect("update") {
        MonitorUpdate::FetchFailed { seq, error } => {
            assert_eq!(seq, 3);
            assert_eq!(error.code(), "PARSE_ERROR");
        }
        other => panic!("unexpected update: {other:?}"),
    }
    match updates.recv().await.expect("update") {
        MonitorUpdate::WindowChanged(view) => assert_eq!(view.window, TimeWindow::Last7d),
        other => panic!("unexpected update: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_notifier_failure_is_counted() {
    let source = ScriptedSource::new(vec![ok(&[0.3])]);
    let notifier = Arc::new(CountingNotifier::failing());
    let monitor = monitor(&config(5000), &source, &notifier);

    assert_eq!(monitor.manual_refresh().await, Ok(RefreshOutcome::Applied));
    settle().await;

    assert_eq!(notifier.count(), 1);
    assert_eq!(monitor.alert_state(), AlertState::Alerting);
    assert_eq!(monitor.activity().notify_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_keeps_schedule() {
    let source = ScriptedSource::new(vec![]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(1000), &source, &notifier);

    monitor.start();
    tokio::time::sleep(Duration::from_millis(500)).await;
    monitor.manual_refresh().await.expect("refresh succeeds");
    assert_eq!(source.calls(), 2);

    // Scheduled fetches still land at 1000ms and 2000ms
    tokio::time::sleep(Duration::from_millis(490)).await;
    assert_eq!(source.calls(), 2);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(source.calls(), 3);
    tokio::time::sleep(Duration::from_millis(1090)).await;
    assert_eq!(source.calls(), 4);
    monitor.stop();

    assert_eq!(monitor.view().seq, 4);
}

#[tokio::test(start_paused = true)]
async fn test_older_success_applied_after_newer_failure() {
    let source = ScriptedSource::new(vec![
        Step {
            delay: Duration::from_millis(500),
            result: Ok(readings(&[0.05])),
        },
        Step {
            delay: Duration::from_millis(10),
            result: Err(SourceError::Fetch("connection reset".into())),
        },
    ]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);

    let (first, second) = tokio::join!(monitor.manual_refresh(), monitor.manual_refresh());

    assert_eq!(first, Ok(RefreshOutcome::Applied));
    assert!(second.is_err());
    assert_eq!(monitor.stats().expect("stats present").current, 0.05);
    // The failure was issued later, so it stays on record.
    assert_eq!(monitor.last_error().expect("failure recorded").seq, 2);
    assert_eq!(monitor.activity().stale_dropped, 0);
}

#[tokio::test(start_paused = true)]
async fn test_non_finite_level_does_not_abort_refresh() {
    let now = Utc::now();
    let source = ScriptedSource::new(vec![Step {
        delay: Duration::ZERO,
        result: Ok(vec![
            Reading::new(now - ChronoDuration::minutes(2), 0.05),
            Reading::new(now - ChronoDuration::minutes(1), f64::NAN),
        ]),
    }]);
    let notifier = Arc::new(CountingNotifier::default());
    let monitor = monitor(&config(5000), &source, &notifier);

    assert_eq!(monitor.manual_refresh().await, Ok(RefreshOutcome::Applied));
    let stats = monitor.stats().expect("stats present");
    assert_eq!(stats.max, 0.05);
    assert_eq!(stats.min, 0.05);
    assert!(stats.current.is_nan());
    assert_eq!(monitor.alert_state(), AlertState::Normal);
}

#[tokio::test(start_paused = true)]
async fn test_flush_waits_for_pending_deliveries() {
    let source = ScriptedSource::new(vec![ok(&[0.2])]);
    let notifier = Arc::new(CountingNotifier::slow(Duration::from_secs(3)));
    let monitor = monitor(&config(5000), &source, &notifier);

    monitor.manual_refresh().await.expect("refresh succeeds");
    assert_eq!(notifier.count(), 0);

    monitor.flush_notifications().await;
    assert_eq!(notifier.count(), 1);

    // Nothing left to wait for
    monitor.flush_notifications().await;
    assert_eq!(notifier.count(), 1);
}

#[test]
fn test_invalid_config_rejected() {
    let source = ScriptedSource::new(vec![]);
    let notifier = Arc::new(CountingNotifier::default());
    let config = Config {
        poll_interval: Duration::ZERO,
        ..Config::default()
    };
    let result = Monitor::new(&config, source, notifier);
    assert!(matches!(result, Err(MonitorError::Config(_))));
}

//! Biosensor Monitor - polling, aggregation and alerting for breath-alcohol readings.
//!
//! A recorder publishes a JSON document of timestamped alcohol-concentration
//! readings. This library polls that document, derives summary statistics,
//! a window-filtered series and per-day averages, and raises a single alert
//! each time the latest level crosses the threshold.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Biosensor Monitor                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Source    │──▶│   Monitor   │──▶│    Core     │       │
//! │  │ (http/file) │   │ (5s poller) │   │ (stats/days)│       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                           │                  │              │
//! │                           ▼                  ▼              │
//! │                    ┌─────────────┐   ┌─────────────┐       │
//! │                    │  Activity   │   │    Alert    │──▶ Notifier
//! │                    │    Log      │   │   Machine   │       │
//! │                    └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use biosensor_monitor::{Config, Monitor};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let monitor = Monitor::from_config(&config)?;
//!
//! // Fetch now and every poll interval after that
//! monitor.start();
//!
//! let mut updates = monitor.subscribe();
//! while let Ok(update) = updates.recv().await {
//!     println!("{update:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod config;
pub mod core;
pub mod monitor;
pub mod notify;
pub mod source;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use activity::{ActivityLog, ActivityStats};
pub use config::{Config, ConfigError, NotifierConfig, SourceConfig};
pub use core::{
    bucket_by_day, compute_stats, filter_by_window, format_labels, AlertEvent, AlertMachine,
    AlertState, DailyAverage, EmptyDataError, Stats, TimeWindow, Zone, DRUNK_THRESHOLD,
};
pub use monitor::{FetchFailure, Monitor, MonitorError, MonitorUpdate, MonitorView, RefreshOutcome};
pub use notify::{LogNotifier, Notifier, NotifyError, WebhookNotifier};
pub use source::{FileSource, HttpSource, Reading, ReadingSource, Snapshot, SourceError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notice shown by the CLI before monitoring starts.
pub const SAFETY_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║               BIOSENSOR MONITOR - SAFETY NOTICE                  ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  Readings come from a low-cost breath sensor and are indicative  ║
║  only. They are not a legal or medical measurement.              ║
║                                                                  ║
║  ✗ Do not use these readings to decide whether you can drive.    ║
║                                                                  ║
║  An alert is raised once when the level reaches the threshold    ║
║  and again only after it has dropped below and risen back.       ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

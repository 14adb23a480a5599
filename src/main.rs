//! Biosensor Monitor CLI
//!
//! Polls breath-alcohol readings, prints statistics and raises alerts.

use anyhow::Context;
use biosensor_monitor::{
    config::{Config, SourceConfig},
    core::TimeWindow,
    monitor::{Monitor, MonitorUpdate, MonitorView},
    source::http::DEFAULT_URL,
    SAFETY_NOTICE, VERSION,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "biosensor-monitor")]
#[command(version = VERSION)]
#[command(about = "Poll breath-alcohol readings and alert on threshold crossings", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll continuously and print each update until Ctrl+C
    Watch {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Fetch once and print statistics, daily averages and the series
    Once {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Serve the monitor's output over HTTP (requires server feature)
    Serve {
        #[command(flatten)]
        overrides: Overrides,

        /// Port to listen on
        #[arg(long, default_value = "8787")]
        port: u16,
    },

    /// Show the effective configuration
    Config,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Command-line overrides for configuration values.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Fetch readings from this URL
    #[arg(long, conflicts_with = "file")]
    url: Option<String>,

    /// Read readings from this local data file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Poll interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Alert threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// Selected time window (24h, 7d or 30d)
    #[arg(long)]
    window: Option<TimeWindow>,

    /// IANA timezone for day grouping and labels
    #[arg(long)]
    timezone: Option<String>,

    /// POST alerts to this webhook URL
    #[arg(long)]
    webhook: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(url) = self.url {
            let timeout_secs = match &config.source {
                SourceConfig::Http { timeout_secs, .. } => *timeout_secs,
                SourceConfig::File { .. } => 10,
            };
            config.source = SourceConfig::Http { url, timeout_secs };
        }
        if let Some(path) = self.file {
            config.source = SourceConfig::File { path };
        }
        if let Some(ms) = self.interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(window) = self.window {
            if !config.windows.contains(&window) {
                config.windows.push(window);
            }
            config.default_window = window;
        }
        if let Some(timezone) = self.timezone {
            config.timezone = Some(timezone);
        }
        if let Some(webhook) = self.webhook {
            config.notifier.webhook_url = Some(webhook);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::config_path);

    match cli.command {
        Commands::Watch { overrides } => cmd_watch(load_config(&config_path, overrides)?).await,
        Commands::Once { overrides } => cmd_once(load_config(&config_path, overrides)?).await,
        Commands::Serve { overrides, port } => {
            cmd_serve(load_config(&config_path, overrides)?, port).await
        }
        Commands::Config => cmd_config(&config_path),
        Commands::Init { force } => cmd_init(&config_path, force),
    }
}

fn load_config(path: &PathBuf, overrides: Overrides) -> anyhow::Result<Config> {
    let mut config = Config::load_from(path)
        .with_context(|| format!("failed to load configuration from {path:?}"))?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn cmd_watch(config: Config) -> anyhow::Result<()> {
    println!("Biosensor Monitor v{VERSION}");
    println!("{SAFETY_NOTICE}");

    let monitor = Monitor::from_config(&config)?;
    println!("  Source: {}", monitor.source_description());
    println!("  Poll interval: {}ms", config.poll_interval.as_millis());
    println!("  Threshold: {:.2}", config.threshold);
    println!("  Window: {}", config.default_window);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let mut updates = monitor.subscribe();
    monitor.start();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Ok(update) => print_update(&update),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "display fell behind; skipped updates");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    println!();
    println!("Stopping monitor...");
    monitor.stop();
    monitor.flush_notifications().await;
    println!();
    println!("{}", monitor.activity_summary());
    Ok(())
}

async fn cmd_once(config: Config) -> anyhow::Result<()> {
    let monitor = Monitor::from_config(&config)?;
    let outcome = monitor
        .manual_refresh()
        .await
        .with_context(|| format!("failed to fetch from {}", monitor.source_description()))?;
    tracing::debug!(?outcome, "refresh complete");

    let view = monitor.view();
    print_view(&view);

    if !view.daily.is_empty() {
        println!();
        println!("Daily averages:");
        for day in &view.daily {
            println!("  {}  {:.3}  ({} readings)", day.day, day.avg, day.count);
        }
    }

    if !view.series.is_empty() {
        println!();
        println!("Readings ({}):", view.window);
        for (reading, label) in view.series.iter().zip(&view.labels) {
            let marker = if reading.level >= view.threshold { " !" } else { "" };
            println!("  {label:>16}  {:.3}{marker}", reading.level);
        }
    }

    monitor.flush_notifications().await;
    Ok(())
}

#[cfg(feature = "server")]
async fn cmd_serve(config: Config, port: u16) -> anyhow::Result<()> {
    use biosensor_monitor::server::{run, ServerConfig};
    use std::sync::Arc;

    let monitor = Arc::new(Monitor::from_config(&config)?);
    monitor.start();

    let (addr, shutdown_tx) = run(ServerConfig::new(port), monitor.clone()).await?;
    println!("Serving monitor API on http://{addr}");
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    let _ = shutdown_tx.send(());
    monitor.stop();
    monitor.flush_notifications().await;
    println!("{}", monitor.activity_summary());
    Ok(())
}

#[cfg(not(feature = "server"))]
async fn cmd_serve(_config: Config, _port: u16) -> anyhow::Result<()> {
    anyhow::bail!("the serve command requires the `server` feature at compile time")
}

fn cmd_config(path: &PathBuf) -> anyhow::Result<()> {
    let config = Config::load_from(path)?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {path:?}{}", if path.exists() { "" } else { " (not found, using defaults)" });
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_init(path: &PathBuf, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{path:?} already exists; pass --force to overwrite");
    }
    Config::default().save_to(path)?;
    println!("Wrote default configuration to {path:?}");
    println!("Readings will be fetched from {DEFAULT_URL}");
    Ok(())
}

fn print_update(update: &MonitorUpdate) {
    let now = chrono::Local::now().format("%H:%M:%S");
    match update {
        MonitorUpdate::Refreshed(view) => {
            print!("[{now}] ");
            print_view(view);
        }
        MonitorUpdate::FetchFailed { seq, error } => {
            println!("[{now}] Fetch #{seq} failed: {error}");
        }
        MonitorUpdate::WindowChanged(view) => {
            println!("[{now}] Window changed to {}", view.window);
        }
        MonitorUpdate::AlertRaised(event) => {
            println!("[{now}] ALERT: {}", event.message);
        }
        MonitorUpdate::AlertCleared { level } => {
            println!("[{now}] Alert cleared (level {level:.2})");
        }
    }
}

fn print_view(view: &MonitorView) {
    match &view.stats {
        Some(stats) => println!(
            "Current: {:.2} | Max: {:.2} | Min: {:.2} | Avg: {:.2} | {} readings, {} in last {}{}",
            stats.current,
            stats.max,
            stats.min,
            stats.avg,
            stats.count,
            view.series.len(),
            view.window,
            if view.alert.is_active() { " | ALERTING" } else { "" }
        ),
        None => println!("No readings available"),
    }
}

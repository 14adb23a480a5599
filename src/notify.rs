//! Alert delivery.
//!
//! The monitor decides whether and what to notify; notifiers only deliver.
//! Delivery is fire-and-forget from the monitor's point of view, and a
//! failure never feeds back into the alert state.

use crate::core::AlertEvent;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Notification delivery errors.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Network/HTTP error
    #[error("notification network error: {0}")]
    Network(String),
    /// Receiver returned an error response
    #[error("notification rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Something that can deliver an alert to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert.
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError>;

    /// Notifier name for logs.
    fn name(&self) -> &str;
}

/// Writes alerts to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        tracing::warn!(
            alert_id = %event.id,
            current_level = event.level,
            threshold = event.threshold,
            "{}",
            event.message
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Body posted by [`WebhookNotifier`].
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    #[serde(flatten)]
    event: &'a AlertEvent,
    host: &'a str,
    source: &'static str,
    version: &'static str,
}

/// POSTs alerts as JSON to a webhook URL.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
    host: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Network(format!("failed to create HTTP client: {e}")))?;

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            url: url.into(),
            client,
            host,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            event,
            host: &self.host,
            source: "biosensor-monitor",
            version: env!("CARGO_PKG_VERSION"),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Delivers each alert to every inner notifier in order.
///
/// All notifiers are attempted; the first failure is returned.
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let mut first_error = None;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(event).await {
                tracing::warn!(notifier = notifier.name(), "alert delivery failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn name(&self) -> &str {
        "fanout"
    }
}

/// Build the notifier described by the configuration.
///
/// Alerts are always logged; a webhook is added when configured.
pub fn from_config(config: &crate::config::NotifierConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    if let Some(url) = &config.webhook_url {
        notifiers.push(Arc::new(WebhookNotifier::new(url.clone())?));
    }
    Ok(Arc::new(FanoutNotifier::new(notifiers)))
}

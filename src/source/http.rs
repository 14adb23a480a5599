//! HTTP source fetching the published data document.

use super::{parse_snapshot, ReadingSource, SourceError, Snapshot};
use async_trait::async_trait;
use std::time::Duration;

/// Default location of the published data document.
pub const DEFAULT_URL: &str =
    "https://raw.githubusercontent.com/Bit-Programming/Biosensor-Repo/refs/heads/main/data.json";

/// Fetches snapshots with a GET request per poll.
#[derive(Debug)]
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
    description: String,
}

impl HttpSource {
    /// Create a source for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Fetch(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            description: format!("http: {url}"),
            url,
            client,
        })
    }

    /// The URL being polled.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReadingSource for HttpSource {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .map_err(|e| SourceError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SourceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Fetch(e.to_string()))?;

        parse_snapshot(&body)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

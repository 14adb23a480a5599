//! Reading sources for the monitor.
//!
//! A source hands the monitor a complete snapshot of readings on demand.
//! Transport and parse failures are reported as [`SourceError`]; a
//! well-formed document with no readings is an empty snapshot, not an error.

pub mod file;
pub mod http;
pub mod types;

pub use file::FileSource;
pub use http::HttpSource;
pub use types::{parse_snapshot, Reading, Snapshot};

use crate::config::SourceConfig;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while fetching a snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// Transport failure or timeout
    #[error("fetch failed: {0}")]
    Fetch(String),
    /// The source answered with a non-success status
    #[error("source returned status {status}: {message}")]
    Status { status: u16, message: String },
    /// The payload could not be parsed into readings
    #[error("malformed payload: {0}")]
    Parse(String),
}

impl SourceError {
    /// Short machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            SourceError::Fetch(_) => "FETCH_ERROR",
            SourceError::Status { .. } => "STATUS_ERROR",
            SourceError::Parse(_) => "PARSE_ERROR",
        }
    }
}

/// A supplier of reading snapshots.
#[async_trait]
pub trait ReadingSource: Send + Sync + Debug {
    /// Fetch the current snapshot.
    async fn fetch_snapshot(&self) -> Result<Snapshot, SourceError>;

    /// Human-readable description of where readings come from.
    fn description(&self) -> &str;
}

/// Build the source described by the configuration.
pub fn from_config(config: &SourceConfig) -> Result<Arc<dyn ReadingSource>, SourceError> {
    match config {
        SourceConfig::Http { url, timeout_secs } => Ok(Arc::new(HttpSource::new(
            url.clone(),
            std::time::Duration::from_secs(*timeout_secs),
        )?)),
        SourceConfig::File { path } => Ok(Arc::new(FileSource::new(path))),
    }
}

//! File-backed source.
//!
//! Reads the `data.json` document the recorder maintains on the sensor host.

use super::{parse_snapshot, ReadingSource, SourceError, Snapshot};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Reads a snapshot from a local JSON file on every fetch.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    description: String,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self { path, description }
    }

    /// Returns the path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ReadingSource for FileSource {
    async fn fetch_snapshot(&self) -> Result<Snapshot, SourceError> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|e| SourceError::Fetch(format!("read error: {e}")))?;
        parse_snapshot(&content)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

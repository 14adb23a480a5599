//! Reading and snapshot types, plus parsing of the published data document.
//!
//! The recorder publishes a JSON document of the form
//! `{"readings": [{"time": "2024-10-01T12:00:00Z", "level": "0.05"}]}`.
//! Levels may arrive either as numbers or as decimal strings.

use super::SourceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single alcohol-concentration reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// When the reading was taken
    pub time: DateTime<Utc>,
    /// Measured alcohol concentration
    #[serde(deserialize_with = "level_serde::deserialize")]
    pub level: f64,
}

impl Reading {
    pub fn new(time: DateTime<Utc>, level: f64) -> Self {
        Self { time, level }
    }
}

/// One fetched batch of readings, kept in source order.
///
/// A snapshot is immutable once received and cheap to clone; it replaces
/// the previous snapshot wholesale and is never merged with it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    readings: Arc<[Reading]>,
    received_at: DateTime<Utc>,
}

impl Snapshot {
    /// Wrap readings received now.
    pub fn new(readings: Vec<Reading>) -> Self {
        Self::received_at(readings, Utc::now())
    }

    /// Wrap readings with an explicit receive time.
    pub fn received_at(readings: Vec<Reading>, received_at: DateTime<Utc>) -> Self {
        Self {
            readings: readings.into(),
            received_at,
        }
    }

    /// Readings in the order the source delivered them.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// The last reading in source order (not the latest timestamp).
    pub fn last(&self) -> Option<&Reading> {
        self.readings.last()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// When this snapshot was received.
    pub fn received(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl From<Vec<Reading>> for Snapshot {
    fn from(readings: Vec<Reading>) -> Self {
        Self::new(readings)
    }
}

/// Parse a data document into a snapshot.
///
/// Accepts either `{"readings": [...]}` or a bare array of readings.
/// Any malformed reading rejects the whole document.
pub fn parse_snapshot(bytes: &[u8]) -> Result<Snapshot, SourceError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| SourceError::Parse(e.to_string()))?;

    let readings = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => map
            .remove("readings")
            .ok_or_else(|| SourceError::Parse("missing \"readings\" field".to_string()))?,
        other => {
            return Err(SourceError::Parse(format!(
                "expected object or array, found {}",
                json_kind(&other)
            )))
        }
    };

    let readings: Vec<Reading> =
        serde_json::from_value(readings).map_err(|e| SourceError::Parse(e.to_string()))?;

    Ok(Snapshot::new(readings))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Serde support for levels written as numbers or numeric strings.
mod level_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawLevel {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level = match RawLevel::deserialize(deserializer)? {
            RawLevel::Number(n) => n,
            RawLevel::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| D::Error::custom(format!("invalid level {s:?}: {e}")))?,
        };

        if !level.is_finite() {
            return Err(D::Error::custom("level must be a finite number"));
        }
        Ok(level)
    }
}

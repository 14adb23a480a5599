//! Edge-triggered threshold alerting.
//!
//! ```text
//!            level >= threshold (emit AlertEvent)
//!   Normal ─────────────────────────────────────► Alerting
//!     ▲                                              │
//!     └──────────── level < threshold (silent) ──────┘
//! ```
//!
//! Consecutive readings at or above the threshold while `Alerting` emit
//! nothing, so a sustained elevated level produces a single alert rather
//! than one per poll. The comparison is inclusive: a level exactly equal to
//! the threshold alerts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default alert threshold.
pub const DRUNK_THRESHOLD: f64 = 0.08;

/// Current alert state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    #[default]
    Normal,
    Alerting,
}

impl AlertState {
    pub fn is_active(self) -> bool {
        self == AlertState::Alerting
    }
}

/// A threshold crossing to hand to a notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Unique identifier for this crossing
    pub id: Uuid,
    /// Level that triggered the alert
    pub level: f64,
    /// Threshold in effect
    pub threshold: f64,
    /// When the crossing was detected
    pub raised_at: DateTime<Utc>,
    /// Human-readable notification text
    pub message: String,
}

impl AlertEvent {
    fn new(level: f64, threshold: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            threshold,
            raised_at: Utc::now(),
            message: format!(
                "Warning: alcohol level {level:.2} is at or above the drunk threshold ({threshold:.2})"
            ),
        }
    }
}

/// What a single observation did to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertTransition {
    /// Crossed into `Alerting`; the event should be delivered.
    Raised(AlertEvent),
    /// Dropped back to `Normal`.
    Cleared,
    /// No state change.
    Unchanged,
}

/// Two-state hysteresis machine over the latest level.
#[derive(Debug, Clone)]
pub struct AlertMachine {
    threshold: f64,
    state: AlertState,
}

impl AlertMachine {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: AlertState::Normal,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    /// Feed the latest level and report the resulting transition.
    ///
    /// Total over every input: a NaN level compares below the threshold.
    pub fn observe(&mut self, level: f64) -> AlertTransition {
        let elevated = level >= self.threshold;

        match (self.state, elevated) {
            (AlertState::Normal, true) => {
                self.state = AlertState::Alerting;
                AlertTransition::Raised(AlertEvent::new(level, self.threshold))
            }
            (AlertState::Alerting, false) => {
                self.state = AlertState::Normal;
                AlertTransition::Cleared
            }
            _ => AlertTransition::Unchanged,
        }
    }
}

impl Default for AlertMachine {
    fn default() -> Self {
        Self::new(DRUNK_THRESHOLD)
    }
}

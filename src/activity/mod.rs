//! Activity accounting for the monitor.

pub mod log;

// Re-export commonly used types
pub use log::{ActivityLog, ActivityStats, SharedActivityLog};

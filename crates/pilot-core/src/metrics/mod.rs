//! Metrics hooks for pilot runners.
//!
//! Backends (prometheus, ...) implement [`MetricsBackend`] and are handed to
//! [`crate::PilotRunner`] at construction.
mod backend;
pub use backend::{MetricsBackend, MetricsHandle, TaskOutcome};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}

//! Prometheus implementation of [`pilot_core::MetricsBackend`].
//!
//! Pilots are short-lived batch processes, so nothing here serves HTTP. The `pilot`
//! binary renders the registry in text exposition format when a run ends, for a
//! node-exporter textfile collector or a push gateway to pick up.
//!
//! ## Metrics
//! - `pilot_tasks_started_total{executor}`
//! - `pilot_tasks_completed_total{executor, outcome}`
//! - `pilot_task_duration_seconds{executor}`
//! - `pilot_claim_conflicts_total`
//! - `pilot_runner_errors_total{error_kind}`
mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};

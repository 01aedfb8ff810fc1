//! Local execution of claimed task commands via `tokio::process`.
mod config;
pub use config::SubprocessConfig;

mod dirs;
mod output;

mod executor;
pub use executor::SubprocessExecutor;

/// Executor name reported to metrics and logs.
pub const EXECUTOR_SUBPROCESS: &str = "subprocess";

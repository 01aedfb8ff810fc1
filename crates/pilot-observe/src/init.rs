use tracing::Subscriber;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::timestamp::Rfc3339Timer;
use crate::{LoggerConfig, LoggerError, LoggerFormat, LoggerResult};

/// Install the global subscriber described by `cfg`.
///
/// Events go to stderr so command output on stdout stays machine-readable.
/// Fails with [`LoggerError::AlreadyInitialized`] when called twice.
pub fn init_logger(cfg: &LoggerConfig) -> LoggerResult<()> {
    let filter = cfg.level.to_env_filter();
    let timer = Rfc3339Timer { tz: cfg.tz };

    match cfg.format {
        LoggerFormat::Text => {
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(cfg.colored())
                .with_target(cfg.with_targets)
                .with_timer(timer);
            install(tracing_subscriber::registry().with(filter).with(layer))
        }
        LoggerFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(cfg.with_targets)
                .with_timer(timer);
            install(tracing_subscriber::registry().with(filter).with(layer))
        }
        LoggerFormat::Journald => journald(cfg),
    }
}

#[cfg(target_os = "linux")]
fn journald(cfg: &LoggerConfig) -> LoggerResult<()> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::Journald(e.to_string()))?
        .with_syslog_identifier("pilot".to_string());
    install(tracing_subscriber::registry().with(cfg.level.to_env_filter()).with(layer))
}

#[cfg(not(target_os = "linux"))]
fn journald(_: &LoggerConfig) -> LoggerResult<()> {
    Err(LoggerError::JournaldNotSupported)
}

fn install<S>(subscriber: S) -> LoggerResult<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(|_| LoggerError::AlreadyInitialized)
}

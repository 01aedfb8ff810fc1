//! Logging setup shared by the `pilot` binary and anything embedding the runner.
mod error;
pub use error::{LoggerError, LoggerResult};

mod config;
pub use config::LoggerConfig;

mod format;
pub use format::LoggerFormat;

mod level;
pub use level::LoggerLevel;

mod timestamp;
pub use timestamp::{LoggerTimeZone, init_local_offset};

mod init;
pub use init::init_logger;

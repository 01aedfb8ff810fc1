use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::{LoggerFormat, LoggerLevel, LoggerTimeZone};

/// `logger` section of the agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` expression.
    pub level: LoggerLevel,
    pub tz: LoggerTimeZone,
    /// Print the event target (module path).
    pub with_targets: bool,
    /// ANSI colors for `text`; only honored when stderr is a terminal.
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: LoggerLevel::default(),
            tz: LoggerTimeZone::Utc,
            with_targets: true,
            use_color: true,
        }
    }
}

impl LoggerConfig {
    pub fn with_level(mut self, level: LoggerLevel) -> Self {
        self.level = level;
        self
    }

    pub(crate) fn colored(&self) -> bool {
        self.use_color && std::io::stderr().is_terminal()
    }
}

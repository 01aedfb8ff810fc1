use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

use crate::LoggerError;

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Timezone of log timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerTimeZone {
    #[default]
    Utc,
    /// The host's offset, captured once by [`init_local_offset`].
    Local,
}

impl FromStr for LoggerTimeZone {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utc" => Ok(Self::Utc),
            "local" => Ok(Self::Local),
            _ => Err(LoggerError::InvalidTimeZone(s.to_string())),
        }
    }
}

impl fmt::Display for LoggerTimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoggerTimeZone::Utc => "utc",
            LoggerTimeZone::Local => "local",
        })
    }
}

/// Capture the local UTC offset.
///
/// Offset detection is refused by `time` once other threads exist, so call this
/// from `main` before the tokio runtime starts. Without it `local` falls back to UTC.
pub fn init_local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

fn local_offset() -> UtcOffset {
    LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC)
}

/// RFC 3339 event timestamps in the configured timezone.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Rfc3339Timer {
    pub tz: LoggerTimeZone,
}

impl Rfc3339Timer {
    pub(crate) fn now(&self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        match self.tz {
            LoggerTimeZone::Utc => now,
            LoggerTimeZone::Local => now.to_offset(local_offset()),
        }
    }
}

impl FormatTime for Rfc3339Timer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        match self.now().format(&Rfc3339) {
            Ok(ts) => write!(w, "{ts} "),
            Err(_) => w.write_str("<invalid-time> "),
        }
    }
}

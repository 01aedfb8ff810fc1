use serde::{Deserialize, Serialize};

/// Queue tuning shared by producers, runners and the reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Locks older than this are returned to `todo` by `scrub`.
    pub lock_expiry_secs: u64,
    /// Rows fetched from the `todo` view per claim round.
    pub candidates: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lock_expiry_secs: 24 * 60 * 60,
            candidates: 8,
        }
    }
}

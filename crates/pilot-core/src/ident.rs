use std::sync::atomic::{AtomicU64, Ordering};

/// Per-process sequence, keeps runner ids unique even within one process.
static RUNNER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Short hostname of this machine, `unknown` when it cannot be read.
pub fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Build a lock owner id.
///
/// Format: `{host}-{pid}-{seq:x}-{rand}`.
pub fn runner_id() -> String {
    let seq = RUNNER_SEQ.fetch_add(1, Ordering::Relaxed);
    let rand = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{seq:x}-{}",
        host_name(),
        std::process::id(),
        &rand[..8]
    )
}

use std::sync::Arc;

/// How a claimed task left the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Exit code 0, recorded as `done`.
    Done,
    /// Non-zero exit or spawn failure, recorded as `error`.
    Failed,
    /// Budget exceeded, recorded as `error`.
    TimedOut,
    /// Handed back to `todo` on shutdown.
    Released,
}

impl TaskOutcome {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskOutcome::Done => "done",
            TaskOutcome::Failed => "failed",
            TaskOutcome::TimedOut => "timeout",
            TaskOutcome::Released => "released",
        }
    }
}

/// Metrics sink used by the runner loop.
pub trait MetricsBackend: Send + Sync + 'static {
    /// A task was claimed and is about to execute.
    fn record_task_started(&self, executor: &str);

    /// A claimed task reached an outcome after `duration_ms`.
    fn record_task_completed(&self, executor: &str, outcome: TaskOutcome, duration_ms: u64);

    /// A claim lost the race (or hit a stale view row).
    fn record_claim_conflict(&self);

    /// Store or bookkeeping failure that did not belong to a single task.
    ///
    /// `error_kind` is a short category such as `store` or `lock_lost`.
    fn record_runner_error(&self, error_kind: &str);
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

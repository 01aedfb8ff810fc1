use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use pilot_model::TaskResult;

use crate::TaskRecord;

/// How a single command execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// The process exited (any code) or was killed by a signal.
    Exited(TaskResult),
    /// Killed after exceeding `budget`.
    TimedOut { budget: Duration, result: TaskResult },
    /// Could not be started at all.
    SpawnFailed(String),
    /// Stopped because the runner is shutting down.
    Cancelled,
}

/// Runs the command of a claimed task.
///
/// Implementations must honor `budget` and `cancel`, and must never panic on a
/// misbehaving command: every failure is an [`Execution`] value.
#[async_trait]
pub trait TaskExecutor: Send + Sync + 'static {
    /// Executor name used in metrics and logs.
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        task: &TaskRecord,
        budget: Duration,
        cancel: CancellationToken,
    ) -> Execution;
}

pub type ExecutorRef = Arc<dyn TaskExecutor>;

//! The pilot runner loop: claim one task, run it, record the result, repeat.
mod config;
pub use config::{IdlePolicy, RunnerConfig};

mod executor;
pub use executor::{Execution, ExecutorRef, TaskExecutor};

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    CoreError, CoreResult, JobManager, LockOwner, MetricsHandle, TaskOutcome, TaskQueue,
    TaskRecord, host_name, noop_metrics,
};

/// Why a runner loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    QueueEmpty,
    BudgetSpent,
    /// The average task would not fit into what is left of the budget.
    NextTaskWontFit,
    /// The job carries a cancel request.
    Cancelled,
    Shutdown,
}

/// Counts of one runner's lifetime, returned when the loop ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Tasks that exited 0.
    pub done: usize,
    /// Tasks moved to `error`, whatever the cause.
    pub failed: usize,
    /// Tasks handed back to `todo` without running to the end.
    pub released: usize,
    pub stop: StopReason,
}

#[derive(Debug, Default)]
struct Stats {
    done: usize,
    failed: usize,
    released: usize,
    executed: u32,
    busy: Duration,
}

impl Stats {
    fn average(&self) -> Option<Duration> {
        (self.executed > 0).then(|| self.busy / self.executed)
    }
}

/// Single sequential worker draining the queue on behalf of one job.
///
/// Holds at most one claimed task at a time. Task failures are recorded on the task and
/// never end the loop; only store, auth and configuration failures do.
pub struct PilotRunner {
    queue: TaskQueue,
    jobs: JobManager,
    executor: ExecutorRef,
    metrics: MetricsHandle,
    owner: LockOwner,
    config: RunnerConfig,
    host: String,
}

impl PilotRunner {
    pub fn new(
        queue: TaskQueue,
        jobs: JobManager,
        executor: ExecutorRef,
        owner: LockOwner,
        config: RunnerConfig,
    ) -> Self {
        Self {
            queue,
            jobs,
            executor,
            metrics: noop_metrics(),
            owner,
            config,
            host: host_name(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    #[instrument(level = "info", skip_all, fields(runner = %self.owner.runner, job = ?self.owner.job))]
    pub async fn run(&self, shutdown: CancellationToken) -> CoreResult<RunSummary> {
        let started = Instant::now();
        let budget = self.config.budget();

        if let Some(job) = &self.owner.job {
            match self.jobs.start(job, &self.host).await {
                Ok(_) => info!(host = %self.host, "job marked running"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(error = %e, "could not mark job running"),
            }
        }

        let mut stats = Stats::default();
        let stop = loop {
            if shutdown.is_cancelled() {
                break StopReason::Shutdown;
            }
            let remaining = budget.map(|b| b.saturating_sub(started.elapsed()));
            if remaining == Some(Duration::ZERO) {
                break StopReason::BudgetSpent;
            }
            if let (Some(left), Some(avg)) = (remaining, stats.average()) {
                if avg.mul_f64(self.config.margin.max(0.0)) > left {
                    debug!(avg_ms = avg.as_millis() as u64, left_ms = left.as_millis() as u64, "next task would not fit");
                    break StopReason::NextTaskWontFit;
                }
            }
            if let Some(job) = &self.owner.job {
                if self.jobs.cancel_requested(job).await? {
                    info!("cancel requested");
                    break StopReason::Cancelled;
                }
            }

            let Some(task) = self.queue.claim_next(&self.owner).await? else {
                match self.config.idle {
                    IdlePolicy::Exit => break StopReason::QueueEmpty,
                    IdlePolicy::Poll { interval_ms } => {
                        let mut wait = Duration::from_millis(interval_ms.max(1));
                        if let Some(left) = remaining {
                            wait = wait.min(left);
                        }
                        debug!(wait_ms = wait.as_millis() as u64, "queue empty, polling");
                        let interrupted = tokio::select! {
                            _ = shutdown.cancelled() => true,
                            _ = tokio::time::sleep(wait) => false,
                        };
                        if interrupted {
                            break StopReason::Shutdown;
                        }
                        continue;
                    }
                }
            };

            self.run_task(task, remaining, &shutdown, &mut stats).await?;
        };

        if let Some(job) = &self.owner.job {
            if stop != StopReason::Cancelled {
                if let Err(e) = self.jobs.finish(job).await {
                    warn!(error = %e, "could not mark job finished");
                }
            }
        }

        info!(
            done = stats.done,
            failed = stats.failed,
            released = stats.released,
            stop = ?stop,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "runner stopped"
        );
        Ok(RunSummary {
            done: stats.done,
            failed: stats.failed,
            released: stats.released,
            stop,
        })
    }

    async fn run_task(
        &self,
        record: TaskRecord,
        remaining: Option<Duration>,
        shutdown: &CancellationToken,
        stats: &mut Stats,
    ) -> CoreResult<()> {
        let own = Duration::from_millis(
            record
                .task
                .timeout_ms
                .unwrap_or(self.config.default_task_timeout_ms),
        );
        let budget = remaining.map_or(own, |left| own.min(left));
        let id = record.id.clone();

        info!(task = %id, command = %record.task.command.display(), budget_ms = budget.as_millis() as u64, "executing task");
        self.metrics.record_task_started(self.executor.name());
        let t0 = Instant::now();
        let execution = self
            .executor
            .execute(&record, budget, shutdown.child_token())
            .await;
        let elapsed = t0.elapsed();

        let (outcome, written) = match execution {
            Execution::Exited(result) if result.exit_code == Some(0) => (
                TaskOutcome::Done,
                self.queue.complete(&id, &self.owner, result).await,
            ),
            Execution::Exited(result) => {
                let message = match result.exit_code {
                    Some(code) => format!("exit code {code}"),
                    None => "terminated by signal".to_string(),
                };
                (
                    TaskOutcome::Failed,
                    self.queue.fail(&id, &self.owner, &message, Some(result)).await,
                )
            }
            Execution::TimedOut { budget, result } => {
                let message = format!("timed out after {} ms", budget.as_millis());
                (
                    TaskOutcome::TimedOut,
                    self.queue.fail(&id, &self.owner, &message, Some(result)).await,
                )
            }
            Execution::SpawnFailed(reason) => {
                let message = format!("failed to start: {reason}");
                (
                    TaskOutcome::Failed,
                    self.queue.fail(&id, &self.owner, &message, None).await,
                )
            }
            Execution::Cancelled => (
                TaskOutcome::Released,
                self.queue.release(&id, &self.owner).await,
            ),
        };

        match written {
            Ok(updated) => {
                info!(task = %id, state = %updated.task.state, elapsed_ms = elapsed.as_millis() as u64, "task recorded");
            }
            Err(e @ (CoreError::InvalidTransition { .. } | CoreError::NotFound(_) | CoreError::Contended(_))) => {
                warn!(task = %id, error = %e, "lost the lock, result dropped");
                self.metrics.record_runner_error("lock_lost");
            }
            Err(e) => {
                self.metrics.record_runner_error("store");
                return Err(e);
            }
        }

        self.metrics
            .record_task_completed(self.executor.name(), outcome, elapsed.as_millis() as u64);
        match outcome {
            TaskOutcome::Done => stats.done += 1,
            TaskOutcome::Failed | TaskOutcome::TimedOut => stats.failed += 1,
            TaskOutcome::Released => stats.released += 1,
        }
        if outcome != TaskOutcome::Released {
            stats.executed += 1;
            stats.busy += elapsed;
        }
        Ok(())
    }
}

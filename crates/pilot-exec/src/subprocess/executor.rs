use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use pilot_core::{Execution, TaskExecutor, TaskRecord};
use pilot_model::{ENV_JOB_ID, ENV_TASK_ID, TaskResult};

use crate::subprocess::EXECUTOR_SUBPROCESS;
use crate::subprocess::config::SubprocessConfig;
use crate::subprocess::dirs::TaskDirs;
use crate::subprocess::output::tail_text;
use crate::utils::{attach_limits, isolate_group, kill_group};
use crate::{ExecError, ExecResult};

/// Runs task commands as child processes of the pilot.
///
/// Each command gets its own process group; on timeout or cancellation the whole
/// group is killed, so `sh -c` lines do not leave orphans behind.
#[derive(Debug, Clone, Default)]
pub struct SubprocessExecutor {
    config: SubprocessConfig,
}

impl SubprocessExecutor {
    pub fn new(config: SubprocessConfig) -> ExecResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SubprocessConfig {
        &self.config
    }

    async fn build(&self, task: &TaskRecord) -> ExecResult<(Command, Option<TaskDirs>)> {
        let (program, args) = task.task.command.program_and_args()?;

        let dirs = match &self.config.workdir {
            Some(root) => Some(TaskDirs::prepare(root, task).await?),
            None => None,
        };

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for kv in self.config.env.merged(&task.task.env).iter() {
            cmd.env(kv.key(), kv.value());
        }
        cmd.env(ENV_TASK_ID, &task.id);
        if let Some(job) = &task.task.job_id {
            cmd.env(ENV_JOB_ID, job);
        }
        if let Some(dirs) = &dirs {
            cmd.current_dir(&dirs.root);
            for (key, value) in dirs.env() {
                cmd.env(key, value);
            }
        }

        isolate_group(&mut cmd);
        attach_limits(&mut cmd, &self.config.limits);

        trace!(
            task = %task.id,
            program = %program,
            args = ?args,
            workdir = ?dirs.as_ref().map(|d| &d.root),
            "spawning task command"
        );
        Ok((cmd, dirs))
    }

    fn result(&self, exit_code: Option<i32>, started: Instant, stdout: &[u8], stderr: &[u8]) -> TaskResult {
        TaskResult {
            exit_code,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            stdout: tail_text(stdout, self.config.output_limit),
            stderr: tail_text(stderr, self.config.output_limit),
        }
    }
}

#[async_trait]
impl TaskExecutor for SubprocessExecutor {
    fn name(&self) -> &'static str {
        EXECUTOR_SUBPROCESS
    }

    async fn execute(&self, task: &TaskRecord, budget: Duration, cancel: CancellationToken) -> Execution {
        let (mut cmd, dirs) = match self.build(task).await {
            Ok(built) => built,
            Err(e @ ExecError::InvalidCommand(_)) => return Execution::SpawnFailed(e.to_string()),
            Err(e) => return Execution::SpawnFailed(format!("prepare: {e}")),
        };

        let started = Instant::now();
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!(task = %task.id, error = %e, "spawn failed");
                return Execution::SpawnFailed(e.to_string());
            }
        };
        let pid = child.id();

        let finished = tokio::select! {
            out = child.wait_with_output() => Some(out),
            _ = tokio::time::sleep(budget) => None,
            _ = cancel.cancelled() => {
                debug!(task = %task.id, "cancellation requested; killing task command");
                kill_group(pid);
                return Execution::Cancelled;
            }
        };

        let Some(output) = finished else {
            warn!(task = %task.id, budget_ms = budget.as_millis() as u64, "task command over budget; killing");
            kill_group(pid);
            return Execution::TimedOut {
                budget,
                result: self.result(None, started, &[], &[]),
            };
        };

        match output {
            Ok(out) => {
                if let Some(dirs) = &dirs {
                    if let Err(e) = dirs.save_streams(&out.stdout, &out.stderr).await {
                        warn!(task = %task.id, error = %e, "failed to save output streams");
                    }
                }
                Execution::Exited(self.result(out.status.code(), started, &out.stdout, &out.stderr))
            }
            Err(e) => Execution::SpawnFailed(format!("wait failed: {e}")),
        }
    }
}

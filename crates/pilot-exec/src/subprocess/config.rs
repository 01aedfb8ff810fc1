use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use pilot_model::{Env, ProcessLimits};

use crate::{ExecError, ExecResult};

const DEFAULT_OUTPUT_LIMIT: usize = 64 * 1024;

/// Settings shared by every command a [`super::SubprocessExecutor`] runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SubprocessConfig {
    /// Root for per-task `tmp`/`input`/`output` directories. `None` runs tasks in the
    /// runner's working directory without staging input.
    pub workdir: Option<PathBuf>,
    /// Base environment, shadowed by the task's own entries.
    pub env: Env,
    pub limits: ProcessLimits,
    /// Bytes of stdout and of stderr kept in the task result (the tail is kept).
    pub output_limit: usize,
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self {
            workdir: None,
            env: Env::new(),
            limits: ProcessLimits::default(),
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }
}

impl SubprocessConfig {
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn with_limits(mut self, limits: ProcessLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn validate(&self) -> ExecResult<()> {
        if self.output_limit == 0 {
            return Err(ExecError::InvalidConfig("output-limit must be positive".into()));
        }
        if self.limits.max_file_size_bytes == Some(0) {
            return Err(ExecError::InvalidConfig(
                "limits.max-file-size-bytes cannot be zero".into(),
            ));
        }
        if self.limits.cpu_seconds == Some(0) {
            return Err(ExecError::InvalidConfig("limits.cpu-seconds cannot be zero".into()));
        }
        if self.workdir.as_ref().is_some_and(|d| d.as_os_str().is_empty()) {
            return Err(ExecError::InvalidConfig("workdir is empty".into()));
        }
        Ok(())
    }
}

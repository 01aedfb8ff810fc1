use std::path::{Path, PathBuf};

use pilot_core::TaskRecord;
use pilot_model::{ENV_INPUT_FILE, ENV_OUTPUT_DIR, ENV_TMP_DIR};

use crate::{ExecError, ExecResult};

const INPUT_FILE: &str = "input.json";

/// Per-claim directories: `<workdir>/<task>_<locked_at>/{tmp,input,output}`.
#[derive(Debug, Clone)]
pub(crate) struct TaskDirs {
    pub root: PathBuf,
    pub tmp: PathBuf,
    pub output: PathBuf,
    pub input_file: Option<PathBuf>,
}

impl TaskDirs {
    pub async fn prepare(workdir: &Path, task: &TaskRecord) -> ExecResult<Self> {
        let locked_at = task.task.locked_at.unwrap_or_default();
        let root = workdir.join(format!("{}_{locked_at}", path_safe(&task.id)));
        let tmp = root.join("tmp");
        let input = root.join("input");
        let output = root.join("output");
        for dir in [&tmp, &input, &output] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| ExecError::Workdir {
                    path: dir.display().to_string(),
                    source,
                })?;
        }

        let input_file = match &task.task.input {
            Some(value) => {
                let path = input.join(INPUT_FILE);
                let bytes = serde_json::to_vec_pretty(value)?;
                tokio::fs::write(&path, bytes).await?;
                Some(path)
            }
            None => None,
        };

        Ok(Self {
            root,
            tmp,
            output,
            input_file,
        })
    }

    pub fn env(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            (ENV_TMP_DIR, self.tmp.display().to_string()),
            (ENV_OUTPUT_DIR, self.output.display().to_string()),
        ];
        if let Some(file) = &self.input_file {
            out.push((ENV_INPUT_FILE, file.display().to_string()));
        }
        out
    }

    /// Keep full stdout/stderr next to whatever the command wrote to `output/`.
    pub async fn save_streams(&self, stdout: &[u8], stderr: &[u8]) -> ExecResult<()> {
        tokio::fs::write(self.output.join("stdout"), stdout).await?;
        tokio::fs::write(self.output.join("stderr"), stderr).await?;
        Ok(())
    }
}

fn path_safe(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Submission lifecycle of a pilot job.
///
/// `submitted -> running -> finished | failed`; a job may also go straight from
/// `submitted` to a terminal state when it dies in the remote queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Submitted,
    Running,
    Finished,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Submitted => "submitted",
            JobState::Running => "running",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
        }
    }

    /// Counted against `max_jobs` and polled by `check`.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Submitted | JobState::Running)
    }

    pub fn can_transition_to(&self, to: JobState) -> bool {
        matches!(
            (self, to),
            (JobState::Submitted, JobState::Running)
                | (JobState::Submitted, JobState::Finished)
                | (JobState::Submitted, JobState::Failed)
                | (JobState::Running, JobState::Finished)
                | (JobState::Running, JobState::Failed)
        )
    }

    pub fn check_transition(&self, to: JobState) -> ModelResult<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(ModelError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "submitted" => Ok(JobState::Submitted),
            "running" => Ok(JobState::Running),
            "finished" => Ok(JobState::Finished),
            "failed" => Ok(JobState::Failed),
            other => Err(ModelError::UnknownJobState(other.to_string())),
        }
    }
}

/// Normalized answer of a backend status poll.
///
/// Anything the backend vocabulary does not map cleanly lands in `Unknown`
/// with the raw text, and never counts as finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Queued,
    Running,
    Finished,
    Failed,
    Unknown(String),
}

impl RemoteStatus {
    /// Job state this status implies, if any.
    pub fn job_state(&self) -> Option<JobState> {
        match self {
            RemoteStatus::Queued => Some(JobState::Submitted),
            RemoteStatus::Running => Some(JobState::Running),
            RemoteStatus::Finished => Some(JobState::Finished),
            RemoteStatus::Failed => Some(JobState::Failed),
            RemoteStatus::Unknown(_) => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, RemoteStatus::Unknown(_))
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStatus::Queued => f.write_str("queued"),
            RemoteStatus::Running => f.write_str("running"),
            RemoteStatus::Finished => f.write_str("finished"),
            RemoteStatus::Failed => f.write_str("failed"),
            RemoteStatus::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pilot_model::{ClusterProfile, RemoteStatus};

/// Handle the scheduler (or broker) gave back for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteJobId(String);

impl RemoteJobId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Submission failures, each carrying the backend's native text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Failed before anything was submitted (staging, connection). Safe to retry.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// The submit command may or may not have run. Never retried.
    #[error("submission outcome unknown: {0}")]
    Ambiguous(String),

    /// The scheduler refused the job.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid cluster configuration: {0}")]
    Config(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }

    /// Native diagnostic text without the category prefix.
    pub fn diagnostic(&self) -> &str {
        match self {
            BackendError::Transient(s)
            | BackendError::Ambiguous(s)
            | BackendError::Rejected(s)
            | BackendError::Auth(s)
            | BackendError::Config(s) => s,
        }
    }
}

/// Turns "run a pilot for job X on this cluster" into a remote action.
///
/// One implementation per transport. `submit` must pass `job_id` to the pilot
/// (the `PILOT_JOB_ID` environment variable) so the runner can find its record.
#[async_trait]
pub trait SubmissionBackend: Send + Sync + 'static {
    /// Backend name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    async fn submit(&self, job_id: &str, profile: &ClusterProfile) -> Result<RemoteJobId, BackendError>;

    async fn poll(&self, remote: &RemoteJobId, profile: &ClusterProfile) -> Result<RemoteStatus, BackendError>;

    async fn cancel(&self, remote: &RemoteJobId, profile: &ClusterProfile) -> Result<(), BackendError>;
}

pub type BackendRef = Arc<dyn SubmissionBackend>;

use thiserror::Error;

use pilot_model::ModelError;
use pilot_store::StoreError;

use crate::job::BackendError;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Somebody else won the claim, or the view row was stale.
    #[error("task {0} is already claimed")]
    AlreadyClaimed(String),

    #[error("invalid transition for task {task}: {reason}")]
    InvalidTransition { task: String, reason: String },

    #[error("token '{0}' was already used")]
    DuplicateToken(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Conditional writes kept losing to concurrent writers.
    #[error("write to {0} kept conflicting")]
    Contended(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store call '{0}' timed out")]
    Timeout(String),

    #[error("gave up on '{what}' after {attempts} attempts: {last}")]
    Exhausted {
        what: String,
        attempts: u32,
        #[source]
        last: Box<CoreError>,
    },
}

impl CoreError {
    /// Worth another attempt after a backoff delay.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Store(e) => e.is_transient(),
            CoreError::Timeout(_) => true,
            CoreError::Backend(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Errors that should stop a runner instead of failing a single task.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::Store(StoreError::Auth(_))
                | CoreError::Config(_)
                | CoreError::Exhausted { .. }
                | CoreError::Backend(BackendError::Auth(_) | BackendError::Config(_))
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

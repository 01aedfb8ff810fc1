use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("unknown task state: {0}")]
    UnknownState(String),

    #[error("unknown job state: {0}")]
    UnknownJobState(String),

    #[error("unknown transport: {0} (expected: ssh|xenon)")]
    UnknownTransport(String),

    #[error("unknown jitter strategy: {0}")]
    UnknownJitter(String),

    #[error("invalid token id: {0}")]
    InvalidToken(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;

use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid executor configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to prepare working directory {path}: {source}")]
    Workdir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode task input: {0}")]
    Input(#[from] serde_json::Error),
}

impl From<pilot_model::ModelError> for ExecError {
    fn from(e: pilot_model::ModelError) -> Self {
        ExecError::InvalidCommand(e.to_string())
    }
}

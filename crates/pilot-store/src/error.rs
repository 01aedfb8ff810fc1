use thiserror::Error;

/// Failures of the document store client.
///
/// A rejected conditional write is not an error; see [`crate::WriteOutcome::Conflict`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    /// Network hiccup, timeout or 5xx. Safe to retry.
    #[error("transient store failure: {0}")]
    Transient(String),

    /// Credentials rejected. Retrying will not help.
    #[error("store authentication failed: {0}")]
    Auth(String),

    #[error("invalid store request or response: {0}")]
    Invalid(String),

    #[error("failed to decode document '{id}': {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() {
            return StoreError::Transient(e.to_string());
        }
        if e.is_decode() || e.is_builder() {
            return StoreError::Invalid(e.to_string());
        }
        match e.status() {
            Some(s) if s.as_u16() == 401 || s.as_u16() == 403 => StoreError::Auth(e.to_string()),
            Some(s) if s.is_client_error() => StoreError::Invalid(e.to_string()),
            _ => StoreError::Transient(e.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{TASK_DOC_PREFIX, TOKEN_DOC_PREFIX};
use crate::error::{ModelError, ModelResult};

/// Caller-supplied batch identifier.
///
/// One batch per token: the queue reserves a `token:<id>` marker document before
/// creating any task, so reuse is detected even between racing producers. Task ids
/// derive from the token, so an interrupted enqueue can be repeated with the same
/// token without duplicating work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(raw: impl Into<String>) -> ModelResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelError::InvalidToken("token id is empty".into()));
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ModelError::InvalidToken(format!(
                "token id {trimmed:?} contains whitespace"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of the marker document reserving this token.
    pub fn marker_id(&self) -> String {
        format!("{TOKEN_DOC_PREFIX}{}", self.0)
    }

    /// Id of the `index`-th task of this batch. Zero-padded so ids sort in enqueue order.
    pub fn task_id(&self, index: usize) -> String {
        format!("{TASK_DOC_PREFIX}{}:{index:06}", self.0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::TokenId;

    #[test]
    fn marker_id_is_prefixed() {
        let t = TokenId::new(" batch-7 ").unwrap();
        assert_eq!(t.as_str(), "batch-7");
        assert_eq!(t.marker_id(), "token:batch-7");
    }

    #[test]
    fn task_ids_sort_in_enqueue_order() {
        let t = TokenId::new("batch-7").unwrap();
        assert_eq!(t.task_id(3), "task:batch-7:000003");
        assert!(t.task_id(9) < t.task_id(10));
        assert_ne!(t.task_id(0), t.marker_id());
    }

    #[test]
    fn blank_or_spaced_tokens_are_rejected() {
        assert!(TokenId::new("").is_err());
        assert!(TokenId::new("a b").is_err());
    }
}

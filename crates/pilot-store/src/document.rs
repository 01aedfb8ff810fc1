use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Opaque document identifier.
pub type DocId = String;

/// Opaque revision token, replaced on every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored document: id, revision and JSON body.
///
/// The body never carries store bookkeeping (`_id`, `_rev`); those live in the
/// struct fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub rev: Revision,
    pub body: serde_json::Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(self.body.clone()).map_err(|source| StoreError::Decode {
            id: self.id.clone(),
            source,
        })
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(Revision),
    /// Revision mismatch, or the id already exists for a create-if-absent.
    Conflict,
}

impl WriteOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteOutcome::Conflict)
    }

    pub fn revision(self) -> Option<Revision> {
        match self {
            WriteOutcome::Written(rev) => Some(rev),
            WriteOutcome::Conflict => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Shape {
        #[allow(dead_code)]
        state: String,
    }

    #[test]
    fn decode_error_names_the_document() {
        let doc = Document {
            id: "abc".into(),
            rev: Revision::new("1-x"),
            body: serde_json::json!({"state": 3}),
        };
        let err = doc.decode::<Shape>().unwrap_err();
        assert!(err.to_string().contains("'abc'"), "{err}");
    }

    #[test]
    fn outcome_helpers() {
        assert!(WriteOutcome::Conflict.is_conflict());
        assert_eq!(
            WriteOutcome::Written(Revision::new("2-a")).revision(),
            Some(Revision::new("2-a"))
        );
    }
}

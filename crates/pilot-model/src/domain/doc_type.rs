use std::fmt;

use serde::{Deserialize, Serialize};

/// Discriminator stored in every document body under the `type` field.
///
/// Views only index documents of the matching type, so task views never see
/// job records or token markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Task,
    Job,
    Token,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Task => "task",
            DocType::Job => "job",
            DocType::Token => "token",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// Randomization applied on top of the exponential retry delay.
///
/// Many runners hitting a flaky store at the same moment would otherwise retry in lockstep.
/// The sampling itself lives in `pilot-core`; this type only names the policy.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterStrategy {
    /// Deterministic delays.
    None,
    /// Uniform in `[0, base]`.
    #[default]
    Full,
    /// `base / 2` plus a uniform sample in `[0, base / 2]`.
    Equal,
    /// Uniform in `[first, prev * 3]`, capped at the maximum.
    Decorrelated,
}

impl FromStr for JitterStrategy {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(JitterStrategy::None),
            "full" => Ok(JitterStrategy::Full),
            "equal" => Ok(JitterStrategy::Equal),
            "decorrelated" => Ok(JitterStrategy::Decorrelated),
            other => Err(ModelError::UnknownJitter(other.to_string())),
        }
    }
}

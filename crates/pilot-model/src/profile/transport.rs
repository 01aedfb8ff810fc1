use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// How a cluster is reached for job submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Direct shell: `scp` the pilot script, then run the scheduler CLI over `ssh`.
    Ssh,
    /// Grid middleware broker CLI.
    Xenon,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Ssh => "ssh",
            Transport::Xenon => "xenon",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" => Ok(Transport::Ssh),
            "xenon" => Ok(Transport::Xenon),
            other => Err(ModelError::UnknownTransport(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        assert_eq!("SSH".parse::<Transport>().unwrap(), Transport::Ssh);
        assert_eq!(" xenon".parse::<Transport>().unwrap(), Transport::Xenon);
        assert!(matches!(
            "gsissh".parse::<Transport>(),
            Err(ModelError::UnknownTransport(_))
        ));
    }
}

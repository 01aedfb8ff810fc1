use serde::{Deserialize, Serialize};

use crate::{StoreError, StoreResult};

/// Connection settings for a CouchDB-compatible server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouchConfig {
    /// Server root, e.g. `http://localhost:5984`.
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout_ms: u64,
}

impl Default for CouchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5984".to_string(),
            database: "pilot".to_string(),
            username: None,
            password: None,
            timeout_ms: 30_000,
        }
    }
}

impl CouchConfig {
    pub fn validate(&self) -> StoreResult<()> {
        if self.database.trim().is_empty() {
            return Err(StoreError::Invalid("database name is empty".into()));
        }
        if self.database.starts_with('_') {
            return Err(StoreError::Invalid(format!(
                "database name '{}' must not start with '_'",
                self.database
            )));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(StoreError::Invalid("password given without username".into()));
        }
        if self.timeout_ms == 0 {
            return Err(StoreError::Invalid("timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(CouchConfig::default().validate().is_ok());
    }

    #[test]
    fn reserved_or_empty_names_fail() {
        for name in ["", "_users"] {
            let cfg = CouchConfig {
                database: name.into(),
                ..CouchConfig::default()
            };
            assert!(cfg.validate().is_err(), "{name:?}");
        }
    }

    #[test]
    fn password_is_never_written_back() {
        let cfg = CouchConfig {
            username: Some("u".into()),
            password: Some("p".into()),
            ..CouchConfig::default()
        };
        let v = serde_json::to_value(&cfg).unwrap();
        assert!(v.get("password").is_none());
        assert_eq!(v["username"], "u");
    }
}

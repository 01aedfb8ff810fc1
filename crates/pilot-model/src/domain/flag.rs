use serde::{Deserialize, Serialize};

/// On/off switch used in profile and runner configuration.
///
/// Serialized as a bare boolean. Defaults to enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flag(bool);

impl Flag {
    pub const fn enabled() -> Self {
        Self(true)
    }

    pub const fn disabled() -> Self {
        Self(false)
    }

    pub const fn is_enabled(&self) -> bool {
        self.0
    }

    pub const fn is_disabled(&self) -> bool {
        !self.0
    }
}

impl Default for Flag {
    fn default() -> Self {
        Self::enabled()
    }
}

impl From<bool> for Flag {
    fn from(b: bool) -> Self {
        Self(b)
    }
}

impl From<Flag> for bool {
    fn from(f: Flag) -> Self {
        f.0
    }
}

#[cfg(test)]
mod tests {
    use super::Flag;

    #[test]
    fn absent_flag_is_enabled() {
        #[derive(serde::Deserialize)]
        struct Section {
            #[serde(default)]
            stage_script: Flag,
        }
        let s: Section = serde_json::from_str("{}").unwrap();
        assert!(s.stage_script.is_enabled());

        let s: Section = serde_json::from_str(r#"{"stage_script": false}"#).unwrap();
        assert!(s.stage_script.is_disabled());
    }

    #[test]
    fn bool_conversions() {
        assert!(bool::from(Flag::enabled()));
        assert!(Flag::from(false).is_disabled());
    }
}

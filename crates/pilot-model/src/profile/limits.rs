use serde::{Deserialize, Serialize};

/// POSIX resource limits applied to every task command a runner executes.
///
/// Unset fields leave the inherited limit in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProcessLimits {
    /// `RLIMIT_CPU`, seconds of CPU time.
    pub cpu_seconds: Option<u64>,
    /// `RLIMIT_NOFILE`.
    pub max_open_files: Option<u64>,
    /// `RLIMIT_FSIZE`, bytes.
    pub max_file_size_bytes: Option<u64>,
    /// `RLIMIT_CORE = 0`.
    pub disable_core_dumps: bool,
}

impl ProcessLimits {
    pub fn is_empty(&self) -> bool {
        self.cpu_seconds.is_none()
            && self.max_open_files.is_none()
            && self.max_file_size_bytes.is_none()
            && !self.disable_core_dumps
    }

    /// `self` with every limit `other` sets taking precedence.
    pub fn overlaid(&self, other: &ProcessLimits) -> ProcessLimits {
        ProcessLimits {
            cpu_seconds: other.cpu_seconds.or(self.cpu_seconds),
            max_open_files: other.max_open_files.or(self.max_open_files),
            max_file_size_bytes: other.max_file_size_bytes.or(self.max_file_size_bytes),
            disable_core_dumps: self.disable_core_dumps || other.disable_core_dumps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ProcessLimits;

    #[test]
    fn kebab_case_keys() {
        let l: ProcessLimits =
            serde_json::from_str(r#"{"max-open-files": 256, "disable-core-dumps": true}"#).unwrap();
        assert_eq!(l.max_open_files, Some(256));
        assert!(l.disable_core_dumps);
        assert!(!l.is_empty());
        assert!(ProcessLimits::default().is_empty());
    }

    #[test]
    fn overlay_prefers_the_cluster_side() {
        let base = ProcessLimits {
            cpu_seconds: Some(600),
            max_open_files: Some(64),
            ..ProcessLimits::default()
        };
        let cluster = ProcessLimits {
            max_open_files: Some(1024),
            disable_core_dumps: true,
            ..ProcessLimits::default()
        };
        let merged = base.overlaid(&cluster);
        assert_eq!(merged.cpu_seconds, Some(600));
        assert_eq!(merged.max_open_files, Some(1024));
        assert!(merged.disable_core_dumps);
        assert_eq!(base.overlaid(&ProcessLimits::default()), base);
    }
}

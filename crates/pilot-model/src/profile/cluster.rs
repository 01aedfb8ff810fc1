use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::{Flag, ProcessLimits, Transport};

const DEFAULT_SUBMIT_COMMAND: &str = "qsub";
const DEFAULT_STATUS_COMMAND: &str = "qstat";
const DEFAULT_CANCEL_COMMAND: &str = "qdel";
const DEFAULT_SCHEDULER: &str = "slurm";
const DEFAULT_BROKER: &str = "xenon";
const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 300;

/// Read-only description of one compute resource.
///
/// Keys use the kebab-case spelling of the configuration file:
///
/// ```json
/// {
///   "transport": "ssh",
///   "host": "lisa.example.org",
///   "script": "pilot.sh",
///   "path": "/home/sim/pilot",
///   "max-time": 1440,
///   "private-key": "~/.ssh/id_ed25519"
/// }
/// ```
///
/// Optional fields resolve to transport-specific defaults through the accessor
/// methods, so callers never read them raw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterProfile {
    pub transport: Transport,
    pub host: String,
    /// Pilot script, local path (staged) or remote path when staging is disabled.
    pub script: String,
    /// Remote working directory.
    pub path: String,
    /// Wall-clock budget of one pilot job, minutes.
    pub max_time: u64,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub submit_command: Option<String>,
    #[serde(default)]
    pub status_command: Option<String>,
    #[serde(default)]
    pub cancel_command: Option<String>,
    #[serde(default)]
    pub scheduler: Option<String>,
    #[serde(default)]
    pub broker: Option<String>,
    /// Copy `script` to `path` before submitting (ssh only).
    #[serde(default)]
    pub stage_script: Flag,
    /// Resource limits for every task command a runner of this cluster executes,
    /// on top of the executor's own.
    #[serde(default)]
    pub limits: Option<ProcessLimits>,
    /// Upper bound on one `ssh`/`scp`/broker invocation, seconds.
    #[serde(default)]
    pub call_timeout: Option<u64>,
}

impl ClusterProfile {
    pub fn new(
        transport: Transport,
        host: impl Into<String>,
        script: impl Into<String>,
        path: impl Into<String>,
        max_time: u64,
    ) -> Self {
        Self {
            transport,
            host: host.into(),
            script: script.into(),
            path: path.into(),
            max_time,
            user: None,
            port: None,
            private_key: None,
            password: None,
            submit_command: None,
            status_command: None,
            cancel_command: None,
            scheduler: None,
            broker: None,
            stage_script: Flag::default(),
            limits: None,
            call_timeout: None,
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.host.trim().is_empty() {
            return Err(ModelError::Invalid("cluster host is empty".into()));
        }
        if self.script.trim().is_empty() {
            return Err(ModelError::Invalid("cluster script is empty".into()));
        }
        if self.path.trim().is_empty() {
            return Err(ModelError::Invalid("cluster path is empty".into()));
        }
        if self.max_time == 0 {
            return Err(ModelError::Invalid("max-time must be positive".into()));
        }
        if self.call_timeout == Some(0) {
            return Err(ModelError::Invalid("call-timeout must be positive".into()));
        }
        if self.transport == Transport::Ssh && self.password.is_some() {
            return Err(ModelError::Invalid(
                "password authentication is not supported by the ssh transport; configure private-key"
                    .into(),
            ));
        }
        Ok(())
    }

    pub fn max_time_secs(&self) -> u64 {
        self.max_time.saturating_mul(60)
    }

    /// `user@host` or plain `host`.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SSH_PORT)
    }

    pub fn submit_command(&self) -> &str {
        self.submit_command.as_deref().unwrap_or(DEFAULT_SUBMIT_COMMAND)
    }

    pub fn status_command(&self) -> &str {
        self.status_command.as_deref().unwrap_or(DEFAULT_STATUS_COMMAND)
    }

    pub fn cancel_command(&self) -> &str {
        self.cancel_command.as_deref().unwrap_or(DEFAULT_CANCEL_COMMAND)
    }

    pub fn scheduler(&self) -> &str {
        self.scheduler.as_deref().unwrap_or(DEFAULT_SCHEDULER)
    }

    pub fn broker(&self) -> &str {
        self.broker.as_deref().unwrap_or(DEFAULT_BROKER)
    }

    pub fn call_timeout_secs(&self) -> u64 {
        self.call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT_SECS)
    }

    /// Remote location of the pilot script.
    pub fn remote_script(&self) -> String {
        if self.stage_script.is_disabled() {
            return self.script.clone();
        }
        let name = self
            .script
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(self.script.as_str());
        format!("{}/{}", self.path.trim_end_matches('/'), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh() -> ClusterProfile {
        ClusterProfile::new(Transport::Ssh, "lisa", "scripts/pilot.sh", "/home/u/run/", 60)
    }

    #[test]
    fn defaults_follow_transport() {
        let p = ssh();
        assert_eq!(p.submit_command(), "qsub");
        assert_eq!(p.status_command(), "qstat");
        assert_eq!(p.cancel_command(), "qdel");
        assert_eq!(p.port(), 22);
        assert_eq!(p.max_time_secs(), 3600);
        assert_eq!(p.remote_script(), "/home/u/run/pilot.sh");

        let x = ClusterProfile::new(Transport::Xenon, "das5", "pilot.sh", "/p", 5);
        assert_eq!(x.scheduler(), "slurm");
        assert_eq!(x.broker(), "xenon");
        assert_eq!(x.call_timeout_secs(), 300);
    }

    #[test]
    fn zero_call_timeout_is_rejected() {
        let mut p = ssh();
        p.call_timeout = Some(0);
        assert!(p.validate().is_err());
        p.call_timeout = Some(20);
        assert!(p.validate().is_ok());
        assert_eq!(p.call_timeout_secs(), 20);
    }

    #[test]
    fn unstaged_script_is_used_verbatim() {
        let mut p = ssh();
        p.stage_script = Flag::disabled();
        assert_eq!(p.remote_script(), "scripts/pilot.sh");
    }

    #[test]
    fn ssh_with_password_is_rejected() {
        let mut p = ssh();
        p.password = Some("secret".into());
        let err = p.validate().unwrap_err().to_string();
        assert!(err.contains("private-key"), "{err}");

        let mut x = ClusterProfile::new(Transport::Xenon, "das5", "pilot.sh", "/p", 5);
        x.password = Some("secret".into());
        assert!(x.validate().is_ok());
    }

    #[test]
    fn decodes_config_file_spelling() {
        let p: ClusterProfile = serde_json::from_str(
            r#"{
                "transport": "ssh",
                "host": "lisa",
                "user": "sim",
                "script": "pilot.sh",
                "path": "/run",
                "max-time": 120,
                "submit-command": "sbatch",
                "limits": {"max-open-files": 1024}
            }"#,
        )
        .unwrap();
        assert_eq!(p.submit_command(), "sbatch");
        assert_eq!(p.destination(), "sim@lisa");
        assert!(p.stage_script.is_enabled());
        assert_eq!(p.limits.and_then(|l| l.max_open_files), Some(1024));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn zero_budget_is_invalid() {
        let mut p = ssh();
        p.max_time = 0;
        assert!(p.validate().is_err());
    }
}

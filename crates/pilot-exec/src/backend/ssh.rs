use async_trait::async_trait;
use tracing::{debug, info, instrument};

use pilot_core::{BackendError, RemoteJobId, SubmissionBackend};
use pilot_model::{ClusterProfile, ENV_JOB_ID, RemoteStatus};

use crate::backend::classify::{Phase, launch_failure, ssh_failure};
use crate::backend::launcher::{CallOutput, LauncherRef, RemoteCall, shell_quote};
use crate::backend::status::{JobIdPattern, parse_status_output};

const CONNECT_TIMEOUT_SECS: u32 = 30;

/// Direct-shell transport: `scp` the pilot script, then run the batch scheduler's
/// commands on the login node over `ssh`.
///
/// Authentication is key-based only (`BatchMode=yes`); profiles carrying a password
/// are refused before anything is launched.
#[derive(Clone)]
pub struct SshBackend {
    launcher: LauncherRef,
    job_ids: JobIdPattern,
}

impl std::fmt::Debug for SshBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshBackend").finish_non_exhaustive()
    }
}

impl SshBackend {
    pub fn new(launcher: LauncherRef) -> Result<Self, BackendError> {
        Ok(Self {
            launcher,
            job_ids: JobIdPattern::new()?,
        })
    }

    fn common_options(profile: &ClusterProfile, port_flag: &str) -> Vec<String> {
        let mut opts = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"),
            port_flag.to_string(),
            profile.port().to_string(),
        ];
        if let Some(key) = &profile.private_key {
            opts.push("-i".to_string());
            opts.push(key.clone());
        }
        opts
    }

    fn ssh(profile: &ClusterProfile, remote_command: String) -> RemoteCall {
        RemoteCall::new("ssh")
            .args(Self::common_options(profile, "-p"))
            .arg(profile.destination())
            .arg(remote_command)
    }

    fn scp(profile: &ClusterProfile) -> RemoteCall {
        let target = format!("{}:{}/", profile.destination(), profile.path.trim_end_matches('/'));
        RemoteCall::new("scp")
            .args(Self::common_options(profile, "-P"))
            .arg(profile.script.clone())
            .arg(target)
    }

    /// Remote shell line that submits the pilot script with the job id in its environment.
    pub(crate) fn submit_line(job_id: &str, profile: &ClusterProfile) -> String {
        let submit = profile.submit_command();
        let program = submit
            .split_whitespace()
            .next()
            .and_then(|p| p.rsplit('/').next())
            .unwrap_or(submit);
        let quoted_id = shell_quote(job_id);
        let scheduler_flags = match program {
            "qsub" => format!(
                "-v {ENV_JOB_ID}={quoted_id} -l walltime={}:{:02}:00",
                profile.max_time / 60,
                profile.max_time % 60
            ),
            "sbatch" => format!("--export=ALL,{ENV_JOB_ID}={quoted_id} --time={}", profile.max_time),
            _ => String::new(),
        };
        let mut line = format!(
            "cd {} && {ENV_JOB_ID}={quoted_id} {submit}",
            shell_quote(&profile.path)
        );
        if !scheduler_flags.is_empty() {
            line.push(' ');
            line.push_str(&scheduler_flags);
        }
        line.push(' ');
        line.push_str(&shell_quote(&profile.remote_script()));
        line
    }

    async fn call(&self, call: &RemoteCall, phase: Phase) -> Result<CallOutput, BackendError> {
        self.launcher
            .launch(call)
            .await
            .map_err(|e| launch_failure(&call.program, e, phase))
    }

    async fn stage(&self, profile: &ClusterProfile) -> Result<(), BackendError> {
        let mkdir = Self::ssh(profile, format!("mkdir -p {}", shell_quote(&profile.path)));
        let out = self.call(&mkdir, Phase::Before).await?;
        if !out.success() {
            return Err(stage_failure(&out));
        }

        let out = self.call(&Self::scp(profile), Phase::Before).await?;
        if !out.success() {
            return Err(stage_failure(&out));
        }
        debug!(host = %profile.host, script = %profile.remote_script(), "pilot script staged");
        Ok(())
    }
}

/// Staging never submits anything, so only credentials and a missing local script
/// are worth surfacing as non-retryable.
fn stage_failure(out: &CallOutput) -> BackendError {
    match ssh_failure(out, Phase::Before) {
        BackendError::Rejected(diag) if diag.contains("No such file or directory") => {
            BackendError::Config(diag)
        }
        BackendError::Rejected(diag) => BackendError::Transient(diag),
        other => other,
    }
}

#[async_trait]
impl SubmissionBackend for SshBackend {
    fn name(&self) -> &'static str {
        "ssh"
    }

    #[instrument(level = "debug", skip(self, profile), fields(host = %profile.host))]
    async fn submit(&self, job_id: &str, profile: &ClusterProfile) -> Result<RemoteJobId, BackendError> {
        if profile.password.is_some() {
            return Err(BackendError::Config(
                "password authentication is not supported by the ssh transport; configure private-key".into(),
            ));
        }
        if profile.stage_script.is_enabled() {
            self.stage(profile).await?;
        }

        let out = self
            .call(&Self::ssh(profile, Self::submit_line(job_id, profile)), Phase::Submit)
            .await?;
        if !out.success() {
            return Err(ssh_failure(&out, Phase::Submit));
        }
        match self.job_ids.find(&out.stdout) {
            Some(remote) => {
                info!(job = job_id, remote = %remote, "scheduler accepted pilot");
                Ok(remote)
            }
            None => Err(BackendError::Ambiguous(format!(
                "submit succeeded without a recognizable job id: {}",
                out.diagnostic()
            ))),
        }
    }

    async fn poll(&self, remote: &RemoteJobId, profile: &ClusterProfile) -> Result<RemoteStatus, BackendError> {
        let line = format!("{} {}", profile.status_command(), shell_quote(remote.as_str()));
        let out = self.call(&Self::ssh(profile, line), Phase::Before).await?;
        if out.success() {
            return Ok(parse_status_output(&out.stdout, remote));
        }
        match ssh_failure(&out, Phase::Before) {
            // The scheduler answered, just not with a state (`qstat: Unknown Job Id`).
            BackendError::Rejected(diag) => Ok(RemoteStatus::Unknown(diag)),
            other => Err(other),
        }
    }

    async fn cancel(&self, remote: &RemoteJobId, profile: &ClusterProfile) -> Result<(), BackendError> {
        let line = format!("{} {}", profile.cancel_command(), shell_quote(remote.as_str()));
        let out = self.call(&Self::ssh(profile, line), Phase::Before).await?;
        if out.success() {
            return Ok(());
        }
        Err(ssh_failure(&out, Phase::Before))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_model::{Flag, Transport};

    fn profile() -> ClusterProfile {
        let mut p = ClusterProfile::new(Transport::Ssh, "lisa.example.org", "scripts/pilot.sh", "/home/sim/run", 90);
        p.user = Some("sim".into());
        p.private_key = Some("/keys/id".into());
        p
    }

    #[test]
    fn qsub_line_carries_job_id_and_walltime() {
        let line = SshBackend::submit_line("job-1", &profile());
        assert_eq!(
            line,
            "cd /home/sim/run && PILOT_JOB_ID=job-1 qsub -v PILOT_JOB_ID=job-1 -l walltime=1:30:00 /home/sim/run/pilot.sh"
        );
    }

    #[test]
    fn sbatch_and_custom_commands() {
        let mut p = profile();
        p.submit_command = Some("/usr/bin/sbatch".into());
        assert!(SshBackend::submit_line("j", &p).contains("--export=ALL,PILOT_JOB_ID=j --time=90"));

        p.submit_command = Some("submit-pilot".into());
        p.stage_script = Flag::disabled();
        p.script = "/opt/pilot/run me.sh".into();
        assert_eq!(
            SshBackend::submit_line("j", &p),
            "cd /home/sim/run && PILOT_JOB_ID=j submit-pilot '/opt/pilot/run me.sh'"
        );
    }

    #[test]
    fn ssh_and_scp_arguments() {
        let p = profile();
        let ssh = SshBackend::ssh(&p, "qstat 1".into());
        assert_eq!(ssh.program, "ssh");
        assert_eq!(
            ssh.args,
            ["-o", "BatchMode=yes", "-o", "ConnectTimeout=30", "-p", "22", "-i", "/keys/id", "sim@lisa.example.org", "qstat 1"]
        );

        let scp = SshBackend::scp(&p);
        assert_eq!(scp.args[4], "-P");
        assert_eq!(scp.args.last().map(String::as_str), Some("sim@lisa.example.org:/home/sim/run/"));
    }

    #[test]
    fn missing_local_script_is_config() {
        let out = CallOutput::failed(1, "scripts/pilot.sh: No such file or directory");
        assert!(matches!(stage_failure(&out), BackendError::Config(_)));
        let out = CallOutput::failed(1, "scp: write failed");
        assert!(matches!(stage_failure(&out), BackendError::Transient(_)));
    }
}

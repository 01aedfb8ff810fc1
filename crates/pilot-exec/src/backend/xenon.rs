use async_trait::async_trait;
use tracing::{info, instrument};

use pilot_core::{BackendError, RemoteJobId, SubmissionBackend};
use pilot_model::{ClusterProfile, ENV_JOB_ID, RemoteStatus};

use crate::backend::classify::{Phase, launch_failure, transport_failure};
use crate::backend::launcher::{CallOutput, LauncherRef, RemoteCall};
use crate::backend::status::{JobIdPattern, parse_broker_status};

const REJECT_MARKERS: &[&str] = &["Invalid", "invalid", "not allowed", "rejected", "Unknown queue"];

/// Middleware transport: every action goes through the broker command line,
/// which owns the connection to the cluster's scheduler.
#[derive(Clone)]
pub struct XenonBackend {
    launcher: LauncherRef,
    job_ids: JobIdPattern,
}

impl std::fmt::Debug for XenonBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XenonBackend").finish_non_exhaustive()
    }
}

impl XenonBackend {
    pub fn new(launcher: LauncherRef) -> Result<Self, BackendError> {
        Ok(Self {
            launcher,
            job_ids: JobIdPattern::new()?,
        })
    }

    fn broker(profile: &ClusterProfile, json: bool) -> RemoteCall {
        let mut call = RemoteCall::new(profile.broker());
        if json {
            call = call.arg("--json");
        }
        call = call
            .arg("scheduler")
            .arg(profile.scheduler())
            .arg("--location")
            .arg(profile.host.clone());
        if let Some(user) = &profile.user {
            call = call.arg("--username").arg(user.clone());
        }
        if let Some(key) = &profile.private_key {
            call = call.arg("--certfile").arg(key.clone());
        }
        if let Some(password) = &profile.password {
            call = call.arg("--password").secret_arg(password.clone());
        }
        call
    }

    pub(crate) fn submit_call(job_id: &str, profile: &ClusterProfile) -> RemoteCall {
        Self::broker(profile, false)
            .arg("submit")
            .arg("--working-directory")
            .arg(profile.path.clone())
            .arg("--max-run-time")
            .arg(profile.max_time.to_string())
            .arg("--env")
            .arg(format!("{ENV_JOB_ID}={job_id}"))
            .arg(profile.script.clone())
    }

    async fn call(&self, call: &RemoteCall, phase: Phase) -> Result<CallOutput, BackendError> {
        self.launcher
            .launch(call)
            .await
            .map_err(|e| launch_failure(&call.program, e, phase))
    }
}

/// A broker exit is either a refusal from the scheduler or a transport problem.
fn broker_failure(out: &CallOutput, phase: Phase) -> BackendError {
    let diag = out.diagnostic();
    if out.code.is_some() && REJECT_MARKERS.iter().any(|m| diag.contains(m)) {
        return BackendError::Rejected(diag);
    }
    transport_failure(out, phase)
}

#[async_trait]
impl SubmissionBackend for XenonBackend {
    fn name(&self) -> &'static str {
        "xenon"
    }

    #[instrument(level = "debug", skip(self, profile), fields(host = %profile.host))]
    async fn submit(&self, job_id: &str, profile: &ClusterProfile) -> Result<RemoteJobId, BackendError> {
        let out = self.call(&Self::submit_call(job_id, profile), Phase::Submit).await?;
        if !out.success() {
            return Err(broker_failure(&out, Phase::Submit));
        }
        match self.job_ids.find(&out.stdout) {
            Some(remote) => {
                info!(job = job_id, remote = %remote, "broker accepted pilot");
                Ok(remote)
            }
            None => Err(BackendError::Ambiguous(format!(
                "broker returned no job id: {}",
                out.diagnostic()
            ))),
        }
    }

    async fn poll(&self, remote: &RemoteJobId, profile: &ClusterProfile) -> Result<RemoteStatus, BackendError> {
        let call = Self::broker(profile, true)
            .arg("list")
            .arg("--identifier")
            .arg(remote.as_str());
        let out = self.call(&call, Phase::Before).await?;
        if !out.success() {
            return match broker_failure(&out, Phase::Before) {
                BackendError::Rejected(diag) => Ok(RemoteStatus::Unknown(diag)),
                other => Err(other),
            };
        }
        parse_broker_status(&out.stdout)
    }

    async fn cancel(&self, remote: &RemoteJobId, profile: &ClusterProfile) -> Result<(), BackendError> {
        let call = Self::broker(profile, false).arg("remove").arg(remote.as_str());
        let out = self.call(&call, Phase::Before).await?;
        if out.success() {
            return Ok(());
        }
        Err(broker_failure(&out, Phase::Before))
    }
}

//! Submission backends, one per [`Transport`].
mod classify;

mod launcher;
pub use launcher::{CallOutput, Launcher, LauncherRef, ProcessLauncher, RemoteCall};

mod status;
pub use status::{parse_broker_status, parse_native_status};

mod ssh;
pub use ssh::SshBackend;

mod xenon;
pub use xenon::XenonBackend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use pilot_core::{BackendError, RemoteJobId, SubmissionBackend};
use pilot_model::{ClusterProfile, RemoteStatus, Transport};

/// The closed set of transports, chosen once per cluster profile.
#[derive(Debug, Clone)]
pub enum Backend {
    Ssh(SshBackend),
    Xenon(XenonBackend),
}

impl Backend {
    pub fn for_transport(transport: Transport, launcher: LauncherRef) -> Result<Self, BackendError> {
        Ok(match transport {
            Transport::Ssh => Backend::Ssh(SshBackend::new(launcher)?),
            Transport::Xenon => Backend::Xenon(XenonBackend::new(launcher)?),
        })
    }

    /// Backend for `profile` that launches real `ssh`/`scp`/broker processes, each
    /// bounded by the profile's call timeout.
    pub fn for_profile(profile: &ClusterProfile) -> Result<Self, BackendError> {
        let timeout = Duration::from_secs(profile.call_timeout_secs());
        Self::for_transport(profile.transport, Arc::new(ProcessLauncher::with_timeout(timeout)))
    }

    fn inner(&self) -> &dyn SubmissionBackend {
        match self {
            Backend::Ssh(b) => b,
            Backend::Xenon(b) => b,
        }
    }
}

#[async_trait]
impl SubmissionBackend for Backend {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    async fn submit(&self, job_id: &str, profile: &ClusterProfile) -> Result<RemoteJobId, BackendError> {
        self.inner().submit(job_id, profile).await
    }

    async fn poll(&self, remote: &RemoteJobId, profile: &ClusterProfile) -> Result<RemoteStatus, BackendError> {
        self.inner().poll(remote, profile).await
    }

    async fn cancel(&self, remote: &RemoteJobId, profile: &ClusterProfile) -> Result<(), BackendError> {
        self.inner().cancel(remote, profile).await
    }
}

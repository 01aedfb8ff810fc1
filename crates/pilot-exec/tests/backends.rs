mod common;

use std::io;
use std::sync::Arc;

use pilot_core::{BackendError, RemoteJobId, SubmissionBackend};
use pilot_exec::{Backend, CallOutput};
use pilot_model::{ClusterProfile, Flag, RemoteStatus, Transport};

use common::ScriptedLauncher;

fn ssh_profile() -> ClusterProfile {
    let mut p = ClusterProfile::new(Transport::Ssh, "lisa.example.org", "pilot.sh", "/home/sim/run", 60);
    p.user = Some("sim".into());
    p
}

fn ssh_with(launcher: &Arc<ScriptedLauncher>) -> Backend {
    Backend::for_transport(Transport::Ssh, launcher.clone()).unwrap()
}

#[tokio::test]
async fn ssh_submit_stages_then_submits() {
    let launcher = Arc::new(ScriptedLauncher::answering(vec![
        Ok(CallOutput::ok("")),
        Ok(CallOutput::ok("")),
        Ok(CallOutput::ok("4242.batch1\n")),
    ]));
    let backend = ssh_with(&launcher);
    assert_eq!(backend.name(), "ssh");

    let remote = backend.submit("job-1", &ssh_profile()).await.unwrap();
    assert_eq!(remote, RemoteJobId::new("4242.batch1"));
    assert_eq!(launcher.programs(), ["ssh", "scp", "ssh"]);
    let submit = launcher.last_args().pop().unwrap();
    assert!(submit.contains("PILOT_JOB_ID=job-1"), "{submit}");
}

#[tokio::test]
async fn unstaged_script_skips_scp() {
    let launcher = Arc::new(ScriptedLauncher::answering(vec![Ok(CallOutput::ok("Submitted batch job 9\n"))]));
    let mut profile = ssh_profile();
    profile.stage_script = Flag::disabled();
    let remote = ssh_with(&launcher).submit("job-2", &profile).await.unwrap();
    assert_eq!(remote.as_str(), "9");
    assert_eq!(launcher.programs(), ["ssh"]);
}

#[tokio::test]
async fn staging_failure_is_transient_and_nothing_is_submitted() {
    let launcher = Arc::new(ScriptedLauncher::answering(vec![
        Ok(CallOutput::ok("")),
        Ok(CallOutput::failed(1, "scp: /home/sim/run/pilot.sh: Disk quota exceeded")),
    ]));
    let err = ssh_with(&launcher).submit("job-3", &ssh_profile()).await.unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
    assert!(err.diagnostic().contains("Disk quota exceeded"));
    assert_eq!(launcher.programs(), ["ssh", "scp"]);
}

#[tokio::test]
async fn dropped_connection_during_submit_is_ambiguous() {
    let launcher = Arc::new(ScriptedLauncher::answering(vec![
        Ok(CallOutput::ok("")),
        Ok(CallOutput::ok("")),
        Ok(CallOutput::failed(255, "Connection to lisa.example.org closed by remote host.")),
    ]));
    let err = ssh_with(&launcher).submit("job-4", &ssh_profile()).await.unwrap_err();
    assert!(matches!(err, BackendError::Ambiguous(_)), "{err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn scheduler_refusal_keeps_native_text() {
    let launcher = Arc::new(ScriptedLauncher::answering(vec![
        Ok(CallOutput::ok("")),
        Ok(CallOutput::ok("")),
        Ok(CallOutput::failed(188, "qsub: Job exceeds queue resource limits MSG=cannot satisfy queue max walltime")),
    ]));
    let err = ssh_with(&launcher).submit("job-5", &ssh_profile()).await.unwrap_err();
    assert_eq!(
        err,
        BackendError::Rejected("qsub: Job exceeds queue resource limits MSG=cannot satisfy queue max walltime".into())
    );
}

#[tokio::test]
async fn password_profiles_are_refused_before_launching() {
    let launcher = Arc::new(ScriptedLauncher::default());
    let mut profile = ssh_profile();
    profile.password = Some("hunter2".into());
    let err = ssh_with(&launcher).submit("job-6", &profile).await.unwrap_err();
    assert!(matches!(err, BackendError::Config(_)));
    assert!(launcher.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_ssh_binary_is_config() {
    let launcher = Arc::new(ScriptedLauncher::answering(vec![Err(io::Error::from(io::ErrorKind::NotFound))]));
    let err = ssh_with(&launcher).submit("job-7", &ssh_profile()).await.unwrap_err();
    assert!(matches!(err, BackendError::Config(_)), "{err:?}");
}

fn timed_out() -> io::Result<CallOutput> {
    Err(io::Error::new(io::ErrorKind::TimedOut, "'ssh' did not finish within 300s"))
}

#[tokio::test]
async fn hung_submit_is_ambiguous() {
    let launcher = Arc::new(ScriptedLauncher::answering(vec![Ok(CallOutput::ok("")), Ok(CallOutput::ok("")), timed_out()]));
    let err = ssh_with(&launcher).submit("job-8", &ssh_profile()).await.unwrap_err();
    assert!(matches!(err, BackendError::Ambiguous(_)), "{err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn hung_staging_or_poll_is_retryable() {
    let launcher = Arc::new(ScriptedLauncher::answering(vec![timed_out(), timed_out()]));
    let backend = ssh_with(&launcher);

    let err = backend.submit("job-9", &ssh_profile()).await.unwrap_err();
    assert!(matches!(err, BackendError::Transient(_)), "{err:?}");
    assert_eq!(launcher.programs(), ["ssh"]);

    let err = backend
        .poll(&RemoteJobId::new("4242.batch1"), &ssh_profile())
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
}

#[tokio::test]
async fn ssh_poll_and_cancel() {
    let launcher = Arc::new(ScriptedLauncher::answering(vec![
        Ok(CallOutput::ok("R\n")),
        Ok(CallOutput::failed(153, "qstat: Unknown Job Id 4242.batch1")),
        Ok(CallOutput::failed(255, "ssh: Could not resolve hostname lisa.example.org")),
        Ok(CallOutput::ok("")),
    ]));
    let backend = ssh_with(&launcher);
    let profile = ssh_profile();
    let remote = RemoteJobId::new("4242.batch1");

    assert_eq!(backend.poll(&remote, &profile).await.unwrap(), RemoteStatus::Running);

    let gone = backend.poll(&remote, &profile).await.unwrap();
    assert!(gone.is_unknown());
    assert_ne!(gone, RemoteStatus::Finished);

    let err = backend.poll(&remote, &profile).await.unwrap_err();
    assert!(err.is_retryable());

    backend.cancel(&remote, &profile).await.unwrap();
    assert_eq!(launcher.last_args().pop().unwrap(), "qdel 4242.batch1");
}

#[tokio::test]
async fn xenon_round_trip() {
    let launcher = Arc::new(ScriptedLauncher::answering(vec![
        Ok(CallOutput::ok("slurm-311\n")),
        Ok(CallOutput::ok(r#"[{"state":"PENDING","running":false,"done":false}]"#)),
        Ok(CallOutput::ok(r#"{"state":"COMPLETED","running":false,"done":true,"exitCode":0}"#)),
        Ok(CallOutput::ok("")),
    ]));
    let backend = Backend::for_transport(Transport::Xenon, launcher.clone()).unwrap();
    assert_eq!(backend.name(), "xenon");
    let profile = ClusterProfile::new(Transport::Xenon, "das5.example.org", "/home/sim/pilot.sh", "/home/sim", 30);

    let remote = backend.submit("job-x", &profile).await.unwrap();
    assert_eq!(remote.as_str(), "slurm-311");
    assert_eq!(launcher.programs(), ["xenon"]);

    assert_eq!(backend.poll(&remote, &profile).await.unwrap(), RemoteStatus::Queued);
    assert_eq!(launcher.last_args()[0], "--json");
    assert_eq!(backend.poll(&remote, &profile).await.unwrap(), RemoteStatus::Finished);

    backend.cancel(&remote, &profile).await.unwrap();
    let args = launcher.last_args();
    assert_eq!(&args[args.len() - 2..], ["remove", "slurm-311"]);
}

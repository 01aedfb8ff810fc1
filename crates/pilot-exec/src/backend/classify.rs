use pilot_core::BackendError;

use crate::backend::launcher::CallOutput;

/// Exit status `ssh` uses for its own failures.
pub(crate) const SSH_ERROR: i32 = 255;

const AUTH_MARKERS: &[&str] = &[
    "Permission denied",
    "Host key verification failed",
    "Authentication failed",
    "Auth fail",
];

const CONNECT_MARKERS: &[&str] = &[
    "Could not resolve hostname",
    "Connection refused",
    "Connection timed out",
    "Operation timed out",
    "No route to host",
    "Network is unreachable",
    "kex_exchange_identification",
    "UnknownHost",
];

/// Which side of the point of no return a failed call was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Nothing was submitted yet.
    Before,
    /// The submit command may have been started remotely.
    Submit,
}

pub(crate) fn has_marker(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text.contains(m))
}

/// Classify a failed transport call (ssh or broker) that did not reach a
/// well-defined scheduler answer.
pub(crate) fn transport_failure(out: &CallOutput, phase: Phase) -> BackendError {
    let diag = out.diagnostic();
    if has_marker(&diag, AUTH_MARKERS) {
        return BackendError::Auth(diag);
    }
    if has_marker(&diag, CONNECT_MARKERS) {
        return BackendError::Transient(diag);
    }
    match phase {
        Phase::Before => BackendError::Transient(diag),
        Phase::Submit => BackendError::Ambiguous(diag),
    }
}

/// Classify a failed ssh call. Exit codes other than 255 come from the remote
/// command itself and are taken as a scheduler answer.
pub(crate) fn ssh_failure(out: &CallOutput, phase: Phase) -> BackendError {
    match out.code {
        Some(SSH_ERROR) | None => transport_failure(out, phase),
        Some(_) => BackendError::Rejected(out.diagnostic()),
    }
}

/// A call that never produced an exit status: either it could not start, which is a
/// local configuration problem, or it was killed at its deadline.
pub(crate) fn launch_failure(program: &str, err: std::io::Error, phase: Phase) -> BackendError {
    if err.kind() != std::io::ErrorKind::TimedOut {
        return BackendError::Config(format!("cannot run '{program}': {err}"));
    }
    match phase {
        Phase::Before => BackendError::Transient(err.to_string()),
        Phase::Submit => BackendError::Ambiguous(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_exit_codes() {
        let refused = CallOutput::failed(255, "ssh: connect to host lisa port 22: Connection refused");
        assert!(matches!(ssh_failure(&refused, Phase::Submit), BackendError::Transient(_)));

        let denied = CallOutput::failed(255, "sim@lisa: Permission denied (publickey).");
        assert!(matches!(ssh_failure(&denied, Phase::Before), BackendError::Auth(_)));

        let dropped = CallOutput::failed(255, "Connection to lisa closed by remote host.");
        assert!(matches!(ssh_failure(&dropped, Phase::Submit), BackendError::Ambiguous(_)));
        assert!(matches!(ssh_failure(&dropped, Phase::Before), BackendError::Transient(_)));

        let refused_by_qsub = CallOutput::failed(1, "qsub: Unknown queue");
        match ssh_failure(&refused_by_qsub, Phase::Submit) {
            BackendError::Rejected(d) => assert_eq!(d, "qsub: Unknown queue"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn deadline_expiry_depends_on_phase() {
        let timed_out = || std::io::Error::new(std::io::ErrorKind::TimedOut, "'ssh' did not finish");
        assert!(matches!(launch_failure("ssh", timed_out(), Phase::Submit), BackendError::Ambiguous(_)));
        assert!(matches!(launch_failure("ssh", timed_out(), Phase::Before), BackendError::Transient(_)));

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        assert!(matches!(launch_failure("ssh", missing, Phase::Submit), BackendError::Config(_)));
    }

    #[test]
    fn killed_by_signal_during_submit_is_ambiguous() {
        let out = CallOutput {
            code: None,
            ..CallOutput::default()
        };
        assert!(matches!(ssh_failure(&out, Phase::Submit), BackendError::Ambiguous(_)));
    }
}

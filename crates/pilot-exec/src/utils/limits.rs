//! POSIX rlimits for task commands.
//!
//! On Unix the limits are installed from a `pre_exec` hook, in the child after
//! `fork()` and before `execve()`, so the command never runs unrestricted. The soft
//! limit becomes the requested value; the hard limit is only lowered when it was
//! below that value already. Elsewhere a non-empty request is logged and ignored.

use pilot_model::ProcessLimits;
use tokio::process::Command;

/// Install `limits` on `cmd`. Empty limits leave the command untouched.
pub fn attach_limits(cmd: &mut Command, limits: &ProcessLimits) {
    if limits.is_empty() {
        return;
    }

    #[cfg(unix)]
    unix_impl::attach(cmd, *limits);

    #[cfg(not(unix))]
    {
        let _ = cmd;
        tracing::warn!(?limits, "process limits are not supported on this platform; ignoring");
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::io;
    use std::os::unix::process::CommandExt;

    use pilot_model::ProcessLimits;
    use tokio::process::Command;

    use crate::utils::log::pre_exec_report;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    type Resource = libc::__rlimit_resource_t;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    type Resource = libc::c_int;

    struct Request {
        resource: Resource,
        value: u64,
        label: &'static [u8],
    }

    fn requests(limits: ProcessLimits) -> [Option<Request>; 4] {
        [
            limits.cpu_seconds.map(|value| Request {
                resource: libc::RLIMIT_CPU as Resource,
                value,
                label: b"failed to set RLIMIT_CPU",
            }),
            limits.max_open_files.map(|value| Request {
                resource: libc::RLIMIT_NOFILE as Resource,
                value,
                label: b"failed to set RLIMIT_NOFILE",
            }),
            limits.max_file_size_bytes.map(|value| Request {
                resource: libc::RLIMIT_FSIZE as Resource,
                value,
                label: b"failed to set RLIMIT_FSIZE",
            }),
            limits.disable_core_dumps.then_some(Request {
                resource: libc::RLIMIT_CORE as Resource,
                value: 0,
                label: b"failed to set RLIMIT_CORE",
            }),
        ]
    }

    pub(super) fn attach(cmd: &mut Command, limits: ProcessLimits) {
        let requests = requests(limits);
        // SAFETY: the hook only calls async-signal-safe functions (getrlimit,
        // setrlimit, write) and touches no heap memory.
        unsafe {
            cmd.pre_exec(move || {
                for req in requests.iter().flatten() {
                    if let Err(e) = set_limit(req.resource, req.value) {
                        pre_exec_report(req.label, e.raw_os_error());
                        return Err(e);
                    }
                }
                Ok(())
            });
        }
    }

    fn set_limit(resource: Resource, value: u64) -> io::Result<()> {
        let Ok(soft) = libc::rlim_t::try_from(value) else {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        };
        let mut current = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: `current` is a valid, writable rlimit.
        if unsafe { libc::getrlimit(resource, &mut current) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let hard = if current.rlim_max == libc::RLIM_INFINITY || current.rlim_max > soft {
            current.rlim_max
        } else {
            soft
        };
        let wanted = libc::rlimit {
            rlim_cur: soft,
            rlim_max: hard,
        };
        // SAFETY: `wanted` is a valid rlimit.
        if unsafe { libc::setrlimit(resource, &wanted) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_limits_are_a_noop() {
        let mut cmd = Command::new("true");
        attach_limits(&mut cmd, &ProcessLimits::default());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn limits_are_visible_to_the_child() {
        let limits = ProcessLimits {
            cpu_seconds: Some(30),
            max_open_files: Some(64),
            max_file_size_bytes: Some(1024 * 1024),
            disable_core_dumps: true,
        };
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("ulimit -n; ulimit -c");
        attach_limits(&mut cmd, &limits);

        let out = cmd.output().await.unwrap();
        assert!(out.status.success());
        let text = String::from_utf8_lossy(&out.stdout);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("64"));
        assert_eq!(lines.next(), Some("0"));
    }
}

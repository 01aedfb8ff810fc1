//! Process-level plumbing for pilots: running task commands on the local host and
//! reaching clusters over `ssh` or a grid broker.
mod error;
pub use error::{ExecError, ExecResult};

mod utils;
pub use utils::attach_limits;

mod subprocess;
pub use subprocess::{EXECUTOR_SUBPROCESS, SubprocessConfig, SubprocessExecutor};

mod backend;
pub use backend::{Backend, SshBackend, XenonBackend};
pub use backend::{CallOutput, Launcher, LauncherRef, ProcessLauncher, RemoteCall};
pub use backend::{parse_broker_status, parse_native_status};

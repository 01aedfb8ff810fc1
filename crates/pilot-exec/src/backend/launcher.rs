use std::fmt;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

/// One invocation of a local program (`ssh`, `scp`, a broker CLI).
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub program: String,
    pub args: Vec<String>,
    /// Argument positions holding credentials; masked in `Debug` output.
    pub secret_args: Vec<usize>,
}

impl RemoteCall {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret_args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(arg.into());
        self
    }
}

impl fmt::Debug for RemoteCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<&str> = self
            .args
            .iter()
            .enumerate()
            .map(|(i, a)| if self.secret_args.contains(&i) { "***" } else { a.as_str() })
            .collect();
        f.debug_struct("RemoteCall")
            .field("program", &self.program)
            .field("args", &args)
            .finish()
    }
}

/// What a finished call printed and how it exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOutput {
    /// `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CallOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed stderr, falling back to stdout, for diagnostics.
    pub fn diagnostic(&self) -> String {
        let err = self.stderr.trim();
        if !err.is_empty() {
            return err.to_string();
        }
        let out = self.stdout.trim();
        if !out.is_empty() {
            return out.to_string();
        }
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Seam between backends and the processes they start.
///
/// An `Err` means the program could not be started at all, or, with kind
/// [`io::ErrorKind::TimedOut`], that it was killed for running past its deadline.
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    async fn launch(&self, call: &RemoteCall) -> io::Result<CallOutput>;
}

pub type LauncherRef = Arc<dyn Launcher>;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs calls with `tokio::process`, killing any call that outlives `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct ProcessLauncher {
    timeout: Duration,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl ProcessLauncher {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, call: &RemoteCall) -> io::Result<CallOutput> {
        trace!(call = ?call, "launching");
        let child = Command::new(&call.program)
            .args(&call.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        // Dropping the future on expiry kills the child.
        let out = tokio::time::timeout(self.timeout, child).await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("'{}' did not finish within {:?}", call.program, self.timeout),
            )
        })??;
        Ok(CallOutput {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// Single-quote `s` for a POSIX shell on the remote side.
pub(crate) fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '=' | ':' | '@' | ','))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

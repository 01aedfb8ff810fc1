//! Translating scheduler output into [`RemoteStatus`] and job handles.
use regex::Regex;
use serde::Deserialize;

use pilot_core::{BackendError, RemoteJobId};
use pilot_model::RemoteStatus;

/// Finds the job handle in submit output: a bare `qsub` id (`4242.batch1`), a broker
/// id (`slurm-311`) or Slurm's `Submitted batch job 4242`.
///
/// The first single-word line carrying a digit wins, so status words a wrapper
/// script prints around the id (`OK`, `done`) are never taken for it.
#[derive(Debug, Clone)]
pub(crate) struct JobIdPattern(Regex);

impl JobIdPattern {
    pub fn new() -> Result<Self, BackendError> {
        Regex::new(r"(?m)^\s*(?:Submitted batch job\s+)?([A-Za-z0-9][A-Za-z0-9_.\[\]-]*)\s*$")
            .map(Self)
            .map_err(|e| BackendError::Config(format!("job id pattern: {e}")))
    }

    pub fn find(&self, stdout: &str) -> Option<RemoteJobId> {
        self.0
            .captures_iter(stdout)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .find(|id| id.chars().any(|c| c.is_ascii_digit()))
            .map(RemoteJobId::new)
    }
}

/// Map one native status token (PBS letter or Slurm word) to a [`RemoteStatus`].
pub fn parse_native_status(raw: &str) -> RemoteStatus {
    let token = raw.split_whitespace().next().unwrap_or("");
    match token {
        // PBS / Torque
        "Q" | "W" | "T" => RemoteStatus::Queued,
        "R" | "E" => RemoteStatus::Running,
        "C" | "F" => RemoteStatus::Finished,
        // Slurm
        "PENDING" | "CONFIGURING" | "REQUEUED" | "RESIZING" => RemoteStatus::Queued,
        "RUNNING" | "COMPLETING" => RemoteStatus::Running,
        "COMPLETED" => RemoteStatus::Finished,
        "FAILED" | "CANCELLED" | "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" | "BOOT_FAIL"
        | "DEADLINE" | "PREEMPTED" => RemoteStatus::Failed,
        _ => RemoteStatus::Unknown(raw.trim().to_string()),
    }
}

/// Pick the status of `remote` out of status-command output.
///
/// Accepts a bare status token (`squeue -h -o %T`) or a PBS `qstat` table, where the
/// state letter is the column before the queue name.
pub(crate) fn parse_status_output(stdout: &str, remote: &RemoteJobId) -> RemoteStatus {
    let trimmed = stdout.trim();
    if !trimmed.is_empty() && !trimmed.contains(char::is_whitespace) {
        return parse_native_status(trimmed);
    }

    let short = remote.as_str().split('.').next().unwrap_or(remote.as_str());
    for line in trimmed.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = cols.first() else { continue };
        let first_short = first.split('.').next().unwrap_or(first);
        if first_short == short && cols.len() >= 3 {
            return parse_native_status(cols[cols.len() - 2]);
        }
    }
    RemoteStatus::Unknown(trimmed.to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrokerJob {
    #[serde(default)]
    state: String,
    #[serde(default)]
    running: bool,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    exit_code: Option<i32>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BrokerAnswer {
    Many(Vec<BrokerJob>),
    One(BrokerJob),
}

/// Map the broker's JSON job status (a single object or a one-element list).
///
/// `done` with exit code 0 and no error is `finished`; any other `done` is
/// `failed`. Without the flags, the `state` word is mapped like native output.
pub fn parse_broker_status(json: &str) -> Result<RemoteStatus, BackendError> {
    let answer: BrokerAnswer = serde_json::from_str(json.trim())
        .map_err(|e| BackendError::Transient(format!("unreadable broker status: {e}")))?;
    let job = match answer {
        BrokerAnswer::One(job) => job,
        BrokerAnswer::Many(mut jobs) => match jobs.pop() {
            Some(job) => job,
            None => return Ok(RemoteStatus::Unknown("no such job".to_string())),
        },
    };

    if job.done {
        let clean = job.exit_code == Some(0) && job.error_message.as_deref().is_none_or(str::is_empty);
        return Ok(if clean {
            RemoteStatus::Finished
        } else {
            RemoteStatus::Failed
        });
    }
    if job.running {
        return Ok(RemoteStatus::Running);
    }
    Ok(match job.state.to_ascii_uppercase().as_str() {
        "PENDING" | "QUEUED" | "SUBMITTED" => RemoteStatus::Queued,
        "RUNNING" => RemoteStatus::Running,
        _ => RemoteStatus::Unknown(job.state),
    })
}

use serde::{Deserialize, Serialize};

use crate::error::ModelResult;
use crate::{DocType, JobState, RemoteStatus, Transport, UnixSeconds};

/// Body of a `type = "job"` document.
///
/// A job never owns tasks. Runners it starts claim tasks one at a time and record
/// the job id on them for provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDoc {
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub cluster_name: String,
    #[serde(default)]
    pub method: Option<Transport>,
    #[serde(default)]
    pub host: Option<String>,
    pub submission_state: JobState,
    #[serde(default)]
    pub remote_job_id: Option<String>,
    pub submitted_at: UnixSeconds,
    #[serde(default)]
    pub started_at: Option<UnixSeconds>,
    #[serde(default)]
    pub finished_at: Option<UnixSeconds>,
    #[serde(default)]
    pub cancel_requested_at: Option<UnixSeconds>,
    #[serde(default)]
    pub diagnostic: Option<String>,
    #[serde(default)]
    pub last_remote_status: Option<String>,
}

impl JobDoc {
    pub fn new(
        cluster_name: impl Into<String>,
        method: Option<Transport>,
        host: Option<String>,
        now: UnixSeconds,
    ) -> Self {
        Self {
            doc_type: DocType::Job,
            cluster_name: cluster_name.into(),
            method,
            host,
            submission_state: JobState::Submitted,
            remote_job_id: None,
            submitted_at: now,
            started_at: None,
            finished_at: None,
            cancel_requested_at: None,
            diagnostic: None,
            last_remote_status: None,
        }
    }

    /// Record for a runner started by hand rather than through a backend.
    pub fn local(host: Option<String>, now: UnixSeconds) -> Self {
        Self::new("local", None, host, now)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested_at.is_some()
    }

    /// `submitted -> running`. Returns `false` when already running.
    pub fn mark_running(&mut self, host: Option<String>, now: UnixSeconds) -> ModelResult<bool> {
        if self.submission_state == JobState::Running {
            return Ok(false);
        }
        self.submission_state.check_transition(JobState::Running)?;
        self.submission_state = JobState::Running;
        self.started_at = Some(now);
        if host.is_some() {
            self.host = host;
        }
        Ok(true)
    }

    /// Move to `finished`. Returns `false` when already finished.
    pub fn mark_finished(&mut self, now: UnixSeconds) -> ModelResult<bool> {
        if self.submission_state == JobState::Finished {
            return Ok(false);
        }
        self.submission_state.check_transition(JobState::Finished)?;
        self.submission_state = JobState::Finished;
        self.finished_at = Some(now);
        Ok(true)
    }

    /// Move to `failed` with the backend's native diagnostic.
    pub fn mark_failed(&mut self, diagnostic: impl Into<String>, now: UnixSeconds) -> ModelResult<bool> {
        if self.submission_state == JobState::Failed {
            return Ok(false);
        }
        self.submission_state.check_transition(JobState::Failed)?;
        self.submission_state = JobState::Failed;
        self.diagnostic = Some(diagnostic.into());
        self.finished_at = Some(now);
        Ok(true)
    }

    /// Stamp the cancel request; the first stamp wins.
    pub fn request_cancel(&mut self, now: UnixSeconds) {
        if self.cancel_requested_at.is_none() {
            self.cancel_requested_at = Some(now);
        }
    }

    /// Fold a poll answer into the record.
    ///
    /// The raw status is always kept. The state only moves forward; an unknown
    /// status or a backwards move (running job reported as queued) leaves it untouched.
    /// Returns whether `submission_state` changed.
    pub fn apply_remote(&mut self, status: &RemoteStatus, now: UnixSeconds) -> bool {
        self.last_remote_status = Some(status.to_string());
        let Some(next) = status.job_state() else {
            return false;
        };
        if !self.submission_state.can_transition_to(next) {
            return false;
        }
        self.submission_state = next;
        match next {
            JobState::Running => self.started_at = Some(now),
            JobState::Finished | JobState::Failed => self.finished_at = Some(now),
            JobState::Submitted => {}
        }
        true
    }
}

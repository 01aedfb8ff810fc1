use serde::{Deserialize, Serialize};

use crate::error::ModelResult;
use crate::{DocType, Env, TaskCommand, TaskState, TimeoutMs, TokenId, UnixSeconds};

/// Outcome recorded on a finished task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskResult {
    /// `None` when the process was killed by a signal or never exited (timeout).
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    /// Tail of the captured stdout.
    #[serde(default)]
    pub stdout: String,
    /// Tail of the captured stderr.
    #[serde(default)]
    pub stderr: String,
}

/// Body of a `type = "task"` document.
///
/// `state` and `lock_owner` always change together, in one revision-checked write.
/// The owner (and job) stay on the document after `done`/`error` so the record
/// shows which runner produced the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDoc {
    #[serde(rename = "type")]
    pub doc_type: DocType,
    pub command: TaskCommand,
    #[serde(default, skip_serializing_if = "Env::is_empty")]
    pub env: Env,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<TimeoutMs>,
    pub token_id: TokenId,
    pub state: TaskState,
    #[serde(default)]
    pub lock_owner: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    pub created_at: UnixSeconds,
    #[serde(default)]
    pub locked_at: Option<UnixSeconds>,
    #[serde(default)]
    pub finished_at: Option<UnixSeconds>,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl TaskDoc {
    pub fn new(command: TaskCommand, token_id: TokenId, now: UnixSeconds) -> Self {
        Self {
            doc_type: DocType::Task,
            command,
            env: Env::new(),
            input: None,
            timeout_ms: None,
            token_id,
            state: TaskState::Todo,
            lock_owner: None,
            job_id: None,
            created_at: now,
            locked_at: None,
            finished_at: None,
            result: None,
            error_message: None,
        }
    }

    pub fn with_env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: TimeoutMs) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn locked_by(&self, owner: &str) -> bool {
        self.state == TaskState::Locked && self.lock_owner.as_deref() == Some(owner)
    }

    /// `todo -> locked`.
    pub fn lock(&mut self, owner: &str, job_id: Option<&str>, now: UnixSeconds) -> ModelResult<()> {
        self.state.check_transition(TaskState::Locked)?;
        self.state = TaskState::Locked;
        self.lock_owner = Some(owner.to_string());
        self.job_id = job_id.map(str::to_string);
        self.locked_at = Some(now);
        Ok(())
    }

    /// `locked -> done`.
    pub fn finish_done(&mut self, result: TaskResult, now: UnixSeconds) -> ModelResult<()> {
        self.state.check_transition(TaskState::Done)?;
        self.state = TaskState::Done;
        self.result = Some(result);
        self.error_message = None;
        self.finished_at = Some(now);
        Ok(())
    }

    /// `locked -> error`. A partial result (exit code, output tails) is kept when available.
    pub fn finish_error(
        &mut self,
        message: impl Into<String>,
        result: Option<TaskResult>,
        now: UnixSeconds,
    ) -> ModelResult<()> {
        self.state.check_transition(TaskState::Error)?;
        self.state = TaskState::Error;
        self.error_message = Some(message.into());
        self.result = result;
        self.finished_at = Some(now);
        Ok(())
    }

    /// `locked -> todo`, dropping all lock bookkeeping.
    pub fn unlock(&mut self) -> ModelResult<()> {
        self.state.check_transition(TaskState::Todo)?;
        self.state = TaskState::Todo;
        self.lock_owner = None;
        self.job_id = None;
        self.locked_at = None;
        Ok(())
    }

    /// Lock older than `max_age_secs` at `now`.
    pub fn lock_expired(&self, now: UnixSeconds, max_age_secs: i64) -> bool {
        self.state == TaskState::Locked
            && self
                .locked_at
                .is_some_and(|at| now.saturating_sub(at) > max_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn todo() -> TaskDoc {
        TaskDoc::new(
            TaskCommand::line("true"),
            TokenId::new("t1").unwrap(),
            100,
        )
    }

    #[test]
    fn lock_sets_owner_and_time_together() {
        let mut t = todo();
        t.lock("runner-a", Some("job-1"), 150).unwrap();
        assert_eq!(t.state, TaskState::Locked);
        assert!(t.locked_by("runner-a"));
        assert!(!t.locked_by("runner-b"));
        assert_eq!(t.locked_at, Some(150));
        assert_eq!(t.job_id.as_deref(), Some("job-1"));
    }

    #[test]
    fn second_lock_is_rejected() {
        let mut t = todo();
        t.lock("a", None, 1).unwrap();
        assert!(t.lock("b", None, 2).is_err());
        assert!(t.locked_by("a"));
    }

    #[test]
    fn finished_task_keeps_provenance_and_cannot_unlock() {
        let mut t = todo();
        t.lock("a", None, 1).unwrap();
        t.finish_error("exit code 2", None, 5).unwrap();
        assert_eq!(t.state, TaskState::Error);
        assert_eq!(t.lock_owner.as_deref(), Some("a"));
        assert!(t.unlock().is_err());
        assert!(t.finish_done(TaskResult::default(), 6).is_err());
    }

    #[test]
    fn unlock_clears_lock_fields() {
        let mut t = todo();
        t.lock("a", Some("j"), 1).unwrap();
        t.unlock().unwrap();
        assert_eq!(t.state, TaskState::Todo);
        assert!(t.lock_owner.is_none() && t.job_id.is_none() && t.locked_at.is_none());
    }

    #[test]
    fn lock_expiry_uses_strict_age() {
        let mut t = todo();
        assert!(!t.lock_expired(10_000, 10));
        t.lock("a", None, 100).unwrap();
        assert!(!t.lock_expired(110, 10));
        assert!(t.lock_expired(111, 10));
    }

    #[test]
    fn document_body_shape() {
        let t = todo().with_timeout_ms(500);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["type"], "task");
        assert_eq!(v["state"], "todo");
        assert_eq!(v["token_id"], "t1");
        assert_eq!(v["timeout_ms"], 500);
        assert!(v.get("env").is_none());

        let back: TaskDoc = serde_json::from_value(v).unwrap();
        assert_eq!(back, t);
    }
}

use std::fmt;

use pilot_model::{Env, TaskCommand, TaskDoc, TimeoutMs, TokenId, UnixSeconds};
use pilot_store::{DocId, Revision};

use crate::ident::runner_id;

/// Identity written into `lock_owner` (and `job_id`) on claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    pub runner: String,
    pub job: Option<String>,
}

impl LockOwner {
    pub fn new(runner: impl Into<String>, job: Option<String>) -> Self {
        Self {
            runner: runner.into(),
            job,
        }
    }

    /// Fresh owner id for this process.
    pub fn generate(job: Option<String>) -> Self {
        Self::new(runner_id(), job)
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.job {
            Some(job) => write!(f, "{}@{}", self.runner, job),
            None => f.write_str(&self.runner),
        }
    }
}

/// Task as submitted by a producer, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub command: TaskCommand,
    pub env: Env,
    pub input: Option<serde_json::Value>,
    pub timeout_ms: Option<TimeoutMs>,
}

impl NewTask {
    pub fn new(command: TaskCommand) -> Self {
        Self {
            command,
            env: Env::new(),
            input: None,
            timeout_ms: None,
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

    pub(crate) fn into_doc(self, token: &TokenId, now: UnixSeconds) -> TaskDoc {
        let mut doc = TaskDoc::new(self.command, token.clone(), now).with_env(self.env);
        doc.input = self.input;
        doc.timeout_ms = self.timeout_ms;
        doc
    }
}

/// Decoded task document together with the revision it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: DocId,
    pub rev: Revision,
    pub task: TaskDoc,
}

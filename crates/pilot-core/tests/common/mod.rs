#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use pilot_core::{
    BackendError, ClockRef, ClusterSet, Execution, JobManager, ManualClock, QueueConfig,
    RemoteJobId, Retry, SubmissionBackend, TaskExecutor, TaskQueue, TaskRecord,
};
use pilot_model::{
    BackoffStrategy, ClusterProfile, JitterStrategy, RemoteStatus, TaskCommand, TaskResult,
    Transport,
};
use pilot_store::{MemoryStore, StoreRef};

pub fn fast_retry() -> Retry {
    Retry::new(
        BackoffStrategy {
            jitter: JitterStrategy::None,
            first_ms: 1,
            max_ms: 1,
            factor: 1.0,
            max_attempts: 3,
        },
        Duration::from_secs(5),
    )
}

pub struct Fixture {
    pub mem: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub queue: TaskQueue,
    pub jobs: JobManager,
}

pub fn fixture() -> Fixture {
    fixture_with(ClusterSet::new())
}

pub fn fixture_with(clusters: ClusterSet) -> Fixture {
    let mem = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000));
    let store: StoreRef = mem.clone();
    let clock_ref: ClockRef = clock.clone();
    let queue = TaskQueue::new(store.clone(), fast_retry(), clock_ref.clone(), QueueConfig::default());
    let jobs = JobManager::new(store, fast_retry(), clock_ref, clusters);
    Fixture {
        mem,
        clock,
        queue,
        jobs,
    }
}

pub fn line(cmd: &str) -> pilot_core::NewTask {
    pilot_core::NewTask::new(TaskCommand::line(cmd))
}

/// Executor that interprets the command line instead of spawning anything.
///
/// `ok` exits 0, `fail` exits 1, `slow` times out, `hang` waits for cancellation,
/// `nostart` fails to spawn.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    pub seen: Mutex<Vec<String>>,
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute(
        &self,
        task: &TaskRecord,
        budget: Duration,
        cancel: CancellationToken,
    ) -> Execution {
        let cmd = task.task.command.display();
        self.seen.lock().unwrap().push(task.id.clone());
        let exited = |code| {
            Execution::Exited(TaskResult {
                exit_code: Some(code),
                duration_ms: 1,
                stdout: String::new(),
                stderr: String::new(),
            })
        };
        match cmd.as_str() {
            "ok" => exited(0),
            "fail" => exited(1),
            "slow" => Execution::TimedOut {
                budget,
                result: TaskResult::default(),
            },
            "hang" => {
                cancel.cancelled().await;
                Execution::Cancelled
            }
            _ => Execution::SpawnFailed(format!("no such program: {cmd}")),
        }
    }
}

/// Backend returning queued answers and counting calls.
#[derive(Debug, Default)]
pub struct FakeBackend {
    pub submits: Mutex<VecDeque<Result<RemoteJobId, BackendError>>>,
    pub polls: Mutex<VecDeque<Result<RemoteStatus, BackendError>>>,
    pub submit_calls: Mutex<Vec<String>>,
    pub cancelled: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn submitting(answers: Vec<Result<RemoteJobId, BackendError>>) -> Self {
        Self {
            submits: Mutex::new(answers.into()),
            ..Self::default()
        }
    }

    pub fn push_poll(&self, answer: Result<RemoteStatus, BackendError>) {
        self.polls.lock().unwrap().push_back(answer);
    }

    pub fn submit_count(&self) -> usize {
        self.submit_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SubmissionBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn submit(&self, job_id: &str, _: &ClusterProfile) -> Result<RemoteJobId, BackendError> {
        self.submit_calls.lock().unwrap().push(job_id.to_string());
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RemoteJobId::new(format!("{job_id}.pbs"))))
    }

    async fn poll(&self, _: &RemoteJobId, _: &ClusterProfile) -> Result<RemoteStatus, BackendError> {
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(RemoteStatus::Queued))
    }

    async fn cancel(&self, remote: &RemoteJobId, _: &ClusterProfile) -> Result<(), BackendError> {
        self.cancelled.lock().unwrap().push(remote.to_string());
        Ok(())
    }
}

pub fn profile() -> ClusterProfile {
    ClusterProfile::new(Transport::Ssh, "lisa", "pilot.sh", "/home/sim", 60)
}

pub fn clusters_with(backend: Arc<FakeBackend>) -> ClusterSet {
    let mut set = ClusterSet::new();
    set.insert("lisa", profile(), backend);
    set
}

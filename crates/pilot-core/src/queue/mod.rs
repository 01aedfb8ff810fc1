//! Task lifecycle on top of revision-checked writes.
//!
//! The `todo` view only proposes candidates. The conditional write in [`TaskQueue::claim`]
//! is the sole gate: a stale row or a lost race both surface as
//! [`CoreError::AlreadyClaimed`], and the caller moves on to the next candidate.
mod config;
pub use config::QueueConfig;

mod record;
pub use record::{LockOwner, NewTask, TaskRecord};

mod overview;
pub use overview::Overview;

mod scrub;
pub use scrub::ScrubReport;

mod orphan;
pub use orphan::{ORPHANED_DIAGNOSTIC, OrphanReport};

mod delete;
pub use delete::DeleteReport;

mod transition;

use std::collections::HashSet;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, trace, warn};

use pilot_model::{DocType, ModelError, TaskDoc, TaskState, TokenId};
use pilot_store::{
    DocId, Document, Revision, StoreError, StoreRef, ViewName, ViewQuery, WriteOutcome,
};

use crate::{ClockRef, CoreError, CoreResult, Retry};

const SEAL_ROUNDS: usize = 5;

/// Producer and runner side of the task queue, over a shared store.
#[derive(Clone)]
pub struct TaskQueue {
    store: StoreRef,
    retry: Retry,
    clock: ClockRef,
    config: QueueConfig,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("retry", &self.retry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TaskQueue {
    pub fn new(store: StoreRef, retry: Retry, clock: ClockRef, config: QueueConfig) -> Self {
        Self {
            store,
            retry,
            clock,
            config,
        }
    }

    /// Store every read and write goes through.
    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    /// Backoff and per-call timeout wrapped around each store call.
    pub fn retry(&self) -> &Retry {
        &self.retry
    }

    /// Source of the lock and finish timestamps.
    pub fn clock(&self) -> &ClockRef {
        &self.clock
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Reserve `token` and create every task in `todo`.
    ///
    /// Task ids derive from the token, so repeating a call that failed part way
    /// resumes it without duplicating tasks. Once a batch is sealed, or when the
    /// repeat asks for a different number of tasks, the token is refused.
    #[instrument(level = "debug", skip(self, tasks), fields(token = %token, count = tasks.len()))]
    pub async fn enqueue(&self, token: &TokenId, tasks: Vec<NewTask>) -> CoreResult<Vec<DocId>> {
        if tasks.is_empty() {
            return Err(ModelError::Invalid("nothing to enqueue".into()).into());
        }
        for t in &tasks {
            t.command.validate()?;
        }

        let now = self.clock.now();
        let marker_id = token.marker_id();
        let marker = json!({
            "type": DocType::Token,
            "token_id": token.as_str(),
            "created_at": now,
            "tasks": tasks.len(),
            "complete": false,
        });

        let outcome = self
            .retry
            .run("reserve token", || self.store.create_with_id(&marker_id, marker.clone()))
            .await?;
        if outcome.is_conflict() {
            self.resumable(token, tasks.len()).await?;
            info!(token = %token, "resuming interrupted enqueue");
        }

        let mut ids = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.into_iter().enumerate() {
            let id = token.task_id(index);
            let body = to_body(&task.into_doc(token, now))?;
            let outcome = self
                .retry
                .run("create task", || self.store.create_with_id(&id, body.clone()))
                .await?;
            if outcome.is_conflict() {
                trace!(task = %id, "task already present");
            } else {
                trace!(task = %id, "task created");
            }
            ids.push(id);
        }
        self.seal(&marker_id).await?;
        info!(token = %token, count = ids.len(), "tasks enqueued");
        Ok(ids)
    }

    /// An existing marker may be resumed only while unsealed and for the same batch size.
    async fn resumable(&self, token: &TokenId, count: usize) -> CoreResult<()> {
        let doc = self.get_document(&token.marker_id()).await?;
        let complete = doc.body.get("complete").and_then(|v| v.as_bool()).unwrap_or(true);
        let reserved = doc.body.get("tasks").and_then(|v| v.as_u64());
        if complete || reserved != Some(count as u64) {
            return Err(CoreError::DuplicateToken(token.to_string()));
        }
        Ok(())
    }

    async fn seal(&self, marker_id: &str) -> CoreResult<()> {
        for _ in 0..SEAL_ROUNDS {
            let mut doc = self.get_document(marker_id).await?;
            if doc.body.get("complete").and_then(|v| v.as_bool()) == Some(true) {
                return Ok(());
            }
            if let Some(body) = doc.body.as_object_mut() {
                body.insert("complete".into(), serde_json::Value::Bool(true));
            }
            let outcome = self
                .retry
                .run("seal token", || self.store.update(marker_id, &doc.rev, doc.body.clone()))
                .await?;
            if !outcome.is_conflict() {
                return Ok(());
            }
        }
        Err(CoreError::Contended(marker_id.to_string()))
    }

    /// Ids of the oldest `todo` tasks. Rows may be stale.
    pub async fn candidates(&self, limit: usize) -> CoreResult<Vec<DocId>> {
        let query = ViewQuery::limit(limit);
        let docs = self
            .retry
            .run("query todo", || self.store.query(ViewName::Todo, &query))
            .await?;
        Ok(docs.into_iter().map(|d| d.id).collect())
    }

    /// `todo -> locked` for `owner`.
    #[instrument(level = "debug", skip(self, owner), fields(runner = %owner.runner))]
    pub async fn claim(&self, id: &str, owner: &LockOwner) -> CoreResult<TaskRecord> {
        let doc = self.get_document(id).await?;
        let mut task: TaskDoc = doc.decode()?;
        if task.state != TaskState::Todo {
            trace!(task = %id, state = %task.state, "stale candidate");
            return Err(CoreError::AlreadyClaimed(id.to_string()));
        }
        task.lock(&owner.runner, owner.job.as_deref(), self.clock.now())?;

        match self.write(id, &doc.rev, &task).await? {
            WriteOutcome::Written(rev) => {
                debug!(task = %id, "claimed");
                Ok(TaskRecord {
                    id: id.to_string(),
                    rev,
                    task,
                })
            }
            WriteOutcome::Conflict => {
                // The write may have landed before a retry saw our own revision bump.
                let current = self.get(id).await?;
                if current.task.locked_by(&owner.runner) {
                    return Ok(current);
                }
                Err(CoreError::AlreadyClaimed(id.to_string()))
            }
        }
    }

    /// Claim the oldest task that can still be claimed.
    ///
    /// Walks the `todo` view past rows that turn out stale or contended. Returns `None`
    /// once the view offers nothing new.
    pub async fn claim_next(&self, owner: &LockOwner) -> CoreResult<Option<TaskRecord>> {
        let page = self.config.candidates.max(1);
        let mut seen: HashSet<DocId> = HashSet::new();

        loop {
            let rows = self.candidates(seen.len() + page).await?;
            let fresh: Vec<DocId> = rows.into_iter().filter(|id| !seen.contains(id)).collect();
            if fresh.is_empty() {
                return Ok(None);
            }
            for id in fresh {
                match self.claim(&id, owner).await {
                    Ok(record) => return Ok(Some(record)),
                    Err(CoreError::AlreadyClaimed(_) | CoreError::NotFound(_)) => {
                        seen.insert(id);
                    }
                    Err(CoreError::Store(e @ StoreError::Decode { .. })) => {
                        warn!(task = %id, error = %e, "skipping malformed task");
                        seen.insert(id);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }

    /// Read one task. A document that is not a task fails to decode.
    pub async fn get(&self, id: &str) -> CoreResult<TaskRecord> {
        let doc = self.get_document(id).await?;
        let task = doc.decode()?;
        Ok(TaskRecord {
            id: doc.id,
            rev: doc.rev,
            task,
        })
    }

    /// Raw documents of any view, in view order.
    pub async fn list(&self, view: ViewName, limit: Option<usize>, skip: usize) -> CoreResult<Vec<Document>> {
        let query = ViewQuery {
            limit,
            skip,
            ..ViewQuery::default()
        };
        self.retry
            .run("list", || self.store.query(view, &query))
            .await
    }

    /// Task counts per state.
    pub async fn overview(&self) -> CoreResult<Overview> {
        let counts = self
            .retry
            .run("overview", || self.store.counts(ViewName::Overview))
            .await?;
        Ok(Overview::from_counts(&counts))
    }

    pub(crate) async fn get_document(&self, id: &str) -> CoreResult<Document> {
        match self.retry.run("get", || self.store.get(id)).await {
            Err(CoreError::Store(StoreError::NotFound(_))) => Err(CoreError::NotFound(id.to_string())),
            other => other,
        }
    }

    pub(crate) async fn write<T: Serialize>(
        &self,
        id: &str,
        rev: &Revision,
        body: &T,
    ) -> CoreResult<WriteOutcome> {
        let body = to_body(body)?;
        self.retry
            .run("update", || self.store.update(id, rev, body.clone()))
            .await
    }
}

/// Whether the `todo` view lists anything, stale rows included.
pub(crate) async fn has_todo(store: &StoreRef, retry: &Retry) -> CoreResult<bool> {
    let query = ViewQuery::limit(1);
    let rows = retry
        .run("query todo", || store.query(ViewName::Todo, &query))
        .await?;
    Ok(!rows.is_empty())
}

pub(crate) fn to_body<T: Serialize>(value: &T) -> CoreResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| CoreError::Model(ModelError::Invalid(e.to_string())))
}

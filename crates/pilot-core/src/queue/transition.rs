use tracing::{debug, warn};

use pilot_model::{ModelResult, TaskDoc, TaskResult};
use pilot_store::WriteOutcome;

use crate::{CoreError, CoreResult, LockOwner, TaskQueue, TaskRecord};

/// Re-read/re-write rounds before a contended update gives up.
const CONFLICT_ROUNDS: usize = 5;

impl TaskQueue {
    /// `locked -> done`, only for the lock holder.
    pub async fn complete(
        &self,
        id: &str,
        owner: &LockOwner,
        result: TaskResult,
    ) -> CoreResult<TaskRecord> {
        let now = self.clock().now();
        self.modify_locked(id, owner, "complete", |task| {
            task.finish_done(result.clone(), now)
        })
        .await
    }

    /// `locked -> error`, only for the lock holder.
    pub async fn fail(
        &self,
        id: &str,
        owner: &LockOwner,
        message: &str,
        result: Option<TaskResult>,
    ) -> CoreResult<TaskRecord> {
        let now = self.clock().now();
        self.modify_locked(id, owner, "fail", |task| {
            task.finish_error(message, result.clone(), now)
        })
        .await
    }

    /// `locked -> todo`, only for the lock holder.
    pub async fn release(&self, id: &str, owner: &LockOwner) -> CoreResult<TaskRecord> {
        self.modify_locked(id, owner, "release", TaskDoc::unlock).await
    }

    /// Apply `change` to a task the caller holds the lock on.
    ///
    /// Conflicts trigger a fresh read; the ownership check is repeated every round so
    /// a lock lost to the reaper in between is reported instead of overwritten.
    async fn modify_locked<F>(
        &self,
        id: &str,
        owner: &LockOwner,
        op: &str,
        mut change: F,
    ) -> CoreResult<TaskRecord>
    where
        F: FnMut(&mut TaskDoc) -> ModelResult<()>,
    {
        for round in 0..CONFLICT_ROUNDS {
            let mut record = self.get(id).await?;
            if !record.task.locked_by(&owner.runner) {
                return Err(CoreError::InvalidTransition {
                    task: id.to_string(),
                    reason: format!(
                        "{op} requires a lock held by {}, found state {} owned by {}",
                        owner.runner,
                        record.task.state,
                        record.task.lock_owner.as_deref().unwrap_or("nobody"),
                    ),
                });
            }
            change(&mut record.task).map_err(|e| CoreError::InvalidTransition {
                task: id.to_string(),
                reason: e.to_string(),
            })?;

            match self.write(id, &record.rev, &record.task).await? {
                WriteOutcome::Written(rev) => {
                    debug!(task = %id, op, state = %record.task.state, "task updated");
                    record.rev = rev;
                    return Ok(record);
                }
                WriteOutcome::Conflict => {
                    warn!(task = %id, op, round, "conflicting write, re-reading");
                }
            }
        }
        Err(CoreError::Contended(id.to_string()))
    }
}

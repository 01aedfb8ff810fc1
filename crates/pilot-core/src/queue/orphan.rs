use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{info, warn};

use pilot_model::TaskDoc;
use pilot_store::{DocId, ViewName, ViewQuery, WriteOutcome};

use crate::{CoreError, CoreResult, JobManager, TaskQueue};

/// Error message stored on tasks whose job stopped while they were locked.
pub const ORPHANED_DIAGNOSTIC: &str = "Failed to finish task in time, the job has stopped already.";

/// What an orphan pass did, or would do on a dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanReport {
    /// Locked tasks of stopped jobs, moved to `error` unless this was a dry run.
    pub failed: Vec<DocId>,
    /// Tasks that changed under us; left for the next pass.
    pub conflicts: usize,
    pub dry_run: bool,
}

impl TaskQueue {
    /// Fail every `locked` task whose job is no longer active.
    ///
    /// Job state is read fresh for each job the locked tasks name. Jobs in
    /// `stopping` count as stopped whatever their record says, so a dry run can
    /// report the effect of a job pass it did not write. Locks without a job are
    /// left to [`TaskQueue::scrub`].
    pub async fn fail_orphaned(
        &self,
        jobs: &JobManager,
        stopping: &HashSet<DocId>,
        dry_run: bool,
    ) -> CoreResult<OrphanReport> {
        let query = ViewQuery::all();
        let locked = self
            .retry()
            .run("query locked", || self.store().query(ViewName::Locked, &query))
            .await?;

        let mut report = OrphanReport {
            dry_run,
            ..OrphanReport::default()
        };
        let mut active: HashMap<String, bool> = HashMap::new();
        for doc in locked {
            let mut task: TaskDoc = match doc.decode() {
                Ok(t) => t,
                Err(e) => {
                    warn!(task = %doc.id, error = %e, "skipping undecodable task");
                    continue;
                }
            };
            let Some(job_id) = task.job_id.clone() else {
                continue;
            };
            let alive = match active.get(&job_id) {
                Some(alive) => *alive,
                None => {
                    let alive = !stopping.contains(&job_id) && job_is_active(jobs, &job_id).await?;
                    active.insert(job_id.clone(), alive);
                    alive
                }
            };
            if alive {
                continue;
            }

            if dry_run {
                info!(task = %doc.id, job = %job_id, "would fail task of stopped job");
                report.failed.push(doc.id);
                continue;
            }
            if task.finish_error(ORPHANED_DIAGNOSTIC, None, self.clock().now()).is_err() {
                continue;
            }
            match self.write(&doc.id, &doc.rev, &task).await? {
                WriteOutcome::Written(_) => {
                    info!(task = %doc.id, job = %job_id, "failed task of stopped job");
                    report.failed.push(doc.id);
                }
                WriteOutcome::Conflict => report.conflicts += 1,
            }
        }
        Ok(report)
    }
}

/// A job without a record has nothing left to run the task.
async fn job_is_active(jobs: &JobManager, id: &str) -> CoreResult<bool> {
    match jobs.get(id).await {
        Ok(record) => Ok(record.job.submission_state.is_active()),
        Err(CoreError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

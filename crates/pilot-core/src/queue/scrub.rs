use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use pilot_model::TaskDoc;
use pilot_store::{DocId, ViewName, ViewQuery, WriteOutcome};

use crate::{CoreResult, TaskQueue};

/// What a reaper pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrubReport {
    /// Tasks returned to `todo`.
    pub released: Vec<DocId>,
    /// Locks still within the expiry window.
    pub kept: usize,
    /// Expired locks that changed under us; left for the next pass.
    pub conflicts: usize,
}

impl TaskQueue {
    /// Return every `locked` task older than `older_than` (default: the configured
    /// lock expiry) to `todo`.
    pub async fn scrub(&self, older_than: Option<Duration>) -> CoreResult<ScrubReport> {
        let secs = older_than
            .map(|d| d.as_secs())
            .unwrap_or(self.config().lock_expiry_secs);
        // Ages past i64::MAX saturate, so nothing counts as expired.
        let max_age = i64::try_from(secs).unwrap_or(i64::MAX);
        let now = self.clock().now();

        let query = ViewQuery::all();
        let locked = self
            .retry()
            .run("query locked", || self.store().query(ViewName::Locked, &query))
            .await?;

        let mut report = ScrubReport::default();
        for doc in locked {
            let mut task: TaskDoc = match doc.decode() {
                Ok(t) => t,
                Err(e) => {
                    warn!(task = %doc.id, error = %e, "skipping undecodable task");
                    continue;
                }
            };
            if !task.lock_expired(now, max_age) {
                report.kept += 1;
                continue;
            }
            let owner = task.lock_owner.clone().unwrap_or_default();
            if task.unlock().is_err() {
                report.kept += 1;
                continue;
            }
            match self.write(&doc.id, &doc.rev, &task).await? {
                WriteOutcome::Written(_) => {
                    info!(task = %doc.id, owner = %owner, "expired lock released");
                    report.released.push(doc.id);
                }
                WriteOutcome::Conflict => report.conflicts += 1,
            }
        }
        Ok(report)
    }
}

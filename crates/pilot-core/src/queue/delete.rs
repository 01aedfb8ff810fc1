use serde::Serialize;
use tracing::{debug, info};

use pilot_model::ModelError;
use pilot_store::{DocId, StoreError, ViewName, ViewQuery, WriteOutcome};

use crate::{CoreError, CoreResult, TaskQueue};

const DELETE_ROUNDS: usize = 5;

/// Outcome of deleting a whole view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted: Vec<DocId>,
    /// Documents that changed between listing and deleting; kept.
    pub conflicts: usize,
}

impl TaskQueue {
    /// Remove one document of any type, whatever its revision.
    pub async fn delete(&self, id: &str) -> CoreResult<()> {
        for round in 0..DELETE_ROUNDS {
            let doc = self.get_document(id).await?;
            match self.retry().run("delete", || self.store().delete(id, &doc.rev)).await {
                Ok(WriteOutcome::Written(_)) | Err(CoreError::Store(StoreError::NotFound(_))) => {
                    info!(doc = %id, "deleted");
                    return Ok(());
                }
                Ok(WriteOutcome::Conflict) => debug!(doc = %id, round, "delete conflict, re-reading"),
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::Contended(id.to_string()))
    }

    /// Remove every document `view` lists, each at the revision it was listed with.
    pub async fn delete_view(&self, view: ViewName) -> CoreResult<DeleteReport> {
        if view.is_reduce() {
            return Err(ModelError::Invalid(format!("view '{view}' holds counts, not documents")).into());
        }
        let query = ViewQuery::all();
        let docs = self
            .retry()
            .run("list", || self.store().query(view, &query))
            .await?;

        let mut report = DeleteReport::default();
        for doc in docs {
            match self.retry().run("delete", || self.store().delete(&doc.id, &doc.rev)).await {
                Ok(WriteOutcome::Written(_)) | Err(CoreError::Store(StoreError::NotFound(_))) => {
                    report.deleted.push(doc.id);
                }
                Ok(WriteOutcome::Conflict) => report.conflicts += 1,
                Err(e) => return Err(e),
            }
        }
        info!(view = %view, deleted = report.deleted.len(), conflicts = report.conflicts, "view deleted");
        Ok(report)
    }
}

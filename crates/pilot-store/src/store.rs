use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{DocId, Document, Revision, StoreResult, ViewName, ViewQuery, WriteOutcome};

/// Typed access to the shared document database.
///
/// Writes keyed on a revision are the only mutual-exclusion primitive the queue relies on:
/// `update` either replaces exactly the revision the caller read, or reports
/// [`WriteOutcome::Conflict`] and leaves the document untouched.
///
/// Views are eventually consistent. A document returned by `query` may already
/// have moved on; callers re-read and let the conditional write decide.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn get(&self, id: &str) -> StoreResult<Document>;

    /// Create with a store-assigned id.
    async fn create(&self, body: Value) -> StoreResult<(DocId, Revision)>;

    /// Create-if-absent under `id`.
    async fn create_with_id(&self, id: &str, body: Value) -> StoreResult<WriteOutcome>;

    async fn update(&self, id: &str, rev: &Revision, body: Value) -> StoreResult<WriteOutcome>;

    /// Remove the document if it is still at `rev`.
    async fn delete(&self, id: &str, rev: &Revision) -> StoreResult<WriteOutcome>;

    /// Documents in the view, in key order (ties broken by id).
    async fn query(&self, view: ViewName, query: &ViewQuery) -> StoreResult<Vec<Document>>;

    /// Row count per key of a reduce view.
    async fn counts(&self, view: ViewName) -> StoreResult<BTreeMap<String, u64>>;

    /// Create the database and (re)write the view definitions when they are missing or differ.
    async fn ensure_views(&self) -> StoreResult<()>;
}

pub type StoreRef = Arc<dyn DocumentStore>;

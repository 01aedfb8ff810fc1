use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::views::collate;
use crate::{
    DocId, Document, DocumentStore, Revision, StoreError, StoreResult, ViewName, ViewQuery,
    WriteOutcome,
};

#[derive(Debug, Clone)]
struct Stored {
    generation: u64,
    rev: Revision,
    body: Value,
}

#[derive(Debug, Default)]
struct Inner {
    docs: HashMap<DocId, Stored>,
    /// Snapshot served to `query`/`counts` while view lag is on.
    frozen: Option<HashMap<DocId, Stored>>,
    fail_next: u32,
    views_ensured: bool,
}

/// In-process [`DocumentStore`] with the same write and view semantics as CouchDB.
///
/// Two switches exist for exercising failure handling:
/// - [`MemoryStore::freeze_views`] makes views serve a stale snapshot while reads and
///   writes keep going to live data;
/// - [`MemoryStore::fail_next`] turns the next `n` calls into [`StoreError::Transient`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start serving views from a snapshot of the current data.
    pub fn freeze_views(&self) {
        let mut inner = self.lock();
        inner.frozen = Some(inner.docs.clone());
    }

    /// Catch views up with live data.
    pub fn thaw_views(&self) {
        self.lock().frozen = None;
    }

    pub fn fail_next(&self, n: u32) {
        self.lock().fail_next = n;
    }

    pub fn views_ensured(&self) -> bool {
        self.lock().views_ensured
    }

    pub fn len(&self) -> usize {
        self.lock().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_rev(generation: u64) -> Revision {
        Revision::new(format!("{generation}-{}", uuid::Uuid::new_v4().simple()))
    }
}

fn injected_failure(inner: &mut Inner) -> StoreResult<()> {
    if inner.fail_next > 0 {
        inner.fail_next -= 1;
        return Err(StoreError::Transient("injected failure".into()));
    }
    Ok(())
}

fn check_body(body: &Value) -> StoreResult<()> {
    if !body.is_object() {
        return Err(StoreError::Invalid("document body must be a JSON object".into()));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> StoreResult<Document> {
        let mut inner = self.lock();
        injected_failure(&mut inner)?;
        inner
            .docs
            .get(id)
            .map(|s| Document {
                id: id.to_string(),
                rev: s.rev.clone(),
                body: s.body.clone(),
            })
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn create(&self, body: Value) -> StoreResult<(DocId, Revision)> {
        check_body(&body)?;
        let mut inner = self.lock();
        injected_failure(&mut inner)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let rev = Self::next_rev(1);
        inner.docs.insert(
            id.clone(),
            Stored {
                generation: 1,
                rev: rev.clone(),
                body,
            },
        );
        trace!(doc = %id, rev = %rev, "created");
        Ok((id, rev))
    }

    async fn create_with_id(&self, id: &str, body: Value) -> StoreResult<WriteOutcome> {
        check_body(&body)?;
        let mut inner = self.lock();
        injected_failure(&mut inner)?;
        if inner.docs.contains_key(id) {
            return Ok(WriteOutcome::Conflict);
        }
        let rev = Self::next_rev(1);
        inner.docs.insert(
            id.to_string(),
            Stored {
                generation: 1,
                rev: rev.clone(),
                body,
            },
        );
        Ok(WriteOutcome::Written(rev))
    }

    async fn update(&self, id: &str, rev: &Revision, body: Value) -> StoreResult<WriteOutcome> {
        check_body(&body)?;
        let mut inner = self.lock();
        injected_failure(&mut inner)?;
        let Some(current) = inner.docs.get_mut(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        if &current.rev != rev {
            trace!(doc = %id, expected = %rev, actual = %current.rev, "revision conflict");
            return Ok(WriteOutcome::Conflict);
        }
        current.generation += 1;
        current.rev = Self::next_rev(current.generation);
        current.body = body;
        Ok(WriteOutcome::Written(current.rev.clone()))
    }

    async fn delete(&self, id: &str, rev: &Revision) -> StoreResult<WriteOutcome> {
        let mut inner = self.lock();
        injected_failure(&mut inner)?;
        let Some(current) = inner.docs.get(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        if &current.rev != rev {
            return Ok(WriteOutcome::Conflict);
        }
        let tombstone = Self::next_rev(current.generation + 1);
        inner.docs.remove(id);
        trace!(doc = %id, "deleted");
        Ok(WriteOutcome::Written(tombstone))
    }

    async fn query(&self, view: ViewName, query: &ViewQuery) -> StoreResult<Vec<Document>> {
        let mut inner = self.lock();
        injected_failure(&mut inner)?;
        let source = inner.frozen.as_ref().unwrap_or(&inner.docs);

        let mut rows: Vec<(Value, &DocId, &Stored)> = source
            .iter()
            .filter_map(|(id, s)| view.map(&s.body).map(|key| (key, id, s)))
            .filter(|(key, _, _)| query.contains(key))
            .collect();
        rows.sort_by(|a, b| collate(&a.0, &b.0).then_with(|| a.1.cmp(b.1)));

        Ok(rows
            .into_iter()
            .skip(query.skip)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(_, id, s)| Document {
                id: id.clone(),
                rev: s.rev.clone(),
                body: s.body.clone(),
            })
            .collect())
    }

    async fn counts(&self, view: ViewName) -> StoreResult<BTreeMap<String, u64>> {
        let mut inner = self.lock();
        injected_failure(&mut inner)?;
        let source = inner.frozen.as_ref().unwrap_or(&inner.docs);

        let mut out = BTreeMap::new();
        for s in source.values() {
            if let Some(key) = view.map(&s.body) {
                let key = match key {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                *out.entry(key).or_insert(0) += 1;
            }
        }
        Ok(out)
    }

    async fn ensure_views(&self) -> StoreResult<()> {
        let mut inner = self.lock();
        injected_failure(&mut inner)?;
        inner.views_ensured = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(state: &str, created_at: i64) -> Value {
        json!({"type": "task", "state": state, "created_at": created_at, "token_id": "t"})
    }

    #[tokio::test]
    async fn stale_revision_conflicts_and_keeps_body() {
        let store = MemoryStore::new();
        let (id, rev1) = store.create(task("todo", 1)).await.unwrap();

        let rev2 = store
            .update(&id, &rev1, task("locked", 1))
            .await
            .unwrap()
            .revision()
            .unwrap();
        assert_ne!(rev1, rev2);

        let again = store.update(&id, &rev1, task("done", 1)).await.unwrap();
        assert!(again.is_conflict());
        assert_eq!(store.get(&id).await.unwrap().body["state"], "locked");
    }

    #[tokio::test]
    async fn delete_needs_the_current_revision() {
        let store = MemoryStore::new();
        let (id, rev1) = store.create(task("todo", 1)).await.unwrap();
        let rev2 = store.update(&id, &rev1, task("locked", 1)).await.unwrap().revision().unwrap();

        assert!(store.delete(&id, &rev1).await.unwrap().is_conflict());
        assert!(!store.delete(&id, &rev2).await.unwrap().is_conflict());
        assert!(matches!(store.get(&id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(&id, &rev2).await, Err(StoreError::NotFound(_))));
        assert!(store.query(ViewName::Locked, &ViewQuery::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_with_id_is_create_if_absent() {
        let store = MemoryStore::new();
        let body = json!({"type": "token", "token_id": "b"});
        assert!(!store.create_with_id("token:b", body.clone()).await.unwrap().is_conflict());
        assert!(store.create_with_id("token:b", body).await.unwrap().is_conflict());
    }

    #[tokio::test]
    async fn query_orders_by_key_then_id_and_pages() {
        let store = MemoryStore::new();
        for (id, ts) in [("c", 2), ("b", 1), ("a", 2), ("d", 3)] {
            store.create_with_id(id, task("todo", ts)).await.unwrap();
        }
        store.create_with_id("x", task("done", 0)).await.unwrap();

        let ids = |docs: Vec<Document>| docs.into_iter().map(|d| d.id).collect::<Vec<_>>();

        let all = store.query(ViewName::Todo, &ViewQuery::all()).await.unwrap();
        assert_eq!(ids(all), vec!["b", "a", "c", "d"]);

        let page = store
            .query(ViewName::Todo, &ViewQuery::limit(2).with_skip(1))
            .await
            .unwrap();
        assert_eq!(ids(page), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn frozen_views_lag_behind_writes() {
        let store = MemoryStore::new();
        let (id, rev) = store.create(task("todo", 1)).await.unwrap();
        store.freeze_views();
        store.update(&id, &rev, task("locked", 1)).await.unwrap();

        let stale = store.query(ViewName::Todo, &ViewQuery::all()).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(store.get(&id).await.unwrap().body["state"], "locked");

        store.thaw_views();
        assert!(store.query(ViewName::Todo, &ViewQuery::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overview_counts_per_state() {
        let store = MemoryStore::new();
        for s in ["todo", "todo", "done", "error"] {
            store.create(task(s, 0)).await.unwrap();
        }
        let counts = store.counts(ViewName::Overview).await.unwrap();
        assert_eq!(counts.get("todo"), Some(&2));
        assert_eq!(counts.get("done"), Some(&1));
        assert_eq!(counts.get("locked"), None);
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_run_out() {
        let store = MemoryStore::new();
        store.fail_next(1);
        assert!(store.get("nope").await.unwrap_err().is_transient());
        assert!(matches!(store.get("nope").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn non_object_bodies_are_invalid() {
        let store = MemoryStore::new();
        assert!(matches!(store.create(json!([1])).await, Err(StoreError::Invalid(_))));
    }
}

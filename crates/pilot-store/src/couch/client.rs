use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::views::{DESIGN_DOC_NAME, design_document};
use crate::{
    CouchConfig, DocId, Document, DocumentStore, Revision, StoreError, StoreResult, ViewName,
    ViewQuery, WriteOutcome,
};

/// [`DocumentStore`] over the CouchDB HTTP API.
#[derive(Debug, Clone)]
pub struct CouchStore {
    client: reqwest::Client,
    db: Url,
    config: CouchConfig,
}

#[derive(Debug, Deserialize)]
struct WriteReply {
    id: String,
    rev: String,
}

#[derive(Debug, Deserialize)]
struct ViewReply {
    rows: Vec<ViewRow>,
}

#[derive(Debug, Deserialize)]
struct ViewRow {
    #[serde(default)]
    key: Value,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    doc: Option<Value>,
}

impl CouchStore {
    pub fn new(config: CouchConfig) -> StoreResult<Self> {
        config.validate()?;
        let mut db = Url::parse(&config.url)
            .map_err(|e| StoreError::Invalid(format!("bad store url '{}': {e}", config.url)))?;
        db.path_segments_mut()
            .map_err(|_| StoreError::Invalid(format!("store url '{}' cannot be a base", config.url)))?
            .pop_if_empty()
            .push(&config.database);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| StoreError::Invalid(format!("http client: {e}")))?;

        Ok(Self { client, db, config })
    }

    pub fn config(&self) -> &CouchConfig {
        &self.config
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.db.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    fn doc_url(&self, id: &str) -> Url {
        match id.strip_prefix("_design/") {
            Some(name) => self.url(&["_design", name]),
            None => self.url(&[id]),
        }
    }

    fn view_url(&self, view: ViewName) -> Url {
        self.url(&["_design", DESIGN_DOC_NAME, "_view", view.as_str()])
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.client.request(method, url);
        match &self.config.username {
            Some(user) => req.basic_auth(user, self.config.password.as_deref()),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> StoreResult<Response> {
        Ok(req.send().await?)
    }

    async fn read_doc(&self, id: &str) -> StoreResult<Option<Document>> {
        let resp = self.send(self.request(Method::GET, self.doc_url(id))).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp, id).await?;
        let body: Value = resp.json().await?;
        split_document(body).map(Some)
    }

    async fn put(&self, id: &str, body: Value) -> StoreResult<WriteOutcome> {
        let resp = self
            .send(self.request(Method::PUT, self.doc_url(id)).json(&body))
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Ok(WriteOutcome::Conflict);
        }
        let reply: WriteReply = check(resp, id).await?.json().await?;
        Ok(WriteOutcome::Written(Revision::new(reply.rev)))
    }

    async fn view(&self, view: ViewName, params: Vec<(&str, String)>) -> StoreResult<ViewReply> {
        let mut url = self.view_url(view);
        url.query_pairs_mut().extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        let resp = self.send(self.request(Method::GET, url)).await?;
        Ok(check(resp, view.as_str()).await?.json().await?)
    }

    async fn ensure_database(&self) -> StoreResult<()> {
        let resp = self.send(self.request(Method::PUT, self.db.clone())).await?;
        match resp.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => {
                info!(database = %self.config.database, "database created");
                Ok(())
            }
            StatusCode::PRECONDITION_FAILED => Ok(()),
            _ => check(resp, &self.config.database).await.map(|_| ()),
        }
    }
}

/// Map an HTTP failure status to a typed error, passing successes through.
async fn check(resp: Response, what: &str) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let detail = format!("{what}: {status} {}", text.trim());
    Err(match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Auth(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => StoreError::Transient(detail),
        s if s.is_server_error() => StoreError::Transient(detail),
        _ => StoreError::Invalid(detail),
    })
}

/// Pull `_id`/`_rev` out of a raw CouchDB document.
fn split_document(mut body: Value) -> StoreResult<Document> {
    let obj = body
        .as_object_mut()
        .ok_or_else(|| StoreError::Invalid("document is not a JSON object".into()))?;
    let id = obj
        .remove("_id")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| StoreError::Invalid("document without _id".into()))?;
    let rev = obj
        .remove("_rev")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| StoreError::Invalid(format!("document '{id}' without _rev")))?;
    Ok(Document {
        id,
        rev: Revision::new(rev),
        body,
    })
}

fn with_rev(mut body: Value, rev: &Revision) -> StoreResult<Value> {
    let obj = body
        .as_object_mut()
        .ok_or_else(|| StoreError::Invalid("document body must be a JSON object".into()))?;
    obj.insert("_rev".into(), Value::String(rev.as_str().to_string()));
    Ok(body)
}

fn view_params(query: &ViewQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("include_docs", "true".to_string()),
        ("reduce", "false".to_string()),
    ];
    if let Some(k) = &query.start_key {
        params.push(("startkey", k.to_string()));
    }
    if let Some(k) = &query.end_key {
        params.push(("endkey", k.to_string()));
    }
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    if query.skip > 0 {
        params.push(("skip", query.skip.to_string()));
    }
    params
}

#[async_trait]
impl DocumentStore for CouchStore {
    #[instrument(level = "trace", skip(self))]
    async fn get(&self, id: &str) -> StoreResult<Document> {
        self.read_doc(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn create(&self, body: Value) -> StoreResult<(DocId, Revision)> {
        let resp = self
            .send(self.request(Method::POST, self.db.clone()).json(&body))
            .await?;
        let reply: WriteReply = check(resp, &self.config.database).await?.json().await?;
        Ok((reply.id, Revision::new(reply.rev)))
    }

    async fn create_with_id(&self, id: &str, body: Value) -> StoreResult<WriteOutcome> {
        if !body.is_object() {
            return Err(StoreError::Invalid("document body must be a JSON object".into()));
        }
        self.put(id, body).await
    }

    async fn update(&self, id: &str, rev: &Revision, body: Value) -> StoreResult<WriteOutcome> {
        self.put(id, with_rev(body, rev)?).await
    }

    async fn delete(&self, id: &str, rev: &Revision) -> StoreResult<WriteOutcome> {
        let mut url = self.doc_url(id);
        url.query_pairs_mut().append_pair("rev", rev.as_str());
        let resp = self.send(self.request(Method::DELETE, url)).await?;
        if resp.status() == StatusCode::CONFLICT {
            return Ok(WriteOutcome::Conflict);
        }
        let reply: WriteReply = check(resp, id).await?.json().await?;
        Ok(WriteOutcome::Written(Revision::new(reply.rev)))
    }

    #[instrument(level = "trace", skip(self, query), fields(view = %view))]
    async fn query(&self, view: ViewName, query: &ViewQuery) -> StoreResult<Vec<Document>> {
        let reply = self.view(view, view_params(query)).await?;
        reply
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .filter(|doc| !doc.is_null())
            .map(split_document)
            .collect()
    }

    async fn counts(&self, view: ViewName) -> StoreResult<BTreeMap<String, u64>> {
        if !view.is_reduce() {
            return Err(StoreError::Invalid(format!("view '{view}' has no reduce")));
        }
        let reply = self.view(view, vec![("group", "true".to_string())]).await?;
        let mut out = BTreeMap::new();
        for row in reply.rows {
            let key = match row.key {
                Value::String(s) => s,
                other => other.to_string(),
            };
            out.insert(key, row.value.as_u64().unwrap_or(0));
        }
        Ok(out)
    }

    async fn ensure_views(&self) -> StoreResult<()> {
        self.ensure_database().await?;

        let wanted = design_document();
        let current = self.read_doc(crate::DESIGN_DOC_ID).await?;
        let body = match current {
            Some(doc) if doc.body.get("views") == wanted.get("views") => {
                debug!("views up to date");
                return Ok(());
            }
            Some(doc) => with_rev(wanted, &doc.rev)?,
            None => wanted,
        };

        match self.put(crate::DESIGN_DOC_ID, body).await? {
            WriteOutcome::Written(rev) => {
                info!(rev = %rev, "views written");
                Ok(())
            }
            WriteOutcome::Conflict => Err(StoreError::Transient(
                "design document changed concurrently".into(),
            )),
        }
    }
}

//! Named views over the database.
//!
//! Every view is a map from a document body to at most one key. The same definitions
//! exist twice: as Rust closures for [`crate::MemoryStore`] and as JavaScript for the
//! CouchDB design document. Keep both in sync when adding a view.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};

use pilot_model::{DOC_TYPE_FIELD, DocType, JobState, TaskState};

use crate::error::StoreError;

/// Design document holding all views.
pub const DESIGN_DOC_ID: &str = "_design/Monitor";

pub(crate) const DESIGN_DOC_NAME: &str = "Monitor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewName {
    Todo,
    Locked,
    Done,
    Error,
    /// Task count per state (reduce view).
    Overview,
    /// Jobs in `submitted` or `running`, keyed by submission time.
    ActiveJobs,
    /// Token markers, keyed by token id.
    Tokens,
}

impl ViewName {
    pub const ALL: [ViewName; 7] = [
        ViewName::Todo,
        ViewName::Locked,
        ViewName::Done,
        ViewName::Error,
        ViewName::Overview,
        ViewName::ActiveJobs,
        ViewName::Tokens,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewName::Todo => "todo",
            ViewName::Locked => "locked",
            ViewName::Done => "done",
            ViewName::Error => "error",
            ViewName::Overview => "overview",
            ViewName::ActiveJobs => "active_jobs",
            ViewName::Tokens => "tokens",
        }
    }

    pub fn is_reduce(&self) -> bool {
        matches!(self, ViewName::Overview)
    }

    /// Key emitted for `body`, or `None` when the document is not in the view.
    pub fn map(&self, body: &Value) -> Option<Value> {
        let doc_type = body.get(DOC_TYPE_FIELD).and_then(Value::as_str)?;
        match self {
            ViewName::Todo | ViewName::Locked | ViewName::Done | ViewName::Error => {
                let state = self.task_state()?;
                (doc_type == DocType::Task.as_str()
                    && body.get("state").and_then(Value::as_str) == Some(state.as_str()))
                .then(|| body.get("created_at").cloned().unwrap_or(Value::Null))
            }
            ViewName::Overview => (doc_type == DocType::Task.as_str())
                .then(|| body.get("state").cloned())
                .flatten(),
            ViewName::ActiveJobs => {
                if doc_type != DocType::Job.as_str() {
                    return None;
                }
                let state: JobState = body
                    .get("submission_state")
                    .and_then(Value::as_str)?
                    .parse()
                    .ok()?;
                state
                    .is_active()
                    .then(|| body.get("submitted_at").cloned().unwrap_or(Value::Null))
            }
            ViewName::Tokens => (doc_type == DocType::Token.as_str())
                .then(|| body.get("token_id").cloned())
                .flatten(),
        }
    }

    fn task_state(&self) -> Option<TaskState> {
        match self {
            ViewName::Todo => Some(TaskState::Todo),
            ViewName::Locked => Some(TaskState::Locked),
            ViewName::Done => Some(TaskState::Done),
            ViewName::Error => Some(TaskState::Error),
            _ => None,
        }
    }

    fn javascript(&self) -> String {
        match self {
            ViewName::Todo | ViewName::Locked | ViewName::Done | ViewName::Error => format!(
                "function (doc) {{ if (doc.type === 'task' && doc.state === '{}') {{ emit(doc.created_at, null); }} }}",
                self.as_str()
            ),
            ViewName::Overview => {
                "function (doc) { if (doc.type === 'task') { emit(doc.state, 1); } }".to_string()
            }
            ViewName::ActiveJobs => "function (doc) { if (doc.type === 'job' && (doc.submission_state === 'submitted' || doc.submission_state === 'running')) { emit(doc.submitted_at, null); } }".to_string(),
            ViewName::Tokens => {
                "function (doc) { if (doc.type === 'token') { emit(doc.token_id, null); } }".to_string()
            }
        }
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        ViewName::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| StoreError::Invalid(format!("unknown view: {s}")))
    }
}

/// Range and paging options for [`crate::DocumentStore::query`].
///
/// Keys are inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewQuery {
    pub start_key: Option<Value>,
    pub end_key: Option<Value>,
    pub limit: Option<usize>,
    pub skip: usize,
}

impl ViewQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_range(mut self, start: Option<Value>, end: Option<Value>) -> Self {
        self.start_key = start;
        self.end_key = end;
        self
    }

    /// Whether `key` falls within the range.
    pub fn contains(&self, key: &Value) -> bool {
        let above = self
            .start_key
            .as_ref()
            .is_none_or(|s| collate(key, s) != Ordering::Less);
        let below = self
            .end_key
            .as_ref()
            .is_none_or(|e| collate(key, e) != Ordering::Greater);
        above && below
    }
}

/// CouchDB key collation: null < false < true < numbers < strings < arrays < objects.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(false) => 1,
            Value::Bool(true) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Object(_) => 6,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = collate(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Body of the `_design/Monitor` document.
pub fn design_document() -> Value {
    let mut views = serde_json::Map::new();
    for view in ViewName::ALL {
        let mut def = json!({ "map": view.javascript() });
        if view.is_reduce() {
            def["reduce"] = json!("_count");
        }
        views.insert(view.as_str().to_string(), def);
    }
    json!({
        "language": "javascript",
        "views": views,
    })
}

mod error;
pub use error::{StoreError, StoreResult};

mod document;
pub use document::{DocId, Document, Revision, WriteOutcome};

mod views;
pub use views::{DESIGN_DOC_ID, ViewName, ViewQuery, collate, design_document};

mod store;
pub use store::{DocumentStore, StoreRef};

mod memory;
pub use memory::MemoryStore;

mod couch;
pub use couch::{CouchConfig, CouchStore};

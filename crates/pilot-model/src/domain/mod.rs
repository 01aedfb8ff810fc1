mod kv;
pub use kv::KeyValue;

mod env;
pub use env::Env;

mod flag;
pub use flag::Flag;

mod constants;
pub use constants::{
    DOC_TYPE_FIELD, ENV_INPUT_FILE, ENV_JOB_ID, ENV_OUTPUT_DIR, ENV_TASK_ID, ENV_TMP_DIR,
    TASK_DOC_PREFIX, TOKEN_DOC_PREFIX,
};

mod doc_type;
pub use doc_type::DocType;

/// Timeout value in milliseconds.
pub type TimeoutMs = u64;

/// Wall-clock instant stored in documents, as seconds since the unix epoch.
pub type UnixSeconds = i64;

mod domain;
pub use domain::{
    DOC_TYPE_FIELD, DocType, ENV_INPUT_FILE, ENV_JOB_ID, ENV_OUTPUT_DIR, ENV_TASK_ID, ENV_TMP_DIR,
    TASK_DOC_PREFIX, TOKEN_DOC_PREFIX,
};
pub use domain::{Env, Flag, KeyValue, TimeoutMs, UnixSeconds};

mod error;
pub use error::{ModelError, ModelResult};

mod task;
pub use task::{TaskCommand, TaskDoc, TaskResult, TaskState, TokenId};

mod job;
pub use job::{JobDoc, JobState, RemoteStatus};

mod profile;
pub use profile::{ClusterProfile, ProcessLimits, Transport};

mod strategy;
pub use strategy::{BackoffStrategy, JitterStrategy};

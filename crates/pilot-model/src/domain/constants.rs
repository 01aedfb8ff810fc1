//! Well-known document fields and environment variable names.
//!
//! Views, the pilot runner and the submission scripts all agree on these strings;
//! keep them here instead of scattering literals across crates.

/// Body field holding the [`crate::DocType`] discriminator.
pub const DOC_TYPE_FIELD: &str = "type";

/// Id prefix of token marker documents (`token:<token_id>`).
pub const TOKEN_DOC_PREFIX: &str = "token:";

/// Id prefix of task documents (`task:<token_id>:<index>`).
pub const TASK_DOC_PREFIX: &str = "task:";

/// Job id handed to a pilot started by a submission backend.
pub const ENV_JOB_ID: &str = "PILOT_JOB_ID";

/// Id of the task a command is running for.
pub const ENV_TASK_ID: &str = "PILOT_TASK_ID";

/// Per-task scratch directory.
pub const ENV_TMP_DIR: &str = "PILOT_TMP_DIR";

/// JSON file holding the task `input`.
pub const ENV_INPUT_FILE: &str = "PILOT_INPUT_FILE";

/// Directory the command should write its outputs into.
pub const ENV_OUTPUT_DIR: &str = "PILOT_OUTPUT_DIR";

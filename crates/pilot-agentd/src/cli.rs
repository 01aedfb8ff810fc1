use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "pilot")]
#[command(about = "Pilot-job task queue on a shared document store", long_about = None)]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "PILOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the configured log filter (e.g. "debug" or "pilot_core=trace,info")
    #[arg(long, global = true, env = "PILOT_LOG")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the database and its views
    Init,

    /// Add tasks to the queue under a fresh token
    Enqueue(EnqueueArgs),

    /// Submit a pilot job to a configured cluster
    Submit {
        /// Cluster name from the configuration
        cluster: String,

        /// Do not submit when this many jobs are already active on the cluster
        #[arg(long, default_value_t = 1)]
        max: usize,

        /// Submit even without queued work or with enough active jobs
        #[arg(long)]
        force: bool,
    },

    /// Task counts per state
    Status,

    /// Documents in a view
    List {
        /// todo, locked, done, error, active_jobs or tokens
        view: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        skip: usize,
    },

    /// Print one document
    Get {
        id: String,
    },

    /// Claim and execute tasks until the queue or the budget runs out
    Run(RunArgs),

    /// Return expired locks to todo
    Scrub {
        /// Lock age that counts as expired (defaults to queue.lock_expiry_secs)
        #[arg(long)]
        older_than_secs: Option<u64>,
    },

    /// Cancel a pilot job and stop its runner at the next task boundary
    Cancel {
        job: String,
    },

    /// Poll the scheduler for every active job, then fail locked tasks of stopped jobs
    Check {
        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete documents by id, or every document a view lists
    Delete {
        #[arg(required_unless_present = "view", conflicts_with = "view")]
        ids: Vec<String>,

        /// todo, locked, done, error, active_jobs or tokens
        #[arg(long)]
        view: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct EnqueueArgs {
    /// Program followed by its arguments; a single argument is run through `sh -c`
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Batch token; reusing one fails
    #[arg(long)]
    pub token: String,

    /// Number of copies to enqueue
    #[arg(short = 'n', long = "count", default_value_t = 1)]
    pub count: usize,

    /// JSON file staged as each task's input
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Per-task budget
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Extra environment, KEY=VALUE
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Job this runner belongs to
    #[arg(long, env = "PILOT_JOB_ID", conflicts_with = "local")]
    pub job_id: Option<String>,

    /// Run under a freshly generated local job record
    #[arg(long)]
    pub local: bool,

    /// Wall-clock budget; defaults to the job's cluster max-time
    #[arg(long)]
    pub minutes: Option<u64>,

    /// Keep polling an empty queue instead of exiting
    #[arg(long)]
    pub endless: bool,

    /// Poll interval for --endless
    #[arg(long, default_value_t = 30_000)]
    pub poll_ms: u64,

    /// Stop when the average task duration times this exceeds the remaining budget
    #[arg(long)]
    pub margin: Option<f64>,

    /// Write Prometheus metrics here when the run ends
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

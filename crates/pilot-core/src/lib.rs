//! Queue semantics, job records and the pilot runner loop.
//!
//! Everything here talks to storage through [`pilot_store::DocumentStore`] and to
//! clusters through [`SubmissionBackend`]; concrete process execution and remote
//! transports live in `pilot-exec`.
mod error;
pub use error::{CoreError, CoreResult};

mod clock;
pub use clock::{Clock, ClockRef, ManualClock, SystemClock, system_clock};

mod ident;
pub use ident::{host_name, runner_id};

mod retry;
pub use retry::Retry;

mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoOpMetrics, TaskOutcome, noop_metrics};

mod queue;
pub use queue::{DeleteReport, ORPHANED_DIAGNOSTIC, OrphanReport};
pub use queue::{LockOwner, NewTask, Overview, QueueConfig, ScrubReport, TaskQueue, TaskRecord};

mod job;
pub use job::{BackendError, BackendRef, CANCELLED_DIAGNOSTIC, Cluster, ClusterSet, JobCheck};
pub use job::{JobManager, JobRecord};
pub use job::{RemoteJobId, SubmissionBackend};

mod pilot;
pub use pilot::{Execution, ExecutorRef, TaskExecutor};
pub use pilot::{IdlePolicy, PilotRunner, RunSummary, RunnerConfig, StopReason};

//! Job records: one document per pilot-job submission.
mod backend;
pub use backend::{BackendError, BackendRef, RemoteJobId, SubmissionBackend};

mod cluster;
pub use cluster::{Cluster, ClusterSet};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use pilot_model::{JobDoc, JobState, ModelResult};
use pilot_store::{DocId, Revision, StoreError, StoreRef, ViewName, ViewQuery, WriteOutcome};

use crate::queue::{has_todo, to_body};
use crate::{ClockRef, CoreError, CoreResult, Retry};

const CONFLICT_ROUNDS: usize = 5;

/// Diagnostic stored on jobs stopped through [`JobManager::cancel`].
pub const CANCELLED_DIAGNOSTIC: &str = "cancelled";

/// Decoded job document with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub id: DocId,
    pub rev: Revision,
    pub job: JobDoc,
}

/// Result of polling one active job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobCheck {
    pub id: DocId,
    pub cluster: String,
    /// State after the poll was applied.
    pub state: JobState,
    /// Scheduler's answer, verbatim.
    pub remote_status: Option<String>,
    /// Why the job could not be polled this pass.
    pub error: Option<String>,
}

/// Job records and the cluster backends that act on them.
#[derive(Clone)]
pub struct JobManager {
    store: StoreRef,
    retry: Retry,
    clock: ClockRef,
    clusters: ClusterSet,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("clusters", &self.clusters)
            .finish_non_exhaustive()
    }
}

impl JobManager {
    pub fn new(store: StoreRef, retry: Retry, clock: ClockRef, clusters: ClusterSet) -> Self {
        Self {
            store,
            retry,
            clock,
            clusters,
        }
    }

    pub fn clusters(&self) -> &ClusterSet {
        &self.clusters
    }

    /// Read one job record; [`CoreError::NotFound`] when there is none.
    pub async fn get(&self, id: &str) -> CoreResult<JobRecord> {
        let doc = match self.retry.run("get job", || self.store.get(id)).await {
            Err(CoreError::Store(StoreError::NotFound(_))) => {
                return Err(CoreError::NotFound(id.to_string()));
            }
            other => other?,
        };
        let job = doc.decode()?;
        Ok(JobRecord {
            id: doc.id,
            rev: doc.rev,
            job,
        })
    }

    /// Jobs in `submitted` or `running`, oldest first.
    pub async fn list_active(&self) -> CoreResult<Vec<JobRecord>> {
        let query = ViewQuery::all();
        let docs = self
            .retry
            .run("query active jobs", || self.store.query(ViewName::ActiveJobs, &query))
            .await?;
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            match doc.decode::<JobDoc>() {
                Ok(job) => out.push(JobRecord {
                    id: doc.id,
                    rev: doc.rev,
                    job,
                }),
                Err(e) => warn!(job = %doc.id, error = %e, "skipping undecodable job"),
            }
        }
        Ok(out)
    }

    /// Create a job record, submit it, and persist the remote handle before returning.
    ///
    /// A rejected submission leaves the record `failed` with the backend diagnostic.
    /// An ambiguous one stays `submitted` with the diagnostic attached, for `check`
    /// or an operator to resolve.
    #[instrument(level = "debug", skip(self))]
    pub async fn submit(&self, cluster_name: &str) -> CoreResult<JobRecord> {
        let cluster = self.clusters.get(cluster_name)?;
        cluster
            .profile
            .validate()
            .map_err(|e| CoreError::Config(format!("cluster '{cluster_name}': {e}")))?;

        let job = JobDoc::new(
            cluster_name,
            Some(cluster.profile.transport),
            Some(cluster.profile.host.clone()),
            self.clock.now(),
        );
        let body = to_body(&job)?;
        let (id, _) = self
            .retry
            .run("create job", || self.store.create(body.clone()))
            .await?;
        info!(job = %id, cluster = cluster_name, backend = cluster.backend.name(), "submitting job");

        let submitted = self
            .retry
            .run_untimed("submit job", || cluster.backend.submit(&id, &cluster.profile))
            .await;

        match submitted {
            Ok(remote) => {
                let record = self
                    .modify(&id, |job| {
                        job.remote_job_id = Some(remote.to_string());
                        Ok(true)
                    })
                    .await?;
                info!(job = %id, remote = %remote, "job submitted");
                Ok(record)
            }
            Err(CoreError::Backend(BackendError::Ambiguous(diag))) => {
                warn!(job = %id, diagnostic = %diag, "submission outcome unknown");
                let note = diag.clone();
                self.modify(&id, |job| {
                    job.diagnostic = Some(note.clone());
                    Ok(true)
                })
                .await?;
                Err(BackendError::Ambiguous(diag).into())
            }
            Err(err) => {
                let diagnostic = match &err {
                    CoreError::Backend(b) => b.diagnostic().to_string(),
                    other => other.to_string(),
                };
                warn!(job = %id, diagnostic = %diagnostic, "submission failed");
                let now = self.clock.now();
                self.modify(&id, |job| job.mark_failed(diagnostic.clone(), now))
                    .await?;
                Err(err)
            }
        }
    }

    /// Submit only when there is queued work and fewer than `max_jobs` active jobs
    /// on `cluster_name`. `force` skips both checks.
    pub async fn submit_if_needed(
        &self,
        cluster_name: &str,
        max_jobs: usize,
        force: bool,
    ) -> CoreResult<Option<JobRecord>> {
        if !force {
            if !has_todo(&self.store, &self.retry).await? {
                debug!(cluster = cluster_name, "no queued tasks, not submitting");
                return Ok(None);
            }
            let active = self
                .list_active()
                .await?
                .into_iter()
                .filter(|r| r.job.cluster_name == cluster_name)
                .count();
            if active >= max_jobs {
                debug!(cluster = cluster_name, active, max_jobs, "enough jobs active");
                return Ok(None);
            }
        }
        self.submit(cluster_name).await.map(Some)
    }

    /// Mark `job_id` running, creating the record for runners started outside a backend.
    pub async fn start(&self, job_id: &str, host: &str) -> CoreResult<JobRecord> {
        let now = self.clock.now();
        if let Err(CoreError::NotFound(_)) = self.get(job_id).await {
            let body = to_body(&JobDoc::local(Some(host.to_string()), now))?;
            let outcome = self
                .retry
                .run("create job", || self.store.create_with_id(job_id, body.clone()))
                .await?;
            if !outcome.is_conflict() {
                info!(job = %job_id, "created job record for local runner");
            }
        }
        self.modify(job_id, |job| job.mark_running(Some(host.to_string()), now))
            .await
    }

    /// Mark `job_id` finished once its runner has left the loop.
    pub async fn finish(&self, job_id: &str) -> CoreResult<JobRecord> {
        let now = self.clock.now();
        self.modify(job_id, |job| job.mark_finished(now)).await
    }

    /// Whether someone asked `job_id` to stop. A job without a record was not.
    pub async fn cancel_requested(&self, job_id: &str) -> CoreResult<bool> {
        match self.get(job_id).await {
            Ok(r) => Ok(r.job.is_cancel_requested()),
            Err(CoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Stop a job: record the request, cancel remotely, mark it failed.
    ///
    /// Tasks the job's runner holds stay `locked` until it releases them on shutdown
    /// or the reaper expires them.
    #[instrument(level = "debug", skip(self))]
    pub async fn cancel(&self, job_id: &str) -> CoreResult<JobRecord> {
        let now = self.clock.now();
        let record = self
            .modify(job_id, |job| {
                let first = !job.is_cancel_requested();
                job.request_cancel(now);
                Ok(first)
            })
            .await?;
        if !record.job.submission_state.is_active() {
            return Ok(record);
        }

        if let Some(remote) = record.job.remote_job_id.as_deref() {
            let cluster = self.clusters.get(&record.job.cluster_name)?;
            let remote = RemoteJobId::new(remote);
            self.retry
                .run("cancel job", || cluster.backend.cancel(&remote, &cluster.profile))
                .await?;
            info!(job = %job_id, remote = %remote, "remote job cancelled");
        }

        self.modify(job_id, |job| job.mark_failed(CANCELLED_DIAGNOSTIC, now))
            .await
    }

    /// Poll every active job with a remote handle and fold the answers into the records.
    ///
    /// Failures to poll one job are reported in its [`JobCheck`] and do not stop the pass.
    /// With `dry_run` the records are left alone and each entry shows the state the
    /// job would move to.
    pub async fn check(&self, dry_run: bool) -> CoreResult<Vec<JobCheck>> {
        let mut out = Vec::new();
        for record in self.list_active().await? {
            let mut entry = JobCheck {
                id: record.id.clone(),
                cluster: record.job.cluster_name.clone(),
                state: record.job.submission_state,
                remote_status: None,
                error: None,
            };
            let Some(remote) = record.job.remote_job_id.as_deref().map(RemoteJobId::new) else {
                out.push(entry);
                continue;
            };
            let cluster = match self.clusters.get(&record.job.cluster_name) {
                Ok(c) => c,
                Err(e) => {
                    entry.error = Some(e.to_string());
                    out.push(entry);
                    continue;
                }
            };

            let status = self
                .retry
                .run("poll job", || cluster.backend.poll(&remote, &cluster.profile))
                .await;
            match status {
                Ok(status) => {
                    let now = self.clock.now();
                    entry.state = if dry_run {
                        let mut job = record.job.clone();
                        job.apply_remote(&status, now);
                        job.submission_state
                    } else {
                        self.modify(&record.id, |job| {
                            job.apply_remote(&status, now);
                            Ok(true)
                        })
                        .await?
                        .job
                        .submission_state
                    };
                    if status.is_unknown() {
                        warn!(job = %record.id, status = %status, "unrecognized remote status");
                    }
                    entry.remote_status = Some(status.to_string());
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(job = %record.id, error = %e, "poll failed");
                    entry.error = Some(e.to_string());
                }
            }
            out.push(entry);
        }
        Ok(out)
    }

    /// Read-modify-write with conflict retry. `change` returns whether it changed anything.
    async fn modify<F>(&self, id: &str, mut change: F) -> CoreResult<JobRecord>
    where
        F: FnMut(&mut JobDoc) -> ModelResult<bool>,
    {
        for round in 0..CONFLICT_ROUNDS {
            let mut record = self.get(id).await?;
            if !change(&mut record.job)? {
                return Ok(record);
            }
            let body = to_body(&record.job)?;
            let outcome = self
                .retry
                .run("update job", || self.store.update(id, &record.rev, body.clone()))
                .await?;
            match outcome {
                WriteOutcome::Written(rev) => {
                    record.rev = rev;
                    return Ok(record);
                }
                WriteOutcome::Conflict => debug!(job = %id, round, "job write conflict, re-reading"),
            }
        }
        Err(CoreError::Contended(id.to_string()))
    }
}

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, bail};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use pilot_core::{
    ExecutorRef, IdlePolicy, JobManager, JobRecord, LockOwner, MetricsHandle, NewTask,
    PilotRunner, TaskQueue, system_clock,
};
use pilot_exec::{SubprocessConfig, SubprocessExecutor};
use pilot_model::{ClusterProfile, Env, TaskCommand, TokenId};
use pilot_prometheus::PrometheusMetrics;
use pilot_store::{CouchStore, DocId, Document, StoreRef, ViewName};

use crate::cli::{EnqueueArgs, RunArgs};
use crate::config::AgentConfig;

/// Prefix of job ids minted by `run --local`.
pub const LOCAL_JOB_PREFIX: &str = "local-";

/// Everything a subcommand needs, wired from one configuration.
pub struct Context {
    config: AgentConfig,
    store: StoreRef,
    queue: TaskQueue,
    jobs: JobManager,
}

impl Context {
    /// Wire against the configured CouchDB server.
    pub fn connect(config: AgentConfig) -> anyhow::Result<Self> {
        let store = CouchStore::new(config.store.clone()).context("store client")?;
        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: AgentConfig, store: StoreRef) -> anyhow::Result<Self> {
        let retry = config.retry();
        let clock = system_clock();
        let queue = TaskQueue::new(store.clone(), retry, clock.clone(), config.queue);
        let jobs = JobManager::new(store.clone(), retry, clock, config.cluster_set()?);
        Ok(Self {
            config,
            store,
            queue,
            jobs,
        })
    }

    pub async fn init(&self) -> anyhow::Result<Value> {
        self.store.ensure_views().await.context("create views")?;
        info!(database = %self.config.store.database, "views ready");
        Ok(json!({ "views": ViewName::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>() }))
    }

    pub async fn enqueue(&self, args: &EnqueueArgs) -> anyhow::Result<Value> {
        let token = TokenId::new(args.token.as_str())?;
        let template = new_task(args).await?;
        let tasks = vec![template; args.count.max(1)];
        let ids = self.queue.enqueue(&token, tasks).await?;
        Ok(json!({ "token": token.as_str(), "tasks": ids }))
    }

    pub async fn submit(&self, cluster: &str, max: usize, force: bool) -> anyhow::Result<Value> {
        match self.jobs.submit_if_needed(cluster, max, force).await? {
            Some(record) => Ok(job_json(&record)),
            None => {
                info!(cluster, "nothing submitted");
                Ok(Value::Null)
            }
        }
    }

    pub async fn status(&self) -> anyhow::Result<Value> {
        let overview = self.queue.overview().await?;
        info!(%overview, "queue");
        Ok(json!({
            "todo": overview.todo,
            "locked": overview.locked,
            "done": overview.done,
            "error": overview.error,
            "total": overview.total(),
        }))
    }

    pub async fn list(&self, view: &str, limit: Option<usize>, skip: usize) -> anyhow::Result<Value> {
        let view: ViewName = view.parse()?;
        if view.is_reduce() {
            bail!("view '{}' only holds counts; use `status`", view.as_str());
        }
        let docs = self.queue.list(view, limit, skip).await?;
        Ok(Value::Array(docs.iter().map(document_json).collect()))
    }

    pub async fn get(&self, id: &str) -> anyhow::Result<Value> {
        let doc = self
            .store
            .get(id)
            .await
            .with_context(|| format!("get {id}"))?;
        Ok(document_json(&doc))
    }

    pub async fn run(&self, args: &RunArgs, shutdown: CancellationToken) -> anyhow::Result<Value> {
        let job = if args.local {
            Some(format!("{LOCAL_JOB_PREFIX}{}", Uuid::new_v4()))
        } else {
            args.job_id.clone()
        };

        let mut config = self.config.runner;
        if let Some(margin) = args.margin {
            if !(margin.is_finite() && margin >= 0.0) {
                bail!("--margin must be a non-negative number");
            }
            config.margin = margin;
        }
        let cluster = self.job_cluster(job.as_deref()).await;
        if let Some(secs) = self.budget_secs(args, cluster) {
            config = config.with_budget_secs(secs);
        }
        if args.endless {
            config = config.with_idle(IdlePolicy::Poll {
                interval_ms: args.poll_ms,
            });
        }

        let executor: ExecutorRef = Arc::new(SubprocessExecutor::new(self.executor_config(cluster))?);
        let owner = LockOwner::generate(job.clone());
        let mut runner = PilotRunner::new(self.queue.clone(), self.jobs.clone(), executor, owner, config);

        let metrics_file = args.metrics_file.clone().or_else(|| self.config.metrics_file.clone());
        let prometheus = match &metrics_file {
            Some(_) => {
                let metrics = Arc::new(PrometheusMetrics::new().context("metrics registry")?);
                runner = runner.with_metrics(metrics.clone() as MetricsHandle);
                Some(metrics)
            }
            None => None,
        };

        info!(runner = %runner.owner(), budget_secs = ?config.budget_secs, "runner starting");
        let summary = runner.run(shutdown).await?;
        info!(done = summary.done, failed = summary.failed, stop = ?summary.stop, "runner finished");

        if let (Some(path), Some(metrics)) = (&metrics_file, &prometheus) {
            write_metrics(path, metrics).await?;
        }

        Ok(json!({
            "runner": runner.owner().runner,
            "job": job,
            "summary": summary,
        }))
    }

    /// Profile of the cluster `job` was submitted to, when the job record and the
    /// cluster are both known.
    async fn job_cluster(&self, job: Option<&str>) -> Option<&ClusterProfile> {
        let job = job?;
        if job.starts_with(LOCAL_JOB_PREFIX) {
            return None;
        }
        let record = match self.jobs.get(job).await {
            Ok(record) => record,
            Err(e) => {
                warn!(job, error = %e, "job record unavailable, using configured budget and limits");
                return None;
            }
        };
        match self.jobs.clusters().get(&record.job.cluster_name) {
            Ok(cluster) => Some(&cluster.profile),
            Err(_) => {
                warn!(job, cluster = %record.job.cluster_name, "job's cluster is not configured");
                None
            }
        }
    }

    /// `--minutes` wins; otherwise the max-time of the job's cluster, then the configured budget.
    fn budget_secs(&self, args: &RunArgs, cluster: Option<&ClusterProfile>) -> Option<u64> {
        if let Some(minutes) = args.minutes {
            return Some(minutes.saturating_mul(60));
        }
        match cluster {
            Some(profile) => Some(profile.max_time_secs()),
            None => self.config.runner.budget_secs,
        }
    }

    /// Executor settings with the cluster's resource limits layered over the configured ones.
    fn executor_config(&self, cluster: Option<&ClusterProfile>) -> SubprocessConfig {
        let config = self.config.executor.clone();
        match cluster.and_then(|p| p.limits.as_ref()) {
            Some(limits) => {
                let limits = config.limits.overlaid(limits);
                config.with_limits(limits)
            }
            None => config,
        }
    }

    pub async fn scrub(&self, older_than_secs: Option<u64>) -> anyhow::Result<Value> {
        let report = self
            .queue
            .scrub(older_than_secs.map(std::time::Duration::from_secs))
            .await?;
        Ok(serde_json::to_value(report)?)
    }

    pub async fn cancel(&self, job: &str) -> anyhow::Result<Value> {
        let record = self.jobs.cancel(job).await?;
        Ok(job_json(&record))
    }

    /// Job pass first, so tasks of jobs it finds stopped are failed in the same run.
    pub async fn check(&self, dry_run: bool) -> anyhow::Result<Value> {
        let checks = self.jobs.check(dry_run).await?;
        for c in checks.iter().filter(|c| c.error.is_some()) {
            warn!(job = %c.id, cluster = %c.cluster, error = ?c.error, "poll failed");
        }
        let stopping: HashSet<DocId> = checks
            .iter()
            .filter(|c| !c.state.is_active())
            .map(|c| c.id.clone())
            .collect();
        let orphans = self.queue.fail_orphaned(&self.jobs, &stopping, dry_run).await?;
        if !orphans.failed.is_empty() {
            info!(count = orphans.failed.len(), dry_run, "tasks of stopped jobs failed");
        }
        Ok(json!({ "jobs": checks, "orphans": orphans }))
    }

    pub async fn delete(&self, ids: &[String], view: Option<&str>) -> anyhow::Result<Value> {
        if let Some(view) = view {
            let view: ViewName = view.parse()?;
            let report = self.queue.delete_view(view).await?;
            return Ok(serde_json::to_value(report)?);
        }
        let mut deleted = Vec::with_capacity(ids.len());
        for id in ids {
            self.queue
                .delete(id)
                .await
                .with_context(|| format!("delete {id}"))?;
            deleted.push(id.as_str());
        }
        Ok(json!({ "deleted": deleted, "conflicts": 0 }))
    }
}

async fn new_task(args: &EnqueueArgs) -> anyhow::Result<NewTask> {
    let command = match args.command.as_slice() {
        [line] => TaskCommand::line(line.as_str()),
        argv => TaskCommand::argv(argv.iter().cloned()),
    };
    command.validate()?;

    let mut task = NewTask::new(command).with_env(parse_env(&args.env)?);
    if let Some(path) = &args.input {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read input {}", path.display()))?;
        let input: Value =
            serde_json::from_str(&raw).with_context(|| format!("parse input {}", path.display()))?;
        task = task.with_input(input);
    }
    if let Some(ms) = args.timeout_ms {
        if ms == 0 {
            bail!("--timeout-ms must be positive");
        }
        task = task.with_timeout_ms(ms);
    }
    Ok(task)
}

fn parse_env(pairs: &[String]) -> anyhow::Result<Env> {
    let mut env = Env::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => env.push(key.trim(), value),
            _ => bail!("--env expects KEY=VALUE, got {pair:?}"),
        }
    }
    Ok(env)
}

fn document_json(doc: &Document) -> Value {
    json!({ "id": doc.id, "rev": doc.rev.as_str(), "doc": doc.body })
}

fn job_json(record: &JobRecord) -> Value {
    json!({ "id": record.id, "rev": record.rev.as_str(), "job": record.job })
}

async fn write_metrics(path: &Path, metrics: &PrometheusMetrics) -> anyhow::Result<()> {
    let text = metrics.render().context("render metrics")?;
    // atomic replace
    let tmp = path.with_extension("prom.tmp");
    tokio::fs::write(&tmp, text)
        .await
        .with_context(|| format!("write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("rename to {}", path.display()))?;
    info!(path = %path.display(), "metrics written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_model::{JobDoc, Transport};
    use pilot_store::{DocumentStore, MemoryStore};

    fn context() -> Context {
        let store = Arc::new(MemoryStore::new());
        Context::with_store(AgentConfig::default(), store).unwrap()
    }

    fn enqueue_args(token: &str, command: &[&str], count: usize) -> EnqueueArgs {
        EnqueueArgs {
            command: command.iter().map(|s| s.to_string()).collect(),
            token: token.into(),
            count,
            input: None,
            timeout_ms: None,
            env: vec![],
        }
    }

    fn run_args() -> RunArgs {
        RunArgs {
            job_id: None,
            local: true,
            minutes: None,
            endless: false,
            poll_ms: 10,
            margin: None,
            metrics_file: None,
        }
    }

    #[tokio::test]
    async fn enqueue_then_status() {
        let ctx = context();
        ctx.init().await.unwrap();
        let out = ctx.enqueue(&enqueue_args("batch-1", &["true"], 3)).await.unwrap();
        assert_eq!(out["tasks"].as_array().unwrap().len(), 3);

        let status = ctx.status().await.unwrap();
        assert_eq!(status["todo"], 3);
        assert_eq!(status["total"], 3);

        let todo = ctx.list("todo", Some(2), 0).await.unwrap();
        assert_eq!(todo.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reused_token_is_an_error() {
        let ctx = context();
        ctx.enqueue(&enqueue_args("once", &["true"], 1)).await.unwrap();
        let err = ctx.enqueue(&enqueue_args("once", &["true"], 1)).await.unwrap_err();
        assert!(err.to_string().contains("once"), "{err}");
    }

    #[tokio::test]
    async fn overview_is_not_listable() {
        let ctx = context();
        assert!(ctx.list("overview", None, 0).await.is_err());
        assert!(ctx.list("nonsense", None, 0).await.is_err());
    }

    #[tokio::test]
    async fn unknown_cluster_is_reported() {
        let ctx = context();
        ctx.enqueue(&enqueue_args("b", &["true"], 1)).await.unwrap();
        assert!(ctx.submit("nowhere", 1, false).await.is_err());
    }

    #[tokio::test]
    async fn submit_without_work_is_null() {
        let ctx = context();
        assert_eq!(ctx.submit("nowhere", 1, false).await.unwrap(), Value::Null);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_run_drains_the_queue() {
        let ctx = context();
        ctx.enqueue(&enqueue_args("ok", &["true"], 2)).await.unwrap();
        ctx.enqueue(&enqueue_args("bad", &["exit 3"], 1)).await.unwrap();

        let out = ctx.run(&run_args(), CancellationToken::new()).await.unwrap();
        assert_eq!(out["summary"]["done"], 2);
        assert_eq!(out["summary"]["failed"], 1);
        assert_eq!(out["summary"]["stop"], "queue_empty");

        let job = out["job"].as_str().unwrap().to_string();
        assert!(job.starts_with(LOCAL_JOB_PREFIX));
        let doc = ctx.get(&job).await.unwrap();
        assert_eq!(doc["doc"]["submission_state"], "finished");

        let status = ctx.status().await.unwrap();
        assert_eq!(status["todo"], 0);
        assert_eq!(status["done"], 2);
        assert_eq!(status["error"], 1);
    }

    #[tokio::test]
    async fn shutdown_before_start_claims_nothing() {
        let ctx = context();
        ctx.enqueue(&enqueue_args("s", &["true"], 1)).await.unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let out = ctx.run(&run_args(), shutdown).await.unwrap();
        assert_eq!(out["summary"]["stop"], "shutdown");
        assert_eq!(ctx.status().await.unwrap()["todo"], 1);
    }

    #[tokio::test]
    async fn minutes_override_the_budget() {
        let ctx = context();
        let mut args = run_args();
        args.minutes = Some(2);
        assert_eq!(ctx.budget_secs(&args, None), Some(120));
        args.minutes = None;
        assert_eq!(ctx.budget_secs(&args, None), None);
        assert!(ctx.job_cluster(Some("local-x")).await.is_none());
        assert!(ctx.job_cluster(Some("missing-job")).await.is_none());
    }

    #[tokio::test]
    async fn submitted_job_runs_under_its_cluster_limits() {
        let raw = r#"{
            "executor": {"limits": {"cpu-seconds": 600, "max-open-files": 4096}},
            "clusters": {"lisa": {"transport": "ssh", "host": "h", "script": "s", "path": "/p",
                                  "max-time": 5, "limits": {"max-open-files": 64}}}
        }"#;
        let store = Arc::new(MemoryStore::new());
        let ctx = Context::with_store(AgentConfig::from_json(raw).unwrap(), store.clone()).unwrap();
        let job = JobDoc::new("lisa", Some(Transport::Ssh), Some("h".into()), 0);
        store
            .create_with_id("job-7", serde_json::to_value(&job).unwrap())
            .await
            .unwrap();

        let cluster = ctx.job_cluster(Some("job-7")).await;
        assert!(cluster.is_some());
        let exec = ctx.executor_config(cluster);
        assert_eq!(exec.limits.max_open_files, Some(64));
        assert_eq!(exec.limits.cpu_seconds, Some(600));
        assert_eq!(ctx.budget_secs(&run_args(), cluster), Some(300));

        // Local runs keep the configured limits untouched.
        let local = ctx.executor_config(ctx.job_cluster(Some("local-x")).await);
        assert_eq!(local.limits.max_open_files, Some(4096));
    }

    #[tokio::test]
    async fn scrub_on_empty_queue() {
        let ctx = context();
        let out = ctx.scrub(Some(60)).await.unwrap();
        assert_eq!(out["released"], json!([]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn metrics_file_is_written() {
        let dir = std::env::temp_dir().join(format!("pilot-metrics-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pilot.prom");

        let ctx = context();
        ctx.enqueue(&enqueue_args("m", &["true"], 1)).await.unwrap();
        let mut args = run_args();
        args.metrics_file = Some(path.clone());
        ctx.run(&args, CancellationToken::new()).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("pilot_tasks_completed_total"), "{text}");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn check_fails_tasks_of_stopped_jobs() {
        let ctx = context();
        ctx.enqueue(&enqueue_args("c", &["true"], 2)).await.unwrap();
        let job = JobDoc::new("gone", None, None, 0);
        ctx.store
            .create_with_id("job-1", serde_json::to_value(&job).unwrap())
            .await
            .unwrap();
        ctx.jobs.finish("job-1").await.unwrap();
        let owner = LockOwner::new("r1", Some("job-1".into()));
        ctx.queue.claim_next(&owner).await.unwrap().unwrap();

        let dry = ctx.check(true).await.unwrap();
        assert_eq!(dry["orphans"]["failed"].as_array().unwrap().len(), 1);
        assert_eq!(ctx.status().await.unwrap()["locked"], 1);

        let out = ctx.check(false).await.unwrap();
        assert_eq!(out["jobs"], json!([]));
        assert_eq!(out["orphans"]["failed"].as_array().unwrap().len(), 1);
        let status = ctx.status().await.unwrap();
        assert_eq!(status["locked"], 0);
        assert_eq!(status["error"], 1);
        assert_eq!(status["todo"], 1);
    }

    #[tokio::test]
    async fn delete_by_id_then_by_view() {
        let ctx = context();
        let out = ctx.enqueue(&enqueue_args("d", &["true"], 3)).await.unwrap();
        let first = out["tasks"][0].as_str().unwrap().to_string();

        let gone = ctx.delete(std::slice::from_ref(&first), None).await.unwrap();
        assert_eq!(gone["deleted"], json!([first.clone()]));
        assert!(ctx.get(&first).await.is_err());
        assert!(ctx.delete(&[first], None).await.is_err());

        let out = ctx.delete(&[], Some("todo")).await.unwrap();
        assert_eq!(out["deleted"].as_array().unwrap().len(), 2);
        assert_eq!(ctx.status().await.unwrap()["total"], 0);

        // With its marker gone the token can be used again.
        ctx.delete(&[], Some("tokens")).await.unwrap();
        ctx.enqueue(&enqueue_args("d", &["true"], 1)).await.unwrap();
        assert!(ctx.delete(&[], Some("overview")).await.is_err());
    }

    #[test]
    fn env_pairs() {
        let env = parse_env(&["A=1".into(), "B=x=y".into(), "C=".into()]).unwrap();
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.get("B"), Some("x=y"));
        assert_eq!(env.get("C"), Some(""));
        assert!(parse_env(&["novalue".into()]).is_err());
        assert!(parse_env(&["=1".into()]).is_err());
    }

    #[tokio::test]
    async fn single_argument_is_a_shell_line() {
        let args = EnqueueArgs {
            command: vec!["echo hi | wc -c".into()],
            token: "t".into(),
            count: 1,
            input: None,
            timeout_ms: Some(500),
            env: vec![],
        };
        let task = new_task(&args).await.unwrap();
        assert_eq!(task.command, TaskCommand::line("echo hi | wc -c"));
        assert_eq!(task.timeout_ms, Some(500));
    }

    #[tokio::test]
    async fn zero_timeout_is_refused() {
        let args = EnqueueArgs {
            command: vec!["true".into()],
            token: "t".into(),
            count: 1,
            input: None,
            timeout_ms: Some(0),
            env: vec![],
        };
        assert!(new_task(&args).await.is_err());
    }
}

use std::sync::Arc;

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use pilot_core::{MetricsBackend, TaskOutcome};

const NAMESPACE: &str = "pilot";

/// Runner metrics backed by a prometheus [`Registry`].
///
/// Label values are bounded: `executor` is an executor name, `outcome` one of
/// [`TaskOutcome`]'s labels, `error_kind` a short fixed category.
#[derive(Clone)]
pub struct PrometheusMetrics {
    tasks_started: IntCounterVec,
    tasks_completed: IntCounterVec,
    task_duration: HistogramVec,
    claim_conflicts: IntCounter,
    runner_errors: IntCounterVec,
    registry: Arc<Registry>,
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    pub fn with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let tasks_started = IntCounterVec::new(
            Opts::new("tasks_started_total", "Tasks claimed and handed to an executor").namespace(NAMESPACE),
            &["executor"],
        )?;
        let tasks_completed = IntCounterVec::new(
            Opts::new("tasks_completed_total", "Claimed tasks by final outcome").namespace(NAMESPACE),
            &["executor", "outcome"],
        )?;
        // Simulation tasks run from seconds to hours.
        let task_duration = HistogramVec::new(
            HistogramOpts::new("task_duration_seconds", "Wall-clock time of task commands")
                .namespace(NAMESPACE)
                .buckets(vec![1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0, 43200.0]),
            &["executor"],
        )?;
        let claim_conflicts = IntCounter::with_opts(
            Opts::new("claim_conflicts_total", "Claims lost to another runner or a stale view row")
                .namespace(NAMESPACE),
        )?;
        let runner_errors = IntCounterVec::new(
            Opts::new("runner_errors_total", "Runner-level failures not attributed to a task")
                .namespace(NAMESPACE),
            &["error_kind"],
        )?;

        registry.register(Box::new(tasks_started.clone()))?;
        registry.register(Box::new(tasks_completed.clone()))?;
        registry.register(Box::new(task_duration.clone()))?;
        registry.register(Box::new(claim_conflicts.clone()))?;
        registry.register(Box::new(runner_errors.clone()))?;

        Ok(Self {
            tasks_started,
            tasks_completed,
            task_duration,
            claim_conflicts,
            runner_errors,
            registry,
        })
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Text exposition of everything in the registry.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_task_started(&self, executor: &str) {
        self.tasks_started.with_label_values(&[executor]).inc();
    }

    fn record_task_completed(&self, executor: &str, outcome: TaskOutcome, duration_ms: u64) {
        self.tasks_completed
            .with_label_values(&[executor, outcome.as_label()])
            .inc();
        self.task_duration
            .with_label_values(&[executor])
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_claim_conflict(&self) {
        self.claim_conflicts.inc();
    }

    fn record_runner_error(&self, error_kind: &str) {
        self.runner_errors.with_label_values(&[error_kind]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families
            .iter()
            .find(|f| f.name() == name)
            .unwrap_or_else(|| panic!("{name} not registered"))
    }

    #[test]
    fn counts_tasks_per_executor_and_outcome() {
        let m = PrometheusMetrics::new().unwrap();
        m.record_task_started("subprocess");
        m.record_task_started("subprocess");
        m.record_task_completed("subprocess", TaskOutcome::Done, 1500);
        m.record_task_completed("subprocess", TaskOutcome::TimedOut, 60_000);

        let families = m.gather();
        assert_eq!(family(&families, "pilot_tasks_started_total").get_metric().len(), 1);
        assert_eq!(family(&families, "pilot_tasks_completed_total").get_metric().len(), 2);
        family(&families, "pilot_task_duration_seconds");

        let text = m.render().unwrap();
        assert!(text.contains(r#"pilot_tasks_started_total{executor="subprocess"} 2"#), "{text}");
        assert!(text.contains(r#"pilot_task_duration_seconds_count{executor="subprocess"} 2"#), "{text}");
    }

    #[test]
    fn conflicts_and_errors() {
        let m = PrometheusMetrics::new().unwrap();
        m.record_claim_conflict();
        m.record_claim_conflict();
        m.record_runner_error("lock_lost");

        let text = m.render().unwrap();
        assert!(text.contains("pilot_claim_conflicts_total 2"), "{text}");
        assert!(text.contains(r#"pilot_runner_errors_total{error_kind="lock_lost"} 1"#), "{text}");
    }

    #[test]
    fn shared_registry_rejects_duplicates() {
        let registry = Arc::new(Registry::new());
        PrometheusMetrics::with_registry(registry.clone()).unwrap();
        assert!(PrometheusMetrics::with_registry(registry).is_err());
    }
}

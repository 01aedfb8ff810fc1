use std::time::Duration;

use serde::{Deserialize, Serialize};

use pilot_model::TimeoutMs;

/// What a runner does when the `todo` view comes back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum IdlePolicy {
    /// Stop the loop.
    #[default]
    Exit,
    /// Sleep and look again until the budget runs out or the job is cancelled.
    Poll { interval_ms: u64 },
}

/// Runner loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Total wall-clock budget. `None` means unlimited.
    pub budget_secs: Option<u64>,
    /// Budget for tasks that carry no `timeout_ms`.
    pub default_task_timeout_ms: TimeoutMs,
    /// Stop early when `average task duration * margin` exceeds the remaining budget.
    pub margin: f64,
    pub idle: IdlePolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            budget_secs: None,
            default_task_timeout_ms: 60 * 60 * 1000,
            margin: 1.5,
            idle: IdlePolicy::Exit,
        }
    }
}

impl RunnerConfig {
    pub fn budget(&self) -> Option<Duration> {
        self.budget_secs.map(Duration::from_secs)
    }

    pub fn with_budget_secs(mut self, secs: u64) -> Self {
        self.budget_secs = Some(secs);
        self
    }

    pub fn with_idle(mut self, idle: IdlePolicy) -> Self {
        self.idle = idle;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_policy_is_tagged() {
        let p: IdlePolicy = serde_json::from_str(r#"{"mode": "poll", "interval_ms": 500}"#).unwrap();
        assert_eq!(p, IdlePolicy::Poll { interval_ms: 500 });
        let p: IdlePolicy = serde_json::from_str(r#"{"mode": "exit"}"#).unwrap();
        assert_eq!(p, IdlePolicy::Exit);
    }

    #[test]
    fn defaults() {
        let c: RunnerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c.margin, 1.5);
        assert!(c.budget().is_none());
        assert_eq!(c.idle, IdlePolicy::Exit);
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use pilot_model::TaskState;

/// Task counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub todo: u64,
    pub locked: u64,
    pub done: u64,
    pub error: u64,
}

impl Overview {
    pub fn from_counts(counts: &BTreeMap<String, u64>) -> Self {
        let mut out = Self::default();
        for (key, n) in counts {
            match key.parse::<TaskState>() {
                Ok(TaskState::Todo) => out.todo += n,
                Ok(TaskState::Locked) => out.locked += n,
                Ok(TaskState::Done) => out.done += n,
                Ok(TaskState::Error) => out.error += n,
                Err(_) => {}
            }
        }
        out
    }

    pub fn total(&self) -> u64 {
        self.todo + self.locked + self.done + self.error
    }

    pub fn get(&self, state: TaskState) -> u64 {
        match state {
            TaskState::Todo => self.todo,
            TaskState::Locked => self.locked,
            TaskState::Done => self.done,
            TaskState::Error => self.error,
        }
    }
}

impl fmt::Display for Overview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "todo={} locked={} done={} error={}",
            self.todo, self.locked, self.done, self.error
        )
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Lifecycle state of a task document.
///
/// ```text
/// todo ──claim──► locked ──complete──► done
///   ▲               │   └───fail─────► error
///   └──release/scrub┘
/// ```
///
/// `done` and `error` are terminal. The only way back to `todo` is an owner
/// release or the lock reaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Todo,
    Locked,
    Done,
    Error,
}

impl TaskState {
    pub const ALL: [TaskState; 4] = [
        TaskState::Todo,
        TaskState::Locked,
        TaskState::Done,
        TaskState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Todo => "todo",
            TaskState::Locked => "locked",
            TaskState::Done => "done",
            TaskState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Error)
    }

    pub fn can_transition_to(&self, to: TaskState) -> bool {
        matches!(
            (self, to),
            (TaskState::Todo, TaskState::Locked)
                | (TaskState::Locked, TaskState::Done)
                | (TaskState::Locked, TaskState::Error)
                | (TaskState::Locked, TaskState::Todo)
        )
    }

    /// Returns an error unless `self -> to` is an allowed edge.
    pub fn check_transition(&self, to: TaskState) -> ModelResult<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(ModelError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(TaskState::Todo),
            "locked" => Ok(TaskState::Locked),
            "done" => Ok(TaskState::Done),
            "error" => Ok(TaskState::Error),
            other => Err(ModelError::UnknownState(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TaskState;

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [TaskState::Done, TaskState::Error] {
            assert!(from.is_terminal());
            for to in TaskState::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn todo_only_moves_to_locked() {
        let allowed: Vec<_> = TaskState::ALL
            .into_iter()
            .filter(|to| TaskState::Todo.can_transition_to(*to))
            .collect();
        assert_eq!(allowed, vec![TaskState::Locked]);
    }

    #[test]
    fn rejected_edge_names_both_ends() {
        let err = TaskState::Done.check_transition(TaskState::Todo).unwrap_err();
        assert_eq!(err.to_string(), "invalid transition: done -> todo");
    }

    #[test]
    fn parse_and_display_agree() {
        for s in TaskState::ALL {
            assert_eq!(s.to_string().parse::<TaskState>().unwrap(), s);
        }
        assert!("LOCKED".parse::<TaskState>().is_ok());
        assert!("running".parse::<TaskState>().is_err());
    }
}

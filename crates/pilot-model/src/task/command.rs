use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Command a task runs.
///
/// Stored either as a single shell line (`"make -C run all"`, executed via `sh -c`)
/// or as an explicit argv (`["/bin/app", "--seed", "3"]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskCommand {
    Line(String),
    Argv(Vec<String>),
}

impl TaskCommand {
    pub fn line(s: impl Into<String>) -> Self {
        TaskCommand::Line(s.into())
    }

    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TaskCommand::Argv(args.into_iter().map(Into::into).collect())
    }

    pub fn validate(&self) -> ModelResult<()> {
        match self {
            TaskCommand::Line(s) if s.trim().is_empty() => {
                Err(ModelError::InvalidCommand("empty command line".into()))
            }
            TaskCommand::Argv(v) if v.is_empty() => {
                Err(ModelError::InvalidCommand("empty argv".into()))
            }
            TaskCommand::Argv(v) if v[0].trim().is_empty() => {
                Err(ModelError::InvalidCommand("empty program name".into()))
            }
            _ => Ok(()),
        }
    }

    /// Resolve into `(program, args)` ready for process spawning.
    pub fn program_and_args(&self) -> ModelResult<(String, Vec<String>)> {
        self.validate()?;
        match self {
            TaskCommand::Line(s) => Ok(("sh".to_string(), vec!["-c".to_string(), s.clone()])),
            TaskCommand::Argv(v) => Ok((v[0].clone(), v[1..].to_vec())),
        }
    }

    /// Human-readable rendering for logs and listings.
    pub fn display(&self) -> String {
        match self {
            TaskCommand::Line(s) => s.clone(),
            TaskCommand::Argv(v) => v.join(" "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_and_list_forms_both_decode() {
        let line: TaskCommand = serde_json::from_str(r#""echo hi""#).unwrap();
        assert_eq!(line, TaskCommand::line("echo hi"));

        let argv: TaskCommand = serde_json::from_str(r#"["echo","hi"]"#).unwrap();
        assert_eq!(argv, TaskCommand::argv(["echo", "hi"]));
    }

    #[test]
    fn line_goes_through_shell() {
        let (prog, args) = TaskCommand::line("exit 3").program_and_args().unwrap();
        assert_eq!(prog, "sh");
        assert_eq!(args, vec!["-c", "exit 3"]);
    }

    #[test]
    fn argv_splits_program() {
        let (prog, args) = TaskCommand::argv(["/bin/true", "-x"]).program_and_args().unwrap();
        assert_eq!(prog, "/bin/true");
        assert_eq!(args, vec!["-x"]);
    }

    #[test]
    fn empty_commands_are_rejected() {
        assert!(TaskCommand::line("   ").validate().is_err());
        assert!(TaskCommand::Argv(vec![]).validate().is_err());
        assert!(TaskCommand::argv([""]).program_and_args().is_err());
    }
}

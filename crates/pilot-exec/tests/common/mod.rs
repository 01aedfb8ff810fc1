#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

use async_trait::async_trait;

use pilot_core::TaskRecord;
use pilot_exec::{CallOutput, Launcher, RemoteCall};
use pilot_model::{TaskCommand, TaskDoc, TokenId};
use pilot_store::Revision;

/// Task already claimed by `runner-1` at t=1700000000.
pub fn claimed(id: &str, command: TaskCommand) -> TaskRecord {
    let mut task = TaskDoc::new(command, TokenId::new("tok").unwrap(), 1_699_999_000);
    task.lock("runner-1", Some("job-1"), 1_700_000_000).unwrap();
    TaskRecord {
        id: id.to_string(),
        rev: Revision::new("2-x"),
        task,
    }
}

/// Launcher that records every call and replays queued answers.
///
/// With nothing queued it answers with a successful, silent exit.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    pub calls: Mutex<Vec<RemoteCall>>,
    answers: Mutex<VecDeque<io::Result<CallOutput>>>,
}

impl ScriptedLauncher {
    pub fn answering(answers: Vec<io::Result<CallOutput>>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            answers: Mutex::new(answers.into()),
        }
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.program.clone())
            .collect()
    }

    pub fn last_args(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|c| c.args.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(&self, call: &RemoteCall) -> io::Result<CallOutput> {
        self.calls.lock().unwrap().push(call.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CallOutput::ok("")))
    }
}

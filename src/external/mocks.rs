// Scripted command executor - deterministic build/test output for scenario tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use super::command::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};

/// Replays queued outputs per program, optionally passing selected programs
/// (typically `git`) through to the real process executor.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    responses: Mutex<HashMap<String, VecDeque<Result<CommandOutput, CommandError>>>>,
    passthrough: HashSet<String>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `program` for real instead of replaying
    pub fn passthrough(mut self, program: &str) -> Self {
        self.passthrough.insert(program.to_string());
        self
    }

    /// Queue the next output for `program`
    pub fn respond(self, program: &str, output: Result<CommandOutput, CommandError>) -> Self {
        self.responses
            .lock()
            .expect("scripted executor lock poisoned")
            .entry(program.to_string())
            .or_default()
            .push_back(output);
        self
    }

    pub fn succeed(self, program: &str, stdout: &str) -> Self {
        self.respond(program, Ok(output(0, stdout, "")))
    }

    pub fn fail(self, program: &str, stdout: &str, stderr: &str) -> Self {
        self.respond(program, Ok(output(1, stdout, stderr)))
    }

    /// Every scripted (non-passthrough) command line seen so far
    pub fn invocations(&self) -> Vec<String> {
        self.invocations
            .lock()
            .expect("scripted executor lock poisoned")
            .clone()
    }
}

fn output(status_code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        status_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        duration_ms: 1,
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        working_dir: &Path,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        if self.passthrough.contains(program) {
            return ProcessCommandExecutor
                .execute(working_dir, program, args, timeout)
                .await;
        }

        self.invocations
            .lock()
            .expect("scripted executor lock poisoned")
            .push(super::command::render_command(program, args));

        let mut responses = self.responses.lock().expect("scripted executor lock poisoned");
        match responses.get_mut(program) {
            // The last queued response repeats once the queue drains
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| Ok(output(0, "", ""))),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Ok(output(0, "", ""))),
            None => Err(CommandError::CommandNotFound {
                command: program.to_string(),
            }),
        }
    }
}

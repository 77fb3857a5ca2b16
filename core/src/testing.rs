//! Test doubles shared across modules.

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::ports::{CommandRunner, CommandSpec};

#[derive(Debug, Clone)]
enum Canned {
    Stdout(String),
    Stderr(String),
    Stall,
}

/// Records every command and answers from canned responses.
///
/// Responses are keyed by a prefix of the argument list (program excluded);
/// the longest matching prefix wins. Unmatched commands succeed with no output.
#[derive(Debug, Default)]
pub(crate) struct FakeRunner {
    canned: Vec<(String, Canned)>,
    calls: Mutex<Vec<CommandSpec>>,
    stalled: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(mut self, prefix: &str, stdout: impl Into<String>) -> Self {
        self.canned
            .push((prefix.to_string(), Canned::Stdout(stdout.into())));
        self
    }

    pub(crate) fn fail(mut self, prefix: &str, stderr: impl Into<String>) -> Self {
        self.canned
            .push((prefix.to_string(), Canned::Stderr(stderr.into())));
        self
    }

    /// The first matching command never completes, like a hung
    /// `rollout status`; later matches succeed with no output.
    pub(crate) fn stall_once(mut self, prefix: &str) -> Self {
        self.canned.push((prefix.to_string(), Canned::Stall));
        self
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    /// Argument lists of every recorded call, joined with spaces.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|call| call.args.join(" "))
            .collect()
    }

    /// Index of the first recorded call starting with `prefix`.
    pub(crate) fn position(&self, prefix: &str) -> Option<usize> {
        self.commands()
            .iter()
            .position(|command| command.starts_with(prefix))
    }
}

impl CommandRunner for FakeRunner {
    async fn output(&self, command: &CommandSpec) -> Result<String> {
        self.calls.lock().push(command.clone());

        let args = command.args.join(" ");
        let canned = self
            .canned
            .iter()
            .filter(|(prefix, _)| args.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .cloned();

        match canned.map(|(_, canned)| canned) {
            Some(Canned::Stdout(stdout)) => Ok(stdout),
            Some(Canned::Stderr(stderr)) => Err(Error::CommandFailed {
                command: command.to_string(),
                code: Some(1),
                stderr,
            }),
            Some(Canned::Stall) => {
                let first = {
                    let mut stalled = self.stalled.lock();
                    let first = !stalled.contains(&args);
                    stalled.push(args);
                    first
                };
                if first {
                    std::future::pending::<()>().await;
                }
                Ok(String::new())
            }
            None => Ok(String::new()),
        }
    }
}

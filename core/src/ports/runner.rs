//! Command runner port (interface).

use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// A fully described external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Text fed to the command's stdin.
    pub stdin: Option<String>,
    /// Upper bound on how long the command may run.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The program followed by its arguments, as one vector.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Port for running external commands to completion.
///
/// Implementations fail fast: a non-zero exit becomes
/// [`Error::CommandFailed`](crate::error::Error::CommandFailed) carrying the
/// captured stderr verbatim.
pub trait CommandRunner: Send + Sync {
    /// Run a command and return its stdout.
    fn output(&self, command: &CommandSpec)
        -> impl std::future::Future<Output = Result<String>> + Send;

    /// Run a command for its side effects only.
    fn check_call(
        &self,
        command: &CommandSpec,
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        async move { self.output(command).await.map(|_| ()) }
    }
}

//! Command runner backed by real child processes.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ports::{CommandRunner, CommandSpec};

/// Runs commands with `tokio::process`, capturing stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    async fn run(command: &CommandSpec) -> Result<String> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(input) = &command.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                // Dropping closes the pipe so the command sees EOF
                drop(stdin);
            }
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if output.status.success() {
            Ok(stdout)
        } else {
            Err(Error::CommandFailed {
                command: command.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

impl CommandRunner for SystemRunner {
    async fn output(&self, command: &CommandSpec) -> Result<String> {
        debug!(command = %command, "Running");

        match command.timeout {
            Some(limit) => timeout(limit, Self::run(command))
                .await
                .map_err(|_| Error::CommandTimeout {
                    command: command.to_string(),
                    timeout: limit,
                })?,
            None => Self::run(command).await,
        }
    }
}

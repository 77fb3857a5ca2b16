//! Background process supervision for the router and SSH forwarders.

use std::process::Stdio;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ports::CommandSpec;

/// Grace period between SIGTERM and a forced kill.
const KILL_GRACE_PERIOD: Duration = Duration::from_millis(300);

/// How often exited children are reaped.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Supervised {
    name: String,
    child: Child,
}

/// Tracks long-running children; one failing takes the rest down with it.
#[derive(Default)]
pub struct ProcessSupervisor {
    children: RwLock<Vec<Supervised>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `command` in the background under `name`.
    pub fn launch(&self, name: impl Into<String>, command: &CommandSpec) -> Result<Option<u32>> {
        let name = name.into();
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        info!(name = %name, pid = ?pid, command = %command, "Launched background process");
        self.children.write().push(Supervised { name, child });
        Ok(pid)
    }

    pub fn len(&self) -> usize {
        self.children.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.read().is_empty()
    }

    /// Wait until every child has exited.
    ///
    /// The first unsuccessful exit kills the remaining children and is
    /// returned as [`Error::ProcessExited`].
    pub async fn wait_all(&self) -> Result<()> {
        loop {
            let failed = self.reap()?;
            if let Some((name, code)) = failed {
                warn!(name = %name, code = ?code, "Background process failed, stopping the rest");
                self.kill_all().await;
                return Err(Error::ProcessExited { name, code });
            }
            if self.is_empty() {
                return Ok(());
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Drop exited children, reporting the first one that failed.
    fn reap(&self) -> Result<Option<(String, Option<i32>)>> {
        let mut children = self.children.write();
        let mut failed = None;
        let mut index = 0;

        while index < children.len() {
            match children[index].child.try_wait()? {
                Some(status) => {
                    let finished = children.remove(index);
                    debug!(name = %finished.name, status = %status, "Background process exited");
                    if !status.success() && failed.is_none() {
                        failed = Some((finished.name, status.code()));
                    }
                }
                None => index += 1,
            }
        }

        Ok(failed)
    }

    /// Terminate every child: SIGTERM first, a kill after the grace period.
    pub async fn kill_all(&self) {
        let mut children = std::mem::take(&mut *self.children.write());
        if children.is_empty() {
            return;
        }

        for supervised in &mut children {
            terminate(&mut supervised.child);
        }
        sleep(KILL_GRACE_PERIOD).await;

        for mut supervised in children {
            if let Ok(None) = supervised.child.try_wait() {
                debug!(name = %supervised.name, "Force killing background process");
                let _ = supervised.child.kill().await;
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

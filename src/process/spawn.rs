//! Child process launch and handle

use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::process::kill::platform_killer;
use crate::types::ServerOptions;

/// Handle to a running analysis server process
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
}

impl ProcessHandle {
    /// OS process id, if the process is still considered alive
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the piped stdio streams; each can be taken once
    pub fn take_stdio(
        &mut self,
    ) -> (
        Option<ChildStdin>,
        Option<ChildStdout>,
        Option<ChildStderr>,
    ) {
        (
            self.child.stdin.take(),
            self.child.stdout.take(),
            self.child.stderr.take(),
        )
    }

    /// Terminate the process and every descendant it spawned
    ///
    /// Graceful protocol shutdown is not assumed to be honored; the server
    /// may have forked build or analysis workers that would otherwise be
    /// orphaned.
    pub async fn kill_tree(&mut self) {
        if let Some(pid) = self.pid {
            if let Err(err) = platform_killer().kill_tree(pid).await {
                warn!(pid, error = %err, "process-tree kill failed; killing direct child only");
            }
        }

        // backstop: make sure the direct child is dead, and reap it
        if let Err(err) = self.child.start_kill() {
            debug!(error = %err, "direct child already gone");
        }
        let _ = self.child.wait().await;
        self.pid = None;
    }
}

/// Spawn the analysis server with piped stdio
pub fn spawn_server(options: &ServerOptions) -> Result<ProcessHandle> {
    let mut cmd = Command::new(&options.executable);
    cmd.args(&options.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &options.working_dir {
        cmd.current_dir(dir);
    }

    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    let child = cmd.spawn().map_err(BridgeError::Spawn)?;
    let pid = child.id();

    info!(
        executable = %options.executable,
        pid = ?pid,
        "spawned analysis server process"
    );

    Ok(ProcessHandle { child, pid })
}

//! Process-tree termination strategies
//!
//! Killing the direct child is not enough: on Windows its children become
//! root processes, and on Unix forked workers are reparented. Each platform
//! sweeps the whole tree its own way.

use async_trait::async_trait;

use crate::error::Result;

/// Terminates a process and all of its descendants
#[async_trait]
pub trait TreeKiller: Send + Sync {
    /// Kill the tree rooted at `pid`
    async fn kill_tree(&self, pid: u32) -> Result<()>;
}

/// The strategy for the current platform
pub fn platform_killer() -> &'static dyn TreeKiller {
    #[cfg(windows)]
    {
        static KILLER: TaskkillTreeKiller = TaskkillTreeKiller;
        &KILLER
    }
    #[cfg(unix)]
    {
        static KILLER: SignalTreeKiller = SignalTreeKiller;
        &KILLER
    }
}

/// Windows: `taskkill /F /T` sweeps the tree in one call
#[cfg(windows)]
pub struct TaskkillTreeKiller;

#[cfg(windows)]
#[async_trait]
impl TreeKiller for TaskkillTreeKiller {
    async fn kill_tree(&self, pid: u32) -> Result<()> {
        use crate::error::BridgeError;

        let output = tokio::process::Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .output()
            .await?;

        if !output.status.success() {
            return Err(BridgeError::Io(std::io::Error::other(format!(
                "taskkill exited with {}",
                output.status
            ))));
        }

        Ok(())
    }
}

/// Unix: walk the `ps` table for descendants, SIGTERM each, then the root
#[cfg(unix)]
pub struct SignalTreeKiller;

#[cfg(unix)]
#[async_trait]
impl TreeKiller for SignalTreeKiller {
    async fn kill_tree(&self, pid: u32) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        use tracing::debug;

        let output = tokio::process::Command::new("ps")
            .args(["-A", "-o", "pid=,ppid="])
            .output()
            .await?;
        let table = String::from_utf8_lossy(&output.stdout);

        for descendant in collect_descendants(pid, &table) {
            debug!(pid = descendant, "terminating descendant process");
            let _ = kill(Pid::from_raw(descendant as i32), Signal::SIGTERM);
        }

        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        Ok(())
    }
}

/// Transitive descendants of `root` in a `ps -A -o pid=,ppid=` table,
/// parents before children
#[cfg(unix)]
fn collect_descendants(root: u32, table: &str) -> Vec<u32> {
    let pairs: Vec<(u32, u32)> = table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let ppid = fields.next()?.parse().ok()?;
            Some((pid, ppid))
        })
        .collect();

    let mut descendants = Vec::new();
    let mut frontier = vec![root];

    while let Some(parent) = frontier.pop() {
        for &(pid, ppid) in &pairs {
            if ppid == parent && pid != parent {
                descendants.push(pid);
                frontier.push(pid);
            }
        }
    }

    descendants
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_collect_direct_children() {
        let table = "  100     1\n  200   100\n  201   100\n  300     1\n";
        let mut found = collect_descendants(100, table);
        found.sort_unstable();
        assert_eq!(found, vec![200, 201]);
    }

    #[test]
    fn test_collect_transitive_descendants() {
        // 100 -> 200 -> 300 -> 400, plus an unrelated 500
        let table = "100 1\n200 100\n300 200\n400 300\n500 1\n";
        let mut found = collect_descendants(100, table);
        found.sort_unstable();
        assert_eq!(found, vec![200, 300, 400]);
    }

    #[test]
    fn test_collect_ignores_garbage_lines() {
        let table = "PID PPID\n100 1\nabc def\n200 100\n";
        assert_eq!(collect_descendants(100, table), vec![200]);
    }

    #[test]
    fn test_collect_with_no_children() {
        let table = "100 1\n300 1\n";
        assert!(collect_descendants(100, table).is_empty());
    }
}

//! Stopping a worker child: voluntary exit, then SIGTERM, then SIGKILL.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::time::timeout;
use tracing::debug;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// How long a worker gets to handle SIGTERM before SIGKILL.
#[cfg(unix)]
const SIGTERM_GRACE: Duration = Duration::from_secs(2);

/// Reap `child`, escalating if it does not exit by itself.
///
/// # Strategy
/// 1. Wait up to `grace` for the child to exit (it has normally been sent
///    an `Exit` request already)
/// 2. Send SIGTERM and wait briefly
/// 3. SIGKILL, then wait for reaping (required to avoid zombies)
///
/// On Windows step 2 is skipped.
pub async fn shutdown_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    if let Ok(result) = timeout(grace, child.wait()).await {
        return result;
    }
    debug!(pid = ?child.id(), ?grace, "Worker still running after grace period");

    #[cfg(unix)]
    {
        terminate_unix(child).await
    }

    #[cfg(not(unix))]
    {
        child.kill().await?;
        child.wait().await
    }
}

#[cfg(unix)]
async fn terminate_unix(child: &mut Child) -> io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // Already reaped by tokio.
        return child.wait().await;
    };
    let pid = i32::try_from(pid).map_err(io::Error::other)?;

    if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        // Process may have already exited
        if e == nix::errno::Errno::ESRCH {
            return child.wait().await;
        }
        return Err(io::Error::other(e));
    }

    if let Ok(result) = timeout(SIGTERM_GRACE, child.wait()).await {
        return result;
    }

    debug!(pid, "Escalating to SIGKILL");
    child.kill().await?;
    child.wait().await
}

//! Unix process termination using signals.
//!
//! Escalation order:
//! 1. SIGTERM, the graceful request
//! 2. SIGKILL, the forced fallback
//!
//! Liveness is checked with signal 0, which probes for existence
//! without delivering anything.

use nix::errno::Errno;
use nix::sys::signal::{kill as send_signal, Signal};
use nix::unistd::Pid;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::Terminate;

/// How long to wait after each termination stage before checking death.
const STAGE_WAIT: Duration = Duration::from_millis(1000);

/// Unix process terminator.
pub struct UnixKiller;

impl UnixKiller {
    /// Create a new Unix terminator.
    pub fn new() -> Self {
        Self
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<bool> {
        match send_signal(Pid::from_raw(pid as i32), signal) {
            Ok(()) => {
                debug!(pid = pid, signal = %signal, "signal delivered");
                Ok(true)
            }
            // Already gone counts as success
            Err(Errno::ESRCH) => {
                debug!(pid = pid, "process not found, already terminated");
                Ok(true)
            }
            Err(Errno::EPERM) => {
                warn!(pid = pid, signal = %signal, "permission denied sending signal");
                Err(Error::PermissionDenied(format!(
                    "cannot signal process {}",
                    pid
                )))
            }
            Err(e) => Err(Error::CommandFailed(format!(
                "kill -{} {} failed: {}",
                signal, pid, e
            ))),
        }
    }
}

impl Default for UnixKiller {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminate for UnixKiller {
    async fn kill(&self, pid: u32, force: bool) -> Result<bool> {
        let signal = if force {
            Signal::SIGKILL
        } else {
            Signal::SIGTERM
        };
        self.signal(pid, signal)
    }

    async fn progressive_kill(&self, pid: u32) -> bool {
        for (i, signal) in [Signal::SIGTERM, Signal::SIGKILL].into_iter().enumerate() {
            debug!(pid = pid, stage = i, signal = %signal, "progressive kill stage");

            if let Err(e) = self.signal(pid, signal) {
                debug!(pid = pid, signal = %signal, error = %e, "stage failed");
                continue;
            }

            sleep(STAGE_WAIT).await;

            if self.is_process_dead(pid).await {
                debug!(pid = pid, signal = %signal, "process terminated");
                return true;
            }

            warn!(pid = pid, signal = %signal, "process survived stage, escalating");
        }

        warn!(pid = pid, "all termination stages exhausted");
        false
    }

    async fn is_process_dead(&self, pid: u32) -> bool {
        // Signal 0 probes existence without delivering anything
        match send_signal(Pid::from_raw(pid as i32), None) {
            Ok(()) => false,
            Err(Errno::ESRCH) => true,
            // EPERM means it exists but belongs to someone else
            Err(_) => false,
        }
    }
}

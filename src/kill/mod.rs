//! Safety-gated, progressive process termination.
//!
//! Termination escalates through stages of increasing severity
//! (graceful signal, forceful signal, OS-specific fallbacks), confirming
//! death after each stage before advancing. A single signal is not
//! reliable across platforms and process states; staged escalation
//! trades a little latency for certainty.
//!
//! Whether a process may be killed at all is decided by [`SafetyPolicy`],
//! which is fail-closed: unknown processes are never killed.

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

mod safety;

pub use safety::SafetyPolicy;

use crate::error::Result;

/// Trait for platform-specific process termination.
pub trait Terminate: Send + Sync {
    /// Send a single termination request.
    ///
    /// Graceful (SIGTERM / plain `taskkill`) unless `force`, which sends
    /// SIGKILL / `taskkill /F`. Returns `Ok(true)` when the request was
    /// delivered or the process was already gone.
    fn kill(&self, pid: u32, force: bool) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Escalate through the platform's termination stages until the
    /// process is confirmed dead, short-circuiting once it is.
    ///
    /// Never errors; failed stages are logged and the next one is tried.
    fn progressive_kill(&self, pid: u32) -> impl std::future::Future<Output = bool> + Send;

    /// Check whether the process no longer exists.
    fn is_process_dead(&self, pid: u32) -> impl std::future::Future<Output = bool> + Send;
}

/// Process terminator for the current platform.
pub struct ProcessKiller {
    #[cfg(unix)]
    inner: unix::UnixKiller,

    #[cfg(windows)]
    inner: windows::WindowsKiller,
}

impl ProcessKiller {
    /// Create a terminator for the current platform.
    pub fn new() -> Self {
        Self {
            #[cfg(unix)]
            inner: unix::UnixKiller::new(),

            #[cfg(windows)]
            inner: windows::WindowsKiller::new(),
        }
    }
}

impl Default for ProcessKiller {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminate for ProcessKiller {
    async fn kill(&self, pid: u32, force: bool) -> Result<bool> {
        self.inner.kill(pid, force).await
    }

    async fn progressive_kill(&self, pid: u32) -> bool {
        self.inner.progressive_kill(pid).await
    }

    async fn is_process_dead(&self, pid: u32) -> bool {
        self.inner.is_process_dead(pid).await
    }
}

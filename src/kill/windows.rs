//! Windows process termination using taskkill and fallbacks.
//!
//! Escalation order:
//! 1. `taskkill /PID n` - graceful (WM_CLOSE)
//! 2. `taskkill /F /PID n` - forced (TerminateProcess)
//! 3. `wmic process where processid=n delete`
//! 4. `powershell Stop-Process -Id n -Force`
//!
//! Liveness is checked with a `tasklist` PID filter.

use std::process::Stdio;

use tokio::process::Command;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::Terminate;

/// How long to wait after each termination stage before checking death.
/// Windows process teardown is slower than Unix signal delivery.
const STAGE_WAIT: Duration = Duration::from_millis(2000);

/// Windows process terminator.
pub struct WindowsKiller;

impl WindowsKiller {
    /// Create a new Windows terminator.
    pub fn new() -> Self {
        Self
    }

    /// Termination commands in escalation order.
    fn kill_stages(pid: u32) -> [(&'static str, Vec<String>); 4] {
        let pid = pid.to_string();
        [
            ("taskkill", vec!["/PID".into(), pid.clone()]),
            ("taskkill", vec!["/F".into(), "/PID".into(), pid.clone()]),
            (
                "wmic",
                vec![
                    "process".into(),
                    "where".into(),
                    format!("processid={}", pid),
                    "delete".into(),
                ],
            ),
            (
                "powershell",
                vec![
                    "-Command".into(),
                    format!("Stop-Process -Id {} -Force", pid),
                ],
            ),
        ]
    }

    async fn run_stage(&self, program: &str, args: &[String]) -> Result<bool> {
        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let combined = format!("{} {}", stdout, stderr);

        // Already-gone conditions count as success
        if combined.contains("not found")
            || combined.contains("could not be found")
            || combined.contains("already been terminated")
        {
            return Ok(true);
        }

        if combined.contains("Access is denied") || combined.contains("access denied") {
            return Err(Error::PermissionDenied(format!(
                "{} refused for process",
                program
            )));
        }

        Err(Error::CommandFailed(format!(
            "{} failed: {}",
            program,
            combined.trim()
        )))
    }
}

impl Default for WindowsKiller {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminate for WindowsKiller {
    async fn kill(&self, pid: u32, force: bool) -> Result<bool> {
        let stages = Self::kill_stages(pid);
        let (program, args) = &stages[usize::from(force)];
        self.run_stage(program, args).await
    }

    async fn progressive_kill(&self, pid: u32) -> bool {
        for (i, (program, args)) in Self::kill_stages(pid).iter().enumerate() {
            debug!(pid = pid, stage = i, program = program, "progressive kill stage");

            if let Err(e) = self.run_stage(program, args).await {
                debug!(pid = pid, program = program, error = %e, "stage failed");
                continue;
            }

            sleep(STAGE_WAIT).await;

            if self.is_process_dead(pid).await {
                debug!(pid = pid, program = program, "process terminated");
                return true;
            }

            warn!(pid = pid, program = program, "process survived stage, escalating");
        }

        warn!(pid = pid, "all termination stages exhausted");
        false
    }

    async fn is_process_dead(&self, pid: u32) -> bool {
        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/FO", "CSV", "/NH"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                !stdout.contains(&format!("\"{}\"", pid))
            }
            // Fail-closed: if the probe itself fails, assume still alive
            Err(_) => false,
        }
    }
}

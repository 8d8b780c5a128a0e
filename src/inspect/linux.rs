//! Linux port-owner lookup using ss and ps.

use std::process::Stdio;

use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::models::ProcessRecord;

use super::{parse_local_port, Inspect};

/// Linux-specific port-owner inspector.
pub struct LinuxInspector;

impl LinuxInspector {
    /// Create a new Linux inspector.
    pub fn new() -> Self {
        Self
    }

    /// Fill in owner/parent/command details for a PID using ps.
    ///
    /// Executes: `ps -p PID -o ppid=,user=,args=`
    async fn enrich(&self, record: &mut ProcessRecord) {
        let output = match Command::new("ps")
            .args(["-p", &record.pid.to_string(), "-o", "ppid=,user=,args="])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
        {
            Ok(output) => output,
            Err(_) => return,
        };

        let stdout = match String::from_utf8(output.stdout) {
            Ok(s) => s,
            Err(_) => return,
        };

        if let Some((ppid, user, args)) = parse_ps_details(&stdout) {
            record.parent_pid = Some(ppid);
            record.user = Some(user);
            if !args.is_empty() {
                record.command = args;
            }
        }
    }
}

impl Default for LinuxInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspect for LinuxInspector {
    /// Find the process listening on `port`.
    ///
    /// Executes: `ss -Htlnp sport = :PORT`
    ///
    /// Flags explained:
    /// -H, --no-header     Suppress header line
    /// -t, --tcp           display only TCP sockets
    /// -l, --listening     display listening sockets
    /// -n, --numeric       don't resolve service names
    /// -p, --processes     show process using socket
    async fn find_owner(&self, port: u16) -> Option<ProcessRecord> {
        let output = Command::new("ss")
            .args(["-Htlnp", "sport", "=", &format!(":{}", port)])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;

        let stdout = String::from_utf8(output.stdout).ok()?;
        let mut record = parse_ss_output(&stdout, port)?;

        self.enrich(&mut record).await;
        debug!(port = port, pid = record.pid, name = %record.name, "identified port owner");
        Some(record)
    }
}

/// Parse ss output, returning the first process bound to `port`.
///
/// Expected ss output format:
/// ```text
/// LISTEN 0 4096 [::ffff:127.0.0.1]:63342 *:* users:(("rustrover",pid=53561,fd=54))
/// ```
fn parse_ss_output(output: &str, port: u16) -> Option<ProcessRecord> {
    let regex = Regex::new(r#"users:\(\("(.+?)",pid=(\d+),fd="#).ok()?;

    for line in output.lines() {
        // Columns: [State] [Recv-Q] [Send-Q] [Local Address:Port] [Peer Address:Port] [Process]
        let components: Vec<&str> = line.split_whitespace().collect();
        if components.len() < 6 {
            continue;
        }

        if parse_local_port(components[3]) != Some(port) {
            continue;
        }

        let Some(caps) = regex.captures(components[5]) else {
            continue;
        };

        let name = caps[1].to_string();
        let pid: u32 = match caps[2].parse() {
            Ok(p) => p,
            Err(_) => continue,
        };

        return Some(ProcessRecord::new(pid, name.clone(), name, port));
    }

    None
}

/// Parse `ps -o ppid=,user=,args=` output into (ppid, user, command).
fn parse_ps_details(output: &str) -> Option<(u32, String, String)> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let mut parts = line.split_whitespace();

    let ppid: u32 = parts.next()?.parse().ok()?;
    let user = parts.next()?.to_string();
    let args = parts.collect::<Vec<_>>().join(" ");

    Some((ppid, user, args))
}

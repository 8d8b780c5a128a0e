//! macOS port-owner lookup using lsof and ps.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::models::ProcessRecord;

use super::Inspect;

/// macOS-specific port-owner inspector.
pub struct DarwinInspector;

impl DarwinInspector {
    /// Create a new macOS inspector.
    pub fn new() -> Self {
        Self
    }

    /// Look up name/parent/owner for a PID.
    ///
    /// Executes: `ps -p PID -o ppid=,user=,comm=` and `ps -p PID -o args=`
    async fn process_details(&self, pid: u32) -> Option<(u32, String, String, String)> {
        let meta = self
            .ps_output(pid, "ppid=,user=,comm=")
            .await
            .and_then(|out| parse_ps_meta(&out))?;
        let (ppid, user, name) = meta;

        let command = self
            .ps_output(pid, "args=")
            .await
            .map(|out| out.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| name.clone());

        Some((ppid, user, name, command))
    }

    async fn ps_output(&self, pid: u32, format: &str) -> Option<String> {
        let output = Command::new("ps")
            .args(["-p", &pid.to_string(), "-o", format])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;

        String::from_utf8(output.stdout).ok()
    }
}

impl Default for DarwinInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspect for DarwinInspector {
    /// Find the process listening on `port`.
    ///
    /// Executes: `lsof -ti tcp:PORT -sTCP:LISTEN`
    ///
    /// Flags explained:
    /// - -t: terse output, PIDs only
    /// - -i tcp:PORT: select TCP sockets on the given port
    /// - -sTCP:LISTEN: listening sockets only
    async fn find_owner(&self, port: u16) -> Option<ProcessRecord> {
        let output = Command::new("lsof")
            .args(["-ti", &format!("tcp:{}", port), "-sTCP:LISTEN"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;

        let stdout = String::from_utf8(output.stdout).ok()?;
        let pid: u32 = stdout.lines().next()?.trim().parse().ok()?;

        let mut record = ProcessRecord::new(pid, "unknown", "unknown", port);
        if let Some((ppid, user, name, command)) = self.process_details(pid).await {
            record.parent_pid = Some(ppid);
            record.user = Some(user);
            record.name = name;
            record.command = command;
        }

        debug!(port = port, pid = pid, name = %record.name, "identified port owner");
        Some(record)
    }
}

/// Parse `ps -o ppid=,user=,comm=` output into (ppid, user, name).
///
/// comm may contain spaces on macOS, so everything after the first two
/// columns belongs to the name.
fn parse_ps_meta(output: &str) -> Option<(u32, String, String)> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let mut parts = line.split_whitespace();

    let ppid: u32 = parts.next()?.parse().ok()?;
    let user = parts.next()?.to_string();
    let name = parts.collect::<Vec<_>>().join(" ");

    if name.is_empty() {
        return None;
    }
    Some((ppid, user, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_meta() {
        let (ppid, user, name) = parse_ps_meta("    1 alice node\n").unwrap();
        assert_eq!(ppid, 1);
        assert_eq!(user, "alice");
        assert_eq!(name, "node");
    }

    #[test]
    fn test_parse_ps_meta_name_with_spaces() {
        let (_, _, name) = parse_ps_meta("389 bob Code Helper (Renderer)\n").unwrap();
        assert_eq!(name, "Code Helper (Renderer)");
    }

    #[test]
    fn test_parse_ps_meta_empty() {
        assert!(parse_ps_meta("").is_none());
    }
}

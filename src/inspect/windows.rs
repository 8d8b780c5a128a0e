//! Windows port-owner lookup using netstat and tasklist.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::models::ProcessRecord;

use super::{parse_local_port, Inspect};

/// Windows-specific port-owner inspector.
pub struct WindowsInspector;

impl WindowsInspector {
    /// Create a new Windows inspector.
    pub fn new() -> Self {
        Self
    }

    /// Look up the image name for a PID.
    ///
    /// Executes: `tasklist /FI "PID eq N" /FO CSV /NH`
    async fn process_name(&self, pid: u32) -> Option<String> {
        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/FO", "CSV", "/NH"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;

        let stdout = String::from_utf8(output.stdout).ok()?;
        parse_tasklist_csv(&stdout, pid)
    }
}

impl Default for WindowsInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspect for WindowsInspector {
    /// Find the process listening on `port`.
    ///
    /// Executes: `netstat -ano -p tcp`
    async fn find_owner(&self, port: u16) -> Option<ProcessRecord> {
        let output = Command::new("netstat")
            .args(["-ano", "-p", "tcp"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;

        let stdout = String::from_utf8(output.stdout).ok()?;
        let pid = parse_netstat_output(&stdout, port)?;

        let name = self
            .process_name(pid)
            .await
            .unwrap_or_else(|| "unknown".to_string());

        debug!(port = port, pid = pid, name = %name, "identified port owner");
        Some(ProcessRecord::new(pid, name.clone(), name, port))
    }
}

/// Parse netstat output, returning the PID listening on `port`.
///
/// Expected netstat output format:
/// ```text
///   TCP    0.0.0.0:5000    0.0.0.0:0    LISTENING    1234
/// ```
fn parse_netstat_output(output: &str, port: u16) -> Option<u32> {
    for line in output.lines() {
        // Columns: [Proto] [Local Address] [Foreign Address] [State] [PID]
        let components: Vec<&str> = line.split_whitespace().collect();
        if components.len() < 5 || components[0] != "TCP" {
            continue;
        }

        if components[3] != "LISTENING" {
            continue;
        }

        if parse_local_port(components[1]) != Some(port) {
            continue;
        }

        if let Ok(pid) = components[4].parse() {
            return Some(pid);
        }
    }

    None
}

/// Parse tasklist CSV output, returning the image name for `pid`.
///
/// Expected tasklist output format:
/// ```text
/// "node.exe","1234","Console","1","52,516 K"
/// ```
fn parse_tasklist_csv(output: &str, pid: u32) -> Option<String> {
    for line in output.lines() {
        let fields: Vec<&str> = line.split(',').map(|f| f.trim_matches('"')).collect();
        if fields.len() < 2 {
            continue;
        }

        if fields[1].parse::<u32>() == Ok(pid) {
            let name = fields[0].to_string();
            if !name.is_empty() {
                return Some(name);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_netstat_output() {
        let output = "\
  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING       948
  TCP    0.0.0.0:5000           0.0.0.0:0              LISTENING       1234
  TCP    127.0.0.1:5000         127.0.0.1:52000        ESTABLISHED     1234
";
        assert_eq!(parse_netstat_output(output, 5000), Some(1234));
        assert_eq!(parse_netstat_output(output, 135), Some(948));
        assert_eq!(parse_netstat_output(output, 9999), None);
    }

    #[test]
    fn test_parse_netstat_skips_established() {
        let output = "  TCP    127.0.0.1:5000    127.0.0.1:52000    ESTABLISHED    1234\n";
        assert_eq!(parse_netstat_output(output, 5000), None);
    }

    #[test]
    fn test_parse_tasklist_csv() {
        let output = "\"node.exe\",\"1234\",\"Console\",\"1\",\"52,516 K\"\n";
        assert_eq!(parse_tasklist_csv(output, 1234), Some("node.exe".to_string()));
        assert_eq!(parse_tasklist_csv(output, 5678), None);
    }

    #[test]
    fn test_parse_tasklist_csv_no_tasks() {
        let output = "INFO: No tasks are running which match the specified criteria.\n";
        assert_eq!(parse_tasklist_csv(output, 1234), None);
    }
}

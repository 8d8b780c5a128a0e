//! Snapshot of the process owning a port.

use serde::{Deserialize, Serialize};

/// Read-only snapshot of OS process state taken at query time.
///
/// Process state is inherently racy, so records are never cached across
/// calls; a record is only meaningful in the operation that looked it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process ID.
    pub pid: u32,

    /// Short process name (e.g., "node", "nginx").
    pub name: String,

    /// Full command line that started the process.
    pub command: String,

    /// The port this process was found listening on.
    pub port: u16,

    /// Parent process ID, when the platform query reported one.
    pub parent_pid: Option<u32>,

    /// Username of the process owner, when reported.
    pub user: Option<String>,
}

impl ProcessRecord {
    /// Create a record with only the fields every platform can supply.
    pub fn new(pid: u32, name: impl Into<String>, command: impl Into<String>, port: u16) -> Self {
        Self {
            pid,
            name: name.into(),
            command: command.into(),
            port,
            parent_pid: None,
            user: None,
        }
    }
}

impl std::fmt::Display for ProcessRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (PID {}) on port {}", self.name, self.pid, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record() {
        let rec = ProcessRecord::new(1234, "node", "node server.js", 5000);
        assert_eq!(rec.pid, 1234);
        assert_eq!(rec.name, "node");
        assert_eq!(rec.command, "node server.js");
        assert_eq!(rec.port, 5000);
        assert!(rec.parent_pid.is_none());
        assert!(rec.user.is_none());
    }

    #[test]
    fn test_display() {
        let rec = ProcessRecord::new(42, "nginx", "nginx -g daemon", 80);
        assert_eq!(rec.to_string(), "nginx (PID 42) on port 80");
    }
}

//! Kill safety policy.
//!
//! Decides whether an identified process may be terminated. The policy
//! is fail-closed: a process is killable only when it is recognized as
//! this service's own stale instance or matches a narrow allowlist of
//! known-safe runtime prefixes, and never when it matches the denylist
//! of critical system processes.

use tracing::debug;

use crate::models::ProcessRecord;

/// Critical system processes that must never be terminated.
const DANGEROUS_NAMES: &[&str] = &[
    "system",
    "kernel",
    "init",
    "systemd",
    "explorer.exe",
    "winlogon.exe",
    "csrss.exe",
    "smss.exe",
    "services.exe",
    "launchd",      // macOS
    "kextd",        // macOS
    "windowserver", // macOS
    "loginwindow",  // macOS
];

/// Runtime prefixes considered safe to reap on a conflicting port.
const SAFE_PREFIXES: &[&str] = &["node", "npm", "npx", "tsx", "feedback-collector"];

/// Process names this service runs under.
const OWN_NAMES: &[&str] = &["feedback-collector", "mcp-feedback-collector"];

/// Command-line fragments identifying this service's entrypoints.
const OWN_KEYWORDS: &[&str] = &[
    "feedback-collector",
    "mcp-feedback-collector",
    "feedback_collector",
];

/// Policy gate deciding whether a process may be killed.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    dangerous_names: Vec<String>,
    safe_prefixes: Vec<String>,
    own_names: Vec<String>,
    own_keywords: Vec<String>,
}

impl SafetyPolicy {
    /// Policy with the built-in denylist, allowlist, and self-identity.
    pub fn new() -> Self {
        Self {
            dangerous_names: DANGEROUS_NAMES.iter().map(|s| s.to_string()).collect(),
            safe_prefixes: SAFE_PREFIXES.iter().map(|s| s.to_string()).collect(),
            own_names: OWN_NAMES.iter().map(|s| s.to_string()).collect(),
            own_keywords: OWN_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Check whether the record is a stale instance of this service.
    ///
    /// Requires both a name match and an entrypoint keyword in the
    /// command line, so an unrelated process that merely shares a
    /// runtime name is not claimed as ours.
    pub fn is_own_process(&self, record: &ProcessRecord) -> bool {
        let name = record.name.to_lowercase();
        let command = record.command.to_lowercase();

        let name_matches = self.own_names.iter().any(|own| name.contains(own));
        let command_matches = self.own_keywords.iter().any(|kw| command.contains(kw));

        let is_own = name_matches && command_matches;
        if is_own {
            debug!(pid = record.pid, name = %record.name, "recognized own stale instance");
        }
        is_own
    }

    /// Decide whether the process may be terminated.
    ///
    /// Our own stale instance is always safe and bypasses the denylist.
    /// Otherwise any denylist match refuses, an allowlist prefix match
    /// accepts, and everything unknown is refused.
    pub fn is_safe_to_kill(&self, record: &ProcessRecord) -> bool {
        if self.is_own_process(record) {
            return true;
        }

        let name = record.name.to_lowercase();
        let command = record.command.to_lowercase();

        for dangerous in &self.dangerous_names {
            if name.contains(dangerous) || command.contains(dangerous) {
                debug!(pid = record.pid, name = %record.name, "denylisted process, refusing kill");
                return false;
            }
        }

        for safe in &self.safe_prefixes {
            if name.contains(safe) || command.contains(safe) {
                return true;
            }
        }

        false
    }
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, command: &str) -> ProcessRecord {
        ProcessRecord::new(4242, name, command, 5000)
    }

    #[test]
    fn test_denylist_refuses_system_processes() {
        let policy = SafetyPolicy::new();
        assert!(!policy.is_safe_to_kill(&record("systemd", "/sbin/init")));
        assert!(!policy.is_safe_to_kill(&record("explorer.exe", "explorer.exe")));
        assert!(!policy.is_safe_to_kill(&record("WindowServer", "WindowServer")));
        assert!(!policy.is_safe_to_kill(&record("launchd", "/sbin/launchd")));
    }

    #[test]
    fn test_own_process_is_always_safe() {
        let policy = SafetyPolicy::new();
        let rec = record("feedback-collector", "feedback-collector serve --port 5000");
        assert!(policy.is_own_process(&rec));
        assert!(policy.is_safe_to_kill(&rec));
    }

    #[test]
    fn test_own_process_requires_both_name_and_keyword() {
        let policy = SafetyPolicy::new();
        // Right name, unrelated command line
        let rec = record("feedback-collector", "some wrapper binary");
        assert!(!policy.is_own_process(&rec));
        // Right command line, unrelated name
        let rec = record("bash", "bash -c mcp-feedback-collector");
        assert!(!policy.is_own_process(&rec));
    }

    #[test]
    fn test_safe_prefixes_accepted() {
        let policy = SafetyPolicy::new();
        assert!(policy.is_safe_to_kill(&record("node", "node server.js")));
        assert!(policy.is_safe_to_kill(&record("npm", "npm run dev")));
    }

    #[test]
    fn test_unknown_process_refused_by_default() {
        let policy = SafetyPolicy::new();
        assert!(!policy.is_safe_to_kill(&record("postgres", "/usr/bin/postgres -D /data")));
        assert!(!policy.is_safe_to_kill(&record("mystery", "mystery --daemon")));
    }

    #[test]
    fn test_denylist_wins_over_allowlist_for_foreign_processes() {
        let policy = SafetyPolicy::new();
        // "node" prefix but launched by a denylisted supervisor path
        let rec = record("node", "systemd-run node server.js");
        assert!(!policy.is_safe_to_kill(&rec));
    }
}

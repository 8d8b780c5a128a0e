//! Process inspection: mapping a listening port to its owning process.
//!
//! Platform-specific implementations:
//! - Linux: `ss` plus `ps`
//! - macOS: `lsof` plus `ps`
//! - Windows: `netstat` plus `tasklist`
//!
//! Inspection is a best-effort diagnostic. Any failure along the way
//! (command missing, unparseable output, vanished process) degrades to
//! "owner unknown" rather than an error.

#[cfg(target_os = "macos")]
mod darwin;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "windows")]
mod windows;

use crate::models::ProcessRecord;

/// Trait for platform-specific port-to-process lookups.
pub trait Inspect: Send + Sync {
    /// Find the process listening on `port`, if it can be identified.
    fn find_owner(&self, port: u16)
        -> impl std::future::Future<Output = Option<ProcessRecord>> + Send;
}

/// Port-to-process inspector for the current platform.
pub struct ProcessInspector {
    #[cfg(target_os = "macos")]
    inner: darwin::DarwinInspector,

    #[cfg(target_os = "linux")]
    inner: linux::LinuxInspector,

    #[cfg(target_os = "windows")]
    inner: windows::WindowsInspector,
}

impl ProcessInspector {
    /// Create an inspector for the current platform.
    pub fn new() -> Self {
        Self {
            #[cfg(target_os = "macos")]
            inner: darwin::DarwinInspector::new(),

            #[cfg(target_os = "linux")]
            inner: linux::LinuxInspector::new(),

            #[cfg(target_os = "windows")]
            inner: windows::WindowsInspector::new(),
        }
    }
}

impl Default for ProcessInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspect for ProcessInspector {
    async fn find_owner(&self, port: u16) -> Option<ProcessRecord> {
        self.inner.find_owner(port).await
    }
}

/// Extract the port from a local-address column.
///
/// Handles the address formats the platform tools emit:
/// IPv4 `127.0.0.1:3000`, wildcard `*:8080`, IPv6 `[::1]:3000`.
#[cfg(any(target_os = "linux", target_os = "windows", test))]
pub(crate) fn parse_local_port(address: &str) -> Option<u16> {
    if address.starts_with('[') {
        let bracket_end = address.find(']')?;
        if address.as_bytes().get(bracket_end + 1) != Some(&b':') {
            return None;
        }
        address[bracket_end + 2..].parse().ok()
    } else {
        let last_colon = address.rfind(':')?;
        address[last_colon + 1..].parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_port_ipv4() {
        assert_eq!(parse_local_port("127.0.0.1:3000"), Some(3000));
        assert_eq!(parse_local_port("*:8080"), Some(8080));
        assert_eq!(parse_local_port("0.0.0.0:5000"), Some(5000));
    }

    #[test]
    fn test_parse_local_port_ipv6() {
        assert_eq!(parse_local_port("[::1]:3000"), Some(3000));
        assert_eq!(parse_local_port("[::ffff:127.0.0.1]:63342"), Some(63342));
    }

    #[test]
    fn test_parse_local_port_rejects_garbage() {
        assert_eq!(parse_local_port("no-port-here"), None);
        assert_eq!(parse_local_port("[::1]3000"), None);
        assert_eq!(parse_local_port("host:notanumber"), None);
    }
}

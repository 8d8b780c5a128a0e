//! Availability snapshot for a single port.

use serde::{Deserialize, Serialize};

/// Point-in-time availability of a TCP port.
///
/// Existence of an available port is defined entirely by a live bind
/// attempt; this struct only reports what was observed at probe time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStatus {
    /// The port number.
    pub port: u16,

    /// Whether a listening socket could be bound at probe time.
    pub available: bool,

    /// PID of the owning process, when an occupied port could be
    /// attributed to one.
    pub pid: Option<u32>,
}

impl PortStatus {
    /// Status for a port that accepted a bind.
    pub fn available(port: u16) -> Self {
        Self {
            port,
            available: true,
            pid: None,
        }
    }

    /// Status for an occupied port, with the owner PID when known.
    pub fn occupied(port: u16, pid: Option<u32>) -> Self {
        Self {
            port,
            available: false,
            pid,
        }
    }
}

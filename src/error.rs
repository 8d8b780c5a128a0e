//! Error types for the feedback-collector core library.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during port acquisition, process termination,
/// and session settlement.
#[derive(Error, Debug)]
pub enum Error {
    /// The preferred port, the fallback range, and random probing were
    /// all exhausted without finding a bindable port.
    #[error("no available ports (preferred: {preferred:?}, range: {range_start}-{range_end}, random retries: {max_retries})")]
    NoAvailablePorts {
        preferred: Option<u16>,
        range_start: u16,
        range_end: u16,
        max_retries: u32,
    },

    /// The requested port is occupied and killing the owner was not allowed.
    #[error("port {0} is occupied")]
    PortOccupied(u16),

    /// The owner of an occupied port could not be identified or terminated.
    #[error("failed to force-release port {port}: {reason}")]
    PortForceReleaseFailed { port: u16, reason: String },

    /// The owning process was terminated but the port did not become
    /// available, which means another process re-bound it in the meantime.
    #[error("port {0} is still occupied after its owner was terminated")]
    PortStillOccupied(u16),

    /// A port did not become available within the allotted wait.
    #[error("port {port} was not released within {waited_ms}ms")]
    PortReleaseTimeout { port: u16, waited_ms: u64 },

    /// The process owning a port failed the kill safety gate.
    #[error("refusing to kill unsafe process {name} (PID {pid})")]
    UnsafeProcessKill { pid: u32, name: String },

    /// A pending session exceeded its timeout before feedback arrived.
    #[error("session timed out after {0} seconds")]
    SessionTimeout(u64),

    /// The server is shutting down; all pending sessions are rejected.
    #[error("server is shutting down")]
    ServerShutdown,

    /// Failed to execute a system command.
    #[error("command execution failed: {0}")]
    CommandFailed(String),

    /// Permission denied for an operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_diagnostics() {
        let err = Error::NoAvailablePorts {
            preferred: Some(5000),
            range_start: 5000,
            range_end: 5019,
            max_retries: 20,
        };
        let msg = err.to_string();
        assert!(msg.contains("5000"));
        assert!(msg.contains("5019"));
        assert!(msg.contains("20"));

        let err = Error::PortReleaseTimeout {
            port: 5000,
            waited_ms: 3000,
        };
        assert!(err.to_string().contains("3000ms"));

        let err = Error::UnsafeProcessKill {
            pid: 1,
            name: "systemd".to_string(),
        };
        assert!(err.to_string().contains("systemd"));
    }
}

//! Low-level availability probing via live bind attempts.

use tokio::net::TcpListener;
use tokio::time::{timeout, Duration};

/// Upper bound on a single bind attempt. A bind either succeeds or
/// fails almost immediately; anything slower is treated as unavailable.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Trait for port availability probing.
pub trait Probe: Send + Sync {
    /// Check whether a listening socket can be bound on `port`.
    fn is_available(&self, port: u16) -> impl std::future::Future<Output = bool> + Send;
}

/// Probe that performs a real wildcard-address bind.
///
/// The test socket is dropped as soon as the bind resolves, so the port
/// is never left held on any path. "In use" is an expected steady-state
/// condition, not an error: the probe fails closed to `false` on
/// timeouts and unexpected OS errors alike.
pub struct TcpProbe;

impl TcpProbe {
    /// Create a new probe.
    pub fn new() -> Self {
        Self
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for TcpProbe {
    async fn is_available(&self, port: u16) -> bool {
        match timeout(PROBE_TIMEOUT, TcpListener::bind(("0.0.0.0", port))).await {
            Ok(Ok(listener)) => {
                drop(listener);
                true
            }
            Ok(Err(_)) => false,
            Err(_) => false,
        }
    }
}

/// Check whether `port` can be bound right now.
pub async fn is_port_available(port: u16) -> bool {
    TcpProbe::new().is_available(port).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_is_idempotent_on_free_port() {
        // Bind an ephemeral port to learn a number that is currently
        // free, then release it before probing
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(is_port_available(port).await);
        // Probing must not leave the port bound
        assert!(is_port_available(port).await);
    }

    #[tokio::test]
    async fn test_probe_detects_occupied_port() {
        let listener = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(!is_port_available(port).await);
        drop(listener);
    }
}

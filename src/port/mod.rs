//! Port acquisition and conflict resolution.
//!
//! The manager composes the prober, the process inspector, the
//! safety-gated terminator, and the kill policy. All platform branching
//! lives behind those injected parts; nothing here shells out directly.

mod probe;

pub use probe::{is_port_available, Probe, TcpProbe};

use rand::Rng;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::inspect::{Inspect, ProcessInspector};
use crate::kill::{ProcessKiller, SafetyPolicy, Terminate};
use crate::models::PortStatus;

/// Preferred fallback range scanned sequentially before random probing.
const FALLBACK_RANGE_START: u16 = 5000;
const FALLBACK_RANGE_END: u16 = 5019;

/// Bounded random probing within the ephemeral range.
const MAX_RANDOM_RETRIES: u32 = 20;
const RANDOM_PORT_MIN: u16 = 1024;

/// Polling interval while waiting for a port to be released.
const RELEASE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default bounded waits for forced and advisory release.
const FORCE_RELEASE_WAIT: Duration = Duration::from_secs(10);
const CLEANUP_WAIT: Duration = Duration::from_secs(3);

/// Port lifecycle manager.
///
/// Generic over its parts so tests can script availability and process
/// state; production code uses [`PortManager::new`] with the real
/// platform implementations.
pub struct PortManager<P = TcpProbe, I = ProcessInspector, K = ProcessKiller> {
    probe: P,
    inspector: I,
    killer: K,
    policy: SafetyPolicy,
    force_release_wait: Duration,
    cleanup_wait: Duration,
}

impl PortManager {
    /// Create a manager with the real platform prober, inspector, and
    /// terminator.
    pub fn new() -> Self {
        Self::with_parts(
            TcpProbe::new(),
            ProcessInspector::new(),
            ProcessKiller::new(),
            SafetyPolicy::new(),
        )
    }
}

impl Default for PortManager {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Probe, I: Inspect, K: Terminate> PortManager<P, I, K> {
    /// Create a manager from explicit parts.
    pub fn with_parts(probe: P, inspector: I, killer: K, policy: SafetyPolicy) -> Self {
        Self {
            probe,
            inspector,
            killer,
            policy,
            force_release_wait: FORCE_RELEASE_WAIT,
            cleanup_wait: CLEANUP_WAIT,
        }
    }

    /// Override the bounded waits used after kills. Callers must always
    /// bound these waits; an unbounded wait is a bug.
    pub fn with_waits(mut self, force_release_wait: Duration, cleanup_wait: Duration) -> Self {
        self.force_release_wait = force_release_wait;
        self.cleanup_wait = cleanup_wait;
        self
    }

    /// Find a usable listening port.
    ///
    /// Tries the preferred port first, then walks the fallback range
    /// 5000-5019 in ascending order (deterministic across runs), then
    /// performs bounded random probing in the ephemeral range.
    pub async fn resolve_port_conflict(&self, preferred: Option<u16>) -> Result<u16> {
        if let Some(port) = preferred {
            debug!(port = port, "checking preferred port");
            if self.probe.is_available(port).await {
                info!(port = port, "using preferred port");
                return Ok(port);
            }
            warn!(port = port, "preferred port unavailable, scanning fallback range");
        }

        for port in FALLBACK_RANGE_START..=FALLBACK_RANGE_END {
            debug!(port = port, "checking fallback port");
            if self.probe.is_available(port).await {
                info!(port = port, "found available fallback port");
                return Ok(port);
            }
        }

        for _ in 0..MAX_RANDOM_RETRIES {
            let port = rand::thread_rng().gen_range(RANDOM_PORT_MIN..=u16::MAX);
            debug!(port = port, "trying random port");
            if self.probe.is_available(port).await {
                info!(port = port, "found available random port");
                return Ok(port);
            }
        }

        Err(Error::NoAvailablePorts {
            preferred,
            range_start: FALLBACK_RANGE_START,
            range_end: FALLBACK_RANGE_END,
            max_retries: MAX_RANDOM_RETRIES,
        })
    }

    /// Acquire a specific port, optionally evicting its owner.
    ///
    /// With `kill_allowed` the occupying process is identified, checked
    /// against the safety policy, and progressively terminated. The two
    /// failure shapes are distinct: the owner could not be identified or
    /// killed ([`Error::PortForceReleaseFailed`]), versus the owner died
    /// but another process re-bound the port before we could
    /// ([`Error::PortStillOccupied`]) - a race the caller must see
    /// rather than have silently retried.
    pub async fn force_port(&self, port: u16, kill_allowed: bool) -> Result<u16> {
        if self.probe.is_available(port).await {
            return Ok(port);
        }

        if !kill_allowed {
            return Err(Error::PortOccupied(port));
        }

        let Some(record) = self.inspector.find_owner(port).await else {
            return Err(Error::PortForceReleaseFailed {
                port,
                reason: "could not identify owning process".to_string(),
            });
        };

        if !self.policy.is_safe_to_kill(&record) {
            warn!(port = port, pid = record.pid, name = %record.name, "refusing to kill unsafe port owner");
            return Err(Error::UnsafeProcessKill {
                pid: record.pid,
                name: record.name,
            });
        }

        info!(
            port = port,
            pid = record.pid,
            name = %record.name,
            own = self.policy.is_own_process(&record),
            "terminating port owner"
        );

        if !self.killer.progressive_kill(record.pid).await {
            return Err(Error::PortForceReleaseFailed {
                port,
                reason: format!("could not terminate {}", record),
            });
        }

        match self.wait_for_release(port, self.force_release_wait).await {
            Ok(()) => Ok(port),
            Err(Error::PortReleaseTimeout { .. }) => Err(Error::PortStillOccupied(port)),
            Err(e) => Err(e),
        }
    }

    /// Poll until `port` becomes available or the deadline passes.
    ///
    /// Used symmetrically at startup (a stale listener from a previous
    /// run must have exited) and shutdown (the OS must have reclaimed
    /// the socket before a supervisor restarts us).
    pub async fn wait_for_release(&self, port: u16, timeout: Duration) -> Result<()> {
        let start = Instant::now();

        while start.elapsed() < timeout {
            if self.probe.is_available(port).await {
                debug!(port = port, "port released");
                return Ok(());
            }
            sleep(RELEASE_POLL_INTERVAL).await;
        }

        Err(Error::PortReleaseTimeout {
            port,
            waited_ms: timeout.as_millis() as u64,
        })
    }

    /// Advisory pre-bind sweep: reap a safe (typically our own stale)
    /// listener from `port` without failing the caller.
    ///
    /// Invoked opportunistically before binding; every failure is
    /// logged and swallowed.
    pub async fn cleanup_port(&self, port: u16) -> Result<()> {
        if self.probe.is_available(port).await {
            return Ok(());
        }

        let Some(record) = self.inspector.find_owner(port).await else {
            debug!(port = port, "occupied port has no identifiable owner, skipping cleanup");
            return Ok(());
        };

        if !self.policy.is_safe_to_kill(&record) {
            warn!(port = port, pid = record.pid, name = %record.name, "unsafe process on port, skipping cleanup");
            return Ok(());
        }

        info!(port = port, pid = record.pid, name = %record.name, "cleaning up stale port owner");

        match self.killer.kill(record.pid, false).await {
            Ok(_) => {
                if let Err(e) = self.wait_for_release(port, self.cleanup_wait).await {
                    warn!(port = port, error = %e, "port still occupied after cleanup kill");
                }
            }
            Err(e) => {
                warn!(port = port, pid = record.pid, error = %e, "cleanup kill failed");
            }
        }

        Ok(())
    }

    /// Availability snapshot for one port, with the owner PID when an
    /// occupied port can be attributed.
    pub async fn port_status(&self, port: u16) -> PortStatus {
        if self.probe.is_available(port).await {
            PortStatus::available(port)
        } else {
            let pid = self.inspector.find_owner(port).await.map(|r| r.pid);
            PortStatus::occupied(port, pid)
        }
    }

    /// Availability snapshots for the whole fallback range.
    pub async fn range_status(&self) -> Vec<PortStatus> {
        let mut statuses = Vec::new();
        for port in FALLBACK_RANGE_START..=FALLBACK_RANGE_END {
            statuses.push(self.port_status(port).await);
        }
        statuses
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::models::ProcessRecord;

    use super::*;

    struct FakeProbe {
        busy: HashSet<u16>,
    }

    impl FakeProbe {
        fn with_busy(busy: impl IntoIterator<Item = u16>) -> Self {
            Self {
                busy: busy.into_iter().collect(),
            }
        }

        fn all_busy() -> Self {
            Self {
                busy: (0..=u16::MAX).collect(),
            }
        }
    }

    impl Probe for FakeProbe {
        async fn is_available(&self, port: u16) -> bool {
            !self.busy.contains(&port)
        }
    }

    struct FakeInspector {
        record: Option<ProcessRecord>,
    }

    impl Inspect for FakeInspector {
        async fn find_owner(&self, _port: u16) -> Option<ProcessRecord> {
            self.record.clone()
        }
    }

    #[derive(Clone)]
    struct FakeKiller {
        attempts: Arc<AtomicU32>,
        confirms_death: bool,
    }

    impl FakeKiller {
        fn new(confirms_death: bool) -> Self {
            Self {
                attempts: Arc::new(AtomicU32::new(0)),
                confirms_death,
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl Terminate for FakeKiller {
        async fn kill(&self, _pid: u32, _force: bool) -> Result<bool> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(self.confirms_death)
        }

        async fn progressive_kill(&self, _pid: u32) -> bool {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.confirms_death
        }

        async fn is_process_dead(&self, _pid: u32) -> bool {
            self.confirms_death
        }
    }

    fn manager(
        probe: FakeProbe,
        record: Option<ProcessRecord>,
        killer: FakeKiller,
    ) -> PortManager<FakeProbe, FakeInspector, FakeKiller> {
        PortManager::with_parts(probe, FakeInspector { record }, killer, SafetyPolicy::new())
    }

    #[tokio::test]
    async fn test_resolve_returns_preferred_when_free() {
        let mgr = manager(FakeProbe::with_busy([]), None, FakeKiller::new(true));
        assert_eq!(mgr.resolve_port_conflict(Some(8080)).await.unwrap(), 8080);
    }

    #[tokio::test]
    async fn test_resolve_scans_fallback_range_in_order() {
        // 5000-5002 occupied, 5003 free: the scan must pick exactly 5003
        let mgr = manager(
            FakeProbe::with_busy([5000, 5001, 5002]),
            None,
            FakeKiller::new(true),
        );
        assert_eq!(mgr.resolve_port_conflict(Some(5000)).await.unwrap(), 5003);
    }

    #[tokio::test]
    async fn test_resolve_exhaustion_reports_diagnostics() {
        let mgr = manager(FakeProbe::all_busy(), None, FakeKiller::new(true));
        let err = mgr.resolve_port_conflict(Some(5000)).await.unwrap_err();
        match err {
            Error::NoAvailablePorts {
                preferred,
                range_start,
                range_end,
                max_retries,
            } => {
                assert_eq!(preferred, Some(5000));
                assert_eq!(range_start, 5000);
                assert_eq!(range_end, 5019);
                assert_eq!(max_retries, 20);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_force_port_free_port_is_returned() {
        let mgr = manager(FakeProbe::with_busy([]), None, FakeKiller::new(true));
        assert_eq!(mgr.force_port(5000, false).await.unwrap(), 5000);
    }

    #[tokio::test]
    async fn test_force_port_without_kill_permission() {
        let mgr = manager(FakeProbe::with_busy([5000]), None, FakeKiller::new(true));
        let err = mgr.force_port(5000, false).await.unwrap_err();
        assert!(matches!(err, Error::PortOccupied(5000)));
    }

    #[tokio::test]
    async fn test_force_port_unknown_owner() {
        let mgr = manager(FakeProbe::with_busy([5000]), None, FakeKiller::new(true));
        let err = mgr.force_port(5000, true).await.unwrap_err();
        assert!(matches!(err, Error::PortForceReleaseFailed { port: 5000, .. }));
    }

    #[tokio::test]
    async fn test_force_port_refuses_unsafe_owner_without_kill_attempt() {
        let killer = FakeKiller::new(true);
        let record = ProcessRecord::new(77, "explorer.exe", "explorer.exe", 5000);
        let mgr = manager(FakeProbe::with_busy([5000]), Some(record), killer.clone());

        let err = mgr.force_port(5000, true).await.unwrap_err();
        assert!(matches!(err, Error::UnsafeProcessKill { pid: 77, .. }));
        // The gate must refuse before any termination is attempted
        assert_eq!(killer.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_port_rebind_race_is_reported() {
        // Owner is killable and dies, but the probe keeps reporting the
        // port busy: someone re-bound it
        let killer = FakeKiller::new(true);
        let record = ProcessRecord::new(88, "node", "node server.js", 5000);
        let mgr = manager(FakeProbe::with_busy([5000]), Some(record), killer.clone());

        let err = mgr.force_port(5000, true).await.unwrap_err();
        assert!(matches!(err, Error::PortStillOccupied(5000)));
        assert_eq!(killer.attempts(), 1);
    }

    #[tokio::test]
    async fn test_force_port_kill_failure() {
        let killer = FakeKiller::new(false);
        let record = ProcessRecord::new(99, "node", "node server.js", 5000);
        let mgr = manager(FakeProbe::with_busy([5000]), Some(record), killer);

        let err = mgr.force_port(5000, true).await.unwrap_err();
        assert!(matches!(err, Error::PortForceReleaseFailed { port: 5000, .. }));
    }

    #[tokio::test]
    async fn test_wait_for_release_returns_immediately_when_free() {
        let mgr = manager(FakeProbe::with_busy([]), None, FakeKiller::new(true));
        mgr.wait_for_release(5000, Duration::from_millis(200))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_release_timeout_carries_elapsed() {
        let mgr = manager(FakeProbe::with_busy([5000]), None, FakeKiller::new(true));
        let err = mgr
            .wait_for_release(5000, Duration::from_millis(300))
            .await
            .unwrap_err();
        match err {
            Error::PortReleaseTimeout { port, waited_ms } => {
                assert_eq!(port, 5000);
                assert_eq!(waited_ms, 300);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_port_never_fails() {
        // Free port
        let mgr = manager(FakeProbe::with_busy([]), None, FakeKiller::new(true));
        mgr.cleanup_port(5000).await.unwrap();

        // Occupied, unknown owner
        let mgr = manager(FakeProbe::with_busy([5000]), None, FakeKiller::new(true));
        mgr.cleanup_port(5000).await.unwrap();

        // Occupied by an unsafe process: skipped, not an error
        let record = ProcessRecord::new(1, "systemd", "/sbin/init", 5000);
        let killer = FakeKiller::new(true);
        let mgr = manager(FakeProbe::with_busy([5000]), Some(record), killer.clone());
        mgr.cleanup_port(5000).await.unwrap();
        assert_eq!(killer.attempts(), 0);

        // Killable owner but the port never frees: still no error
        let record = ProcessRecord::new(2, "node", "node stale.js", 5000);
        let killer = FakeKiller::new(true);
        let mgr = manager(FakeProbe::with_busy([5000]), Some(record), killer.clone());
        mgr.cleanup_port(5000).await.unwrap();
        assert_eq!(killer.attempts(), 1);
    }

    #[tokio::test]
    async fn test_port_status_attributes_owner() {
        let record = ProcessRecord::new(321, "node", "node server.js", 5000);
        let mgr = manager(FakeProbe::with_busy([5000]), Some(record), FakeKiller::new(true));

        let status = mgr.port_status(5000).await;
        assert!(!status.available);
        assert_eq!(status.pid, Some(321));

        let status = mgr.port_status(5001).await;
        assert!(status.available);
        assert!(status.pid.is_none());
    }

    #[tokio::test]
    async fn test_range_status_covers_fallback_range() {
        let mgr = manager(FakeProbe::with_busy([5003]), None, FakeKiller::new(true));
        let statuses = mgr.range_status().await;
        assert_eq!(statuses.len(), 20);
        assert_eq!(statuses[0].port, 5000);
        assert_eq!(statuses[19].port, 5019);
        assert!(!statuses[3].available);
        assert!(statuses[4].available);
    }
}

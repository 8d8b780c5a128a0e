//! In-memory registry of pending feedback sessions.
//!
//! A session models a single-resolution future keyed by string ID: the
//! event that settles it (a human submitting feedback) arrives on a
//! different control path than the call that created it, so the
//! settlement handle has to live in a lookup table rather than a call
//! stack. Settlement is exactly-once: the handle leaves the registry
//! under the same lock that removes the entry, whether it is the
//! external completion, the timeout sweep, or shutdown that wins.
//!
//! Settled sessions are deleted, not archived; state is volatile by
//! design.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default interval between expiry sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Generate a fresh feedback session ID.
pub fn generate_session_id() -> String {
    format!("feedback-{}", uuid::Uuid::new_v4())
}

/// Settlement outcome delivered to the creator of a session.
pub type Settlement<R> = Result<Vec<R>>;

struct Session<R> {
    work_summary: String,
    results: Vec<R>,
    created_at: Instant,
    timeout: Duration,
    /// Taken exactly once, atomically with removal from the registry.
    settle: Option<oneshot::Sender<Settlement<R>>>,
}

impl<R> Session<R> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.timeout
    }
}

/// Read-only snapshot of a pending session.
#[derive(Debug, Clone)]
pub struct SessionView<R> {
    pub id: String,
    pub work_summary: String,
    pub elapsed: Duration,
    pub timeout: Duration,
    pub results: Vec<R>,
}

/// Registry counts split by expiry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
}

struct Inner<R> {
    sessions: Mutex<HashMap<String, Session<R>>>,
}

impl<R> Inner<R> {
    /// Settle every expired session with a timeout rejection.
    ///
    /// The read path applies the same expiry predicate lazily, so an
    /// entry the sweep has not reached yet is never observable past its
    /// deadline.
    fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut cleaned = 0;

        let mut sessions = self.sessions.lock();
        sessions.retain(|id, session| {
            if !session.is_expired(now) {
                return true;
            }
            if let Some(tx) = session.settle.take() {
                let _ = tx.send(Err(Error::SessionTimeout(session.timeout.as_secs())));
            }
            debug!(session_id = %id, "expired session settled and removed");
            cleaned += 1;
            false
        });
        drop(sessions);

        if cleaned > 0 {
            info!(count = cleaned, "cleaned up expired sessions");
        }
        cleaned
    }
}

/// Keyed store of pending sessions with timeout-driven settlement.
///
/// Generic over the opaque result type `R`; the store performs no
/// interpretation of results or work summaries.
pub struct SessionStore<R> {
    inner: Arc<Inner<R>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<R: Send + 'static> SessionStore<R> {
    /// Create a store sweeping at the default 60s interval.
    ///
    /// Must be called within a tokio runtime; the sweep task is spawned
    /// immediately.
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    /// Create a store sweeping at a custom interval.
    pub fn with_sweep_interval(interval: Duration) -> Self {
        let inner = Arc::new(Inner {
            sessions: Mutex::new(HashMap::new()),
        });

        let weak: Weak<Inner<R>> = Arc::downgrade(&inner);
        let sweeper = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the
            // first real sweep happens one interval from now
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.sweep_expired();
            }
        });

        Self {
            inner,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Register a pending session and return its settlement handle.
    ///
    /// The receiver resolves with `Ok(results)` on external completion
    /// and rejects with [`Error::SessionTimeout`] or
    /// [`Error::ServerShutdown`] otherwise, so the creating side can
    /// always turn a timeout into a terminal "no feedback" response
    /// instead of hanging. A session created under an ID that is
    /// already pending replaces the old entry; the displaced handle is
    /// dropped and its creator observes a closed channel.
    pub fn create(
        &self,
        id: impl Into<String>,
        work_summary: impl Into<String>,
        timeout: Duration,
    ) -> oneshot::Receiver<Settlement<R>> {
        let id = id.into();
        let (tx, rx) = oneshot::channel();

        let session = Session {
            work_summary: work_summary.into(),
            results: Vec::new(),
            created_at: Instant::now(),
            timeout,
            settle: Some(tx),
        };

        // A displaced entry's sender is dropped here, closing its channel
        drop(self.inner.sessions.lock().insert(id.clone(), session));

        debug!(session_id = %id, timeout_secs = timeout.as_secs(), "session created");
        rx
    }

    /// Snapshot a pending session.
    ///
    /// Applies lazy expiry: an entry past its deadline is settled with
    /// a timeout rejection, removed, and reported absent, even if the
    /// periodic sweep has not reached it yet.
    pub fn get(&self, id: &str) -> Option<SessionView<R>>
    where
        R: Clone,
    {
        let now = Instant::now();
        let mut sessions = self.inner.sessions.lock();

        if self.reap_if_expired(&mut sessions, id, now) {
            return None;
        }

        sessions.get(id).map(|session| SessionView {
            id: id.to_string(),
            work_summary: session.work_summary.clone(),
            elapsed: now.duration_since(session.created_at),
            timeout: session.timeout,
            results: session.results.clone(),
        })
    }

    /// Append a result to a pending session. Returns `false` when the
    /// session is absent or expired.
    pub fn append(&self, id: &str, result: R) -> bool {
        let now = Instant::now();
        let mut sessions = self.inner.sessions.lock();

        if self.reap_if_expired(&mut sessions, id, now) {
            return false;
        }

        match sessions.get_mut(id) {
            Some(session) => {
                session.results.push(result);
                true
            }
            None => false,
        }
    }

    /// Externally complete a session, resolving it with the results
    /// accumulated so far. Returns `false` when absent or expired.
    pub fn complete(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut sessions = self.inner.sessions.lock();

        if self.reap_if_expired(&mut sessions, id, now) {
            return false;
        }

        let Some(mut session) = sessions.remove(id) else {
            return false;
        };
        drop(sessions);

        if let Some(tx) = session.settle.take() {
            let _ = tx.send(Ok(std::mem::take(&mut session.results)));
        }
        debug!(session_id = %id, "session completed");
        true
    }

    /// Remove a session without settling it; the settlement handle is
    /// dropped and the creator observes a closed channel.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.inner.sessions.lock().remove(id).is_some();
        if removed {
            debug!(session_id = %id, "session deleted");
        }
        removed
    }

    /// Number of registered sessions, expired entries included until
    /// they are reaped.
    pub fn count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Registry counts split by the expiry predicate.
    pub fn stats(&self) -> SessionStats {
        let now = Instant::now();
        let sessions = self.inner.sessions.lock();

        let expired = sessions.values().filter(|s| s.is_expired(now)).count();
        SessionStats {
            total: sessions.len(),
            active: sessions.len() - expired,
            expired,
        }
    }

    /// Run one expiry sweep now. Exposed so callers and tests can force
    /// a deterministic sweep instead of waiting for the interval.
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired()
    }

    /// Reject every pending session with [`Error::ServerShutdown`],
    /// empty the registry, and cancel the sweep task.
    pub fn clear(&self) {
        let mut sessions = self.inner.sessions.lock();
        for (id, session) in sessions.iter_mut() {
            if let Some(tx) = session.settle.take() {
                let _ = tx.send(Err(Error::ServerShutdown));
            }
            debug!(session_id = %id, "session rejected for shutdown");
        }
        sessions.clear();
        drop(sessions);

        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        info!("all sessions cleared");
    }

    /// Remove and reject `id` when its deadline has passed. Returns
    /// `true` when the entry was reaped. Caller holds the lock.
    fn reap_if_expired(
        &self,
        sessions: &mut HashMap<String, Session<R>>,
        id: &str,
        now: Instant,
    ) -> bool {
        let expired = sessions.get(id).is_some_and(|s| s.is_expired(now));
        if expired {
            if let Some(mut session) = sessions.remove(id) {
                if let Some(tx) = session.settle.take() {
                    let _ = tx.send(Err(Error::SessionTimeout(session.timeout.as_secs())));
                }
            }
            debug!(session_id = %id, "session expired at read time");
        }
        expired
    }
}

impl<R> Drop for SessionStore<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

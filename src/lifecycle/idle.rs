//! Active-connection accounting and the idle-shutdown timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::lifecycle::shutdown::Shutdown;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient; only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection, used in log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Inner {
    active: AtomicU64,
    changes: watch::Sender<u64>,
}

impl Inner {
    fn release(&self) {
        let now = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        let _ = self.changes.send(now);
    }
}

/// Tracks how many connections are currently being served.
///
/// Every transition is published on a watch channel so the idle timer and
/// the drain-on-shutdown wait can both observe count changes without
/// polling.
#[derive(Clone)]
pub struct ActivityTracker {
    inner: Arc<Inner>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                active: AtomicU64::new(0),
                changes,
            }),
        }
    }

    /// Record a new active connection. The returned guard decrements the
    /// count when dropped, whatever way the handler exits.
    pub fn track(&self) -> ActivityGuard {
        let now = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.inner.changes.send(now);
        ActivityGuard {
            inner: Arc::clone(&self.inner),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    /// Wait until no connections remain.
    pub async fn wait_idle(&self) {
        let mut changes = self.subscribe();
        while *changes.borrow_and_update() != 0 {
            if changes.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard tying a connection's lifetime to the tracker.
pub struct ActivityGuard {
    inner: Arc<Inner>,
    id: ConnectionId,
}

impl ActivityGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.inner.release();
        tracing::trace!(connection_id = %self.id, "connection closed");
    }
}

/// Shut the proxy down after `timeout` with no active connections.
///
/// The countdown arms whenever the count reaches zero and disarms the
/// moment a connection arrives. Runs until it fires or the tracker goes
/// away.
pub async fn run_idle_timer(tracker: ActivityTracker, timeout: Duration, shutdown: Arc<Shutdown>) {
    let mut changes = tracker.subscribe();
    loop {
        if *changes.borrow_and_update() == 0 {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    tracing::info!(
                        idle_secs = timeout.as_secs(),
                        "idle timeout reached, shutting down"
                    );
                    shutdown.trigger();
                    return;
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        } else if changes.changed().await.is_err() {
            return;
        }
    }
}

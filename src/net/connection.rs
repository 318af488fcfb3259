//! Live-connection accounting.
//!
//! Every accepted socket is counted from accept until its task ends. The
//! count is what `getCurrentConnections` and the status API report, and
//! what shutdown waits on while draining.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::observability::metrics;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection number, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    live: AtomicU64,
    opened: AtomicU64,
    drained: Notify,
}

/// Shared live-connection counter. Clones observe the same count.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    counters: Arc<Counters>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new connection until the returned guard is dropped.
    pub fn track(&self) -> ConnectionGuard {
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.opened.fetch_add(1, Ordering::Relaxed);
        metrics::record_active_connections(live);
        ConnectionGuard {
            counters: Arc::clone(&self.counters),
            id: ConnectionId::next(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Connections accepted since the tracker was created.
    pub fn total_opened(&self) -> u64 {
        self.counters.opened.load(Ordering::Relaxed)
    }

    /// Wait for the live count to reach zero. `false` if `deadline` passed first.
    pub async fn wait_for_idle(&self, deadline: Duration) -> bool {
        let drained = async {
            loop {
                // Register before checking so a drop in between is not missed.
                let notified = self.counters.drained.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// Keeps one connection counted while alive.
#[derive(Debug)]
pub struct ConnectionGuard {
    counters: Arc<Counters>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let live = self.counters.live.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_active_connections(live);
        if live == 0 {
            self.counters.drained.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, live, "Connection released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();
        assert!(second > first);
        assert_eq!(first.to_string(), format!("conn-{}", first.as_u64()));
    }

    #[test]
    fn test_guards_move_the_count() {
        let tracker = ConnectionTracker::new();
        let observer = tracker.clone();

        let a = tracker.track();
        let b = tracker.track();
        assert_eq!(observer.active_count(), 2);

        drop(a);
        assert_eq!(observer.active_count(), 1);
        drop(b);
        assert_eq!(observer.active_count(), 0);
        assert_eq!(observer.total_opened(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_idle() {
        let tracker = ConnectionTracker::new();
        assert!(tracker.wait_for_idle(Duration::from_millis(10)).await);

        let guard = tracker.track();
        assert!(!tracker.wait_for_idle(Duration::from_millis(50)).await);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(guard);
        });
        assert!(tracker.wait_for_idle(Duration::from_secs(2)).await);
    }
}

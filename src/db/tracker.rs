//! Active-query tracking.
//!
//! Every logical query gets a monotonic identifier and is registered here
//! for its lifetime. The tracker counts completed, cancelled, and active
//! queries, carries the draining flag, and signals waiters when the active
//! count reaches zero. Registration while draining fails with the
//! retryable [`Error::Draining`].

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Notify;

/// Counters snapshot for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub active: usize,
    pub completed: u64,
    pub cancelled: u64,
}

#[derive(Debug)]
struct TrackedQuery {
    #[allow(dead_code)]
    started_at: Instant,
    /// First 100 chars of the statement, for diagnostics only.
    #[allow(dead_code)]
    sql_head: String,
}

/// Shared tracker; one per driver, shared with the drain protocol.
#[derive(Debug)]
pub struct QueryTracker {
    next_id: AtomicU64,
    active: Mutex<HashMap<u64, TrackedQuery>>,
    completed: AtomicU64,
    cancelled: AtomicU64,
    draining: AtomicBool,
    idle: Notify,
}

impl QueryTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
            completed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            draining: AtomicBool::new(false),
            idle: Notify::new(),
        })
    }

    /// Registers a query and returns a guard that completes it on drop.
    pub fn register(self: &Arc<Self>, sql: &str) -> Result<QueryGuard> {
        if self.draining.load(Ordering::SeqCst) {
            return Err(Error::Draining);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut active = self.active.lock().expect("tracker lock poisoned");
        // Draining may have flipped between the check and the lock.
        if self.draining.load(Ordering::SeqCst) {
            return Err(Error::Draining);
        }
        active.insert(
            id,
            TrackedQuery {
                started_at: Instant::now(),
                sql_head: sql.chars().take(100).collect(),
            },
        );
        Ok(QueryGuard {
            tracker: Arc::clone(self),
            id,
        })
    }

    fn complete(&self, id: u64) {
        let removed = {
            let mut active = self.active.lock().expect("tracker lock poisoned");
            active.remove(&id).is_some()
        };
        if removed {
            self.completed.fetch_add(1, Ordering::SeqCst);
            self.notify_if_idle();
        }
    }

    /// Marks every active query cancelled and clears the map.
    ///
    /// Returns how many queries were cancelled.
    pub fn cancel_remaining(&self) -> usize {
        let drained: usize = {
            let mut active = self.active.lock().expect("tracker lock poisoned");
            let count = active.len();
            active.clear();
            count
        };
        self.cancelled.fetch_add(drained as u64, Ordering::SeqCst);
        self.notify_if_idle();
        drained
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().expect("tracker lock poisoned").len()
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            active: self.active_count(),
            completed: self.completed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
        }
    }

    /// Flips the draining flag; new registrations fail from here on.
    pub fn start_draining(&self) {
        self.draining.store(true, Ordering::SeqCst);
        self.notify_if_idle();
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Suspends until the active count reaches zero.
    pub async fn wait_idle(&self) {
        loop {
            if self.active_count() == 0 {
                return;
            }
            self.idle.notified().await;
        }
    }

    fn notify_if_idle(&self) {
        if self.active_count() == 0 {
            self.idle.notify_waiters();
        }
    }
}

/// Completes its query in the tracker when dropped.
#[derive(Debug)]
pub struct QueryGuard {
    tracker: Arc<QueryTracker>,
    id: u64,
}

impl QueryGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for QueryGuard {
    fn drop(&mut self) {
        self.tracker.complete(self.id);
    }
}

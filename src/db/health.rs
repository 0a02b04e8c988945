//! Periodic health probing with edge-triggered change notification.
//!
//! The monitor keeps the last probe outcome, fires the configured callback
//! exactly once per healthy↔unhealthy transition, and owns the periodic
//! probe task. `start` and `stop` are idempotent; at most one probe task
//! exists per driver.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Outcome of one probe.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: u64,
    pub last_checked_at: DateTime<Utc>,
    pub error: Option<String>,
}

type ChangeCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Health state shared by the driver and its probe task.
pub struct HealthMonitor {
    /// `None` until the first probe completes.
    last_healthy: Mutex<Option<bool>>,
    callback: Mutex<Option<ChangeCallback>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            last_healthy: Mutex::new(None),
            callback: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// True if the most recent probe succeeded. Before any probe the
    /// driver is assumed healthy (it connected).
    pub fn is_healthy(&self) -> bool {
        self.last_healthy
            .lock()
            .expect("health lock poisoned")
            .unwrap_or(true)
    }

    pub fn on_change(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        *self.callback.lock().expect("health lock poisoned") = Some(Box::new(callback));
    }

    /// Records a probe outcome, firing the callback on an edge.
    pub fn record(&self, status: &HealthStatus) {
        let mut last = self.last_healthy.lock().expect("health lock poisoned");
        let changed = *last != Some(status.healthy);
        *last = Some(status.healthy);
        drop(last);

        if changed {
            if status.healthy {
                info!(latency_ms = status.latency_ms, "database became healthy");
            } else {
                warn!(error = ?status.error, "database became unhealthy");
            }
            if let Some(callback) = &*self.callback.lock().expect("health lock poisoned") {
                callback(status.healthy);
            }
        }
    }

    /// Spawns the periodic probe task. A second call is a no-op.
    pub fn start(&self, driver: Arc<super::driver::Driver>, interval: Duration) {
        let mut slot = self.task.lock().expect("health lock poisoned");
        if slot.is_some() {
            return;
        }
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                driver.health_check().await;
            }
        }));
    }

    /// Aborts the probe task if one is running.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().expect("health lock poisoned").take() {
            task.abort();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn status(healthy: bool) -> HealthStatus {
        HealthStatus {
            healthy,
            latency_ms: 1,
            last_checked_at: Utc::now(),
            error: if healthy { None } else { Some("boom".into()) },
        }
    }

    #[test]
    fn callback_fires_once_per_edge() {
        let monitor = HealthMonitor::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        monitor.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.record(&status(true)); // None -> healthy: an edge
        monitor.record(&status(true)); // steady state, no callback
        monitor.record(&status(false)); // edge
        monitor.record(&status(false)); // steady
        monitor.record(&status(true)); // edge

        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn healthy_by_default() {
        assert!(HealthMonitor::new().is_healthy());
    }
}

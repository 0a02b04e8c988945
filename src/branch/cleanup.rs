//! Time-based branch cleanup.
//!
//! Sweeps branches whose `last_accessed_at` is older than the age limit,
//! skipping protected branches (configurable) and anything already
//! deleting. A delete failure does not abort the sweep. The scheduler runs
//! on a tokio interval with overrun protection: a sweep in progress blocks
//! the next tick, and failures land in a bounded history ring.

use super::{BranchEngine, BranchStatus};
use crate::error::Result;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Bounded error-history size.
const ERROR_RING_CAPACITY: usize = 32;

/// Options for one cleanup sweep.
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    /// Branches idle longer than this are deleted.
    pub max_age_days: i64,
    /// Leave protected branches alone.
    pub skip_protected: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            max_age_days: 14,
            skip_protected: true,
        }
    }
}

/// Sweep outcome: deleted and skipped slugs.
#[derive(Debug, Clone, Default)]
pub struct CleanupResult {
    pub deleted: Vec<String>,
    pub skipped: Vec<String>,
}

impl BranchEngine {
    /// Deletes stale branches one by one; failures are skipped, not fatal.
    pub async fn cleanup(&self, options: &CleanupOptions) -> Result<CleanupResult> {
        let now = Utc::now();
        let mut result = CleanupResult::default();

        for branch in self.list().await? {
            if branch.status == BranchStatus::Deleting {
                continue;
            }
            if options.skip_protected && branch.protected {
                result.skipped.push(branch.slug);
                continue;
            }
            let stale = branch
                .last_accessed_at
                .map(|accessed| (now - accessed).num_days() >= options.max_age_days)
                .unwrap_or(false);
            if !stale {
                result.skipped.push(branch.slug);
                continue;
            }
            match self.delete(&branch.slug, false).await {
                Ok(()) => result.deleted.push(branch.slug),
                Err(error) => {
                    warn!(slug = %branch.slug, %error, "branch cleanup delete failed");
                    result.skipped.push(branch.slug);
                }
            }
        }

        info!(
            deleted = result.deleted.len(),
            skipped = result.skipped.len(),
            "branch cleanup sweep complete"
        );
        Ok(result)
    }
}

/// Periodic cleanup runner with overrun protection.
pub struct CleanupScheduler {
    engine: Arc<BranchEngine>,
    options: CleanupOptions,
    running: Arc<AtomicBool>,
    errors: Arc<Mutex<VecDeque<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CleanupScheduler {
    pub fn new(engine: Arc<BranchEngine>, options: CleanupOptions) -> Self {
        Self {
            engine,
            options,
            running: Arc::new(AtomicBool::new(false)),
            errors: Arc::new(Mutex::new(VecDeque::new())),
            task: Mutex::new(None),
        }
    }

    /// Starts the timer. Idempotent.
    pub fn start(&self, interval: Duration) {
        let mut slot = self.task.lock().expect("scheduler lock poisoned");
        if slot.is_some() {
            return;
        }
        let engine = Arc::clone(&self.engine);
        let options = self.options.clone();
        let running = Arc::clone(&self.running);
        let errors = Arc::clone(&self.errors);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                // A sweep still in flight blocks this tick.
                if running.swap(true, Ordering::SeqCst) {
                    continue;
                }
                if let Err(error) = engine.cleanup(&options).await {
                    let mut ring = errors.lock().expect("error ring lock poisoned");
                    if ring.len() == ERROR_RING_CAPACITY {
                        ring.pop_front();
                    }
                    ring.push_back(error.to_string());
                }
                running.store(false, Ordering::SeqCst);
            }
        }));
    }

    /// Stops the timer. Idempotent.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().expect("scheduler lock poisoned").take() {
            task.abort();
        }
    }

    /// Recent sweep errors, oldest first.
    pub fn recent_errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .expect("error ring lock poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Graceful drain protocol.
//!
//! `drain_and_close` stops the driver accepting new work, waits for the
//! active count to reach zero or the timeout, optionally cancels the
//! remainder, and closes the pool. Progress is published through the
//! configured callback as `draining → cancelling → closing → complete`.
//! Signal handlers can be wired to trigger a drain on SIGINT/SIGTERM.

use super::driver::Driver;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Drain lifecycle phases published to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPhase {
    Draining,
    Cancelling,
    Closing,
    Complete,
}

type ProgressCallback = Box<dyn Fn(DrainPhase) + Send + Sync>;

/// Options for [`Driver::drain_and_close`].
pub struct DrainOptions {
    /// How long to wait for in-flight queries.
    pub timeout: Duration,
    /// Cancel unfinished queries when the timeout expires instead of
    /// failing the drain.
    pub force_cancel_on_timeout: bool,
    pub on_progress: Option<ProgressCallback>,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            force_cancel_on_timeout: true,
            on_progress: None,
        }
    }
}

/// Outcome of a completed drain.
#[derive(Debug, Clone, Copy)]
pub struct DrainResult {
    pub completed: u64,
    pub cancelled: u64,
    pub elapsed: Duration,
    /// True when the timeout expired and queries were force-cancelled.
    pub forced: bool,
}

impl Driver {
    /// Drains in-flight work and closes the pool.
    ///
    /// With `force_cancel_on_timeout` unset, a timeout surfaces as
    /// [`Error::DrainTimeout`] and the pool stays open; with it set, the
    /// remaining queries are marked cancelled and the pool closes anyway.
    pub async fn drain_and_close(&self, options: DrainOptions) -> Result<DrainResult> {
        let started = Instant::now();
        let progress = |phase: DrainPhase| {
            if let Some(callback) = &options.on_progress {
                callback(phase);
            }
        };

        self.tracker().start_draining();
        progress(DrainPhase::Draining);
        info!(active = self.get_active_query_count(), "drain started");

        let drained_in_time =
            tokio::time::timeout(options.timeout, self.tracker().wait_idle())
                .await
                .is_ok();

        let mut forced = false;
        if !drained_in_time {
            if !options.force_cancel_on_timeout {
                return Err(Error::DrainTimeout {
                    active: self.get_active_query_count(),
                });
            }
            progress(DrainPhase::Cancelling);
            let cancelled = self.tracker().cancel_remaining();
            warn!(cancelled, "drain timeout expired, cancelling remaining queries");
            forced = true;
        }

        progress(DrainPhase::Closing);
        self.stop_health_checks();
        self.close_pool_only().await;
        progress(DrainPhase::Complete);

        let stats = self.tracker_stats();
        info!(
            completed = stats.completed,
            cancelled = stats.cancelled,
            forced,
            "drain complete"
        );
        Ok(DrainResult {
            completed: stats.completed,
            cancelled: stats.cancelled,
            elapsed: started.elapsed(),
            forced,
        })
    }
}

/// Exit codes used by the signal-triggered drain.
#[derive(Debug, Clone, Copy)]
pub struct SignalDrainConfig {
    pub timeout: Duration,
    /// Exit code when the drain completes cleanly.
    pub exit_code: i32,
    /// Exit code when queries had to be cancelled.
    pub forced_exit_code: i32,
}

impl Default for SignalDrainConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            exit_code: 0,
            forced_exit_code: 1,
        }
    }
}

/// Installs SIGINT/SIGTERM handlers that drain the driver and exit.
pub fn install_signal_drain(driver: Arc<Driver>, config: SignalDrainConfig) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, draining");
        let result = driver
            .drain_and_close(DrainOptions {
                timeout: config.timeout,
                force_cancel_on_timeout: true,
                on_progress: None,
            })
            .await;
        let code = match result {
            Ok(drain) if drain.forced => config.forced_exit_code,
            Ok(_) => config.exit_code,
            Err(_) => config.forced_exit_code,
        };
        std::process::exit(code);
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

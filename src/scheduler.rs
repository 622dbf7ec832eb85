//! Scheduler
//!
//! Drives the collection loop: one health sweep at startup, one collection
//! cycle immediately after, then a cycle every `interval`. Cycles never
//! overlap; a slow cycle delays the next tick instead of queueing a burst.
//!
//! A health sweep runs after every [`health_sweep_every`] completed cycles,
//! counted explicitly rather than by wall clock.
//!
//! Each cycle and sweep runs in its own task so a panic is contained: it is
//! logged, the loop backs off for `error_backoff`, and collection resumes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{DEFAULT_ERROR_BACKOFF, MIN_INTERVAL};
use crate::engine::CollectionEngine;
use crate::health::HealthMonitor;

/// Target time between health sweeps (1 hour).
pub const HEALTH_SWEEP_PERIOD: Duration = Duration::from_secs(3600);

/// Completed cycles between health sweeps for a given interval.
///
/// ```
/// use std::time::Duration;
/// use tributary::scheduler::health_sweep_every;
///
/// assert_eq!(health_sweep_every(Duration::from_secs(60)), 60);
/// assert_eq!(health_sweep_every(Duration::from_secs(7200)), 1);
/// ```
pub fn health_sweep_every(interval: Duration) -> u64 {
    let secs = interval.as_secs().max(1);
    (HEALTH_SWEEP_PERIOD.as_secs() / secs).max(1)
}

/// Periodic driver for the collection engine and health monitor.
#[derive(Debug)]
pub struct Scheduler {
    engine: Arc<CollectionEngine>,
    monitor: Arc<HealthMonitor>,
    interval: Duration,
    error_backoff: Duration,
    sweep_every: u64,
}

impl Scheduler {
    /// Create a scheduler. Intervals below one second are raised to one second.
    pub fn new(
        engine: Arc<CollectionEngine>,
        monitor: Arc<HealthMonitor>,
        interval: Duration,
    ) -> Self {
        let interval = if interval < MIN_INTERVAL {
            tracing::warn!(
                requested = ?interval,
                "Collection interval below minimum, using {:?}",
                MIN_INTERVAL
            );
            MIN_INTERVAL
        } else {
            interval
        };

        Self {
            engine,
            monitor,
            interval,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            sweep_every: health_sweep_every(interval),
        }
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn sweep_every(&self) -> u64 {
        self.sweep_every
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// An in-flight cycle always completes. Returns the number of cycles
    /// completed.
    pub async fn run(self, shutdown: CancellationToken) -> u64 {
        tracing::info!(
            interval = ?self.interval,
            sweep_every = self.sweep_every,
            "Scheduler started"
        );

        if !self.sweep(&shutdown).await {
            return 0;
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut completed = 0;
        let mut since_sweep = 0;
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            if self.cycle(&shutdown).await {
                completed += 1;
                since_sweep += 1;
            }

            if since_sweep >= self.sweep_every {
                since_sweep = 0;
                if !self.sweep(&shutdown).await {
                    break;
                }
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.cancelled() => break,
            }
        }

        tracing::info!(cycles = completed, "Scheduler stopped");
        completed
    }

    /// Run one collection cycle. Returns `true` if it completed.
    async fn cycle(&self, shutdown: &CancellationToken) -> bool {
        let engine = Arc::clone(&self.engine);
        match tokio::spawn(async move { engine.collect_all_sources().await }).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Collection cycle aborted");
                self.backoff(shutdown).await;
                false
            }
        }
    }

    /// Run one health sweep. Returns `false` if shutdown arrived during backoff.
    async fn sweep(&self, shutdown: &CancellationToken) -> bool {
        let monitor = Arc::clone(&self.monitor);
        match tokio::spawn(async move { monitor.test_all().await }).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Health sweep aborted");
                self.backoff(shutdown).await
            }
        }
    }

    /// Sleep for `error_backoff`. Returns `false` if shutdown arrived first.
    async fn backoff(&self, shutdown: &CancellationToken) -> bool {
        tracing::warn!(backoff = ?self.error_backoff, "Backing off before resuming");
        tokio::select! {
            _ = tokio::time::sleep(self.error_backoff) => true,
            _ = shutdown.cancelled() => false,
        }
    }
}

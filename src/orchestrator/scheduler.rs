//! Upstream refresh scheduler
//!
//! Periodically nudges the flood collector with a `CollectNow` INFORM that
//! is indistinguishable from tick-driven collection. Tracks run statistics
//! and supports manual triggering from the admin surface.

use crate::messaging::{AclMessage, MailboxRouter, MessageContent, SendError, names};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Shared run statistics. The collector adds data points as it emits
/// batches; the scheduler records run outcomes.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    total_runs: AtomicU64,
    successful_runs: AtomicU64,
    failed_runs: AtomicU64,
    data_points_collected: AtomicU64,
    last_run_time: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

/// Serializable snapshot of the statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatsSnapshot {
    /// Refreshes attempted.
    pub total_runs: u64,
    /// Refreshes whose trigger was delivered.
    pub successful_runs: u64,
    /// Refreshes whose trigger failed.
    pub failed_runs: u64,
    /// Readings emitted by the collector, cumulative.
    pub data_points_collected: u64,
    /// When the last refresh ran.
    pub last_run_time: Option<DateTime<Utc>>,
    /// The last trigger failure, when any.
    pub last_error: Option<String>,
}

impl SchedulerStats {
    fn record_success(&self, at: DateTime<Utc>) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.successful_runs.fetch_add(1, Ordering::Relaxed);
        *self.last_run_time.lock().unwrap() = Some(at);
    }

    fn record_failure(&self, at: DateTime<Utc>, error: &SendError) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
        self.failed_runs.fetch_add(1, Ordering::Relaxed);
        *self.last_run_time.lock().unwrap() = Some(at);
        *self.last_error.lock().unwrap() = Some(error.to_string());
    }

    /// Credits collected data points (called by the flood collector).
    pub fn add_data_points(&self, count: usize) {
        self.data_points_collected
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Current values.
    #[must_use]
    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            total_runs: self.total_runs.load(Ordering::Relaxed),
            successful_runs: self.successful_runs.load(Ordering::Relaxed),
            failed_runs: self.failed_runs.load(Ordering::Relaxed),
            data_points_collected: self.data_points_collected.load(Ordering::Relaxed),
            last_run_time: *self.last_run_time.lock().unwrap(),
            last_error: self.last_error.lock().unwrap().clone(),
        }
    }
}

/// The periodic refresh scheduler.
pub struct RefreshScheduler {
    router: Arc<MailboxRouter>,
    interval: Duration,
    stats: Arc<SchedulerStats>,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    /// Builds a stopped scheduler.
    #[must_use]
    pub fn new(router: Arc<MailboxRouter>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            router,
            interval,
            stats: Arc::new(SchedulerStats::default()),
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
        })
    }

    /// Shared statistics handle.
    #[must_use]
    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }

    /// Whether the periodic task is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Configured trigger interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fires one refresh now (also used by every periodic firing).
    pub async fn trigger(&self) -> Result<(), SendError> {
        let now = Utc::now();
        let nudge = AclMessage::inform(
            names::system(),
            names::flood_collector(),
            MessageContent::CollectNow,
        );
        match self.router.send(nudge).await {
            Ok(()) => {
                self.stats.record_success(now);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "refresh trigger failed");
                self.stats.record_failure(now, &err);
                Err(err)
            }
        }
    }

    /// Starts the periodic task. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.interval);
            // The first interval tick fires immediately; skip it so start()
            // does not double up with an explicit trigger.
            ticker.tick().await;
            while scheduler.running.load(Ordering::Relaxed) {
                ticker.tick().await;
                if !scheduler.running.load(Ordering::Relaxed) {
                    break;
                }
                let _ = scheduler.trigger().await;
            }
        });
        *self.handle.lock().unwrap() = Some(handle);
        info!(interval_s = self.interval.as_secs(), "refresh scheduler started");
    }

    /// Stops the periodic task.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

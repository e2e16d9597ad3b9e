//! Refresh metrics context.
//!
//! Gauges, counters and phase timers written by refresh cycles and read by
//! whoever reports them. The context is created by the host and shared as
//! `Arc<RefreshMetrics>`; nothing here is global.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;

/// Timed phases of a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A whole cycle: load plus population
    Refresh,
    /// Population pass over servers
    ServerPass,
    /// Population pass over server arrays
    ServerArrayPass,
    /// Link resolution for one instance
    LinkResolution,
}

/// Count, total and maximum of recorded durations.
#[derive(Debug, Default)]
pub struct PhaseTimer {
    count: AtomicU64,
    total_micros: AtomicU64,
    max_micros: AtomicU64,
}

impl PhaseTimer {
    /// Record one duration.
    pub fn record(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    /// Read the timer.
    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            count: self.count.load(Ordering::Relaxed),
            total_ms: self.total_micros.load(Ordering::Relaxed) as f64 / 1000.0,
            max_ms: self.max_micros.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

/// Records the time between its creation and drop into a [`PhaseTimer`].
#[must_use = "the duration is recorded when the guard is dropped"]
pub struct TimerGuard<'a> {
    timer: &'a PhaseTimer,
    started: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.started.elapsed());
    }
}

/// Point-in-time reading of a [`PhaseTimer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimerSnapshot {
    pub count: u64,
    pub total_ms: f64,
    pub max_ms: f64,
}

/// Observability context for the refresh orchestrator and pipeline.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
    node_count: AtomicUsize,
    last_refresh_duration_ms: AtomicU64,
    refresh_interval_secs: AtomicI64,
    refresh_total: AtomicU64,
    refresh_skipped: AtomicU64,
    last_completed: Mutex<Option<Instant>>,

    refresh: PhaseTimer,
    server_pass: PhaseTimer,
    server_array_pass: PhaseTimer,
    link_resolution: PhaseTimer,
}

impl RefreshMetrics {
    /// Create an empty metrics context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configured refresh interval gauge.
    pub fn set_refresh_interval(&self, secs: i64) {
        self.refresh_interval_secs.store(secs, Ordering::Relaxed);
    }

    /// Count the start of a refresh cycle.
    pub fn record_refresh_start(&self) {
        self.refresh_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed cycle.
    pub fn record_refresh_complete(&self, node_count: usize, duration: Duration) {
        self.node_count.store(node_count, Ordering::Relaxed);
        self.last_refresh_duration_ms.store(
            u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        *self.last_completed.lock() = Some(Instant::now());
    }

    /// Count a stale request that found a refresh already in flight.
    pub fn record_skipped(&self) {
        self.refresh_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Start timing a phase.
    pub fn time(&self, phase: Phase) -> TimerGuard<'_> {
        TimerGuard {
            timer: self.timer(phase),
            started: Instant::now(),
        }
    }

    /// The timer for a phase.
    pub fn timer(&self, phase: Phase) -> &PhaseTimer {
        match phase {
            Phase::Refresh => &self.refresh,
            Phase::ServerPass => &self.server_pass,
            Phase::ServerArrayPass => &self.server_array_pass,
            Phase::LinkResolution => &self.link_resolution,
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_count.load(Ordering::Relaxed)
    }

    pub fn refresh_total(&self) -> u64 {
        self.refresh_total.load(Ordering::Relaxed)
    }

    pub fn refresh_skipped(&self) -> u64 {
        self.refresh_skipped.load(Ordering::Relaxed)
    }

    /// Seconds since the last completed cycle, if any completed.
    pub fn seconds_since_last_refresh(&self) -> Option<u64> {
        self.last_completed.lock().map(|at| at.elapsed().as_secs())
    }

    /// Read every gauge, counter and timer.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            node_count: self.node_count(),
            seconds_since_last_refresh: self.seconds_since_last_refresh(),
            last_refresh_duration_ms: self.last_refresh_duration_ms.load(Ordering::Relaxed),
            refresh_interval_secs: self.refresh_interval_secs.load(Ordering::Relaxed),
            refresh_total: self.refresh_total(),
            refresh_skipped: self.refresh_skipped(),
            refresh: self.refresh.snapshot(),
            server_pass: self.server_pass.snapshot(),
            server_array_pass: self.server_array_pass.snapshot(),
            link_resolution: self.link_resolution.snapshot(),
        }
    }
}

/// Point-in-time reading of [`RefreshMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub node_count: usize,
    pub seconds_since_last_refresh: Option<u64>,
    pub last_refresh_duration_ms: u64,
    pub refresh_interval_secs: i64,
    pub refresh_total: u64,
    pub refresh_skipped: u64,
    pub refresh: TimerSnapshot,
    pub server_pass: TimerSnapshot,
    pub server_array_pass: TimerSnapshot,
    pub link_resolution: TimerSnapshot,
}

/// Log a metrics snapshot at `info` every `every` until the task is aborted.
pub fn spawn_reporter(metrics: Arc<RefreshMetrics>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snapshot = metrics.snapshot();
            info!(
                node_count = snapshot.node_count,
                seconds_since_last_refresh = ?snapshot.seconds_since_last_refresh,
                last_refresh_duration_ms = snapshot.last_refresh_duration_ms,
                refresh_interval_secs = snapshot.refresh_interval_secs,
                refresh_total = snapshot.refresh_total,
                refresh_skipped = snapshot.refresh_skipped,
                refresh_max_ms = snapshot.refresh.max_ms,
                server_pass_max_ms = snapshot.server_pass.max_ms,
                server_array_pass_max_ms = snapshot.server_array_pass.max_ms,
                link_resolution_count = snapshot.link_resolution.count,
                "Refresh metrics"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_gauges() {
        let metrics = RefreshMetrics::new();
        metrics.set_refresh_interval(60);
        metrics.record_refresh_start();
        metrics.record_refresh_start();
        metrics.record_skipped();
        assert_eq!(metrics.seconds_since_last_refresh(), None);

        metrics.record_refresh_complete(3, Duration::from_millis(250));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.refresh_total, 2);
        assert_eq!(snapshot.refresh_skipped, 1);
        assert_eq!(snapshot.node_count, 3);
        assert_eq!(snapshot.last_refresh_duration_ms, 250);
        assert_eq!(snapshot.refresh_interval_secs, 60);
        assert_eq!(snapshot.seconds_since_last_refresh, Some(0));
    }

    #[test]
    fn test_phase_timer_records_on_drop() {
        let metrics = RefreshMetrics::new();
        {
            let _guard = metrics.time(Phase::ServerPass);
        }
        metrics
            .timer(Phase::ServerPass)
            .record(Duration::from_millis(4));

        let timer = metrics.timer(Phase::ServerPass).snapshot();
        assert_eq!(timer.count, 2);
        assert!(timer.max_ms >= 4.0);
        assert_eq!(metrics.timer(Phase::Refresh).snapshot().count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_runs_until_aborted() {
        let metrics = Arc::new(RefreshMetrics::new());
        let handle = spawn_reporter(Arc::clone(&metrics), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert!(!handle.is_finished());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}

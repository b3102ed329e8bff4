//! Process counters for the orchestrator heartbeat.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Thread-safe counters covering runs, orders and scheduler activity.
#[derive(Debug)]
pub struct OrchestratorMetrics {
    runs_started: AtomicU64,
    runs_ok: AtomicU64,
    runs_failed: AtomicU64,
    runs_halted: AtomicU64,
    orders_placed: AtomicU64,
    trades_closed: AtomicU64,
    triggers_fired: AtomicU64,
    triggers_dropped: AtomicU64,
    broker_errors: AtomicU64,
    inner: RwLock<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    start_time: Instant,
    last_run_time: Option<Instant>,
}

impl Default for OrchestratorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_ok: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            runs_halted: AtomicU64::new(0),
            orders_placed: AtomicU64::new(0),
            trades_closed: AtomicU64::new(0),
            triggers_fired: AtomicU64::new(0),
            triggers_dropped: AtomicU64::new(0),
            broker_errors: AtomicU64::new(0),
            inner: RwLock::new(MetricsInner {
                start_time: Instant::now(),
                last_run_time: None,
            }),
        }
    }

    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        self.inner.write().last_run_time = Some(Instant::now());
    }

    pub fn inc_runs_ok(&self) {
        self.runs_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_runs_halted(&self) {
        self.runs_halted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orders_placed(&self, n: u64) {
        self.orders_placed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_trades_closed(&self) {
        self.trades_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_triggers_fired(&self) {
        self.triggers_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_triggers_dropped(&self) {
        self.triggers_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_broker_errors(&self) {
        self.broker_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot for the heartbeat log.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read();
        MetricsSnapshot {
            uptime_secs: inner.start_time.elapsed().as_secs(),
            seconds_since_last_run: inner.last_run_time.map(|t| t.elapsed().as_secs()),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_ok: self.runs_ok.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_halted: self.runs_halted.load(Ordering::Relaxed),
            orders_placed: self.orders_placed.load(Ordering::Relaxed),
            trades_closed: self.trades_closed.load(Ordering::Relaxed),
            triggers_fired: self.triggers_fired.load(Ordering::Relaxed),
            triggers_dropped: self.triggers_dropped.load(Ordering::Relaxed),
            broker_errors: self.broker_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub seconds_since_last_run: Option<u64>,
    pub runs_started: u64,
    pub runs_ok: u64,
    pub runs_failed: u64,
    pub runs_halted: u64,
    pub orders_placed: u64,
    pub trades_closed: u64,
    pub triggers_fired: u64,
    pub triggers_dropped: u64,
    pub broker_errors: u64,
}

/// Shared metrics handle.
pub type SharedMetrics = Arc<OrchestratorMetrics>;

/// Create a shared metrics collector.
pub fn create_metrics() -> SharedMetrics {
    Arc::new(OrchestratorMetrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = OrchestratorMetrics::new();
        metrics.inc_runs_started();
        metrics.inc_runs_ok();
        metrics.inc_orders_placed(3);
        metrics.inc_triggers_fired();

        let snap = metrics.snapshot();
        assert_eq!(snap.runs_started, 1);
        assert_eq!(snap.runs_ok, 1);
        assert_eq!(snap.orders_placed, 3);
        assert_eq!(snap.triggers_fired, 1);
        assert!(snap.seconds_since_last_run.is_some());
    }
}

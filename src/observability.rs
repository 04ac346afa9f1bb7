use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Pipeline counters for one process
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub runs: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub gate_runs: AtomicU64,
    pub blocking_errors: AtomicU64,
    pub auto_fixes: AtomicU64,
    pub rollbacks: AtomicU64,
    pub reconciliation_updates: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_run(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task(&self, success: bool) {
        if success {
            self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_gate(&self, blocking_errors: usize) {
        self.gate_runs.fetch_add(1, Ordering::Relaxed);
        self.blocking_errors
            .fetch_add(blocking_errors as u64, Ordering::Relaxed);
    }

    pub fn record_auto_fixes(&self, count: usize) {
        self.auto_fixes.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconciliation_updates(&self, count: usize) {
        self.reconciliation_updates
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> PipelineStats {
        PipelineStats {
            runs: self.runs.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            gate_runs: self.gate_runs.load(Ordering::Relaxed),
            blocking_errors: self.blocking_errors.load(Ordering::Relaxed),
            auto_fixes: self.auto_fixes.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            reconciliation_updates: self.reconciliation_updates.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            runs = stats.runs,
            tasks_completed = stats.tasks_completed,
            tasks_failed = stats.tasks_failed,
            gate_runs = stats.gate_runs,
            blocking_errors = stats.blocking_errors,
            auto_fixes = stats.auto_fixes,
            rollbacks = stats.rollbacks,
            reconciliation_updates = stats.reconciliation_updates,
            "Pipeline metrics"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub runs: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub gate_runs: u64,
    pub blocking_errors: u64,
    pub auto_fixes: u64,
    pub rollbacks: u64,
    pub reconciliation_updates: u64,
}

/// Global metrics instance
static PIPELINE_METRICS: std::sync::LazyLock<PipelineMetrics> =
    std::sync::LazyLock::new(PipelineMetrics::new);

pub fn pipeline_metrics() -> &'static PipelineMetrics {
    &PIPELINE_METRICS
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Log and return the elapsed milliseconds
    pub fn finish(self) -> u64 {
        let duration_ms = self.elapsed_ms();
        info!(
            operation = %self.operation,
            duration_ms = duration_ms,
            "Operation completed"
        );
        duration_ms
    }
}

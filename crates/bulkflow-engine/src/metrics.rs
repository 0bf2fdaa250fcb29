//! Passive pipeline counters.
//!
//! Every stage ticks its counter here; nothing in this module blocks or
//! allocates on the hot path. Reporting is a single structured log line
//! at completion — external metrics backends are out of scope.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic counters observed by the pipeline stages.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub total_records: AtomicU64,
    pub failed_records: AtomicU64,
    pub statements: AtomicU64,
    pub failed_statements: AtomicU64,
    pub batches: AtomicU64,
    pub batched_statements: AtomicU64,
    pub writes: AtomicU64,
    pub failed_writes: AtomicU64,
    pub reads: AtomicU64,
    pub failed_reads: AtomicU64,
    pub in_flight: AtomicU64,
    latency_micros: AtomicU64,
    latency_count: AtomicU64,
}

impl PipelineMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_batch(&self, statement_count: usize) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.batched_statements
            .fetch_add(statement_count as u64, Ordering::Relaxed);
    }

    pub fn observe_latency(&self, latency: Duration) {
        self.latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Mean statements per batch, or 0 when nothing was batched.
    #[must_use]
    pub fn avg_batch_size(&self) -> f64 {
        let batches = self.batches.load(Ordering::Relaxed);
        if batches == 0 {
            return 0.0;
        }
        self.batched_statements.load(Ordering::Relaxed) as f64 / batches as f64
    }

    /// Mean execution latency, or zero when nothing executed.
    #[must_use]
    pub fn avg_latency(&self) -> Duration {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.latency_micros.load(Ordering::Relaxed) / count)
    }

    /// Emit the completion snapshot.
    pub fn report(&self, elapsed: Duration) {
        let total = self.total_records.load(Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 { total as f64 / secs } else { 0.0 };
        tracing::info!(
            records = total,
            failed_records = self.failed_records.load(Ordering::Relaxed),
            writes = self.writes.load(Ordering::Relaxed),
            failed_writes = self.failed_writes.load(Ordering::Relaxed),
            reads = self.reads.load(Ordering::Relaxed),
            failed_reads = self.failed_reads.load(Ordering::Relaxed),
            batches = self.batches.load(Ordering::Relaxed),
            avg_batch_size = format!("{:.1}", self.avg_batch_size()),
            avg_latency_ms = self.avg_latency().as_millis() as u64,
            records_per_sec = format!("{throughput:.0}"),
            "Pipeline metrics"
        );
    }
}

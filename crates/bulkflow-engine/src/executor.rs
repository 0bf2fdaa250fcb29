//! Bounded-in-flight execution adapter over the driver session.
//!
//! Presents a uniform async execute with a global in-flight bound
//! (semaphore), an optional requests-per-second cap, and per-execution
//! latency accounting. Recoverable driver failures become failure
//! results flowing downstream; classification of unrecoverable causes is
//! the failed-writes gate's job so the failure is still written to the
//! bad file first. The adapter never retries.

use crate::driver::ClusterSession;
use crate::errors::PipelineError;
use crate::metrics::PipelineMetrics;
use anyhow::anyhow;
use bulkflow_types::{BulkStatement, ExecError, ExecutionDetails, WriteResult};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Driver outcome before result wrapping: recoverable failures stay in
/// the inner `Err`.
pub type QueryOutcome = Result<ExecutionDetails, ExecError>;

/// Uniform async executor with bounded in-flight concurrency.
pub struct BulkExecutor {
    session: Arc<dyn ClusterSession>,
    permits: Option<Arc<Semaphore>>,
    limiter: Option<DirectLimiter>,
    metrics: Arc<PipelineMetrics>,
    dry_run: bool,
}

impl BulkExecutor {
    #[must_use]
    pub fn new(
        session: Arc<dyn ClusterSession>,
        max_in_flight: Option<usize>,
        max_per_second: Option<u32>,
        metrics: Arc<PipelineMetrics>,
        dry_run: bool,
    ) -> Self {
        let permits = max_in_flight
            .filter(|n| *n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        let limiter = max_per_second
            .and_then(NonZeroU32::new)
            .map(|n| RateLimiter::direct(Quota::per_second(n)));
        Self {
            session,
            permits,
            limiter,
            metrics,
            dry_run,
        }
    }

    /// Execute one write statement or batch.
    ///
    /// Dry-run mode skips the driver entirely and fabricates an empty
    /// success so downstream gates still fire.
    pub async fn execute_write(
        &self,
        statement: BulkStatement,
    ) -> Result<WriteResult, PipelineError> {
        if self.dry_run {
            self.metrics.writes.fetch_add(1, Ordering::Relaxed);
            return Ok(WriteResult::success(statement, ExecutionDetails::empty()));
        }
        let outcome = self.execute_inner(&statement).await?;
        Ok(match outcome {
            Ok(details) => {
                self.metrics.writes.fetch_add(1, Ordering::Relaxed);
                WriteResult::success(statement, details)
            }
            Err(cause) => {
                self.metrics.failed_writes.fetch_add(1, Ordering::Relaxed);
                WriteResult::failure(statement, cause)
            }
        })
    }

    /// Execute one read statement, returning the page-level outcome.
    pub async fn execute_query(
        &self,
        statement: &BulkStatement,
    ) -> Result<QueryOutcome, PipelineError> {
        if self.dry_run {
            self.metrics.reads.fetch_add(1, Ordering::Relaxed);
            return Ok(Ok(ExecutionDetails::empty()));
        }
        let outcome = self.execute_inner(statement).await?;
        match &outcome {
            Ok(_) => {
                self.metrics.reads.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.failed_reads.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(outcome)
    }

    async fn execute_inner(&self, statement: &BulkStatement) -> Result<QueryOutcome, PipelineError> {
        let _permit = match &self.permits {
            Some(permits) => Some(
                permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| anyhow!("executor semaphore closed: {e}"))?,
            ),
            None => None,
        };
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        self.metrics.in_flight.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let outcome = self.session.execute(statement).await;
        self.metrics.observe_latency(start.elapsed());
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SimulatedCluster;
    use bulkflow_types::SimpleStatement;

    fn simple() -> BulkStatement {
        BulkStatement::Simple(SimpleStatement::new("SELECT 1"))
    }

    #[tokio::test]
    async fn dry_run_issues_no_driver_calls() {
        let cluster = Arc::new(SimulatedCluster::new());
        let executor = BulkExecutor::new(
            cluster.clone(),
            Some(4),
            None,
            Arc::new(PipelineMetrics::new()),
            true,
        );
        let result = executor.execute_write(simple()).await.unwrap();
        assert!(result.outcome.is_ok());
        assert_eq!(cluster.execution_count(), 0);
    }

    #[tokio::test]
    async fn execution_records_latency_and_counts() {
        let cluster = Arc::new(SimulatedCluster::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let executor = BulkExecutor::new(cluster.clone(), Some(4), None, metrics.clone(), false);
        executor.execute_write(simple()).await.unwrap();
        assert_eq!(cluster.execution_count(), 1);
        assert_eq!(metrics.writes.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.in_flight.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn unbounded_when_max_in_flight_unset() {
        let executor = BulkExecutor::new(
            Arc::new(SimulatedCluster::new()),
            None,
            None,
            Arc::new(PipelineMetrics::new()),
            false,
        );
        for _ in 0..64 {
            executor.execute_write(simple()).await.unwrap();
        }
    }
}

//! Pipeline orchestrator: wires stages together, picks a scheduling
//! regime, runs to completion, and shuts down cleanly.
//!
//! Load topology: read → count totals → failed-record gate → map →
//! unmappable gate → (optional batch) → bounded execute → warnings gate
//! → failed-write gate → position recording. Connector I/O runs on
//! blocking tasks feeding bounded channels; workers are async tasks
//! fanned out through a `JoinSet` under a semaphore, with per-worker
//! write concurrency sized so total in-flight approximates
//! `executor.maxInFlight`. Fatal errors latch the log manager's stop
//! flag; every stage observes it at its next suspension point.

use crate::batcher::{BatchMode, StatementBatcher};
use crate::config::Settings;
use crate::connector::{Connector, ResourceRead};
use crate::driver::ClusterSession;
use crate::errors::PipelineError;
use crate::executor::BulkExecutor;
use crate::log::LogManager;
use crate::mapping::{parse_mapping, InsertMapper, RowMapper};
use crate::metrics::PipelineMetrics;
use crate::result::{RunSummary, WorkflowKind};
use anyhow::anyhow;
use bulkflow_types::{
    BulkStatement, DataRecord, ExecError, ReadResult, Record, ResourceUri, SimpleStatement,
};
use std::num::NonZeroUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Resource count at or above which each resource gets its own worker.
const TPC_THRESHOLD: usize = 4;
/// Capacity of the per-resource record channel.
const RECORD_CHANNEL_CAPACITY: usize = 256;
/// Rows per write batch handed to the connector on the unload path.
const UNLOAD_WRITE_BATCH: usize = 1024;

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn classify_exec(error: ExecError) -> PipelineError {
    if error.is_unrecoverable() {
        PipelineError::Unrecoverable(error)
    } else {
        PipelineError::Infrastructure(anyhow::Error::new(error))
    }
}

#[derive(Debug, Clone, Copy)]
struct BatchSpec {
    mode: BatchMode,
    max_statements: usize,
    max_size_bytes: u64,
}

/// Everything a load worker needs, shared across workers.
struct LoadStages {
    log: Arc<LogManager>,
    metrics: Arc<PipelineMetrics>,
    mapper: InsertMapper,
    executor: Arc<BulkExecutor>,
    session: Arc<dyn ClusterSession>,
    batch: Option<BatchSpec>,
    write_concurrency: usize,
}

/// Bounded fan-out of write executions for one worker.
struct WriteDispatcher {
    in_flight: JoinSet<Result<(), PipelineError>>,
    concurrency: usize,
    first_error: Option<PipelineError>,
}

impl WriteDispatcher {
    fn new(concurrency: usize) -> Self {
        Self {
            in_flight: JoinSet::new(),
            concurrency: concurrency.max(1),
            first_error: None,
        }
    }

    async fn absorb_one(&mut self) {
        if let Some(joined) = self.in_flight.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.first_error.get_or_insert(e);
                }
                Err(join_err) => {
                    self.first_error.get_or_insert(PipelineError::Infrastructure(anyhow!(
                        "Write task panicked: {join_err}"
                    )));
                }
            }
        }
    }

    /// Submit one statement, waiting for a slot when the worker is at
    /// its concurrency bound. The spawned task runs the full result
    /// gate chain so completions are accounted as they happen.
    async fn submit(&mut self, stages: &Arc<LoadStages>, statement: BulkStatement) {
        while self.in_flight.len() >= self.concurrency {
            self.absorb_one().await;
            if self.first_error.is_some() {
                return;
            }
        }
        if self.first_error.is_some() {
            return;
        }
        let log = stages.log.clone();
        let metrics = stages.metrics.clone();
        let executor = stages.executor.clone();
        self.in_flight.spawn(async move {
            let result = executor.execute_write(statement).await?;
            log.handle_query_warnings(result.warnings());
            if result.outcome.is_err() || result.is_cas_failure() {
                metrics.failed_statements.fetch_add(1, Ordering::Relaxed);
            }
            log.handle_failed_write(&result)?;
            log.record_write_positions(&result);
            Ok(())
        });
    }

    async fn drain(&mut self) {
        while !self.in_flight.is_empty() {
            self.absorb_one().await;
        }
    }

    fn take_error(&mut self) -> Option<PipelineError> {
        self.first_error.take()
    }
}

/// Per-worker stage chain from record to dispatched statement.
struct LoadSink {
    stages: Arc<LoadStages>,
    batcher: Option<StatementBatcher>,
    writes: WriteDispatcher,
}

impl LoadSink {
    fn new(stages: Arc<LoadStages>) -> Self {
        let batcher = stages.batch.map(|spec| {
            StatementBatcher::new(
                spec.mode,
                spec.max_statements,
                spec.max_size_bytes,
                stages.session.clone(),
            )
        });
        let writes = WriteDispatcher::new(stages.write_concurrency);
        Self {
            stages,
            batcher,
            writes,
        }
    }

    async fn push(&mut self, record: Record) -> Result<(), PipelineError> {
        self.stages
            .metrics
            .total_records
            .fetch_add(1, Ordering::Relaxed);
        self.stages.log.count_total();

        let data = match self.stages.log.filter_failed_record(record)? {
            Some(data) => data,
            None => {
                self.stages
                    .metrics
                    .failed_records
                    .fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        };

        self.stages.metrics.statements.fetch_add(1, Ordering::Relaxed);
        let statement = self.stages.mapper.map(data);
        let statement = match self.stages.log.filter_unmappable_statement(statement)? {
            Some(statement) => statement,
            None => {
                self.stages
                    .metrics
                    .failed_statements
                    .fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        };

        let ready = match (&mut self.batcher, statement) {
            (Some(batcher), BulkStatement::Mapped(mapped)) => batcher.add(mapped),
            (_, statement) => vec![statement],
        };
        self.dispatch(ready).await
    }

    async fn dispatch(&mut self, statements: Vec<BulkStatement>) -> Result<(), PipelineError> {
        for statement in statements {
            if let BulkStatement::Batch(batch) = &statement {
                self.stages.metrics.observe_batch(batch.statements.len());
            }
            self.writes.submit(&self.stages, statement).await;
            if let Some(e) = self.writes.take_error() {
                self.writes.drain().await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Flush partial batch groups and wait out in-flight executions.
    async fn finish(&mut self) -> Result<(), PipelineError> {
        let remaining = self
            .batcher
            .as_mut()
            .map(StatementBatcher::flush_all)
            .unwrap_or_default();
        self.dispatch(remaining).await?;
        self.writes.drain().await;
        match self.writes.take_error() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drain in-flight work without flushing; used after a fatal error
    /// or a cooperative stop so completions are still accounted.
    async fn abort(&mut self) -> Option<PipelineError> {
        self.writes.drain().await;
        self.writes.take_error()
    }
}

async fn run_load_worker(
    stages: Arc<LoadStages>,
    mut records: mpsc::Receiver<Record>,
) -> Result<(), PipelineError> {
    let mut sink = LoadSink::new(stages.clone());
    let mut fatal: Option<PipelineError> = None;
    while let Some(record) = records.recv().await {
        if stages.log.is_stopped() {
            break;
        }
        if let Err(e) = sink.push(record).await {
            fatal = Some(e);
            break;
        }
    }
    drop(records);
    if fatal.is_none() && !stages.log.is_stopped() {
        if let Err(e) = sink.finish().await {
            fatal = Some(e);
        }
    } else if let Some(e) = sink.abort().await {
        fatal.get_or_insert(e);
    }
    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// A finished regime run: the connector handed back for closing, and
/// the pipeline outcome.
struct RegimeOutcome {
    connector: Box<dyn Connector>,
    result: Result<(), PipelineError>,
}

async fn collect_workers(
    mut workers: JoinSet<Result<(), PipelineError>>,
    first_error: &mut Option<PipelineError>,
) {
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_err) => {
                first_error.get_or_insert(PipelineError::Infrastructure(anyhow!(
                    "Worker task panicked: {join_err}"
                )));
            }
        }
    }
}

/// Thread-per-resource regime: the connector enumerates resources
/// lazily; each resource is drained sequentially on its own worker.
async fn load_thread_per_resource(
    mut connector: Box<dyn Connector>,
    stages: Arc<LoadStages>,
    worker_count: usize,
) -> Result<RegimeOutcome, PipelineError> {
    let (resource_tx, mut resource_rx) = mpsc::channel::<ResourceRead>(worker_count.max(1));
    let feeder = tokio::task::spawn_blocking(
        move || -> (Box<dyn Connector>, Result<(), anyhow::Error>) {
            let resources = match connector.read_by_resource() {
                Ok(resources) => resources,
                Err(e) => return (connector, Err(e)),
            };
            for resource in resources {
                if resource_tx.blocking_send(resource).is_err() {
                    break;
                }
            }
            (connector, Ok(()))
        },
    );

    let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));
    let mut workers: JoinSet<Result<(), PipelineError>> = JoinSet::new();
    let mut first_error: Option<PipelineError> = None;

    while let Some(resource) = resource_rx.recv().await {
        if stages.log.is_stopped() {
            break;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                first_error.get_or_insert(anyhow!("Worker semaphore closed: {e}").into());
                break;
            }
        };
        let stages = stages.clone();
        workers.spawn(async move {
            let _permit = permit;
            let resource_uri = resource.resource.clone();
            let records = resource.records;
            let (record_tx, record_rx) = mpsc::channel::<Record>(RECORD_CHANNEL_CAPACITY);
            let reader = tokio::task::spawn_blocking(move || {
                for record in records {
                    if record_tx.blocking_send(record).is_err() {
                        break;
                    }
                }
            });
            let result = run_load_worker(stages, record_rx).await;
            if let Err(join_err) = reader.await {
                return Err(PipelineError::Infrastructure(anyhow!(
                    "Reader task for {resource_uri} panicked: {join_err}"
                )));
            }
            result
        });
    }
    drop(resource_rx);

    collect_workers(workers, &mut first_error).await;

    let (connector, feed_result) = feeder
        .await
        .map_err(|e| PipelineError::Infrastructure(anyhow!("Connector feeder panicked: {e}")))?;
    if let Err(e) = feed_result {
        first_error.get_or_insert(PipelineError::Infrastructure(e));
    }

    Ok(RegimeOutcome {
        connector,
        result: match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        },
    })
}

/// Parallel windowed regime: one flat stream chopped into windows,
/// dispatched across a fixed worker pool. Partial batch groups flush at
/// window close.
async fn load_parallel_windowed(
    mut connector: Box<dyn Connector>,
    stages: Arc<LoadStages>,
    cores: usize,
    window_size: usize,
) -> Result<RegimeOutcome, PipelineError> {
    let (window_tx, window_rx) = mpsc::channel::<Vec<Record>>(cores.max(1) * 2);
    let window = window_size.max(1);
    let feeder = tokio::task::spawn_blocking(
        move || -> (Box<dyn Connector>, Result<(), anyhow::Error>) {
            let records = match connector.read() {
                Ok(records) => records,
                Err(e) => return (connector, Err(e)),
            };
            let mut buffer = Vec::with_capacity(window);
            for record in records {
                buffer.push(record);
                if buffer.len() >= window {
                    let full = std::mem::replace(&mut buffer, Vec::with_capacity(window));
                    if window_tx.blocking_send(full).is_err() {
                        return (connector, Ok(()));
                    }
                }
            }
            if !buffer.is_empty() {
                let _ = window_tx.blocking_send(buffer);
            }
            (connector, Ok(()))
        },
    );

    let shared_rx = Arc::new(tokio::sync::Mutex::new(window_rx));
    let mut workers: JoinSet<Result<(), PipelineError>> = JoinSet::new();
    for _ in 0..cores.max(1) {
        let stages = stages.clone();
        let shared_rx = shared_rx.clone();
        workers.spawn(async move {
            loop {
                if stages.log.is_stopped() {
                    break;
                }
                let next = { shared_rx.lock().await.recv().await };
                let Some(records) = next else { break };
                let mut sink = LoadSink::new(stages.clone());
                let mut fatal: Option<PipelineError> = None;
                for record in records {
                    if stages.log.is_stopped() {
                        break;
                    }
                    if let Err(e) = sink.push(record).await {
                        fatal = Some(e);
                        break;
                    }
                }
                if fatal.is_none() && !stages.log.is_stopped() {
                    if let Err(e) = sink.finish().await {
                        fatal = Some(e);
                    }
                } else if let Some(e) = sink.abort().await {
                    fatal.get_or_insert(e);
                }
                if let Some(e) = fatal {
                    return Err(e);
                }
            }
            Ok(())
        });
    }

    let mut first_error: Option<PipelineError> = None;
    collect_workers(workers, &mut first_error).await;
    // Release the receiver before joining the feeder: a feeder blocked
    // on a full channel unblocks only once every receiver handle is
    // gone.
    drop(shared_rx);

    let (connector, feed_result) = feeder
        .await
        .map_err(|e| PipelineError::Infrastructure(anyhow!("Connector feeder panicked: {e}")))?;
    if let Err(e) = feed_result {
        first_error.get_or_insert(PipelineError::Infrastructure(e));
    }

    Ok(RegimeOutcome {
        connector,
        result: match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        },
    })
}

/// Shared shutdown: metrics, log manager, connector, session, in that
/// order; the first close error is captured and rethrown after the
/// pipeline outcome. No path skips file flushing.
#[allow(clippy::too_many_arguments)]
async fn finalize(
    workflow: WorkflowKind,
    execution_id: String,
    start: Instant,
    log: Arc<LogManager>,
    metrics: Arc<PipelineMetrics>,
    connector: Option<Box<dyn Connector>>,
    session: Arc<dyn ClusterSession>,
    pipeline_result: Result<(), PipelineError>,
) -> Result<RunSummary, PipelineError> {
    let elapsed = start.elapsed();
    metrics.report(elapsed);
    let mut close_error: Option<anyhow::Error> = None;
    if let Err(e) = log.close() {
        close_error.get_or_insert(e);
    }
    if let Some(mut connector) = connector {
        if let Err(e) = connector.close() {
            close_error.get_or_insert(e);
        }
    }
    if let Err(e) = session.close().await {
        close_error.get_or_insert(e);
    }
    log.final_report(elapsed);
    pipeline_result?;
    if let Some(e) = close_error {
        return Err(PipelineError::Infrastructure(e));
    }
    Ok(RunSummary {
        workflow,
        execution_id,
        operation_directory: log.operation_directory().to_path_buf(),
        records: log.total_items(),
        errors: log.total_errors(),
        elapsed,
    })
}

/// Run a load: records from the connector are mapped, batched, and
/// written to the cluster with full failure accounting.
///
/// # Errors
///
/// Returns `TooManyErrors` when the configured threshold is crossed,
/// `Unrecoverable` for programming/protocol errors at execute time, and
/// `Infrastructure` for host-side failures.
pub async fn run_load(
    settings: &Settings,
    connector: Box<dyn Connector>,
    session: Arc<dyn ClusterSession>,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();
    let workflow = WorkflowKind::Load;
    let execution_id = settings.execution_id(workflow.label());
    let log = Arc::new(LogManager::init(
        &settings.log.directory,
        &execution_id,
        settings.max_errors_threshold()?,
        settings.max_query_warnings_threshold(),
        settings.log.verbosity,
    )?);
    tracing::info!(
        execution_id = %execution_id,
        dry_run = settings.engine.dry_run,
        "Starting load"
    );
    if settings.engine.dry_run {
        tracing::info!("Dry-run mode enabled.");
    }
    let snapshot = serde_yaml::to_string(settings)
        .map_err(|e| anyhow!("Failed to render effective settings: {e}"))?;
    log.log_effective_settings(&snapshot)?;

    let metrics = Arc::new(PipelineMetrics::new());
    let mapper = InsertMapper::from_schema(&settings.schema)?;
    session.prepare(mapper.cql()).await.map_err(classify_exec)?;
    let executor = Arc::new(BulkExecutor::new(
        session.clone(),
        settings.max_in_flight(),
        settings.max_per_second(),
        metrics.clone(),
        settings.engine.dry_run,
    ));

    let cores = available_cores();
    let stages = Arc::new(LoadStages {
        log: log.clone(),
        metrics: metrics.clone(),
        mapper,
        executor,
        session: session.clone(),
        batch: settings.batching_enabled().then(|| BatchSpec {
            mode: settings.batch.mode,
            max_statements: settings.batch.max_batch_statements,
            max_size_bytes: settings.batch.max_batch_size_bytes,
        }),
        write_concurrency: settings.write_concurrency(cores),
    });

    let mut connector = connector;
    connector.init().map_err(PipelineError::Infrastructure)?;
    let resource_count = connector.estimated_resource_count();

    let regime = if resource_count == 0 || resource_count >= TPC_THRESHOLD {
        let workers = if resource_count == 0 {
            cores
        } else {
            resource_count.min(cores)
        };
        tracing::debug!(resource_count, workers, "Using thread-per-resource regime");
        load_thread_per_resource(connector, stages, workers).await?
    } else {
        let window = settings.window_size();
        tracing::debug!(resource_count, cores, window, "Using parallel windowed regime");
        load_parallel_windowed(connector, stages, cores, window).await?
    };

    finalize(
        workflow,
        execution_id,
        start,
        log,
        metrics,
        Some(regime.connector),
        session,
        regime.result,
    )
    .await
}

fn read_query(settings: &Settings) -> anyhow::Result<(Arc<str>, ResourceUri)> {
    let resource = match (&settings.schema.keyspace, &settings.schema.table) {
        (Some(keyspace), Some(table)) => ResourceUri::new(format!("cql://{keyspace}/{table}")),
        _ => ResourceUri::new("cql://query"),
    };
    let query: Arc<str> = match &settings.schema.query {
        Some(query) => Arc::from(query.as_str()),
        None => {
            let keyspace = settings
                .schema
                .keyspace
                .as_deref()
                .ok_or_else(|| anyhow!("schema.keyspace is required to generate a query"))?;
            let table = settings
                .schema
                .table
                .as_deref()
                .ok_or_else(|| anyhow!("schema.table is required to generate a query"))?;
            let columns = if settings.schema.mapping.trim().is_empty() {
                "*".to_string()
            } else {
                parse_mapping(&settings.schema.mapping)?
                    .iter()
                    .map(|m| m.column.clone())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            Arc::from(format!("SELECT {columns} FROM {keyspace}.{table}"))
        }
    };
    Ok((query, resource))
}

/// Run an unload: rows fetched from the cluster are mapped back to
/// records and written to the connector.
///
/// # Errors
///
/// Same classification as [`run_load`].
pub async fn run_unload(
    settings: &Settings,
    connector: Box<dyn Connector>,
    session: Arc<dyn ClusterSession>,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();
    let workflow = WorkflowKind::Unload;
    let execution_id = settings.execution_id(workflow.label());
    let log = Arc::new(LogManager::init(
        &settings.log.directory,
        &execution_id,
        settings.max_errors_threshold()?,
        settings.max_query_warnings_threshold(),
        settings.log.verbosity,
    )?);
    tracing::info!(execution_id = %execution_id, "Starting unload");
    let snapshot = serde_yaml::to_string(settings)
        .map_err(|e| anyhow!("Failed to render effective settings: {e}"))?;
    log.log_effective_settings(&snapshot)?;

    let metrics = Arc::new(PipelineMetrics::new());
    let executor = BulkExecutor::new(
        session.clone(),
        settings.max_in_flight(),
        settings.max_per_second(),
        metrics.clone(),
        settings.engine.dry_run,
    );
    let (query, resource) = read_query(settings)?;
    let row_mapper = RowMapper::new(resource, query.clone());

    let mut connector = connector;
    connector.init().map_err(PipelineError::Infrastructure)?;

    let (write_tx, mut write_rx) = mpsc::channel::<Vec<DataRecord>>(4);
    let writer = tokio::task::spawn_blocking(
        move || -> (Box<dyn Connector>, Result<u64, anyhow::Error>) {
            let mut written = 0u64;
            while let Some(batch) = write_rx.blocking_recv() {
                match connector.write(&batch) {
                    Ok(count) => written += count,
                    Err(e) => return (connector, Err(e)),
                }
            }
            (connector, Ok(written))
        },
    );

    let statement = BulkStatement::Simple(SimpleStatement::new(query));
    let mut pipeline_result: Result<(), PipelineError> = Ok(());
    match executor.execute_query(&statement).await {
        Err(e) => pipeline_result = Err(e),
        Ok(Err(cause)) => {
            let read = ReadResult::failure(statement.clone(), cause);
            if let Err(e) = log.handle_failed_read(&read) {
                pipeline_result = Err(e);
            }
        }
        Ok(Ok(details)) => {
            log.handle_query_warnings(&details.warnings);
            let mut buffer: Vec<DataRecord> = Vec::with_capacity(UNLOAD_WRITE_BATCH);
            for (index, row) in details.rows.into_iter().enumerate() {
                if log.is_stopped() {
                    break;
                }
                log.count_total();
                metrics.total_records.fetch_add(1, Ordering::Relaxed);
                match row_mapper.map(row, (index + 1) as u64) {
                    Ok(record) => {
                        buffer.push(record);
                        if buffer.len() >= UNLOAD_WRITE_BATCH {
                            let full = std::mem::take(&mut buffer);
                            if write_tx.send(full).await.is_err() {
                                pipeline_result =
                                    Err(anyhow!("Connector writer stopped accepting records")
                                        .into());
                                break;
                            }
                        }
                    }
                    Err(row_error) => {
                        metrics.failed_records.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = log.handle_unmappable_row(&row_error) {
                            pipeline_result = Err(e);
                            break;
                        }
                    }
                }
            }
            if pipeline_result.is_ok() && !buffer.is_empty() && write_tx.send(buffer).await.is_err()
            {
                pipeline_result =
                    Err(anyhow!("Connector writer stopped accepting records").into());
            }
        }
    }
    drop(write_tx);

    let (connector, write_result) = writer
        .await
        .map_err(|e| PipelineError::Infrastructure(anyhow!("Connector writer panicked: {e}")))?;
    if let Err(e) = write_result {
        if pipeline_result.is_ok() {
            pipeline_result = Err(PipelineError::Infrastructure(e));
        }
    }

    finalize(
        workflow,
        execution_id,
        start,
        log,
        metrics,
        Some(connector),
        session,
        pipeline_result,
    )
    .await
}

/// Run a count: rows are fetched and tallied, nothing is written.
///
/// # Errors
///
/// Same classification as [`run_load`].
pub async fn run_count(
    settings: &Settings,
    session: Arc<dyn ClusterSession>,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();
    let workflow = WorkflowKind::Count;
    let execution_id = settings.execution_id(workflow.label());
    let log = Arc::new(LogManager::init(
        &settings.log.directory,
        &execution_id,
        settings.max_errors_threshold()?,
        settings.max_query_warnings_threshold(),
        settings.log.verbosity,
    )?);
    tracing::info!(execution_id = %execution_id, "Starting count");
    let snapshot = serde_yaml::to_string(settings)
        .map_err(|e| anyhow!("Failed to render effective settings: {e}"))?;
    log.log_effective_settings(&snapshot)?;

    let metrics = Arc::new(PipelineMetrics::new());
    let executor = BulkExecutor::new(
        session.clone(),
        settings.max_in_flight(),
        settings.max_per_second(),
        metrics.clone(),
        settings.engine.dry_run,
    );
    let (query, _resource) = read_query(settings)?;
    let statement = BulkStatement::Simple(SimpleStatement::new(query));

    let mut pipeline_result: Result<(), PipelineError> = Ok(());
    match executor.execute_query(&statement).await {
        Err(e) => pipeline_result = Err(e),
        Ok(Err(cause)) => {
            let read = ReadResult::failure(statement.clone(), cause);
            if let Err(e) = log.handle_failed_read(&read) {
                pipeline_result = Err(e);
            }
        }
        Ok(Ok(details)) => {
            log.handle_query_warnings(&details.warnings);
            for _row in &details.rows {
                log.count_total();
                metrics.total_records.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    finalize(
        workflow,
        execution_id,
        start,
        log,
        metrics,
        None,
        session,
        pipeline_result,
    )
    .await
}

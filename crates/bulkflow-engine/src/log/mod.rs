//! Failure accounting: bad files, error logs, thresholds, positions.
//!
//! The log manager sits behind every failure point of the pipeline. Each
//! handler is a no-op for healthy items and a side-effecting sink for
//! failures: it appends the raw source line to the matching `*.bad` file,
//! writes a structured entry to the matching `*-errors.log`, records the
//! position as terminally observed, and enforces the configured error
//! threshold. Crossing the threshold sets a single-shot stop flag and
//! surfaces [`PipelineError::TooManyErrors`]; workers observe the flag at
//! their next suspension point.

mod format;
mod writer;

use crate::errors::PipelineError;
use crate::mapping::RowMappingError;
use crate::position::PositionTracker;
use crate::result::format_elapsed;
use anyhow::{anyhow, Context};
use bulkflow_types::{
    BulkStatement, DataRecord, ErrorRecord, ErrorThreshold, ExecError, Record, ReadResult,
    TooManyErrors, WriteResult,
};
use format::{format_cause_chain, format_row, format_single_line, format_statement, EntryBlock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use writer::LazyAppender;

/// Central failure accountant for one operation.
pub struct LogManager {
    operation_directory: PathBuf,
    execution_id: String,
    verbosity: u8,
    max_errors: ErrorThreshold,
    max_query_warnings: ErrorThreshold,

    total_items: AtomicU64,
    errors: AtomicU64,
    query_warnings: AtomicU64,
    warnings_capped: AtomicBool,
    stopped: AtomicBool,
    closed: AtomicBool,

    positions: PositionTracker,

    connector_bad: LazyAppender,
    connector_errors: LazyAppender,
    mapping_bad: LazyAppender,
    mapping_errors: LazyAppender,
    load_bad: LazyAppender,
    load_errors: LazyAppender,
    unload_errors: LazyAppender,
    paxos_bad: LazyAppender,
    paxos_errors: LazyAppender,
}

impl LogManager {
    /// Create the operation directory and the (lazy) artifact appenders.
    pub fn init(
        output_root: &Path,
        execution_id: &str,
        max_errors: ErrorThreshold,
        max_query_warnings: ErrorThreshold,
        verbosity: u8,
    ) -> anyhow::Result<Self> {
        let operation_directory = output_root.join(execution_id);
        std::fs::create_dir_all(&operation_directory).with_context(|| {
            format!(
                "Failed to create operation directory {}",
                operation_directory.display()
            )
        })?;
        let dir = &operation_directory;
        Ok(Self {
            connector_bad: LazyAppender::new(dir, "connector.bad"),
            connector_errors: LazyAppender::new(dir, "connector-errors.log"),
            mapping_bad: LazyAppender::new(dir, "mapping.bad"),
            mapping_errors: LazyAppender::new(dir, "mapping-errors.log"),
            load_bad: LazyAppender::new(dir, "load.bad"),
            load_errors: LazyAppender::new(dir, "load-errors.log"),
            unload_errors: LazyAppender::new(dir, "unload-errors.log"),
            paxos_bad: LazyAppender::new(dir, "paxos.bad"),
            paxos_errors: LazyAppender::new(dir, "paxos-errors.log"),
            operation_directory,
            execution_id: execution_id.to_string(),
            verbosity,
            max_errors,
            max_query_warnings,
            total_items: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            query_warnings: AtomicU64::new(0),
            warnings_capped: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            positions: PositionTracker::new(),
        })
    }

    #[must_use]
    pub fn operation_directory(&self) -> &Path {
        &self.operation_directory
    }

    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.errors.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.total_items.load(Ordering::Acquire)
    }

    /// Monotone stop flag set when a fatal error was observed. Workers
    /// poll this at suspension points for cooperative cancellation.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Count one consumed item toward the ratio-threshold denominator.
    pub fn count_total(&self) {
        self.total_items.fetch_add(1, Ordering::AcqRel);
    }

    /// Snapshot of the resolved configuration, written eagerly at init.
    pub fn log_effective_settings(&self, snapshot: &str) -> anyhow::Result<()> {
        let path = self.operation_directory.join("effective-settings.log");
        std::fs::write(&path, snapshot)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn append(&self, appender: &LazyAppender, text: &str) -> Result<(), PipelineError> {
        appender.append(text).map_err(|e| {
            PipelineError::Infrastructure(anyhow!(
                "Failed to append to {}: {e}",
                appender.path().display()
            ))
        })
    }

    fn append_bad_line(
        &self,
        appender: &LazyAppender,
        source: Option<&str>,
    ) -> Result<(), PipelineError> {
        // An error record with no source text writes nothing to the bad
        // file; the error log and position file still get their entries.
        if let Some(source) = source {
            self.append(appender, &format!("{}\n", format_single_line(source)))?;
        }
        Ok(())
    }

    /// Increment the data-error counter and enforce the threshold.
    fn record_data_error(&self) -> Result<(), PipelineError> {
        let errors = self.errors.fetch_add(1, Ordering::AcqRel) + 1;
        let total = self.total_items.load(Ordering::Acquire);
        if self.max_errors.is_exceeded(errors, total) {
            self.stopped.store(true, Ordering::Release);
            return Err(TooManyErrors::new(self.max_errors).into());
        }
        Ok(())
    }

    fn fail_unrecoverable(&self, cause: &ExecError) -> PipelineError {
        self.stopped.store(true, Ordering::Release);
        PipelineError::Unrecoverable(cause.clone())
    }

    // ── Load-side gates ─────────────────────────────────────────────

    /// Gate for records the connector failed to parse. Healthy records
    /// pass through; error records are logged and absorbed.
    pub fn filter_failed_record(&self, record: Record) -> Result<Option<DataRecord>, PipelineError> {
        match record {
            Record::Data(data) => Ok(Some(data)),
            Record::Error(err) => {
                self.log_error_record(&err, &self.connector_bad, &self.connector_errors)?;
                self.record_data_error()?;
                Ok(None)
            }
        }
    }

    /// Gate for statements whose record-to-statement mapping failed.
    pub fn filter_unmappable_statement(
        &self,
        statement: BulkStatement,
    ) -> Result<Option<BulkStatement>, PipelineError> {
        match statement {
            BulkStatement::Unmappable(unmappable) => {
                let origin = unmappable.record.origin();
                self.append_bad_line(&self.mapping_bad, origin.source.as_deref())?;
                let block = EntryBlock::new()
                    .origin(origin)
                    .lines(format_cause_chain(&unmappable.cause))
                    .render();
                self.append(&self.mapping_errors, &block)?;
                self.positions.record(&origin.resource, origin.position);
                self.record_data_error()?;
                Ok(None)
            }
            other => Ok(Some(other)),
        }
    }

    fn log_error_record(
        &self,
        err: &ErrorRecord,
        bad: &LazyAppender,
        errors: &LazyAppender,
    ) -> Result<(), PipelineError> {
        self.append_bad_line(bad, err.origin.source.as_deref())?;
        let block = EntryBlock::new()
            .origin(&err.origin)
            .lines(format_cause_chain(&err.cause))
            .render();
        self.append(errors, &block)?;
        self.positions.record(&err.origin.resource, err.origin.position);
        Ok(())
    }

    /// Gate for failed write results. Batch failures unwind to their
    /// constituent records, each logged with the shared cause.
    pub fn handle_failed_write(&self, result: &WriteResult) -> Result<(), PipelineError> {
        match &result.outcome {
            Ok(details) if !details.was_applied => self.handle_cas_failure(result),
            Ok(_) => Ok(()),
            Err(cause) => {
                let constituents = result.statement.mapped_statements();
                for mapped in &constituents {
                    let origin = mapped.origin();
                    self.append_bad_line(&self.load_bad, origin.source.as_deref())?;
                    let block = EntryBlock::new()
                        .origin(origin)
                        .lines(format_statement(
                            &BulkStatement::Mapped((*mapped).clone()),
                            self.verbosity,
                        ))
                        .line(cause.to_string())
                        .render();
                    self.append(&self.load_errors, &block)?;
                    self.positions.record(&origin.resource, origin.position);
                }
                if cause.is_unrecoverable() {
                    return Err(self.fail_unrecoverable(cause));
                }
                let mut exceeded = None;
                for _ in 0..constituents.len().max(1) {
                    if let Err(e) = self.record_data_error() {
                        exceeded.get_or_insert(e);
                    }
                }
                match exceeded {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
        }
    }

    /// A conditional batch the server declined: every non-applied row is
    /// accounted as a write error and grouped under one header.
    fn handle_cas_failure(&self, result: &WriteResult) -> Result<(), PipelineError> {
        let details = match &result.outcome {
            Ok(details) => details,
            Err(_) => return Ok(()),
        };
        let constituents = result.statement.mapped_statements();

        let mut block = EntryBlock::new().line("Failed conditional updates: ");
        for (index, mapped) in constituents.iter().enumerate() {
            block = block.lines(format_statement(
                &BulkStatement::Mapped((*mapped).clone()),
                self.verbosity.max(1),
            ));
            if let Some(row) = details.rows.get(index) {
                block = block.lines(format_row(row));
            }
            let origin = mapped.origin();
            self.append_bad_line(&self.paxos_bad, origin.source.as_deref())?;
            self.positions.record(&origin.resource, origin.position);
        }
        self.append(&self.paxos_errors, &block.render())?;

        let failed_rows = if details.rows.is_empty() {
            constituents.len().max(1)
        } else {
            details.rows.len()
        };
        let mut exceeded = None;
        for _ in 0..failed_rows {
            if let Err(e) = self.record_data_error() {
                exceeded.get_or_insert(e);
            }
        }
        match exceeded {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Record terminal success positions for a write result.
    pub fn record_write_positions(&self, result: &WriteResult) {
        if matches!(&result.outcome, Ok(details) if details.was_applied) {
            for mapped in result.statement.mapped_statements() {
                let origin = mapped.origin();
                self.positions.record(&origin.resource, origin.position);
            }
        }
    }

    // ── Unload-side gates ───────────────────────────────────────────

    /// Gate for failed read results. Returns `Ok(true)` when the result
    /// is healthy and should flow on.
    pub fn handle_failed_read(&self, result: &ReadResult) -> Result<bool, PipelineError> {
        let cause = match &result.outcome {
            Ok(_) => return Ok(true),
            Err(cause) => cause,
        };
        let block = EntryBlock::new()
            .lines(format_statement(&result.statement, self.verbosity.max(1)))
            .line(cause.to_string())
            .render();
        self.append(&self.unload_errors, &block)?;
        if cause.is_unrecoverable() {
            return Err(self.fail_unrecoverable(cause));
        }
        self.record_data_error()?;
        Ok(false)
    }

    /// Gate for rows that failed row-to-record mapping on the unload
    /// path. No resource, position, or source is available.
    pub fn handle_unmappable_row(&self, error: &RowMappingError) -> Result<(), PipelineError> {
        let mut block = EntryBlock::new();
        if let Some(cql) = &error.cql {
            block = block.line(format!("Statement: {cql}"));
        }
        block = block
            .lines(format_row(&error.row))
            .lines(format_cause_chain(&error.cause));
        self.append(&self.mapping_errors, &block.render())?;
        self.record_data_error()?;
        Ok(())
    }

    // ── Warnings ────────────────────────────────────────────────────

    /// Log server-side query warnings up to the configured cap, then
    /// announce suppression exactly once.
    pub fn handle_query_warnings(&self, warnings: &[String]) {
        for warning in warnings {
            let seen = self.query_warnings.fetch_add(1, Ordering::AcqRel) + 1;
            let max = match self.max_query_warnings {
                ErrorThreshold::Absolute { max } => max,
                _ => u64::MAX,
            };
            if seen <= max {
                tracing::warn!("Query generated server-side warning: {warning}");
            } else if !self.warnings_capped.swap(true, Ordering::AcqRel) {
                tracing::warn!(
                    "The maximum number of logged query warnings has been exceeded ({max}); \
                     subsequent warnings will not be logged."
                );
            }
        }
    }

    // ── Termination ─────────────────────────────────────────────────

    /// Flush and close every artifact, then write the position file.
    /// Idempotent; safe to call from the shutdown path and a signal
    /// handler.
    pub fn close(&self) -> anyhow::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut first_error: Option<anyhow::Error> = None;
        for appender in [
            &self.connector_bad,
            &self.connector_errors,
            &self.mapping_bad,
            &self.mapping_errors,
            &self.load_bad,
            &self.load_errors,
            &self.unload_errors,
            &self.paxos_bad,
            &self.paxos_errors,
        ] {
            if let Err(e) = appender.close() {
                first_error.get_or_insert(anyhow!(
                    "Failed to close {}: {e}",
                    appender.path().display()
                ));
            }
        }
        if !self.positions.is_empty() {
            let path = self.operation_directory.join("positions.txt");
            if let Err(e) = std::fs::write(&path, self.positions.render()) {
                first_error
                    .get_or_insert(anyhow!("Failed to write {}: {e}", path.display()));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Emit the one-line operator summary.
    pub fn final_report(&self, elapsed: Duration) {
        let errors = self.total_errors();
        if errors == 0 {
            tracing::info!(
                "Operation {} completed successfully in {}.",
                self.execution_id,
                format_elapsed(elapsed)
            );
        } else {
            tracing::warn!(
                "Operation {} completed with {} errors in {}.",
                self.execution_id,
                errors,
                format_elapsed(elapsed)
            );
        }
        tracing::info!(
            "Operation directory: {}",
            self.operation_directory.display()
        );
    }
}

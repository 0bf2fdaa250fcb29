//! Execution results flowing out of the driver adapter.
//!
//! A [`WriteResult`] or [`ReadResult`] pairs the executed statement with
//! either execution metadata (warnings, conditional-update outcome, rows)
//! or the failure cause. Batch results apply to the whole batch; the log
//! manager unwinds them to constituents.

use crate::error::ExecError;
use crate::statement::BulkStatement;
use std::fmt;

/// One column of a returned row, rendered for diagnostics.
///
/// Columns whose buffer could not be deserialized keep the raw bytes and
/// the CQL type tag instead of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRender {
    Value(String),
    Malformed { bytes: Vec<u8>, type_tag: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    pub name: String,
    pub render: ColumnRender,
}

impl fmt::Display for ColumnView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.render {
            ColumnRender::Value(v) => write!(f, "{}: {}", self.name, v),
            ColumnRender::Malformed { bytes, type_tag } => {
                write!(f, "{}: 0x", self.name)?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                write!(f, " (malformed buffer for type {type_tag})")
            }
        }
    }
}

/// A returned row, rendered column by column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowView {
    pub columns: Vec<ColumnView>,
}

impl RowView {
    /// True when any column carries a buffer that failed deserialization.
    #[must_use]
    pub fn has_malformed_columns(&self) -> bool {
        self.columns
            .iter()
            .any(|c| matches!(c.render, ColumnRender::Malformed { .. }))
    }
}

/// Server-side metadata for a completed execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionDetails {
    /// Server warnings attached to the response.
    pub warnings: Vec<String>,
    /// For conditional updates, whether the update was applied. Always
    /// true for non-conditional statements.
    pub was_applied: bool,
    /// Returned rows: the result page for reads, or the per-row outcome
    /// of a conditional update that was not applied.
    pub rows: Vec<RowView>,
}

impl ExecutionDetails {
    /// Details for an unconditionally successful execution with no rows,
    /// as produced by dry-run short-circuiting.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            warnings: Vec::new(),
            was_applied: true,
            rows: Vec::new(),
        }
    }
}

/// Outcome of executing one write statement (or batch).
#[derive(Debug, Clone)]
pub struct WriteResult {
    pub statement: BulkStatement,
    pub outcome: Result<ExecutionDetails, ExecError>,
}

impl WriteResult {
    #[must_use]
    pub fn success(statement: BulkStatement, details: ExecutionDetails) -> Self {
        Self {
            statement,
            outcome: Ok(details),
        }
    }

    #[must_use]
    pub fn failure(statement: BulkStatement, cause: ExecError) -> Self {
        Self {
            statement,
            outcome: Err(cause),
        }
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        match &self.outcome {
            Ok(details) => &details.warnings,
            Err(_) => &[],
        }
    }

    /// A conditional update that the server declined to apply.
    #[must_use]
    pub fn is_cas_failure(&self) -> bool {
        matches!(&self.outcome, Ok(details) if !details.was_applied)
    }
}

/// Outcome of fetching one row on the unload path.
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub statement: BulkStatement,
    pub outcome: Result<ReadDetails, ExecError>,
}

/// A fetched row plus the warnings of the page it arrived on.
#[derive(Debug, Clone)]
pub struct ReadDetails {
    pub row: RowView,
    pub warnings: Vec<String>,
}

impl ReadResult {
    #[must_use]
    pub fn success(statement: BulkStatement, row: RowView, warnings: Vec<String>) -> Self {
        Self {
            statement,
            outcome: Ok(ReadDetails { row, warnings }),
        }
    }

    #[must_use]
    pub fn failure(statement: BulkStatement, cause: ExecError) -> Self {
        Self {
            statement,
            outcome: Err(cause),
        }
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        match &self.outcome {
            Ok(details) => &details.warnings,
            Err(_) => &[],
        }
    }
}

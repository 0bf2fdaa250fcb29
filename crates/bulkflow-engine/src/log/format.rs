//! Rendering of error-log entries.
//!
//! Entries are multi-line blocks separated by a blank line: provenance
//! headers first (`Resource:`, `Position:`, `Source:`), then the
//! statement and row detail allowed by the configured verbosity, then
//! the full cause chain.

use bulkflow_types::{BulkStatement, FieldValue, RecordOrigin, RowView};

/// Maximum rendered length for a single bound value.
const MAX_VALUE_LENGTH: usize = 50;

/// Collapse a raw source line to a single log-safe line.
pub(crate) fn format_single_line(source: &str) -> String {
    source
        .trim_end_matches(['\n', '\r'])
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn format_value(value: &FieldValue) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() > MAX_VALUE_LENGTH {
        let truncated: String = rendered.chars().take(MAX_VALUE_LENGTH).collect();
        format!("{truncated}…")
    } else {
        rendered
    }
}

/// Render a statement according to the verbosity level: 0 elides it,
/// 1 shows query strings, 2 and above add bound values.
pub(crate) fn format_statement(statement: &BulkStatement, verbosity: u8) -> Vec<String> {
    if verbosity == 0 {
        return Vec::new();
    }
    let mut lines = Vec::new();
    match statement {
        BulkStatement::Simple(s) => lines.push(format!("Statement: {}", s.cql)),
        BulkStatement::Mapped(s) => {
            lines.push(format!("Statement: {}", s.cql));
            if verbosity >= 2 && !s.values.is_empty() {
                let values: Vec<String> = s.values.iter().map(format_value).collect();
                lines.push(format!("Values: {}", values.join(", ")));
            }
        }
        BulkStatement::Batch(batch) => {
            lines.push(format!("Batch of {} statements:", batch.statements.len()));
            for inner in &batch.statements {
                lines.push(format!("  Statement: {}", inner.cql));
                if verbosity >= 2 && !inner.values.is_empty() {
                    let values: Vec<String> = inner.values.iter().map(format_value).collect();
                    lines.push(format!("  Values: {}", values.join(", ")));
                }
            }
        }
        BulkStatement::Unmappable(_) => {}
    }
    lines
}

/// Render one row, column per line.
pub(crate) fn format_row(row: &RowView) -> Vec<String> {
    row.columns.iter().map(|c| c.to_string()).collect()
}

/// Render an error and its full source chain.
pub(crate) fn format_cause_chain(cause: &anyhow::Error) -> Vec<String> {
    let mut lines = vec![cause.to_string()];
    for source in cause.chain().skip(1) {
        lines.push(format!("  Caused by: {source}"));
    }
    lines
}

/// Builder for one error-log block.
pub(crate) struct EntryBlock {
    lines: Vec<String>,
}

impl EntryBlock {
    pub(crate) fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Push the provenance headers for a record origin.
    pub(crate) fn origin(mut self, origin: &RecordOrigin) -> Self {
        self.lines.push(format!("Resource: {}", origin.resource));
        self.lines.push(format!("Position: {}", origin.position));
        if let Some(source) = &origin.source {
            self.lines
                .push(format!("Source: {}", format_single_line(source)));
        }
        self
    }

    pub(crate) fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub(crate) fn lines(mut self, lines: impl IntoIterator<Item = String>) -> Self {
        self.lines.extend(lines);
        self
    }

    /// Render the block, blank-line terminated.
    pub(crate) fn render(self) -> String {
        let mut out = self.lines.join("\n");
        out.push_str("\n\n");
        out
    }
}

//! Shared data model for bulkflow pipeline execution.

pub mod error;
pub mod record;
pub mod result;
pub mod statement;
pub mod threshold;

pub use error::{ExecError, ExecErrorKind, TooManyErrors};
pub use record::{DataRecord, ErrorRecord, Field, FieldValue, Record, RecordOrigin, ResourceUri};
pub use result::{ColumnRender, ColumnView, ExecutionDetails, ReadResult, RowView, WriteResult};
pub use statement::{
    BatchKind, BulkStatement, MappedStatement, NodeId, RoutingKey, SimpleStatement, StatementBatch,
    Token, UnmappableStatement,
};
pub use threshold::ErrorThreshold;

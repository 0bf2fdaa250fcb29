//! Statement model: database-bound commands flowing through the pipeline.
//!
//! A mapped statement keeps a back-reference to the record it was built
//! from so failure accounting can recover the original source line, even
//! after the statement has been folded into a batch.

use crate::record::{DataRecord, FieldValue, Record, RecordOrigin};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 64-bit routing token computed from a statement's partition key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub i64);

/// Identity of a cluster node, as reported by the driver's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialized partition key, the input to the driver's token computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey(Vec<u8>);

impl RoutingKey {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Build a routing key from the statement's key column values.
    #[must_use]
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a FieldValue>) -> Self {
        let mut bytes = Vec::new();
        for value in values {
            bytes.extend_from_slice(value.to_string().as_bytes());
            bytes.push(0);
        }
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A prepared, bound statement carrying its originating record.
#[derive(Debug, Clone)]
pub struct MappedStatement {
    pub record: Arc<DataRecord>,
    /// Prepared CQL text, shared across all statements of a run.
    pub cql: Arc<str>,
    pub values: Vec<FieldValue>,
    pub routing_key: RoutingKey,
    /// True when the statement is a conditional (`IF [NOT] EXISTS`) update.
    pub conditional: bool,
}

impl MappedStatement {
    /// Approximate wire size, used by the batcher's byte bound.
    #[must_use]
    pub fn weight_bytes(&self) -> u64 {
        self.values.iter().map(FieldValue::weight_bytes).sum::<u64>() + self.cql.len() as u64
    }

    #[must_use]
    pub fn origin(&self) -> &RecordOrigin {
        &self.record.origin
    }
}

/// Placeholder produced when record-to-statement mapping fails. Never
/// executed; filtered out by the mapping error gate.
#[derive(Debug, Clone)]
pub struct UnmappableStatement {
    pub record: Record,
    pub cause: Arc<anyhow::Error>,
}

/// A statement with no record back-reference (unload reads, counts).
#[derive(Debug, Clone)]
pub struct SimpleStatement {
    pub cql: Arc<str>,
}

impl SimpleStatement {
    #[must_use]
    pub fn new(cql: impl Into<Arc<str>>) -> Self {
        Self { cql: cql.into() }
    }
}

/// Batch type, mirroring the database's logged/unlogged distinction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchKind {
    Logged,
    #[default]
    Unlogged,
}

/// An ordered group of statements sharing a routing affinity.
#[derive(Debug, Clone)]
pub struct StatementBatch {
    pub kind: BatchKind,
    pub statements: Vec<MappedStatement>,
}

impl StatementBatch {
    #[must_use]
    pub fn weight_bytes(&self) -> u64 {
        self.statements.iter().map(MappedStatement::weight_bytes).sum()
    }
}

/// Any statement flowing through the pipeline.
#[derive(Debug, Clone)]
pub enum BulkStatement {
    Mapped(MappedStatement),
    Unmappable(UnmappableStatement),
    Simple(SimpleStatement),
    Batch(StatementBatch),
}

impl BulkStatement {
    /// CQL text for diagnostics; batches render their first statement.
    #[must_use]
    pub fn cql(&self) -> Option<&str> {
        match self {
            Self::Mapped(s) => Some(&s.cql),
            Self::Simple(s) => Some(&s.cql),
            Self::Batch(b) => b.statements.first().map(|s| &*s.cql),
            Self::Unmappable(_) => None,
        }
    }

    /// Records backing this statement, in statement order. Empty for
    /// simple statements.
    #[must_use]
    pub fn mapped_statements(&self) -> Vec<&MappedStatement> {
        match self {
            Self::Mapped(s) => vec![s],
            Self::Batch(b) => b.statements.iter().collect(),
            Self::Simple(_) | Self::Unmappable(_) => Vec::new(),
        }
    }

    /// True when executing this statement requires a conditional write.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        match self {
            Self::Mapped(s) => s.conditional,
            Self::Batch(b) => b.statements.iter().any(|s| s.conditional),
            Self::Simple(_) | Self::Unmappable(_) => false,
        }
    }
}

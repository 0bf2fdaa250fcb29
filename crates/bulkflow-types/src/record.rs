//! Record model: provenance-carrying field tuples read from a connector.
//!
//! A [`Record`] is either parsed data or a connector-level parse failure.
//! Both carry a [`RecordOrigin`] naming the resource they came from and
//! their 1-based position within it. Records are immutable once emitted;
//! statements keep back-references to them via `Arc`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// URI naming an input or output location (file, stdin, table).
///
/// Thin wrapper providing type clarity without a URL-parsing dependency.
/// Callers are trusted to provide well-formed URIs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceUri(String);

impl ResourceUri {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provenance of a record: where it came from and which line produced it.
#[derive(Debug, Clone)]
pub struct RecordOrigin {
    /// Resource the record was read from.
    pub resource: ResourceUri,
    /// 1-based position within the resource.
    pub position: u64,
    /// Original source text, when the connector can preserve it.
    pub source: Option<String>,
}

impl RecordOrigin {
    #[must_use]
    pub fn new(resource: ResourceUri, position: u64, source: Option<String>) -> Self {
        Self {
            resource,
            position,
            source,
        }
    }
}

/// A single CQL-bound value produced by mapping.
///
/// Type conversion codecs live outside the core; this is the narrow value
/// surface they produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Boolean(bool),
    BigInt(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl FieldValue {
    /// Approximate encoded size, used by the batcher's byte bound.
    #[must_use]
    pub fn weight_bytes(&self) -> u64 {
        match self {
            Self::Null => 4,
            Self::Boolean(_) => 1,
            Self::BigInt(_) | Self::Double(_) => 8,
            Self::Text(s) => s.len() as u64,
            Self::Blob(b) => b.len() as u64,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::BigInt(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Blob(v) => {
                f.write_str("0x")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// One named field of a data record.
///
/// Connectors that only support indexed access use the decimal index as
/// the field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

/// A successfully parsed record.
#[derive(Debug, Clone)]
pub struct DataRecord {
    pub origin: RecordOrigin,
    /// Fields in connector order.
    pub fields: Vec<Field>,
}

impl DataRecord {
    /// Look up a field by name, falling back to decimal-index names.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

/// A record the connector failed to parse. Carries no fields, only the
/// cause and whatever source text survived.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub origin: RecordOrigin,
    pub cause: Arc<anyhow::Error>,
}

/// A record emitted by a connector: parsed data or a parse failure.
#[derive(Debug, Clone)]
pub enum Record {
    Data(DataRecord),
    Error(ErrorRecord),
}

impl Record {
    #[must_use]
    pub fn data(
        resource: ResourceUri,
        position: u64,
        source: Option<String>,
        fields: Vec<Field>,
    ) -> Self {
        Self::Data(DataRecord {
            origin: RecordOrigin::new(resource, position, source),
            fields,
        })
    }

    #[must_use]
    pub fn error(
        resource: ResourceUri,
        position: u64,
        source: Option<String>,
        cause: anyhow::Error,
    ) -> Self {
        Self::Error(ErrorRecord {
            origin: RecordOrigin::new(resource, position, source),
            cause: Arc::new(cause),
        })
    }

    #[must_use]
    pub fn origin(&self) -> &RecordOrigin {
        match self {
            Self::Data(r) => &r.origin,
            Self::Error(r) => &r.origin,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

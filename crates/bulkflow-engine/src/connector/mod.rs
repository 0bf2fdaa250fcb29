//! Connector interface: the boundary between external resources and the
//! pipeline.
//!
//! Connectors do blocking I/O; the orchestrator drives them on
//! dedicated blocking tasks feeding bounded channels. Record streams
//! are lazy iterators so resources are only opened when a worker gets
//! to them.

pub mod csv;

use crate::config::ConnectorConfig;
use anyhow::{bail, Result};
use bulkflow_types::{DataRecord, Record, ResourceUri};

/// Optional connector capabilities probed by the schema layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorFeature {
    /// Records expose fields by position.
    IndexedRecords,
    /// Records expose fields by name.
    MappedRecords,
}

/// Field names and declared types of the connector's records.
#[derive(Debug, Clone, Default)]
pub struct RecordMetadata {
    pub fields: Vec<String>,
}

/// One resource and its lazy, position-ordered record stream.
pub struct ResourceRead {
    pub resource: ResourceUri,
    pub records: Box<dyn Iterator<Item = Record> + Send>,
}

/// A source/sink of records behind a URI scheme.
pub trait Connector: Send {
    /// Open the connector; called once before any read or write.
    fn init(&mut self) -> Result<()>;

    /// Flat lazy stream across all resources.
    fn read(&mut self) -> Result<Box<dyn Iterator<Item = Record> + Send>>;

    /// One lazy stream per resource; records within a resource are
    /// sequential and position-ordered.
    fn read_by_resource(&mut self) -> Result<Box<dyn Iterator<Item = ResourceRead> + Send>>;

    /// Declared resource count; 0 means unknown and is treated as large.
    fn estimated_resource_count(&self) -> usize;

    fn supports(&self, feature: ConnectorFeature) -> bool;

    fn record_metadata(&self) -> RecordMetadata;

    /// Append records on the unload direction. Returns the number
    /// written.
    fn write(&mut self, records: &[DataRecord]) -> Result<u64>;

    /// Release resources; called exactly once at shutdown.
    fn close(&mut self) -> Result<()>;
}

/// Whether a connector name resolves to a shipped implementation.
#[must_use]
pub fn is_supported(name: &str) -> bool {
    name == "csv"
}

/// Construct the configured connector.
///
/// # Errors
///
/// Returns a configuration error for unknown connector names.
pub fn create(config: &ConnectorConfig) -> Result<Box<dyn Connector>> {
    match config.name.as_str() {
        "csv" => Ok(Box::new(csv::CsvConnector::new(config.csv.clone()))),
        other => bail!("Unknown connector '{other}'"),
    }
}

//! Record/statement mapping at the pipeline seams.
//!
//! Type conversion codecs are external collaborators; mapping here is
//! structural: select the configured fields from a record, bind them in
//! column order, and derive the routing key. Failures never escape as
//! errors — they become [`UnmappableStatement`]s (load) or
//! [`RowMappingError`]s (unload) for the log manager's gates.

use crate::config::SchemaConfig;
use anyhow::anyhow;
use bulkflow_types::{
    BulkStatement, ColumnRender, DataRecord, Field, FieldValue, MappedStatement, Record,
    RecordOrigin, ResourceUri, RoutingKey, RowView, UnmappableStatement,
};
use std::sync::Arc;

/// One `field=column` association from `schema.mapping`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub field: String,
    pub column: String,
}

/// Parse the `schema.mapping` syntax: a comma-separated list of
/// `field=column` pairs, or bare column names when record fields and
/// table columns share names. Indexed connectors use decimal indices as
/// field names.
pub fn parse_mapping(mapping: &str) -> anyhow::Result<Vec<FieldMapping>> {
    let mut entries = Vec::new();
    for part in mapping.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let entry = match part.split_once('=') {
            Some((field, column)) => FieldMapping {
                field: field.trim().to_string(),
                column: column.trim().to_string(),
            },
            None => FieldMapping {
                field: part.to_string(),
                column: part.to_string(),
            },
        };
        if entry.field.is_empty() || entry.column.is_empty() {
            return Err(anyhow!("invalid mapping entry '{part}'"));
        }
        entries.push(entry);
    }
    if entries.is_empty() {
        return Err(anyhow!("schema.mapping resolved to no columns"));
    }
    Ok(entries)
}

/// Maps parsed records to bound insert statements.
pub struct InsertMapper {
    cql: Arc<str>,
    mappings: Vec<FieldMapping>,
    conditional: bool,
}

impl InsertMapper {
    /// Build the mapper from the schema section. A user-supplied
    /// `schema.query` overrides the generated insert; conditional
    /// updates are detected from its text.
    pub fn from_schema(schema: &SchemaConfig) -> anyhow::Result<Self> {
        let mappings = parse_mapping(&schema.mapping)?;
        let cql: Arc<str> = match &schema.query {
            Some(query) => Arc::from(query.as_str()),
            None => {
                let keyspace = schema
                    .keyspace
                    .as_deref()
                    .ok_or_else(|| anyhow!("schema.keyspace is required to generate a query"))?;
                let table = schema
                    .table
                    .as_deref()
                    .ok_or_else(|| anyhow!("schema.table is required to generate a query"))?;
                let columns: Vec<&str> = mappings.iter().map(|m| m.column.as_str()).collect();
                let placeholders = vec!["?"; columns.len()].join(", ");
                Arc::from(format!(
                    "INSERT INTO {keyspace}.{table} ({}) VALUES ({placeholders})",
                    columns.join(", ")
                ))
            }
        };
        let upper = cql.to_uppercase();
        let conditional = upper.contains("IF NOT EXISTS") || upper.contains("IF EXISTS");
        Ok(Self {
            cql,
            mappings,
            conditional,
        })
    }

    #[must_use]
    pub fn cql(&self) -> &str {
        &self.cql
    }

    /// Map one record. Missing fields yield an unmappable statement
    /// carrying the original record.
    #[must_use]
    pub fn map(&self, record: DataRecord) -> BulkStatement {
        let mut values = Vec::with_capacity(self.mappings.len());
        for mapping in &self.mappings {
            match record.field(&mapping.field) {
                Some(value) => values.push(value.clone()),
                None => {
                    return BulkStatement::Unmappable(UnmappableStatement {
                        record: Record::Data(record),
                        cause: Arc::new(anyhow!(
                            "Required field '{}' (mapped to column '{}') was missing from record",
                            mapping.field,
                            mapping.column
                        )),
                    });
                }
            }
        }
        // The first mapped column doubles as the partition key; real
        // deployments read the key columns from table metadata.
        let routing_key = RoutingKey::from_values([&values[0]]);
        BulkStatement::Mapped(MappedStatement {
            record: Arc::new(record),
            cql: self.cql.clone(),
            values,
            routing_key,
            conditional: self.conditional,
        })
    }
}

/// A row that failed row-to-record conversion on the unload path.
#[derive(Debug)]
pub struct RowMappingError {
    pub cql: Option<Arc<str>>,
    pub row: RowView,
    pub cause: anyhow::Error,
}

/// Maps result rows back to records for the unload direction.
pub struct RowMapper {
    resource: ResourceUri,
    cql: Arc<str>,
}

impl RowMapper {
    #[must_use]
    pub fn new(resource: ResourceUri, cql: Arc<str>) -> Self {
        Self { resource, cql }
    }

    /// Convert one fetched row into a record. Columns whose buffers
    /// could not be deserialized fail the whole row.
    pub fn map(&self, row: RowView, position: u64) -> Result<DataRecord, RowMappingError> {
        let mut fields = Vec::with_capacity(row.columns.len());
        for column in &row.columns {
            match &column.render {
                ColumnRender::Value(value) => fields.push(Field {
                    name: column.name.clone(),
                    value: FieldValue::Text(value.clone()),
                }),
                ColumnRender::Malformed { type_tag, .. } => {
                    let cause = anyhow!(
                        "Invalid buffer for type {type_tag}, value cannot be deserialized"
                    )
                    .context(format!(
                        "Could not deserialize column {} of type {type_tag}",
                        column.name
                    ));
                    return Err(RowMappingError {
                        cql: Some(self.cql.clone()),
                        row,
                        cause,
                    });
                }
            }
        }
        Ok(DataRecord {
            origin: RecordOrigin::new(self.resource.clone(), position, None),
            fields,
        })
    }
}

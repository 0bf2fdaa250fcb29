//! Driver session interface and the in-process simulated cluster.
//!
//! The real CQL driver is an external collaborator; the engine talks to
//! it through [`ClusterSession`] only. [`SimulatedCluster`] is the
//! in-memory implementation used by tests and by the CLI's default
//! profile: it stores written rows, serves them back to reads, and
//! exposes a stable token ring for routing-affinity batching.

use async_trait::async_trait;
use bulkflow_types::{
    BulkStatement, ColumnRender, ColumnView, ExecError, ExecErrorKind, ExecutionDetails, NodeId,
    RoutingKey, RowView, Token,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Handle to a server-side prepared statement.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub cql: Arc<str>,
}

/// Minimum driver surface the engine depends on.
///
/// `token_for` and `replicas` are pure metadata lookups and stay
/// synchronous; execution is async and classified through [`ExecError`].
#[async_trait]
pub trait ClusterSession: Send + Sync {
    /// Prepare a statement on the cluster.
    async fn prepare(&self, cql: &str) -> Result<PreparedStatement, ExecError>;

    /// Execute a statement and return its server-side metadata. Reads
    /// return their rows in [`ExecutionDetails::rows`].
    async fn execute(&self, statement: &BulkStatement) -> Result<ExecutionDetails, ExecError>;

    /// Routing token for a serialized partition key.
    fn token_for(&self, key: &RoutingKey) -> Token;

    /// Replica set owning a token, in ring order.
    fn replicas(&self, token: Token) -> Vec<NodeId>;

    /// Close the session, releasing any pooled connections.
    async fn close(&self) -> anyhow::Result<()>;
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// In-memory cluster session.
///
/// Writes are stored as rendered rows; reads return everything stored so
/// far, which gives the unload path and the round-trip tests a real data
/// source without a cluster.
pub struct SimulatedCluster {
    nodes: Vec<NodeId>,
    replication_factor: usize,
    rows: Mutex<Vec<RowView>>,
    executions: AtomicU64,
}

impl SimulatedCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::with_topology(3, 1)
    }

    #[must_use]
    pub fn with_topology(node_count: usize, replication_factor: usize) -> Self {
        let nodes = (0..node_count.max(1))
            .map(|i| NodeId::new(format!("node-{i}")))
            .collect();
        Self {
            nodes,
            replication_factor: replication_factor.max(1),
            rows: Mutex::new(Vec::new()),
            executions: AtomicU64::new(0),
        }
    }

    /// Number of statements executed so far. Dry-run tests assert this
    /// stays at zero.
    #[must_use]
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::Acquire)
    }

    /// Rows stored by write statements, in arrival order.
    #[must_use]
    pub fn stored_rows(&self) -> Vec<RowView> {
        self.rows.lock().expect("row store poisoned").clone()
    }

    fn store_writes(&self, statement: &BulkStatement) {
        let mut rows = self.rows.lock().expect("row store poisoned");
        for mapped in statement.mapped_statements() {
            let columns = mapped
                .record
                .fields
                .iter()
                .zip(&mapped.values)
                .map(|(field, value)| ColumnView {
                    name: field.name.clone(),
                    render: ColumnRender::Value(value.to_string()),
                })
                .collect();
            rows.push(RowView { columns });
        }
    }
}

impl Default for SimulatedCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterSession for SimulatedCluster {
    async fn prepare(&self, cql: &str) -> Result<PreparedStatement, ExecError> {
        if cql.trim().is_empty() {
            return Err(ExecError::new(
                ExecErrorKind::IllegalArgument,
                "empty statement",
            ));
        }
        Ok(PreparedStatement {
            cql: Arc::from(cql),
        })
    }

    async fn execute(&self, statement: &BulkStatement) -> Result<ExecutionDetails, ExecError> {
        self.executions.fetch_add(1, Ordering::AcqRel);
        match statement {
            BulkStatement::Mapped(_) | BulkStatement::Batch(_) => {
                self.store_writes(statement);
                Ok(ExecutionDetails::empty())
            }
            BulkStatement::Simple(_) => Ok(ExecutionDetails {
                warnings: Vec::new(),
                was_applied: true,
                rows: self.stored_rows(),
            }),
            BulkStatement::Unmappable(_) => Err(ExecError::new(
                ExecErrorKind::IllegalArgument,
                "unmappable statement reached the driver",
            )),
        }
    }

    fn token_for(&self, key: &RoutingKey) -> Token {
        Token(fnv1a_64(key.as_bytes()) as i64)
    }

    fn replicas(&self, token: Token) -> Vec<NodeId> {
        let start = (token.0 as u64 % self.nodes.len() as u64) as usize;
        (0..self.replication_factor.min(self.nodes.len()))
            .map(|i| self.nodes[(start + i) % self.nodes.len()].clone())
            .collect()
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkflow_types::{DataRecord, Field, FieldValue, MappedStatement, RecordOrigin, ResourceUri, SimpleStatement};

    fn mapped(id: i64) -> BulkStatement {
        let record = DataRecord {
            origin: RecordOrigin::new(ResourceUri::new("file:///f.csv"), id as u64, None),
            fields: vec![Field {
                name: "id".into(),
                value: FieldValue::BigInt(id),
            }],
        };
        BulkStatement::Mapped(MappedStatement {
            record: Arc::new(record),
            cql: Arc::from("INSERT INTO ks.t (id) VALUES (?)"),
            values: vec![FieldValue::BigInt(id)],
            routing_key: RoutingKey::from_values([&FieldValue::BigInt(id)]),
            conditional: false,
        })
    }

    #[test]
    fn token_is_stable_for_equal_keys() {
        let cluster = SimulatedCluster::new();
        let a = RoutingKey::from_values([&FieldValue::BigInt(1)]);
        let b = RoutingKey::from_values([&FieldValue::BigInt(1)]);
        assert_eq!(cluster.token_for(&a), cluster.token_for(&b));
    }

    #[test]
    fn replica_sets_have_configured_size() {
        let cluster = SimulatedCluster::with_topology(5, 3);
        let token = cluster.token_for(&RoutingKey::new(vec![1, 2, 3]));
        assert_eq!(cluster.replicas(token).len(), 3);
    }

    #[tokio::test]
    async fn writes_are_served_back_to_reads() {
        let cluster = SimulatedCluster::new();
        cluster.execute(&mapped(1)).await.unwrap();
        cluster.execute(&mapped(2)).await.unwrap();
        let details = cluster
            .execute(&BulkStatement::Simple(SimpleStatement::new(
                "SELECT id FROM ks.t",
            )))
            .await
            .unwrap();
        assert_eq!(details.rows.len(), 2);
        assert_eq!(cluster.execution_count(), 3);
    }

    #[tokio::test]
    async fn empty_prepare_is_an_illegal_argument() {
        let cluster = SimulatedCluster::new();
        let err = cluster.prepare("  ").await.unwrap_err();
        assert!(err.is_unrecoverable());
    }
}

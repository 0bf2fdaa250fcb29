//! Routing-affinity statement batching.
//!
//! Small statements bound for the same partition (or the same replica
//! set) are merged into unlogged batches to amortize round-trips. Token
//! computation is delegated to the driver session; the batcher only keys
//! groups by the result.

use crate::driver::ClusterSession;
use bulkflow_types::{BatchKind, BulkStatement, MappedStatement, StatementBatch};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Default statement-count bound per batch.
pub const DEFAULT_MAX_BATCH_STATEMENTS: usize = 32;
/// Default byte bound per batch.
pub const DEFAULT_MAX_BATCH_SIZE_BYTES: u64 = 65_536;

/// Grouping regime for batch construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchMode {
    /// Group statements sharing a routing token.
    PartitionKey,
    /// Group statements sharing a replica set; tolerates cross-partition
    /// batches to reduce coordinator hops.
    ReplicaSet,
    /// No batching.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Token(i64),
    Replicas(String),
}

#[derive(Default)]
struct Group {
    statements: Vec<MappedStatement>,
    bytes: u64,
}

/// Accumulates statements into routing groups and emits bounded batches.
///
/// Groups flush when they reach the statement-count or byte bound; on
/// window close, [`flush_all`](Self::flush_all) drains partial groups in
/// insertion order of their first statement. Singleton groups unwrap
/// back into the bare statement.
pub struct StatementBatcher {
    mode: BatchMode,
    max_statements: usize,
    max_size_bytes: u64,
    session: Arc<dyn ClusterSession>,
    groups: HashMap<GroupKey, Group>,
    order: Vec<GroupKey>,
}

impl StatementBatcher {
    #[must_use]
    pub fn new(
        mode: BatchMode,
        max_statements: usize,
        max_size_bytes: u64,
        session: Arc<dyn ClusterSession>,
    ) -> Self {
        Self {
            mode,
            max_statements: max_statements.max(1),
            max_size_bytes: max_size_bytes.max(1),
            session,
            groups: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn group_key(&self, statement: &MappedStatement) -> GroupKey {
        let token = self.session.token_for(&statement.routing_key);
        match self.mode {
            BatchMode::PartitionKey | BatchMode::Disabled => GroupKey::Token(token.0),
            BatchMode::ReplicaSet => {
                let mut replicas: Vec<String> = self
                    .session
                    .replicas(token)
                    .into_iter()
                    .map(|n| n.as_str().to_string())
                    .collect();
                replicas.sort();
                GroupKey::Replicas(replicas.join(","))
            }
        }
    }

    /// Add one statement, returning any batches that became full.
    pub fn add(&mut self, statement: MappedStatement) -> Vec<BulkStatement> {
        let key = self.group_key(&statement);
        let weight = statement.weight_bytes();
        let mut flushed = Vec::new();

        let group = self.groups.entry(key.clone()).or_default();
        if group.statements.is_empty() {
            self.order.push(key.clone());
        } else if group.bytes + weight > self.max_size_bytes {
            // Adding would blow the byte bound; seal what we have first.
            flushed.push(seal(std::mem::take(group)));
            self.order.retain(|k| *k != key);
            self.order.push(key.clone());
        }

        let group = self.groups.get_mut(&key).expect("group just inserted");
        group.statements.push(statement);
        group.bytes += weight;

        if group.statements.len() >= self.max_statements || group.bytes >= self.max_size_bytes {
            flushed.push(seal(std::mem::take(group)));
            self.groups.remove(&key);
            self.order.retain(|k| *k != key);
        }
        flushed
    }

    /// Drain all partial groups, in insertion order of first statement.
    pub fn flush_all(&mut self) -> Vec<BulkStatement> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|key| self.groups.remove(&key))
            .filter(|group| !group.statements.is_empty())
            .map(seal)
            .collect()
    }

    /// Number of statements currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.groups.values().map(|g| g.statements.len()).sum()
    }
}

fn seal(mut group: Group) -> BulkStatement {
    if group.statements.len() == 1 {
        BulkStatement::Mapped(group.statements.pop().expect("len checked"))
    } else {
        BulkStatement::Batch(StatementBatch {
            kind: BatchKind::Unlogged,
            statements: group.statements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SimulatedCluster;
    use bulkflow_types::{
        DataRecord, Field, FieldValue, RecordOrigin, ResourceUri, RoutingKey,
    };

    fn mapped(partition: i64, position: u64) -> MappedStatement {
        let record = DataRecord {
            origin: RecordOrigin::new(
                ResourceUri::new("file:///f.csv"),
                position,
                Some(format!("line{position}")),
            ),
            fields: vec![Field {
                name: "pk".into(),
                value: FieldValue::BigInt(partition),
            }],
        };
        MappedStatement {
            record: Arc::new(record),
            cql: Arc::from("INSERT INTO ks.t (pk) VALUES (?)"),
            values: vec![FieldValue::BigInt(partition)],
            routing_key: RoutingKey::from_values([&FieldValue::BigInt(partition)]),
            conditional: false,
        }
    }

    fn batcher(max_statements: usize, max_bytes: u64) -> StatementBatcher {
        StatementBatcher::new(
            BatchMode::PartitionKey,
            max_statements,
            max_bytes,
            Arc::new(SimulatedCluster::new()),
        )
    }

    #[test]
    fn full_group_flushes_as_batch() {
        let mut b = batcher(2, u64::MAX);
        assert!(b.add(mapped(1, 1)).is_empty());
        let flushed = b.add(mapped(1, 2));
        assert_eq!(flushed.len(), 1);
        match &flushed[0] {
            BulkStatement::Batch(batch) => assert_eq!(batch.statements.len(), 2),
            other => panic!("expected batch, got {other:?}"),
        }
        assert_eq!(b.buffered(), 0);
    }

    #[test]
    fn different_partitions_never_share_a_batch() {
        let mut b = batcher(10, u64::MAX);
        b.add(mapped(1, 1));
        b.add(mapped(2, 2));
        b.add(mapped(1, 3));
        let flushed = b.flush_all();
        assert_eq!(flushed.len(), 2);
        for stmt in &flushed {
            let tokens: Vec<_> = stmt
                .mapped_statements()
                .iter()
                .map(|s| s.values[0].clone())
                .collect();
            assert!(tokens.windows(2).all(|w| w[0] == w[1]));
        }
    }

    #[test]
    fn singleton_groups_unwrap() {
        let mut b = batcher(10, u64::MAX);
        b.add(mapped(1, 1));
        let flushed = b.flush_all();
        assert_eq!(flushed.len(), 1);
        assert!(matches!(flushed[0], BulkStatement::Mapped(_)));
    }

    #[test]
    fn flush_all_preserves_insertion_order() {
        let mut b = batcher(10, u64::MAX);
        b.add(mapped(7, 1));
        b.add(mapped(3, 2));
        b.add(mapped(7, 3));
        let flushed = b.flush_all();
        let first_positions: Vec<u64> = flushed
            .iter()
            .map(|s| s.mapped_statements()[0].origin().position)
            .collect();
        assert_eq!(first_positions, vec![1, 2]);
    }

    #[test]
    fn byte_bound_is_never_exceeded() {
        let weight = mapped(1, 1).weight_bytes();
        let mut b = batcher(100, weight * 2);
        let mut out = Vec::new();
        for p in 1..=5 {
            out.extend(b.add(mapped(1, p)));
        }
        out.extend(b.flush_all());
        let total: usize = out.iter().map(|s| s.mapped_statements().len()).sum();
        assert_eq!(total, 5);
        for stmt in &out {
            if let BulkStatement::Batch(batch) = stmt {
                assert!(batch.weight_bytes() <= weight * 2);
            }
        }
    }

    #[test]
    fn every_statement_appears_exactly_once() {
        let mut b = batcher(3, u64::MAX);
        let mut out = Vec::new();
        for p in 1..=10 {
            out.extend(b.add(mapped(p % 2, p as u64)));
        }
        out.extend(b.flush_all());
        let mut positions: Vec<u64> = out
            .iter()
            .flat_map(|s| s.mapped_statements())
            .map(|s| s.origin().position)
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn replica_set_mode_groups_by_replicas() {
        let session = Arc::new(SimulatedCluster::with_topology(2, 2));
        let mut b = StatementBatcher::new(BatchMode::ReplicaSet, 100, u64::MAX, session);
        // With two nodes and RF 2 every token maps to the same replica
        // set, so everything lands in a single batch.
        for p in 1..=4 {
            b.add(mapped(p as i64, p));
        }
        let flushed = b.flush_all();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].mapped_statements().len(), 4);
    }
}

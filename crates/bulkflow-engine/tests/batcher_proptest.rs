//! Property tests for the statement batcher and the position tracker.

use bulkflow_engine::batcher::{BatchMode, StatementBatcher};
use bulkflow_engine::driver::{ClusterSession, SimulatedCluster};
use bulkflow_engine::position::PositionTracker;
use bulkflow_types::{
    BulkStatement, DataRecord, Field, FieldValue, MappedStatement, RecordOrigin, ResourceUri,
    RoutingKey,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn mapped(partition: i64, position: u64) -> MappedStatement {
    let record = DataRecord {
        origin: RecordOrigin::new(
            ResourceUri::new("file:///prop.csv"),
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

proptest! {
    /// Every input statement appears in exactly one output, no batch
    /// exceeds the bounds, and all members of a batch share a token.
    #[test]
    fn batcher_partitions_inputs_within_bounds(
        partitions in prop::collection::vec(0i64..8, 1..200),
        max_statements in 1usize..10,
        max_bytes in 64u64..4096,
    ) {
        let session = Arc::new(SimulatedCluster::new());
        let mut batcher = StatementBatcher::new(
            BatchMode::PartitionKey,
            max_statements,
            max_bytes,
            session.clone(),
        );

        let mut outputs = Vec::new();
        for (index, partition) in partitions.iter().enumerate() {
            outputs.extend(batcher.add(mapped(*partition, index as u64 + 1)));
        }
        outputs.extend(batcher.flush_all());

        // Partition: each input position exactly once.
        let mut seen: Vec<u64> = outputs
            .iter()
            .flat_map(BulkStatement::mapped_statements)
            .map(|s| s.origin().position)
            .collect();
        seen.sort_unstable();
        let expected: Vec<u64> = (1..=partitions.len() as u64).collect();
        prop_assert_eq!(seen, expected);

        for output in &outputs {
            match output {
                BulkStatement::Batch(batch) => {
                    prop_assert!(batch.statements.len() >= 2);
                    prop_assert!(batch.statements.len() <= max_statements);
                    prop_assert!(batch.weight_bytes() <= max_bytes);
                    let tokens: BTreeSet<i64> = batch
                        .statements
                        .iter()
                        .map(|s| session.token_for(&s.routing_key).0)
                        .collect();
                    prop_assert_eq!(tokens.len(), 1);
                }
                BulkStatement::Mapped(_) => {}
                other => prop_assert!(false, "unexpected output {:?}", other),
            }
        }
    }

    /// The tracker's merged ranges cover exactly the set of recorded
    /// positions, sorted and disjoint.
    #[test]
    fn position_tracker_matches_naive_set_model(
        positions in prop::collection::vec(1u64..64, 1..200),
    ) {
        let tracker = PositionTracker::new();
        let resource = ResourceUri::new("file:///prop.csv");
        let mut model = BTreeSet::new();
        for position in &positions {
            tracker.record(&resource, *position);
            model.insert(*position);
        }

        let ranges = tracker.ranges();
        let ranges = ranges.get(&resource).expect("resource recorded");

        // Sorted, disjoint, non-adjacent.
        for window in ranges.windows(2) {
            prop_assert!(window[0].1 + 1 < window[1].0);
        }
        // Exactly the recorded set.
        let covered: BTreeSet<u64> = ranges
            .iter()
            .flat_map(|(lo, hi)| *lo..=*hi)
            .collect();
        prop_assert_eq!(covered, model);
    }
}

//! Per-resource position accounting.
//!
//! Every record whose terminal outcome has been observed (written
//! successfully, or failed and logged) has its position recorded here.
//! Positions are kept as sorted, disjoint closed intervals per resource
//! and rendered once at shutdown as restart hints.

use bulkflow_types::ResourceUri;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// A closed interval of positions, inclusive on both ends.
pub type PositionRange = (u64, u64);

/// Tracks observed positions per resource as merged interval sets.
///
/// Insertion is O(log n) via binary search on the interval starts;
/// adjacent intervals merge eagerly so the set stays minimal.
#[derive(Debug, Default)]
pub struct PositionTracker {
    resources: Mutex<HashMap<ResourceUri, Vec<PositionRange>>>,
}

impl PositionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed position.
    pub fn record(&self, resource: &ResourceUri, position: u64) {
        let mut resources = self.resources.lock().expect("position tracker poisoned");
        let ranges = resources.entry(resource.clone()).or_default();
        insert_position(ranges, position);
    }

    /// True if no position has been recorded for any resource.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources
            .lock()
            .expect("position tracker poisoned")
            .is_empty()
    }

    /// Snapshot of all ranges, resources in ascending URI order.
    #[must_use]
    pub fn ranges(&self) -> BTreeMap<ResourceUri, Vec<PositionRange>> {
        self.resources
            .lock()
            .expect("position tracker poisoned")
            .iter()
            .map(|(uri, ranges)| (uri.clone(), ranges.clone()))
            .collect()
    }

    /// Render the tracker as `<resource>:<lo>` / `<resource>:<lo>-<hi>`
    /// lines, resources ascending, ranges ascending within a resource.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (resource, ranges) in self.ranges() {
            for (lo, hi) in ranges {
                if lo == hi {
                    out.push_str(&format!("{resource}:{lo}\n"));
                } else {
                    out.push_str(&format!("{resource}:{lo}-{hi}\n"));
                }
            }
        }
        out
    }
}

/// Insert `position` into a sorted, disjoint range vector, merging with
/// neighbors when adjacent.
fn insert_position(ranges: &mut Vec<PositionRange>, position: u64) {
    let idx = ranges.partition_point(|&(lo, _)| lo <= position);

    // Already covered by the preceding range.
    if idx > 0 {
        let (lo, hi) = ranges[idx - 1];
        if position <= hi {
            return;
        }
        if position == hi + 1 {
            // Extends the preceding range; may bridge to the next.
            if idx < ranges.len() && ranges[idx].0 == position + 1 {
                ranges[idx - 1] = (lo, ranges[idx].1);
                ranges.remove(idx);
            } else {
                ranges[idx - 1].1 = position;
            }
            return;
        }
    }

    // Extends the following range downward.
    if idx < ranges.len() && ranges[idx].0 == position + 1 {
        ranges[idx].0 = position;
        return;
    }

    ranges.insert(idx, (position, position));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> ResourceUri {
        ResourceUri::new(s)
    }

    #[test]
    fn single_position_renders_without_range() {
        let tracker = PositionTracker::new();
        tracker.record(&uri("file:///f1.csv"), 1);
        assert_eq!(tracker.render(), "file:///f1.csv:1\n");
    }

    #[test]
    fn contiguous_positions_merge() {
        let tracker = PositionTracker::new();
        for p in [3, 1, 2] {
            tracker.record(&uri("file:///f1.csv"), p);
        }
        assert_eq!(tracker.render(), "file:///f1.csv:1-3\n");
    }

    #[test]
    fn gaps_stay_split() {
        let tracker = PositionTracker::new();
        for p in [1, 2, 5, 7] {
            tracker.record(&uri("file:///f1.csv"), p);
        }
        assert_eq!(tracker.render(), "file:///f1.csv:1-2\nfile:///f1.csv:5\nfile:///f1.csv:7\n");
    }

    #[test]
    fn bridging_position_joins_two_ranges() {
        let tracker = PositionTracker::new();
        for p in [1, 2, 4, 5, 3] {
            tracker.record(&uri("file:///f1.csv"), p);
        }
        assert_eq!(tracker.render(), "file:///f1.csv:1-5\n");
    }

    #[test]
    fn duplicate_positions_are_idempotent() {
        let tracker = PositionTracker::new();
        tracker.record(&uri("file:///f1.csv"), 2);
        tracker.record(&uri("file:///f1.csv"), 2);
        assert_eq!(tracker.render(), "file:///f1.csv:2\n");
    }

    #[test]
    fn resources_render_in_uri_order() {
        let tracker = PositionTracker::new();
        tracker.record(&uri("file:///b.csv"), 1);
        tracker.record(&uri("file:///a.csv"), 9);
        assert_eq!(tracker.render(), "file:///a.csv:9\nfile:///b.csv:1\n");
    }

    #[test]
    fn ranges_are_sorted_and_disjoint_under_random_order() {
        let tracker = PositionTracker::new();
        let positions = [17, 3, 4, 99, 5, 1, 18, 16, 2, 100];
        for p in positions {
            tracker.record(&uri("file:///f.csv"), p);
        }
        let ranges = tracker.ranges();
        let ranges = ranges.get(&uri("file:///f.csv")).unwrap();
        for window in ranges.windows(2) {
            assert!(window[0].1 + 1 < window[1].0, "ranges {window:?} overlap or touch");
        }
        assert_eq!(ranges, &vec![(1, 5), (16, 18), (99, 100)]);
    }
}

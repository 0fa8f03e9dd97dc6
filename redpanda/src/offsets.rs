//! Commit position tracking for a consumer task.

use std::collections::{BTreeSet, HashMap};

/// Outstanding offsets per partition.
///
/// Kafka commits are cumulative: committing `n` marks every offset below `n`
/// as consumed. While an offset is unacknowledged the commit position of its
/// partition stays at that offset, even though later offsets keep being
/// delivered and acknowledged. Once nothing is outstanding the position is one
/// past the highest offset seen.
#[derive(Debug, Default)]
pub(crate) struct PartitionOffsets {
    partitions: HashMap<i32, Progress>,
}

#[derive(Debug, Default)]
struct Progress {
    /// One past the highest offset delivered
    next: i64,
    unacked: BTreeSet<i64>,
}

impl Progress {
    fn commit_position(&self) -> i64 {
        self.unacked.first().copied().unwrap_or(self.next)
    }
}

impl PartitionOffsets {
    /// Record a polled offset as outstanding until it is acknowledged.
    pub(crate) fn delivered(&mut self, partition: i32, offset: i64) {
        let progress = self.partitions.entry(partition).or_default();
        progress.unacked.insert(offset);
        progress.next = progress.next.max(offset + 1);
    }

    /// Mark `offset` acknowledged.
    ///
    /// Returns the new commit position if it moved forward.
    pub(crate) fn acked(&mut self, partition: i32, offset: i64) -> Option<i64> {
        let progress = self.partitions.get_mut(&partition)?;
        let before = progress.commit_position();
        if !progress.unacked.remove(&offset) {
            return None;
        }
        let after = progress.commit_position();
        (after > before).then_some(after)
    }

    /// Offset the partition would resume from if the task stopped now.
    pub(crate) fn commit_position(&self, partition: i32) -> Option<i64> {
        self.partitions.get(&partition).map(Progress::commit_position)
    }

    /// Number of delivered but unacknowledged offsets in `partition`.
    pub(crate) fn outstanding(&self, partition: i32) -> usize {
        self.partitions.get(&partition).map_or(0, |p| p.unacked.len())
    }
}

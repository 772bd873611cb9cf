//! Deterministic work sharding across independent worker instances.
//!
//! Every worker runs the same branch-free formula over the same ordered item
//! list, so no runtime coordination is needed: `ceil(total / count)` items per
//! worker, worker `i` takes the `i`-th contiguous slice. The last worker's
//! nominal `end` may overshoot the item count; the range is advisory and
//! callers clamp before enumerating actual items.

use crate::error::{ProbeError, ProbeResult};

/// A worker's half-open slice `[begin, end)` of the global ordered item list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardRange {
    pub begin: usize,
    pub end: usize,
}

impl ShardRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    /// Clamp the advisory range to the actual item count.
    pub fn clamp_to(self, total_items: usize) -> Self {
        Self {
            begin: self.begin.min(total_items),
            end: self.end.min(total_items),
        }
    }
}

/// Sub-slice of a shard dispatched as one external render invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Batch {
    pub begin: usize,
    pub end: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
}

/// Compute worker `worker_index`'s slice of `total_items` ordered items.
///
/// Pure and deterministic; the union of all workers' ranges tiles
/// `[0, ceil(total/count) * count)` with no gaps or overlaps.
pub fn shard(
    total_items: usize,
    worker_count: usize,
    worker_index: usize,
) -> ProbeResult<ShardRange> {
    if worker_count == 0 {
        return Err(ProbeError::config("worker count must be positive"));
    }
    if worker_index >= worker_count {
        return Err(ProbeError::config(format!(
            "worker index {worker_index} out of range for {worker_count} worker(s)"
        )));
    }

    let per_worker = total_items.div_ceil(worker_count);
    Ok(ShardRange {
        begin: per_worker * worker_index,
        end: per_worker * (worker_index + 1),
    })
}

/// Split a shard into contiguous ascending batches of at most `batch_size`
/// items, exactly tiling the range (the last batch is truncated).
pub fn batches(range: ShardRange, batch_size: usize) -> ProbeResult<Vec<Batch>> {
    if batch_size == 0 {
        return Err(ProbeError::config("batch size must be positive"));
    }

    let mut out = Vec::with_capacity(range.len().div_ceil(batch_size));
    let mut begin = range.begin;
    while begin < range.end {
        let end = (begin + batch_size).min(range.end);
        out.push(Batch { begin, end });
        begin = end;
    }
    Ok(out)
}

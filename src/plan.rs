use std::ops::Range;

use crate::array::Batchable;
use crate::axes::Axis;
use crate::tree::Tree;
use crate::{Result, ShardError};

/// Size bookkeeping for one sharded invocation.
///
/// Invariant: `batch_size == num_full_shards * shard_size + last_shard_size`
/// with `0 < last_shard_size <= shard_size`. When the batch divides evenly,
/// `last_shard_size == shard_size` and the final shard is just another full
/// shard; a zero-size shard never exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPlan {
    pub shard_size: usize,
    pub batch_size: usize,
    /// Full shards beyond the final one, i.e. `ceil(batch/shard) - 1`.
    pub num_full_shards: usize,
    /// Size of the final shard; equals `shard_size` on an even split.
    pub last_shard_size: usize,
}

impl ShardPlan {
    pub fn new(batch_size: usize, shard_size: usize) -> Result<Self> {
        if shard_size == 0 {
            return Err(ShardError::InvalidShardSize);
        }
        if batch_size == 0 {
            return Err(ShardError::EmptyBatch);
        }
        let num_full_shards = (batch_size - 1) / shard_size;
        let rem = batch_size % shard_size;
        let last_shard_size = if rem == 0 { shard_size } else { rem };
        debug_assert_eq!(
            batch_size,
            num_full_shards * shard_size + last_shard_size
        );
        Ok(ShardPlan {
            shard_size,
            batch_size,
            num_full_shards,
            last_shard_size,
        })
    }

    /// Start offsets of the shards driven by the main loop, in ascending
    /// order. Includes the final shard when it is exactly `shard_size` long.
    pub fn full_shard_starts(&self) -> impl Iterator<Item = usize> + '_ {
        let count = if self.batch_size >= self.shard_size {
            (self.batch_size - self.shard_size) / self.shard_size + 1
        } else {
            0
        };
        (0..count).map(move |k| k * self.shard_size)
    }

    /// `(start, size)` of the trailing partial shard, if the batch does not
    /// divide evenly.
    pub fn remainder(&self) -> Option<(usize, usize)> {
        if self.last_shard_size == self.shard_size {
            None
        } else {
            Some((self.batch_size - self.last_shard_size, self.last_shard_size))
        }
    }

    /// Total number of shards that will execute.
    pub fn num_shards(&self) -> usize {
        self.full_shard_starts().count() + self.remainder().is_some() as usize
    }

    /// The concrete index partition of `[0, batch_size)`, for inspection.
    pub fn ranges(&self) -> Vec<Range<usize>> {
        let mut out: Vec<Range<usize>> = self
            .full_shard_starts()
            .map(|s| s..s + self.shard_size)
            .collect();
        if let Some((start, size)) = self.remainder() {
            out.push(start..start + size);
        }
        out
    }
}

/// Common batch size of an argument tree: the length of every mapped leaf
/// along its mapped axis. Disagreement between mapped leaves is a caller
/// contract violation and fails loudly rather than picking one.
pub fn batch_size_of<A: Batchable>(args: &Tree<A>, axes: &Tree<Axis>) -> Result<usize> {
    let mut batch: Option<usize> = None;
    args.try_for_each_zip(axes, |leaf, axis| {
        let axis = match axis {
            Axis::Broadcast => return Ok(()),
            Axis::Mapped(axis) => *axis,
        };
        let rank = leaf.rank();
        if axis >= rank {
            return Err(ShardError::InvalidAxis { axis, rank });
        }
        let size = leaf.dim(axis);
        match batch {
            None => {
                batch = Some(size);
                Ok(())
            }
            Some(prev) if prev != size => Err(ShardError::BatchSizeMismatch(prev, size)),
            Some(_) => Ok(()),
        }
    })?;
    batch.ok_or(ShardError::NoBatchedArguments)
}

//! Chunked-batch execution for vectorized functions.
//!
//! Given a vectorized function and array-valued arguments sharing a batch
//! axis, this crate applies the function to the full batch in fixed-size
//! contiguous shards. Peak memory is bounded by one shard's working set (as
//! in a plain per-element map) while throughput stays close to full
//! vectorization: the throughput/memory dial for inference pipelines whose
//! batches are too large to vectorize in one piece.
//!
//! # Core Types
//!
//! - [`Tree`]: nested structure of array leaves; arguments, outputs, shape
//!   specs and axis tags all share it
//! - [`Axis`] / [`AxisSpec`]: which axis of each leaf is the batch axis, or
//!   [`Axis::Broadcast`] for arguments passed whole to every shard
//! - [`ShardPlan`]: the index partition of the batch, remainder included
//! - [`Batchable`] / [`ArraySpec`] / [`ShardFn`] / [`Vectorize`]: the host
//!   array-framework interface the engine is generic over
//! - [`Tensor`]: bundled dense row-major host, used by the tests and usable
//!   standalone
//!
//! # Entry Points
//!
//! - [`sharded_apply`]: wrap an already-vectorized function for sharded
//!   execution
//! - [`sharded_map`]: vectorize via [`Vectorize`], then shard
//! - [`inference_subbatch`]: immediate split/run/concatenate convenience call
//!
//! # Example
//!
//! ```rust
//! use sharded_map::{sharded_apply, ApplyOptions, PureFn, Tensor, TensorSpec, Tree};
//!
//! // An (already vectorized) function: double every element.
//! let double = PureFn::new(
//!     |args: &Tree<Tensor<f64>>| args.try_map(|t| Ok(t.map(|x| x * 2.0))),
//!     |specs: &Tree<TensorSpec>| Ok(specs.clone()),
//! );
//!
//! // Run it over a batch of 10 rows in shards of 3 (3 full shards plus a
//! // remainder of 1). The result is identical to one full-batch call.
//! let f = sharded_apply(double, &ApplyOptions::with_shard_size(3))?;
//! let x = Tensor::from_fn(&[10, 4], |idx| (idx[0] * 4 + idx[1]) as f64);
//! let out = f.call(&Tree::leaf(x))?;
//! assert_eq!(out.leaves()[0].dims(), &[10, 4]);
//! # Ok::<(), sharded_map::ShardError>(())
//! ```
//!
//! # Execution Model
//!
//! One call runs as: axis normalization over the argument tree, shard
//! planning (including the uneven remainder), a shape-only probe of the
//! wrapped function to learn output shapes and dtypes, zero-filled buffer
//! allocation for the whole batch, then a strictly sequential fold over
//! shard start offsets, each iteration writing a disjoint slice of the
//! buffers. Shards run strictly one at a time; the dial trades throughput
//! against memory, not against parallelism. A failure in any shard surfaces
//! immediately; partial output is never returned.

mod apply;
pub mod array;
mod axes;
mod plan;
mod smap;
mod subbatch;
pub mod tensor;
pub mod tree;

// ============================================================================
// Entry points
// ============================================================================
pub use apply::{sharded_apply, ApplyOptions, Sharded};
pub use smap::{sharded_map, Mode, ShardedMap};
pub use subbatch::inference_subbatch;

// ============================================================================
// Axis specification and planning
// ============================================================================
pub use axes::{expand_axes, Axis, AxisSpec};
pub use plan::{batch_size_of, ShardPlan};

// ============================================================================
// Host-framework interface and bundled dense host
// ============================================================================
pub use array::{ArraySpec, Batchable, PureFn, ShardFn, Vectorize};
pub use tensor::{Tensor, TensorSpec};
pub use tree::Tree;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur while planning or executing a sharded call.
#[derive(Debug, thiserror::Error)]
pub enum ShardError {
    /// `new_out_axes` is reserved and unimplemented.
    #[error("new output axes are not implemented")]
    NewOutAxesUnsupported,

    /// A shard size of zero was requested.
    #[error("shard_size must be greater than 0")]
    InvalidShardSize,

    /// No leaf carries a mapped axis, so no batch size can be determined.
    #[error("no batched arguments: at least one leaf must have a mapped axis")]
    NoBatchedArguments,

    /// A mapped leaf is empty along its batch axis.
    #[error("cannot shard an empty batch")]
    EmptyBatch,

    /// An axis or spec tree does not align with the argument tree.
    #[error("tree structure mismatch: {left} vs {right}")]
    StructureMismatch { left: String, right: String },

    /// Mapped leaves disagree about the batch size.
    #[error("mapped axis sizes disagree: {0} vs {1}")]
    BatchSizeMismatch(usize, usize),

    /// Invalid axis index for the given array rank.
    #[error("invalid axis {axis} for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    /// Output axes must be mapped; there is no placement for shard results
    /// along a broadcast axis.
    #[error("broadcast axes are not allowed in out_axes")]
    BroadcastOutputAxis,

    /// Array shapes are incompatible for the operation.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// Slice bounds exceed the axis length.
    #[error("slice [{start}, {end}) out of bounds for axis of length {len}")]
    SliceOutOfBounds {
        start: usize,
        end: usize,
        len: usize,
    },
}

/// Result type for sharded execution.
pub type Result<T> = std::result::Result<T, ShardError>;

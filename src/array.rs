//! Interface to the host array framework.
//!
//! The engine does not own an array implementation; it is generic over the
//! capabilities it needs from one: shape/dtype metadata, axis slicing,
//! disjoint slice writes, zero-filled allocation, shape-only evaluation and
//! batched-transform lifting. [`crate::tensor::Tensor`] is a bundled dense
//! implementation of these seams.

use crate::axes::AxisSpec;
use crate::tree::Tree;
use crate::Result;

/// Shape-and-dtype metadata for one array leaf. Cheap to build and copy;
/// carries no element data. The element dtype is whatever the implementing
/// host encodes in the type, and is never widened or narrowed by the engine.
pub trait ArraySpec: Clone {
    fn rank(&self) -> usize;

    /// Length along `axis`.
    fn dim(&self, axis: usize) -> usize;

    /// The same spec with one axis resized.
    fn with_dim(&self, axis: usize, len: usize) -> Self;
}

/// An array the shard executor can slice, and a buffer it can assemble.
pub trait Batchable: Clone {
    type Spec: ArraySpec;

    /// Metadata for this array, as the probe would see it.
    fn spec(&self) -> Self::Spec;

    fn rank(&self) -> usize;

    /// Length along `axis`.
    fn dim(&self, axis: usize) -> usize;

    /// Contiguous read of `[start, start + len)` along `axis`.
    fn slice(&self, axis: usize, start: usize, len: usize) -> Result<Self>;

    /// Write `shard` into `[start, start + shard.dim(axis))` along `axis`.
    /// Every non-`axis` dimension of `shard` must match `self`.
    fn write_slice(&mut self, axis: usize, start: usize, shard: &Self) -> Result<()>;

    /// Zero-initialized allocation. The zero fill is an implementation
    /// convenience: the executor overwrites every element before the buffer
    /// is handed out.
    fn zeros(spec: &Self::Spec) -> Self;
}

/// A function the engine can apply shard-by-shard.
///
/// `eval_shape` is the probe: it must report exactly the output shapes and
/// dtypes `call` would produce for arguments of the given specs, at metadata
/// cost only, without materializing a shard of data.
pub trait ShardFn<A: Batchable> {
    fn call(&self, args: &Tree<A>) -> Result<Tree<A>>;

    fn eval_shape(&self, args: &Tree<A::Spec>) -> Result<Tree<A::Spec>>;
}

impl<A: Batchable, F: ShardFn<A>> ShardFn<A> for &F {
    fn call(&self, args: &Tree<A>) -> Result<Tree<A>> {
        (**self).call(args)
    }

    fn eval_shape(&self, args: &Tree<A::Spec>) -> Result<Tree<A::Spec>> {
        (**self).eval_shape(args)
    }
}

/// Lift a per-element function to a full-batch vectorized form. This is the
/// host framework's batched-transform construction; the sharded-map
/// combinator composes it with the shard executor.
pub trait Vectorize {
    type Vectorized;

    fn vectorize(&self, in_axes: &AxisSpec, out_axes: &AxisSpec) -> Self::Vectorized;
}

/// [`ShardFn`] built from a pair of closures: one for real evaluation, one
/// for the shape-only probe.
pub struct PureFn<C, E> {
    call: C,
    eval: E,
}

impl<C, E> PureFn<C, E> {
    pub fn new(call: C, eval: E) -> Self {
        PureFn { call, eval }
    }
}

impl<A, C, E> ShardFn<A> for PureFn<C, E>
where
    A: Batchable,
    C: Fn(&Tree<A>) -> Result<Tree<A>>,
    E: Fn(&Tree<A::Spec>) -> Result<Tree<A::Spec>>,
{
    fn call(&self, args: &Tree<A>) -> Result<Tree<A>> {
        (self.call)(args)
    }

    fn eval_shape(&self, args: &Tree<A::Spec>) -> Result<Tree<A::Spec>> {
        (self.eval)(args)
    }
}

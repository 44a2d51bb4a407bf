//! The shard executor: plan, probe, allocate, run.
//!
//! [`sharded_apply`] wraps an already-vectorized function so that a call on a
//! full batch is executed as a sequence of fixed-size contiguous shards, each
//! sliced out of the mapped arguments, evaluated, and written into a
//! pre-allocated output buffer at the matching offset. Memory stays bounded
//! by one shard's working set plus the output buffers; throughput stays close
//! to the vectorized form because nothing runs element-by-element.

use crate::array::{ArraySpec, Batchable, ShardFn};
use crate::axes::{expand_axes, Axis, AxisSpec};
use crate::plan::{batch_size_of, ShardPlan};
use crate::tree::Tree;
use crate::{Result, ShardError};

/// Options for [`sharded_apply`] and [`crate::sharded_map`].
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Rows per shard. `None` disables sharding entirely: the wrapped
    /// function is invoked once on the full batch, with no planning, probing
    /// or buffer allocation.
    pub shard_size: Option<usize>,
    /// Which axis of each input leaf is the batch axis.
    pub in_axes: AxisSpec,
    /// Which axis of each output leaf the batch is assembled along.
    pub out_axes: AxisSpec,
    /// Reserved; `true` is rejected before the function can run.
    pub new_out_axes: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        ApplyOptions {
            shard_size: Some(1),
            in_axes: AxisSpec::Uniform(0),
            out_axes: AxisSpec::Uniform(0),
            new_out_axes: false,
        }
    }
}

impl ApplyOptions {
    pub fn with_shard_size(shard_size: usize) -> Self {
        ApplyOptions {
            shard_size: Some(shard_size),
            ..Default::default()
        }
    }
}

/// A function wrapped for sharded execution. Built by [`sharded_apply`];
/// call it through [`Sharded::call`].
pub struct Sharded<F> {
    f: F,
    shard_size: Option<usize>,
    in_axes: AxisSpec,
    out_axes: AxisSpec,
}

impl<F> std::fmt::Debug for Sharded<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sharded")
            .field("shard_size", &self.shard_size)
            .field("in_axes", &self.in_axes)
            .field("out_axes", &self.out_axes)
            .finish_non_exhaustive()
    }
}

/// Wrap `f` so that calls run shard-by-shard per `options`.
///
/// Fails fast on configuration errors (`new_out_axes`, zero shard size)
/// before `f` is ever invoked.
pub fn sharded_apply<F>(f: F, options: &ApplyOptions) -> Result<Sharded<F>> {
    if options.new_out_axes {
        return Err(ShardError::NewOutAxesUnsupported);
    }
    if options.shard_size == Some(0) {
        return Err(ShardError::InvalidShardSize);
    }
    Ok(Sharded {
        f,
        shard_size: options.shard_size,
        in_axes: options.in_axes.clone(),
        out_axes: options.out_axes.clone(),
    })
}

impl<F> Sharded<F> {
    /// Apply the wrapped function to a full batch.
    ///
    /// Plans the shard partition, probes the output shapes at metadata cost,
    /// allocates zero-filled buffers for the whole batch, then folds over the
    /// full-shard starts in ascending order and finally the remainder shard,
    /// if any. The buffer tree is owned exclusively by this call and returned
    /// only once fully written; a failure in any shard surfaces immediately
    /// and no partial output escapes.
    pub fn call<A>(&self, args: &Tree<A>) -> Result<Tree<A>>
    where
        A: Batchable,
        F: ShardFn<A>,
    {
        let Some(shard_size) = self.shard_size else {
            // Sharding disabled: direct passthrough.
            return self.f.call(args);
        };

        let in_axes = expand_axes(&self.in_axes, args)?;
        let batch_size = batch_size_of(args, &in_axes)?;
        let plan = ShardPlan::new(batch_size, shard_size)?;

        // Probe: shape-only evaluation on a representative slice. The
        // remainder shard determines dtypes and non-mapped dims; a full-size
        // probe is only needed when full shards exist, since the two may
        // differ along the mapped axis.
        let arg_specs = args.map(|leaf| leaf.spec());
        let probe = |size: usize| -> Result<Tree<A::Spec>> {
            let sliced = arg_specs.try_zip_with(&in_axes, |spec, axis| {
                Ok(match axis {
                    Axis::Mapped(ax) => spec.with_dim(*ax, size),
                    Axis::Broadcast => spec.clone(),
                })
            })?;
            self.f.eval_shape(&sliced)
        };

        let remainder_specs = probe(plan.last_shard_size)?;
        let out_axes = expand_axes(&self.out_axes, &remainder_specs)?;
        if out_axes.leaves().iter().any(|axis| !axis.is_mapped()) {
            return Err(ShardError::BroadcastOutputAxis);
        }

        // Buffer shapes: the full-shard output with its mapped axis scaled to
        // cover the whole batch. With no full shards the single remainder
        // shard is the whole batch and its specs are the buffer specs.
        let buffer_specs = if plan.num_full_shards > 0 {
            let full_specs = probe(plan.shard_size)?;
            full_specs.try_zip3_with(&remainder_specs, &out_axes, |full, rem, axis| {
                let ax = match axis {
                    Axis::Mapped(ax) => *ax,
                    Axis::Broadcast => return Err(ShardError::BroadcastOutputAxis),
                };
                if ax >= full.rank() {
                    return Err(ShardError::InvalidAxis {
                        axis: ax,
                        rank: full.rank(),
                    });
                }
                let total = full.dim(ax) * plan.num_full_shards + rem.dim(ax);
                Ok(full.with_dim(ax, total))
            })?
        } else {
            remainder_specs
        };

        let mut outputs: Tree<A> = buffer_specs.map(|spec| A::zeros(spec));

        for start in plan.full_shard_starts() {
            self.run_shard(&mut outputs, args, &in_axes, &out_axes, start, shard_size)?;
        }
        if let Some((start, size)) = plan.remainder() {
            self.run_shard(&mut outputs, args, &in_axes, &out_axes, start, size)?;
        }
        Ok(outputs)
    }

    /// One fold step: slice, evaluate, write at the same offset. Each step
    /// writes a disjoint index range of the buffers.
    fn run_shard<A>(
        &self,
        outputs: &mut Tree<A>,
        args: &Tree<A>,
        in_axes: &Tree<Axis>,
        out_axes: &Tree<Axis>,
        start: usize,
        size: usize,
    ) -> Result<()>
    where
        A: Batchable,
        F: ShardFn<A>,
    {
        let input = args.try_zip_with(in_axes, |leaf, axis| match axis {
            Axis::Mapped(ax) => leaf.slice(*ax, start, size),
            Axis::Broadcast => Ok(leaf.clone()),
        })?;
        let shard_out = self.f.call(&input)?;
        outputs.try_zip2_mut_with(&shard_out, out_axes, |buffer, piece, axis| match axis {
            Axis::Mapped(ax) => buffer.write_slice(*ax, start, piece),
            Axis::Broadcast => Err(ShardError::BroadcastOutputAxis),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::PureFn;
    use crate::tensor::{Tensor, TensorSpec};

    fn arange(dims: &[usize]) -> Tensor<f64> {
        let mut next = 0.0;
        Tensor::from_fn(dims, |_| {
            let v = next;
            next += 1.0;
            v
        })
    }

    fn double() -> impl ShardFn<Tensor<f64>> {
        PureFn::new(
            |args: &Tree<Tensor<f64>>| args.try_map(|t| Ok(t.map(|x| x * 2.0))),
            |specs: &Tree<TensorSpec>| Ok(specs.clone()),
        )
    }

    #[test]
    fn test_uneven_shards_match_direct_call() {
        let x = arange(&[10, 4]);
        let args = Tree::leaf(x);
        let expected = double().call(&args).unwrap();

        let f = sharded_apply(double(), &ApplyOptions::with_shard_size(3)).unwrap();
        assert_eq!(f.call(&args).unwrap(), expected);
    }

    #[test]
    fn test_even_shards_match_direct_call() {
        let args = Tree::leaf(arange(&[9, 2]));
        let expected = double().call(&args).unwrap();
        let f = sharded_apply(double(), &ApplyOptions::with_shard_size(3)).unwrap();
        assert_eq!(f.call(&args).unwrap(), expected);
    }

    #[test]
    fn test_shard_larger_than_batch() {
        let args = Tree::leaf(arange(&[4, 2]));
        let expected = double().call(&args).unwrap();
        let f = sharded_apply(double(), &ApplyOptions::with_shard_size(16)).unwrap();
        assert_eq!(f.call(&args).unwrap(), expected);
    }

    #[test]
    fn test_mapped_axis_other_than_zero() {
        let args = Tree::leaf(arange(&[3, 7]));
        let expected = double().call(&args).unwrap();
        let options = ApplyOptions {
            shard_size: Some(2),
            in_axes: AxisSpec::Uniform(1),
            out_axes: AxisSpec::Uniform(1),
            ..Default::default()
        };
        let f = sharded_apply(double(), &options).unwrap();
        assert_eq!(f.call(&args).unwrap(), expected);
    }

    #[test]
    fn test_new_out_axes_rejected_at_construction() {
        let options = ApplyOptions {
            new_out_axes: true,
            ..Default::default()
        };
        assert!(matches!(
            sharded_apply(double(), &options),
            Err(ShardError::NewOutAxesUnsupported)
        ));
    }

    #[test]
    fn test_zero_shard_size_rejected() {
        let options = ApplyOptions {
            shard_size: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            sharded_apply(double(), &options),
            Err(ShardError::InvalidShardSize)
        ));
    }

    #[test]
    fn test_broadcast_out_axis_rejected() {
        let args = Tree::leaf(arange(&[6]));
        let options = ApplyOptions {
            shard_size: Some(2),
            out_axes: AxisSpec::PerLeaf(Tree::leaf(Axis::Broadcast)),
            ..Default::default()
        };
        let f = sharded_apply(double(), &options).unwrap();
        assert!(matches!(
            f.call(&args),
            Err(ShardError::BroadcastOutputAxis)
        ));
    }

    #[test]
    fn test_output_shape_change_per_shard() {
        // [n, 4] -> [n]: row sums. Exercises buffer sizing when the output
        // drops the non-mapped axis.
        let row_sums = PureFn::new(
            |args: &Tree<Tensor<f64>>| {
                args.try_map(|t| {
                    let (rows, cols) = (t.dims()[0], t.dims()[1]);
                    let data = (0..rows)
                        .map(|r| (0..cols).map(|c| t.get(&[r, c])).sum())
                        .collect();
                    Ok(Tensor::from_vec(data))
                })
            },
            |specs: &Tree<TensorSpec>| {
                specs.try_map(|s| Ok(TensorSpec::new(vec![s.dims()[0]])))
            },
        );
        let args = Tree::leaf(arange(&[10, 4]));
        let expected = row_sums.call(&args).unwrap();
        let f = sharded_apply(&row_sums, &ApplyOptions::with_shard_size(4)).unwrap();
        assert_eq!(f.call(&args).unwrap(), expected);
    }
}

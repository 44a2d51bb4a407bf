//! Split/run/concatenate convenience call for inference pipelines.

use crate::apply::{sharded_apply, ApplyOptions};
use crate::array::{Batchable, ShardFn};
use crate::axes::AxisSpec;
use crate::smap::Mode;
use crate::tree::Tree;
use crate::{Result, ShardError};

/// Run `module` over subbatches of its batched arguments.
///
/// `batched_args` are sliced per shard along `input_subbatch_dim`;
/// `nonbatched_args` are passed whole to every shard. The module sees one
/// `Tree::Seq` of batched-then-nonbatched arguments, mirroring a plain call
/// on the concatenation of both groups. Results are assembled along
/// `output_subbatch_dim`, defaulting to the input dim.
///
/// An empty `batched_args` is a precondition violation: no batch size can be
/// determined. It is reported before `module` is invoked, in any mode. In
/// [`Mode::Init`], `module` runs exactly once on the full arguments and
/// sharding is bypassed.
pub fn inference_subbatch<A, F>(
    module: &F,
    subbatch_size: usize,
    batched_args: Vec<Tree<A>>,
    nonbatched_args: Vec<Tree<A>>,
    input_subbatch_dim: usize,
    output_subbatch_dim: Option<usize>,
    mode: Mode,
) -> Result<Tree<A>>
where
    A: Batchable,
    F: ShardFn<A>,
{
    if batched_args.is_empty() {
        return Err(ShardError::NoBatchedArguments);
    }

    if mode == Mode::Init {
        let mut all = batched_args;
        all.extend(nonbatched_args);
        return module.call(&Tree::Seq(all));
    }

    let output_subbatch_dim = output_subbatch_dim.unwrap_or(input_subbatch_dim);

    let nonbatched_specs: Vec<Tree<A::Spec>> = nonbatched_args
        .iter()
        .map(|tree| tree.map(|leaf| leaf.spec()))
        .collect();
    let run_module = WithCaptured {
        module,
        captured: &nonbatched_args,
        captured_specs: &nonbatched_specs,
    };

    let options = ApplyOptions {
        shard_size: Some(subbatch_size),
        in_axes: AxisSpec::Uniform(input_subbatch_dim),
        out_axes: AxisSpec::Uniform(output_subbatch_dim),
        new_out_axes: false,
    };
    let sharded = sharded_apply(run_module, &options)?;
    sharded.call(&Tree::Seq(batched_args))
}

/// Adapter appending the non-batched argument group to each shard's batched
/// slice before delegating to the module. Spec trees for the captured group
/// are precomputed so the probe stays metadata-only.
struct WithCaptured<'a, F, A: Batchable> {
    module: &'a F,
    captured: &'a [Tree<A>],
    captured_specs: &'a [Tree<A::Spec>],
}

impl<'a, F, A> ShardFn<A> for WithCaptured<'a, F, A>
where
    A: Batchable,
    F: ShardFn<A>,
{
    fn call(&self, args: &Tree<A>) -> Result<Tree<A>> {
        let mut all = match args {
            Tree::Seq(items) => items.clone(),
            other => vec![other.clone()],
        };
        all.extend(self.captured.iter().cloned());
        self.module.call(&Tree::Seq(all))
    }

    fn eval_shape(&self, args: &Tree<A::Spec>) -> Result<Tree<A::Spec>> {
        let mut all = match args {
            Tree::Seq(items) => items.clone(),
            other => vec![other.clone()],
        };
        all.extend(self.captured_specs.iter().cloned());
        self.module.eval_shape(&Tree::Seq(all))
    }
}

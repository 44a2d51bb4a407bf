//! Sharded vmap: vectorize, then shard.

use crate::apply::{sharded_apply, ApplyOptions, Sharded};
use crate::array::{Batchable, ShardFn, Vectorize};
use crate::tree::Tree;
use crate::{Result, ShardError};

/// Execution mode threaded explicitly through the entry points that bypass
/// sharding during one-time setup.
///
/// `Init` guarantees initialization behavior independent of the configured
/// shard size: setup runs against the plain vectorized function, trading a
/// possibly higher one-off memory cost for cross-run determinism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Init,
    Run,
}

/// Result of [`sharded_map`]: either the bare vectorized function (init
/// mode) or its sharded composition.
pub enum ShardedMap<G> {
    Direct(G),
    Sharded(Sharded<G>),
}

impl<G> ShardedMap<G> {
    pub fn call<A>(&self, args: &Tree<A>) -> Result<Tree<A>>
    where
        A: Batchable,
        G: ShardFn<A>,
    {
        match self {
            ShardedMap::Direct(g) => g.call(args),
            ShardedMap::Sharded(s) => s.call(args),
        }
    }

    pub fn is_sharded(&self) -> bool {
        matches!(self, ShardedMap::Sharded(_))
    }
}

/// Map `fun` over the batch axes in shards of `options.shard_size`: lift it
/// to a full-batch vectorized form via [`Vectorize`], then run that form
/// through the shard executor. A smooth trade-off between memory (as in a
/// plain map) and throughput (as in a full vmap).
///
/// In [`Mode::Init`] the executor is skipped and the vectorized form is
/// returned directly.
pub fn sharded_map<F: Vectorize>(
    fun: &F,
    options: &ApplyOptions,
    mode: Mode,
) -> Result<ShardedMap<F::Vectorized>> {
    if options.new_out_axes {
        return Err(ShardError::NewOutAxesUnsupported);
    }
    let vectorized = fun.vectorize(&options.in_axes, &options.out_axes);
    match mode {
        Mode::Init => Ok(ShardedMap::Direct(vectorized)),
        Mode::Run => Ok(ShardedMap::Sharded(sharded_apply(vectorized, options)?)),
    }
}

use std::collections::BTreeMap;

use crate::tree::{structure_mismatch, Tree};
use crate::Result;

/// Per-leaf axis tag: either the axis an argument is sliced along, or a
/// marker that the argument is not batched and is passed whole to every
/// shard. An explicit variant, so there is no sentinel object to compare by
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Mapped(usize),
    Broadcast,
}

impl Axis {
    pub fn is_mapped(&self) -> bool {
        matches!(self, Axis::Mapped(_))
    }
}

/// Axis specification for a whole argument (or output) tree.
///
/// `Uniform(k)` maps axis `k` on every leaf. `PerLeaf` carries a tree of
/// [`Axis`] tags; the tree may stop early with a `Leaf` at an interior
/// position, in which case that tag applies to every leaf of the matching
/// argument subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSpec {
    Uniform(usize),
    PerLeaf(Tree<Axis>),
}

impl Default for AxisSpec {
    fn default() -> Self {
        AxisSpec::Uniform(0)
    }
}

impl From<usize> for AxisSpec {
    fn from(axis: usize) -> Self {
        AxisSpec::Uniform(axis)
    }
}

/// Expand a possibly-partial axis specification into one [`Axis`] per leaf of
/// `values`. A structural mismatch between a `PerLeaf` spec and the value
/// tree is a caller contract violation and is reported, never truncated.
pub fn expand_axes<A>(spec: &AxisSpec, values: &Tree<A>) -> Result<Tree<Axis>> {
    match spec {
        AxisSpec::Uniform(axis) => Ok(values.map(|_| Axis::Mapped(*axis))),
        AxisSpec::PerLeaf(tree) => align(tree, values),
    }
}

fn align<A>(spec: &Tree<Axis>, values: &Tree<A>) -> Result<Tree<Axis>> {
    match (spec, values) {
        // A leaf spec covers the whole matching subtree.
        (Tree::Leaf(axis), _) => Ok(values.map(|_| *axis)),
        (Tree::Seq(specs), Tree::Seq(subtrees)) if specs.len() == subtrees.len() => {
            let items: Result<Vec<_>> = specs
                .iter()
                .zip(subtrees)
                .map(|(s, v)| align(s, v))
                .collect();
            Ok(Tree::Seq(items?))
        }
        (Tree::Record(specs), Tree::Record(subtrees))
            if specs.len() == subtrees.len() && specs.keys().eq(subtrees.keys()) =>
        {
            let mut items = BTreeMap::new();
            for (key, s) in specs {
                items.insert(key.clone(), align(s, &subtrees[key])?);
            }
            Ok(Tree::Record(items))
        }
        (s, v) => Err(structure_mismatch(s, v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShardError;

    fn args() -> Tree<&'static str> {
        Tree::seq(vec![
            Tree::leaf("x"),
            Tree::seq(vec![Tree::leaf("y"), Tree::leaf("z")]),
        ])
    }

    #[test]
    fn test_uniform_expansion() {
        let axes = expand_axes(&AxisSpec::Uniform(1), &args()).unwrap();
        assert!(axes.structure_eq(&args()));
        assert!(axes.leaves().iter().all(|a| **a == Axis::Mapped(1)));
    }

    #[test]
    fn test_per_leaf_with_broadcast() {
        let spec = AxisSpec::PerLeaf(Tree::seq(vec![
            Tree::leaf(Axis::Mapped(0)),
            Tree::seq(vec![Tree::leaf(Axis::Broadcast), Tree::leaf(Axis::Mapped(2))]),
        ]));
        let axes = expand_axes(&spec, &args()).unwrap();
        let tags: Vec<Axis> = axes.leaves().into_iter().copied().collect();
        assert_eq!(tags, vec![Axis::Mapped(0), Axis::Broadcast, Axis::Mapped(2)]);
    }

    #[test]
    fn test_prefix_spec_covers_subtree() {
        // A leaf at an interior position applies to the whole subtree.
        let spec = AxisSpec::PerLeaf(Tree::seq(vec![
            Tree::leaf(Axis::Broadcast),
            Tree::leaf(Axis::Mapped(0)),
        ]));
        let axes = expand_axes(&spec, &args()).unwrap();
        let tags: Vec<Axis> = axes.leaves().into_iter().copied().collect();
        assert_eq!(tags, vec![Axis::Broadcast, Axis::Mapped(0), Axis::Mapped(0)]);
    }

    #[test]
    fn test_misaligned_spec_is_error() {
        let spec = AxisSpec::PerLeaf(Tree::seq(vec![Tree::leaf(Axis::Mapped(0))]));
        let err = expand_axes(&spec, &args()).unwrap_err();
        assert!(matches!(err, ShardError::StructureMismatch { .. }));
    }
}

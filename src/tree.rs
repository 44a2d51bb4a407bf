use std::collections::BTreeMap;

use crate::{Result, ShardError};

/// An arbitrarily nested structure of array-valued leaves.
///
/// Arguments, outputs, shape specs and axis tags all travel as trees built
/// from the same structural template, so any two of them can be walked
/// leaf-by-leaf with [`Tree::try_zip_with`]. Records use a `BTreeMap` so leaf
/// order is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tree<A> {
    Leaf(A),
    Seq(Vec<Tree<A>>),
    Record(BTreeMap<String, Tree<A>>),
}

impl<A> Tree<A> {
    pub fn leaf(value: A) -> Self {
        Tree::Leaf(value)
    }

    pub fn seq(items: Vec<Tree<A>>) -> Self {
        Tree::Seq(items)
    }

    pub fn record<I: IntoIterator<Item = (String, Tree<A>)>>(entries: I) -> Self {
        Tree::Record(entries.into_iter().collect())
    }

    /// Number of leaves in the tree.
    pub fn num_leaves(&self) -> usize {
        match self {
            Tree::Leaf(_) => 1,
            Tree::Seq(items) => items.iter().map(Tree::num_leaves).sum(),
            Tree::Record(entries) => entries.values().map(Tree::num_leaves).sum(),
        }
    }

    /// All leaves in deterministic traversal order.
    pub fn leaves(&self) -> Vec<&A> {
        let mut out = Vec::with_capacity(self.num_leaves());
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a A>) {
        match self {
            Tree::Leaf(value) => out.push(value),
            Tree::Seq(items) => {
                for item in items {
                    item.collect_leaves(out);
                }
            }
            Tree::Record(entries) => {
                for item in entries.values() {
                    item.collect_leaves(out);
                }
            }
        }
    }

    /// Apply `f` to every leaf, preserving structure.
    pub fn map<B, F: FnMut(&A) -> B>(&self, mut f: F) -> Tree<B> {
        self.map_inner(&mut f)
    }

    fn map_inner<B, F: FnMut(&A) -> B>(&self, f: &mut F) -> Tree<B> {
        match self {
            Tree::Leaf(value) => Tree::Leaf(f(value)),
            Tree::Seq(items) => Tree::Seq(items.iter().map(|t| t.map_inner(f)).collect()),
            Tree::Record(entries) => Tree::Record(
                entries
                    .iter()
                    .map(|(k, t)| (k.clone(), t.map_inner(f)))
                    .collect(),
            ),
        }
    }

    /// Fallible [`Tree::map`].
    pub fn try_map<B, F: FnMut(&A) -> Result<B>>(&self, mut f: F) -> Result<Tree<B>> {
        self.try_map_inner(&mut f)
    }

    fn try_map_inner<B, F: FnMut(&A) -> Result<B>>(&self, f: &mut F) -> Result<Tree<B>> {
        match self {
            Tree::Leaf(value) => Ok(Tree::Leaf(f(value)?)),
            Tree::Seq(items) => {
                let mapped: Result<Vec<_>> = items.iter().map(|t| t.try_map_inner(f)).collect();
                Ok(Tree::Seq(mapped?))
            }
            Tree::Record(entries) => {
                let mut mapped = BTreeMap::new();
                for (k, t) in entries {
                    mapped.insert(k.clone(), t.try_map_inner(f)?);
                }
                Ok(Tree::Record(mapped))
            }
        }
    }

    /// Zip two trees leaf-by-leaf. The structures must align exactly;
    /// a mismatch is an error, never a truncation.
    pub fn try_zip_with<B, C, F>(&self, other: &Tree<B>, mut f: F) -> Result<Tree<C>>
    where
        F: FnMut(&A, &B) -> Result<C>,
    {
        self.try_zip_inner(other, &mut f)
    }

    fn try_zip_inner<B, C, F>(&self, other: &Tree<B>, f: &mut F) -> Result<Tree<C>>
    where
        F: FnMut(&A, &B) -> Result<C>,
    {
        match (self, other) {
            (Tree::Leaf(a), Tree::Leaf(b)) => Ok(Tree::Leaf(f(a, b)?)),
            (Tree::Seq(xs), Tree::Seq(ys)) if xs.len() == ys.len() => {
                let zipped: Result<Vec<_>> = xs
                    .iter()
                    .zip(ys)
                    .map(|(x, y)| x.try_zip_inner(y, f))
                    .collect();
                Ok(Tree::Seq(zipped?))
            }
            (Tree::Record(xs), Tree::Record(ys)) if same_keys(xs, ys) => {
                let mut zipped = BTreeMap::new();
                for (k, x) in xs {
                    zipped.insert(k.clone(), x.try_zip_inner(&ys[k], f)?);
                }
                Ok(Tree::Record(zipped))
            }
            (a, b) => Err(structure_mismatch(a, b)),
        }
    }

    /// Three-way zip, used when an axis tree rides along two value trees.
    pub fn try_zip3_with<B, C, D, F>(
        &self,
        second: &Tree<B>,
        third: &Tree<C>,
        mut f: F,
    ) -> Result<Tree<D>>
    where
        F: FnMut(&A, &B, &C) -> Result<D>,
    {
        self.try_zip3_inner(second, third, &mut f)
    }

    fn try_zip3_inner<B, C, D, F>(
        &self,
        second: &Tree<B>,
        third: &Tree<C>,
        f: &mut F,
    ) -> Result<Tree<D>>
    where
        F: FnMut(&A, &B, &C) -> Result<D>,
    {
        match (self, second, third) {
            (Tree::Leaf(a), Tree::Leaf(b), Tree::Leaf(c)) => Ok(Tree::Leaf(f(a, b, c)?)),
            (Tree::Seq(xs), Tree::Seq(ys), Tree::Seq(zs))
                if xs.len() == ys.len() && xs.len() == zs.len() =>
            {
                let zipped: Result<Vec<_>> = xs
                    .iter()
                    .zip(ys.iter().zip(zs))
                    .map(|(x, (y, z))| x.try_zip3_inner(y, z, f))
                    .collect();
                Ok(Tree::Seq(zipped?))
            }
            (Tree::Record(xs), Tree::Record(ys), Tree::Record(zs))
                if same_keys(xs, ys) && same_keys(xs, zs) =>
            {
                let mut zipped = BTreeMap::new();
                for (k, x) in xs {
                    zipped.insert(k.clone(), x.try_zip3_inner(&ys[k], &zs[k], f)?);
                }
                Ok(Tree::Record(zipped))
            }
            (a, b, _) => Err(structure_mismatch(a, b)),
        }
    }

    /// Visit zipped leaves without building a result tree.
    pub fn try_for_each_zip<B, F>(&self, other: &Tree<B>, mut f: F) -> Result<()>
    where
        F: FnMut(&A, &B) -> Result<()>,
    {
        self.try_zip_inner(other, &mut |a, b| f(a, b)).map(|_| ())
    }

    /// In-place three-way zip: mutate each leaf of `self` from the matching
    /// leaves of `second` and `third`.
    pub fn try_zip2_mut_with<B, C, F>(
        &mut self,
        second: &Tree<B>,
        third: &Tree<C>,
        mut f: F,
    ) -> Result<()>
    where
        F: FnMut(&mut A, &B, &C) -> Result<()>,
    {
        self.try_zip2_mut_inner(second, third, &mut f)
    }

    fn try_zip2_mut_inner<B, C, F>(
        &mut self,
        second: &Tree<B>,
        third: &Tree<C>,
        f: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&mut A, &B, &C) -> Result<()>,
    {
        match (self, second, third) {
            (Tree::Leaf(a), Tree::Leaf(b), Tree::Leaf(c)) => f(a, b, c),
            (Tree::Seq(xs), Tree::Seq(ys), Tree::Seq(zs))
                if xs.len() == ys.len() && xs.len() == zs.len() =>
            {
                for (x, (y, z)) in xs.iter_mut().zip(ys.iter().zip(zs)) {
                    x.try_zip2_mut_inner(y, z, f)?;
                }
                Ok(())
            }
            (Tree::Record(xs), Tree::Record(ys), Tree::Record(zs))
                if same_keys(xs, ys) && same_keys(xs, zs) =>
            {
                for (k, x) in xs.iter_mut() {
                    x.try_zip2_mut_inner(&ys[k], &zs[k], f)?;
                }
                Ok(())
            }
            (a, b, _) => Err(structure_mismatch(&*a, b)),
        }
    }

    /// True when both trees are built from the same structural template.
    pub fn structure_eq<B>(&self, other: &Tree<B>) -> bool {
        match (self, other) {
            (Tree::Leaf(_), Tree::Leaf(_)) => true,
            (Tree::Seq(xs), Tree::Seq(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| x.structure_eq(y))
            }
            (Tree::Record(xs), Tree::Record(ys)) => {
                same_keys(xs, ys) && xs.iter().all(|(k, x)| x.structure_eq(&ys[k]))
            }
            _ => false,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            Tree::Leaf(_) => "leaf".to_string(),
            Tree::Seq(items) => format!("seq[{}]", items.len()),
            Tree::Record(entries) => {
                let keys: Vec<&str> = entries.keys().map(String::as_str).collect();
                format!("record{{{}}}", keys.join(", "))
            }
        }
    }
}

fn same_keys<A, B>(a: &BTreeMap<String, Tree<A>>, b: &BTreeMap<String, Tree<B>>) -> bool {
    a.len() == b.len() && a.keys().zip(b.keys()).all(|(x, y)| x == y)
}

pub(crate) fn structure_mismatch<A, B>(a: &Tree<A>, b: &Tree<B>) -> ShardError {
    ShardError::StructureMismatch {
        left: a.describe(),
        right: b.describe(),
    }
}

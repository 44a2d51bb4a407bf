//! Dense row-major tensor: the bundled reference host.
//!
//! A contiguous `Vec<T>` plus dimensions, with exactly the capabilities the
//! engine needs: axis slicing, disjoint slice writes and zero allocation.
//! Axis operations decompose the buffer into `outer x axis x inner` blocks
//! and move whole `inner`-sized runs at a time.

use num_traits::Zero;

use crate::array::{ArraySpec, Batchable};
use crate::{Result, ShardError};

/// Shape metadata for [`Tensor`]. The element dtype is the type parameter on
/// the tensor itself, so a spec is just the dims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    dims: Vec<usize>,
}

impl TensorSpec {
    pub fn new(dims: Vec<usize>) -> Self {
        TensorSpec { dims }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArraySpec for TensorSpec {
    fn rank(&self) -> usize {
        self.dims.len()
    }

    fn dim(&self, axis: usize) -> usize {
        self.dims[axis]
    }

    fn with_dim(&self, axis: usize, len: usize) -> Self {
        let mut dims = self.dims.clone();
        dims[axis] = len;
        TensorSpec { dims }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    dims: Vec<usize>,
    data: Vec<T>,
}

impl<T: Clone> Tensor<T> {
    pub fn new(dims: Vec<usize>, data: Vec<T>) -> Result<Self> {
        let expected: usize = dims.iter().product();
        if data.len() != expected {
            return Err(ShardError::ShapeMismatch(dims, vec![data.len()]));
        }
        Ok(Tensor { dims, data })
    }

    /// Rank-1 tensor over `data`.
    pub fn from_vec(data: Vec<T>) -> Self {
        Tensor {
            dims: vec![data.len()],
            data,
        }
    }

    /// Build a tensor by evaluating `f` at every index, in row-major order.
    pub fn from_fn<F: FnMut(&[usize]) -> T>(dims: &[usize], mut f: F) -> Self {
        let n: usize = dims.iter().product();
        let mut idx = vec![0usize; dims.len()];
        let mut data = Vec::with_capacity(n);
        for _ in 0..n {
            data.push(f(&idx));
            // Row-major odometer increment.
            for d in (0..dims.len()).rev() {
                idx[d] += 1;
                if idx[d] < dims[d] {
                    break;
                }
                idx[d] = 0;
            }
        }
        Tensor {
            dims: dims.to_vec(),
            data,
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn get(&self, idx: &[usize]) -> &T {
        debug_assert_eq!(idx.len(), self.dims.len());
        let mut offset = 0;
        for (i, d) in idx.iter().zip(&self.dims) {
            debug_assert!(i < d);
            offset = offset * d + i;
        }
        &self.data[offset]
    }

    /// Element-wise map, preserving shape.
    pub fn map<U, F: Fn(&T) -> U>(&self, f: F) -> Tensor<U> {
        Tensor {
            dims: self.dims.clone(),
            data: self.data.iter().map(f).collect(),
        }
    }

    /// `(outer, axis_len, inner)` block decomposition around `axis`.
    fn blocks(&self, axis: usize) -> (usize, usize, usize) {
        let outer: usize = self.dims[..axis].iter().product();
        let inner: usize = self.dims[axis + 1..].iter().product();
        (outer, self.dims[axis], inner)
    }

    fn check_axis(&self, axis: usize) -> Result<()> {
        if axis >= self.dims.len() {
            return Err(ShardError::InvalidAxis {
                axis,
                rank: self.dims.len(),
            });
        }
        Ok(())
    }
}

impl<T: Clone + Zero> Tensor<T> {
    /// Zero-filled tensor of the given dims.
    pub fn zeros_with(dims: &[usize]) -> Self {
        let n: usize = dims.iter().product();
        Tensor {
            dims: dims.to_vec(),
            data: vec![T::zero(); n],
        }
    }
}

impl<T: Clone + Zero> Batchable for Tensor<T> {
    type Spec = TensorSpec;

    fn spec(&self) -> TensorSpec {
        TensorSpec::new(self.dims.clone())
    }

    fn rank(&self) -> usize {
        self.dims.len()
    }

    fn dim(&self, axis: usize) -> usize {
        self.dims[axis]
    }

    fn slice(&self, axis: usize, start: usize, len: usize) -> Result<Self> {
        self.check_axis(axis)?;
        let (outer, axis_len, inner) = self.blocks(axis);
        if start + len > axis_len {
            return Err(ShardError::SliceOutOfBounds {
                start,
                end: start + len,
                len: axis_len,
            });
        }
        let mut data = Vec::with_capacity(outer * len * inner);
        for o in 0..outer {
            let base = o * axis_len * inner + start * inner;
            data.extend_from_slice(&self.data[base..base + len * inner]);
        }
        let mut dims = self.dims.clone();
        dims[axis] = len;
        Ok(Tensor { dims, data })
    }

    fn write_slice(&mut self, axis: usize, start: usize, shard: &Self) -> Result<()> {
        self.check_axis(axis)?;
        if shard.dims.len() != self.dims.len()
            || shard
                .dims
                .iter()
                .enumerate()
                .any(|(d, &n)| d != axis && n != self.dims[d])
        {
            return Err(ShardError::ShapeMismatch(
                self.dims.clone(),
                shard.dims.clone(),
            ));
        }
        let (outer, axis_len, inner) = self.blocks(axis);
        let len = shard.dims[axis];
        if start + len > axis_len {
            return Err(ShardError::SliceOutOfBounds {
                start,
                end: start + len,
                len: axis_len,
            });
        }
        for o in 0..outer {
            let dst = o * axis_len * inner + start * inner;
            let src = o * len * inner;
            self.data[dst..dst + len * inner].clone_from_slice(&shard.data[src..src + len * inner]);
        }
        Ok(())
    }

    fn zeros(spec: &TensorSpec) -> Self {
        Tensor::zeros_with(spec.dims())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arange(dims: &[usize]) -> Tensor<f64> {
        let mut next = 0.0;
        Tensor::from_fn(dims, |_| {
            let v = next;
            next += 1.0;
            v
        })
    }

    #[test]
    fn test_from_fn_row_major() {
        let t = Tensor::from_fn(&[2, 3], |idx| (idx[0] * 10 + idx[1]) as i64);
        assert_eq!(t.data(), &[0, 1, 2, 10, 11, 12]);
        assert_eq!(*t.get(&[1, 2]), 12);
    }

    #[test]
    fn test_slice_leading_axis() {
        let t = arange(&[4, 3]);
        let s = t.slice(0, 1, 2).unwrap();
        assert_eq!(s.dims(), &[2, 3]);
        assert_eq!(s.data(), &[3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_slice_inner_axis() {
        let t = arange(&[2, 4]);
        let s = t.slice(1, 2, 2).unwrap();
        assert_eq!(s.dims(), &[2, 2]);
        assert_eq!(s.data(), &[2.0, 3.0, 6.0, 7.0]);
    }

    #[test]
    fn test_write_slice_inverts_slice() {
        let t = arange(&[5, 2]);
        let mut out = Tensor::<f64>::zeros_with(&[5, 2]);
        for start in [0, 2, 4] {
            let len = (5 - start).min(2);
            let piece = t.slice(0, start, len).unwrap();
            out.write_slice(0, start, &piece).unwrap();
        }
        assert_eq!(out, t);
    }

    #[test]
    fn test_write_slice_middle_axis() {
        let t = arange(&[2, 3, 2]);
        let mut out = Tensor::<f64>::zeros_with(&[2, 3, 2]);
        for start in 0..3 {
            let piece = t.slice(1, start, 1).unwrap();
            out.write_slice(1, start, &piece).unwrap();
        }
        assert_eq!(out, t);
    }

    #[test]
    fn test_slice_out_of_bounds() {
        let t = arange(&[4]);
        assert!(matches!(
            t.slice(0, 3, 2),
            Err(ShardError::SliceOutOfBounds { start: 3, end: 5, len: 4 })
        ));
        assert!(matches!(
            t.slice(1, 0, 1),
            Err(ShardError::InvalidAxis { axis: 1, rank: 1 })
        ));
    }

    #[test]
    fn test_write_slice_shape_check() {
        let mut out = Tensor::<f64>::zeros_with(&[4, 3]);
        let bad = arange(&[2, 2]);
        assert!(matches!(
            out.write_slice(0, 0, &bad),
            Err(ShardError::ShapeMismatch(..))
        ));
    }

    #[test]
    fn test_spec_round_trip() {
        let t = arange(&[3, 2]);
        let spec = t.spec();
        assert_eq!(spec.dims(), &[3, 2]);
        assert_eq!(spec.with_dim(0, 7).dims(), &[7, 2]);
        let z = Tensor::<f64>::zeros(&spec);
        assert_eq!(z.dims(), t.dims());
        assert!(z.data().iter().all(|&x| x == 0.0));
    }
}

//! Index and offset iteration.

use ndengine_traits::Ordering;
use smallvec::SmallVec;

use crate::layout::axes_fastest_first;

type SVec<T> = SmallVec<[T; 8]>;

/// Iterates every multi-index of a shape in row-major or column-major order.
#[derive(Debug, Clone)]
pub struct NdIndexIter {
    shape: SVec<usize>,
    axes: SVec<usize>,
    current: SVec<usize>,
    remaining: usize,
}

impl NdIndexIter {
    pub fn new(shape: &[usize], ordering: Ordering) -> Self {
        Self {
            shape: SmallVec::from_slice(shape),
            axes: axes_fastest_first(shape.len(), ordering).into_iter().collect(),
            current: SmallVec::from_elem(0, shape.len()),
            remaining: shape.iter().product(),
        }
    }
}

impl Iterator for NdIndexIter {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.remaining == 0 {
            return None;
        }
        let out = self.current.to_vec();
        self.remaining -= 1;
        if self.remaining > 0 {
            for &axis in &self.axes {
                self.current[axis] += 1;
                if self.current[axis] < self.shape[axis] {
                    break;
                }
                self.current[axis] = 0;
            }
        }
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for NdIndexIter {}

/// Iterates the buffer offsets of a strided view in a given ordering.
///
/// Offsets are updated incrementally, so each step costs one stride add in the
/// common case.
#[derive(Debug, Clone)]
pub struct OffsetIter {
    shape: SVec<usize>,
    stride: SVec<isize>,
    axes: SVec<usize>,
    index: SVec<usize>,
    current: isize,
    remaining: usize,
}

impl OffsetIter {
    pub fn new(shape: &[usize], stride: &[isize], offset: usize, ordering: Ordering) -> Self {
        Self {
            shape: SmallVec::from_slice(shape),
            stride: SmallVec::from_slice(stride),
            axes: axes_fastest_first(shape.len(), ordering).into_iter().collect(),
            index: SmallVec::from_elem(0, shape.len()),
            current: offset as isize,
            remaining: shape.iter().product(),
        }
    }
}

impl Iterator for OffsetIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let out = self.current as usize;
        self.remaining -= 1;
        if self.remaining > 0 {
            for &axis in &self.axes {
                self.index[axis] += 1;
                self.current += self.stride[axis];
                if self.index[axis] < self.shape[axis] {
                    break;
                }
                self.current -= self.stride[axis] * self.shape[axis] as isize;
                self.index[axis] = 0;
            }
        }
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for OffsetIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_iter_orders() {
        let rm: Vec<Vec<usize>> = NdIndexIter::new(&[2, 2], Ordering::RowMajor).collect();
        assert_eq!(rm, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
        let cm: Vec<Vec<usize>> = NdIndexIter::new(&[2, 2], Ordering::ColumnMajor).collect();
        assert_eq!(cm, vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]]);
    }

    #[test]
    fn test_index_iter_degenerate() {
        assert_eq!(NdIndexIter::new(&[], Ordering::RowMajor).count(), 1);
        assert_eq!(NdIndexIter::new(&[3, 0], Ordering::RowMajor).count(), 0);
    }

    #[test]
    fn test_offset_iter_transposed() {
        // [3, 2] view of a row-major [2, 3] block.
        let offsets: Vec<usize> = OffsetIter::new(&[3, 2], &[1, 3], 0, Ordering::RowMajor).collect();
        assert_eq!(offsets, vec![0, 3, 1, 4, 2, 5]);
        let offsets: Vec<usize> = OffsetIter::new(&[2], &[4], 1, Ordering::RowMajor).collect();
        assert_eq!(offsets, vec![1, 5]);
    }
}

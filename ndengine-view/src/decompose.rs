//! Derived views: reshape, linear view, tensor-along-dimension, rows and columns.

use ndengine_traits::Ordering;

use crate::layout::{attempt_nocopy_reshape, strides_for, unravel};
use crate::view::NdArray;
use crate::{Result, ViewError};

/// A derived array that either aliases its parent or is an explicit copy.
#[derive(Debug, Clone)]
pub enum Derived {
    /// Shares the parent's buffer; writes are visible through both.
    View(NdArray),
    /// Fresh buffer; the parent could not be expressed as a strided slice.
    Copy(NdArray),
}

impl Derived {
    pub fn is_copy(&self) -> bool {
        matches!(self, Derived::Copy(_))
    }

    pub fn as_array(&self) -> &NdArray {
        match self {
            Derived::View(a) | Derived::Copy(a) => a,
        }
    }

    pub fn into_array(self) -> NdArray {
        match self {
            Derived::View(a) | Derived::Copy(a) => a,
        }
    }
}

/// Sorts `dims`, rejecting duplicates and axes `>= rank`.
pub(crate) fn normalize_dims(dims: &[usize], rank: usize) -> Result<Vec<usize>> {
    let mut sorted = dims.to_vec();
    sorted.sort_unstable();
    for w in sorted.windows(2) {
        if w[0] == w[1] {
            return Err(ViewError::DuplicateAxis(w[0]));
        }
    }
    if let Some(&axis) = sorted.iter().find(|&&a| a >= rank) {
        return Err(ViewError::InvalidAxis { axis, rank });
    }
    Ok(sorted)
}

/// `shape` with `dims` removed: the output shape of a reduction along `dims`.
pub fn reduced_shape(shape: &[usize], dims: &[usize]) -> Result<Vec<usize>> {
    let dims = normalize_dims(dims, shape.len())?;
    Ok(complement(shape.len(), &dims)
        .into_iter()
        .map(|a| shape[a])
        .collect())
}

/// Axes in `0..rank` not in sorted `dims`.
fn complement(rank: usize, dims: &[usize]) -> Vec<usize> {
    (0..rank).filter(|a| dims.binary_search(a).is_err()).collect()
}

/// Whether `arrays` can be walked together as flat runs with one stride each.
///
/// Every array needs an element-wise stride, the same shape, and the same
/// ordering unless it is effectively one-dimensional.
pub fn can_do_directly(arrays: &[&NdArray]) -> bool {
    let Some(first) = arrays.first() else {
        return true;
    };
    arrays.iter().all(|a| {
        a.element_wise_stride().is_some()
            && a.shape() == first.shape()
            && (a.ordering() == first.ordering() || effectively_vector(a))
    })
}

fn effectively_vector(a: &NdArray) -> bool {
    a.shape().iter().filter(|&&d| d != 1).count() <= 1
}

impl NdArray {
    /// Reshape to `shape` (same element count) in this view's ordering.
    ///
    /// Returns a view when the new shape is expressible with strides over the
    /// same buffer, otherwise a compacted copy.
    pub fn reshape(&self, shape: &[usize]) -> Result<Derived> {
        let len: usize = shape.iter().product();
        if len != self.len() {
            return Err(ViewError::InvalidReshape {
                from: self.shape.to_vec(),
                to: shape.to_vec(),
            });
        }
        if shape == &*self.shape {
            return Ok(Derived::View(self.clone()));
        }
        if let Some(stride) = attempt_nocopy_reshape(&self.shape, &self.stride, shape, self.ordering) {
            return Ok(Derived::View(self.derive(shape.to_vec(), stride, self.offset)));
        }
        tracing::debug!(
            from = ?self.shape,
            to = ?shape,
            "reshape not expressible as strides, copying"
        );
        let compact = self.dup()?;
        let stride = strides_for(shape, self.ordering);
        Ok(Derived::Copy(compact.derive(shape.to_vec(), stride, 0)))
    }

    /// Reshape where at most one extent is `None` and inferred from the rest.
    pub fn reshape_infer(&self, shape: &[Option<usize>]) -> Result<Derived> {
        let invalid = || ViewError::InvalidReshape {
            from: self.shape.to_vec(),
            to: shape.iter().map(|d| d.unwrap_or(0)).collect(),
        };
        let unknown = shape.iter().filter(|d| d.is_none()).count();
        if unknown > 1 {
            return Err(invalid());
        }
        let known: usize = shape.iter().flatten().product();
        let resolved: Vec<usize> = if unknown == 1 {
            if known == 0 || self.len() % known != 0 {
                return Err(invalid());
            }
            let inferred = self.len() / known;
            shape.iter().map(|d| d.unwrap_or(inferred)).collect()
        } else {
            shape.iter().flatten().copied().collect()
        };
        self.reshape(&resolved)
    }

    /// Rank-1 reinterpretation of every element in this view's ordering.
    ///
    /// Zero-copy when the view has an element-wise stride; otherwise the
    /// elements are flattened into a new buffer.
    pub fn linear_view(&self) -> Result<Derived> {
        let len = self.len();
        if let Some(ews) = self.ews {
            return Ok(Derived::View(self.derive(vec![len], vec![ews], self.offset)));
        }
        tracing::debug!(shape = ?self.shape, stride = ?self.stride, "linear view requires a copy");
        let compact = self.dup()?;
        Ok(Derived::Copy(compact.derive(vec![len], vec![1], 0)))
    }

    /// Number of sub-tensors spanning `dims`: the product of the other extents.
    pub fn tensors_along_dimension(&self, dims: &[usize]) -> Result<usize> {
        let dims = normalize_dims(dims, self.rank())?;
        Ok(complement(self.rank(), &dims)
            .into_iter()
            .map(|a| self.shape[a])
            .product())
    }

    /// The `index`-th sub-tensor spanning axes `dims`.
    ///
    /// `dims` are sorted; the result has shape `shape[dims]`. The remaining
    /// axes are fixed to the row-major unravelling of `index` over their
    /// extents. Always shares the buffer.
    pub fn tensor_along_dimension(&self, index: usize, dims: &[usize]) -> Result<NdArray> {
        let dims = normalize_dims(dims, self.rank())?;
        let rest = complement(self.rank(), &dims);
        let rest_shape: Vec<usize> = rest.iter().map(|&a| self.shape[a]).collect();
        let count: usize = rest_shape.iter().product();
        if index >= count {
            return Err(ViewError::TensorIndexOutOfRange { index, count });
        }

        let mut fixed = vec![0usize; rest.len()];
        unravel(index, &rest_shape, Ordering::RowMajor, &mut fixed);
        let mut offset = self.offset as isize;
        for (&axis, &i) in rest.iter().zip(&fixed) {
            offset += i as isize * self.stride[axis];
        }

        let shape = dims.iter().map(|&a| self.shape[a]).collect();
        let stride = dims.iter().map(|&a| self.stride[a]).collect();
        Ok(self.derive(shape, stride, offset as usize))
    }

    pub fn vector_along_dimension(&self, index: usize, dim: usize) -> Result<NdArray> {
        self.tensor_along_dimension(index, &[dim])
    }

    /// Row `i` of a matrix (rank 1 arrays are their own single row).
    pub fn get_row(&self, i: usize) -> Result<NdArray> {
        match self.rank() {
            1 if i == 0 => Ok(self.clone()),
            1 => Err(ViewError::TensorIndexOutOfRange { index: i, count: 1 }),
            2 => self.tensor_along_dimension(i, &[1]),
            r => Err(ViewError::RankMismatch(r, 2)),
        }
    }

    /// Column `j` of a matrix.
    pub fn get_column(&self, j: usize) -> Result<NdArray> {
        match self.rank() {
            1 => self.tensor_along_dimension(j, &[]),
            2 => self.tensor_along_dimension(j, &[0]),
            r => Err(ViewError::RankMismatch(r, 2)),
        }
    }

    /// Parent multi-index of element `element` (in this view's ordering) of
    /// sub-tensor `index` along `dims`.
    pub fn tad_parent_index(&self, index: usize, dims: &[usize], element: usize) -> Result<Vec<usize>> {
        let dims = normalize_dims(dims, self.rank())?;
        let rest = complement(self.rank(), &dims);
        let rest_shape: Vec<usize> = rest.iter().map(|&a| self.shape[a]).collect();
        let count: usize = rest_shape.iter().product();
        if index >= count {
            return Err(ViewError::TensorIndexOutOfRange { index, count });
        }
        let tad_shape: Vec<usize> = dims.iter().map(|&a| self.shape[a]).collect();
        let tad_len: usize = tad_shape.iter().product();
        if element >= tad_len {
            return Err(ViewError::IndexOutOfBounds {
                index: vec![element],
                shape: vec![tad_len],
            });
        }

        let mut fixed = vec![0usize; rest.len()];
        unravel(index, &rest_shape, Ordering::RowMajor, &mut fixed);
        let mut inner = vec![0usize; dims.len()];
        unravel(element, &tad_shape, self.ordering, &mut inner);

        let mut out = vec![0usize; self.rank()];
        for (&axis, &i) in rest.iter().zip(&fixed) {
            out[axis] = i;
        }
        for (&axis, &i) in dims.iter().zip(&inner) {
            out[axis] = i;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arange(shape: &[usize], ordering: Ordering) -> NdArray {
        let len: usize = shape.iter().product();
        NdArray::from_vec((0..len).map(|i| i as f64).collect(), shape, ordering).unwrap()
    }

    #[test]
    fn test_reshape_view_aliases() {
        let a = arange(&[2, 6], Ordering::RowMajor);
        let r = a.reshape(&[3, 4]).unwrap();
        assert!(!r.is_copy());
        let r = r.into_array();
        assert_eq!(r.get_double(&[1, 0]).unwrap(), 4.0);
        r.put(&[2, 3], -1.0f64).unwrap();
        assert_eq!(a.get_double(&[1, 5]).unwrap(), -1.0);
    }

    #[test]
    fn test_reshape_copy_fallback() {
        let a = arange(&[2, 3], Ordering::RowMajor);
        let t = a.transpose();
        let r = t.reshape(&[6]).unwrap();
        assert!(r.is_copy());
        assert_eq!(
            r.as_array().to_vec::<f64>().unwrap(),
            vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]
        );
        assert!(matches!(
            a.reshape(&[4]),
            Err(ViewError::InvalidReshape { .. })
        ));
    }

    #[test]
    fn test_reshape_infer() {
        let a = arange(&[2, 6], Ordering::RowMajor);
        let r = a.reshape_infer(&[Some(4), None]).unwrap().into_array();
        assert_eq!(r.shape(), &[4, 3]);
        assert!(a.reshape_infer(&[None, None]).is_err());
        assert!(a.reshape_infer(&[Some(5), None]).is_err());
    }

    #[test]
    fn test_linear_view() {
        let a = arange(&[2, 2], Ordering::RowMajor);
        let lin = a.linear_view().unwrap();
        assert!(!lin.is_copy());
        lin.as_array().put_linear(3, 7.0f64).unwrap();
        assert_eq!(a.get_double(&[1, 1]).unwrap(), 7.0);

        let lin_t = a.transpose().linear_view().unwrap();
        assert!(lin_t.is_copy());
        assert_eq!(lin_t.as_array().to_vec::<f64>().unwrap(), vec![0.0, 2.0, 1.0, 7.0]);
    }

    #[test]
    fn test_tad_slices() {
        let a = arange(&[3, 2, 4], Ordering::RowMajor);
        // Dims are sorted, so [1, 0] spans axes 0 and 1.
        let t = a.tensor_along_dimension(0, &[1, 0]).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.to_vec::<f64>().unwrap(), vec![0.0, 4.0, 8.0, 12.0, 16.0, 20.0]);
        let t = a.tensor_along_dimension(3, &[0, 1]).unwrap();
        assert_eq!(t.get_double(&[0, 0]).unwrap(), 3.0);

        assert_eq!(a.tensors_along_dimension(&[2]).unwrap(), 6);
        let v = a.tensor_along_dimension(5, &[2]).unwrap();
        assert_eq!(v.to_vec::<f64>().unwrap(), vec![20.0, 21.0, 22.0, 23.0]);
        assert!(matches!(
            a.tensor_along_dimension(6, &[2]),
            Err(ViewError::TensorIndexOutOfRange { index: 6, count: 6 })
        ));
        assert!(matches!(
            a.tensor_along_dimension(0, &[1, 1]),
            Err(ViewError::DuplicateAxis(1))
        ));
    }

    #[test]
    fn test_rows_and_columns() {
        let a = arange(&[2, 3], Ordering::RowMajor);
        assert_eq!(a.get_row(1).unwrap().to_vec::<f64>().unwrap(), vec![3.0, 4.0, 5.0]);
        let col = a.get_column(2).unwrap();
        assert_eq!(col.to_vec::<f64>().unwrap(), vec![2.0, 5.0]);
        assert_eq!(col.element_wise_stride(), Some(3));

        let f = arange(&[2, 3], Ordering::ColumnMajor);
        assert_eq!(f.get_row(1).unwrap().to_vec::<f64>().unwrap(), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_tad_parent_index() {
        let a = arange(&[2, 3, 4], Ordering::RowMajor);
        let parent = a.tad_parent_index(4, &[1], 2).unwrap();
        assert_eq!(parent, vec![1, 2, 0]);
        let t = a.tensor_along_dimension(4, &[1]).unwrap();
        assert_eq!(
            t.get_linear::<f64>(2).unwrap(),
            a.get_double(&parent).unwrap()
        );
    }

    #[test]
    fn test_reduced_shape_and_direct() {
        assert_eq!(reduced_shape(&[2, 3, 4], &[1]).unwrap(), vec![2, 4]);
        assert_eq!(reduced_shape(&[2, 3], &[0, 1]).unwrap(), Vec::<usize>::new());

        let a = arange(&[2, 3], Ordering::RowMajor);
        let b = arange(&[2, 3], Ordering::RowMajor);
        assert!(can_do_directly(&[&a, &b]));
        assert!(!can_do_directly(&[&a, &a.transpose()]));
        let f = arange(&[2, 3], Ordering::ColumnMajor);
        assert!(!can_do_directly(&[&a, &f]));
        let col = a.get_column(0).unwrap();
        let row = a.get_row(0).unwrap().get_column(0).unwrap();
        assert!(can_do_directly(&[&col, &col]));
        assert_eq!(row.len(), 1);
    }
}

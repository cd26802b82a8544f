//! The `NdArray` strided view.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use ndengine_buffer::{AllocationMode, DataBuffer};
use ndengine_traits::{DataType, Element, Ordering};

use crate::iter::OffsetIter;
use crate::layout::{element_wise_stride, ravel, strides_for, unravel, validate_bounds};
use crate::{Result, ViewError};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

/// Shape, stride, offset and ordering over a shared [`DataBuffer`].
///
/// Many views may alias one buffer; mutations through any of them are visible
/// through all. Each view registers itself with the buffer's referencing set
/// on creation and deregisters on drop.
///
/// Linear positions (`get_linear`, `to_vec`, `linear_view`) follow the view's
/// own ordering.
pub struct NdArray {
    pub(crate) id: u64,
    pub(crate) buffer: Arc<DataBuffer>,
    pub(crate) shape: Arc<[usize]>,
    pub(crate) stride: Arc<[isize]>,
    pub(crate) offset: usize,
    pub(crate) ordering: Ordering,
    pub(crate) ews: Option<isize>,
}

impl NdArray {
    /// View `buffer` with explicit strides. Every reachable element must lie
    /// inside the buffer.
    pub fn new(
        buffer: Arc<DataBuffer>,
        shape: &[usize],
        stride: &[isize],
        offset: usize,
        ordering: Ordering,
    ) -> Result<Self> {
        validate_bounds(buffer.len(), shape, stride, offset)?;
        Ok(Self::from_parts(buffer, shape.into(), stride.into(), offset, ordering))
    }

    pub(crate) fn from_parts(
        buffer: Arc<DataBuffer>,
        shape: Arc<[usize]>,
        stride: Arc<[isize]>,
        offset: usize,
        ordering: Ordering,
    ) -> Self {
        let id = NEXT_VIEW_ID.fetch_add(1, AtomicOrdering::Relaxed);
        buffer.add_referencing(id);
        let ews = element_wise_stride(&shape, &stride, ordering);
        Self {
            id,
            buffer,
            shape,
            stride,
            offset,
            ordering,
            ews,
        }
    }

    /// Dense view over the start of `buffer` with strides for `ordering`.
    pub fn from_buffer(buffer: Arc<DataBuffer>, shape: &[usize], ordering: Ordering) -> Result<Self> {
        let len: usize = shape.iter().product();
        if len > buffer.len() {
            return Err(ViewError::LengthMismatch {
                expected: len,
                actual: buffer.len(),
            });
        }
        let stride = strides_for(shape, ordering);
        Self::new(buffer, shape, &stride, 0, ordering)
    }

    /// Zero-filled array.
    pub fn create(shape: &[usize], dtype: DataType, ordering: Ordering, mode: AllocationMode) -> Self {
        let len: usize = shape.iter().product();
        let buffer = Arc::new(DataBuffer::new(len, dtype, mode));
        let stride = strides_for(shape, ordering);
        Self::from_parts(buffer, shape.into(), stride.into(), 0, ordering)
    }

    /// Heap array over `data`, laid out in `ordering`.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: &[usize], ordering: Ordering) -> Result<Self> {
        let len: usize = shape.iter().product();
        if len != data.len() {
            return Err(ViewError::LengthMismatch {
                expected: len,
                actual: data.len(),
            });
        }
        let buffer = Arc::new(DataBuffer::from_vec(data, AllocationMode::Heap));
        Self::from_buffer(buffer, shape, ordering)
    }

    /// Rank-0 array holding `value`.
    pub fn scalar<T: Element>(value: T) -> Self {
        let buffer = Arc::new(DataBuffer::from_vec(vec![value], AllocationMode::Heap));
        Self::from_parts(buffer, Arc::from(Vec::new()), Arc::from(Vec::new()), 0, Ordering::RowMajor)
    }

    /// A new view sharing this buffer.
    pub(crate) fn derive(&self, shape: Vec<usize>, stride: Vec<isize>, offset: usize) -> Self {
        Self::from_parts(
            Arc::clone(&self.buffer),
            shape.into(),
            stride.into(),
            offset,
            self.ordering,
        )
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn buffer(&self) -> &Arc<DataBuffer> {
        &self.buffer
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn stride(&self) -> &[isize] {
        &self.stride
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn ordering(&self) -> Ordering {
        self.ordering
    }

    #[inline]
    pub fn dtype(&self) -> DataType {
        self.buffer.dtype()
    }

    /// Stride that walks the whole view as one run, or `None`.
    #[inline]
    pub fn element_wise_stride(&self) -> Option<isize> {
        self.ews
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size(&self, axis: usize) -> Result<usize> {
        self.shape.get(axis).copied().ok_or(ViewError::InvalidAxis {
            axis,
            rank: self.rank(),
        })
    }

    pub fn rows(&self) -> usize {
        match self.rank() {
            0 | 1 => 1,
            _ => self.shape[0],
        }
    }

    pub fn columns(&self) -> usize {
        match self.rank() {
            0 => 1,
            1 => self.shape[0],
            _ => self.shape[1],
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.len() == 1
    }

    /// Rank 1, or rank 2 with a single row or column.
    pub fn is_vector(&self) -> bool {
        match self.rank() {
            1 => true,
            2 => self.shape[0] == 1 || self.shape[1] == 1,
            _ => false,
        }
    }

    pub fn is_row_vector(&self) -> bool {
        self.rank() == 1 || (self.rank() == 2 && self.shape[0] == 1)
    }

    pub fn is_column_vector(&self) -> bool {
        self.rank() == 2 && self.shape[1] == 1
    }

    pub fn is_matrix(&self) -> bool {
        self.rank() == 2
    }

    pub fn is_square(&self) -> bool {
        self.is_matrix() && self.shape[0] == self.shape[1]
    }

    /// Buffer position of a multi-index.
    pub fn offset_of(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.rank() {
            return Err(ViewError::RankMismatch(index.len(), self.rank()));
        }
        let mut pos = self.offset as isize;
        for ((&i, &dim), &s) in index.iter().zip(self.shape.iter()).zip(self.stride.iter()) {
            if i >= dim {
                return Err(ViewError::IndexOutOfBounds {
                    index: index.to_vec(),
                    shape: self.shape.to_vec(),
                });
            }
            pos += i as isize * s;
        }
        Ok(pos as usize)
    }

    /// Buffer position of linear element `i` in this view's ordering.
    pub fn linear_offset(&self, i: usize) -> Result<usize> {
        let len = self.len();
        if i >= len {
            return Err(ViewError::IndexOutOfBounds {
                index: vec![i],
                shape: vec![len],
            });
        }
        if let Some(ews) = self.ews {
            return Ok((self.offset as isize + i as isize * ews) as usize);
        }
        let mut index = vec![0usize; self.rank()];
        unravel(i, &self.shape, self.ordering, &mut index);
        self.offset_of(&index)
    }

    /// Buffer position of the `i`-th element in row-major order, regardless of
    /// this view's ordering.
    pub fn row_major_offset(&self, i: usize) -> Result<usize> {
        if self.ordering == Ordering::RowMajor {
            return self.linear_offset(i);
        }
        let mut index = vec![0usize; self.rank()];
        unravel(i, &self.shape, Ordering::RowMajor, &mut index);
        self.offset_of(&index)
    }

    /// Linear position of a multi-index in this view's ordering.
    pub fn linear_index(&self, index: &[usize]) -> usize {
        ravel(index, &self.shape, self.ordering)
    }

    pub fn get<T: Element>(&self, index: &[usize]) -> Result<T> {
        Ok(self.buffer.get(self.offset_of(index)?)?)
    }

    pub fn put<T: Element>(&self, index: &[usize], value: T) -> Result<()> {
        Ok(self.buffer.put(self.offset_of(index)?, value)?)
    }

    pub fn get_linear<T: Element>(&self, i: usize) -> Result<T> {
        Ok(self.buffer.get(self.linear_offset(i)?)?)
    }

    pub fn put_linear<T: Element>(&self, i: usize, value: T) -> Result<()> {
        Ok(self.buffer.put(self.linear_offset(i)?, value)?)
    }

    pub fn get_double(&self, index: &[usize]) -> Result<f64> {
        self.get(index)
    }

    /// Buffer offsets of every element in this view's ordering.
    pub fn offsets(&self) -> OffsetIter {
        self.offsets_in(self.ordering)
    }

    pub fn offsets_in(&self, ordering: Ordering) -> OffsetIter {
        OffsetIter::new(&self.shape, &self.stride, self.offset, ordering)
    }

    /// Elements in this view's ordering.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let data = self.buffer.reader()?;
        if let Some(ews) = self.ews {
            let base = self.offset as isize;
            return Ok((0..self.len())
                .map(|i| data.read((base + i as isize * ews) as usize))
                .collect());
        }
        Ok(self.offsets().map(|o| data.read(o)).collect())
    }

    /// Deep copy into a fresh compact buffer with the same dtype, allocation
    /// mode and ordering.
    pub fn dup(&self) -> Result<NdArray> {
        let out = NdArray::create(
            &self.shape,
            self.dtype(),
            self.ordering,
            self.buffer.allocation_mode(),
        );
        out.assign(self)?;
        Ok(out)
    }

    /// Copies `other` element-by-index into this view. Shapes must match.
    pub fn assign(&self, other: &NdArray) -> Result<()> {
        if self.shape != other.shape {
            return Err(ViewError::ShapeMismatch(
                self.shape.to_vec(),
                other.shape.to_vec(),
            ));
        }
        // Read before writing: the two views may alias one buffer.
        let values: Vec<f64> = {
            let data = other.buffer.reader()?;
            other.offsets_in(self.ordering).map(|o| data.read::<f64>(o)).collect()
        };
        let mut writer = self.buffer.writer()?;
        for (pos, value) in self.offsets().zip(values) {
            writer.put(pos, value)?;
        }
        Ok(())
    }

    pub fn assign_scalar<T: Element>(&self, value: T) -> Result<()> {
        let mut writer = self.buffer.writer()?;
        for pos in self.offsets() {
            writer.put(pos, value)?;
        }
        Ok(())
    }

    /// Writes `values` in this view's ordering.
    pub fn assign_values<T: Element>(&self, values: &[T]) -> Result<()> {
        if values.len() != self.len() {
            return Err(ViewError::LengthMismatch {
                expected: self.len(),
                actual: values.len(),
            });
        }
        let mut writer = self.buffer.writer()?;
        for (pos, &value) in self.offsets().zip(values) {
            writer.put(pos, value)?;
        }
        Ok(())
    }

    /// Reorders axes. Never copies.
    pub fn permute(&self, axes: &[usize]) -> Result<NdArray> {
        let rank = self.rank();
        if axes.len() != rank {
            return Err(ViewError::RankMismatch(axes.len(), rank));
        }
        let mut seen = vec![false; rank];
        for &a in axes {
            if a >= rank {
                return Err(ViewError::InvalidAxis { axis: a, rank });
            }
            if seen[a] {
                return Err(ViewError::DuplicateAxis(a));
            }
            seen[a] = true;
        }
        let shape = axes.iter().map(|&a| self.shape[a]).collect();
        let stride = axes.iter().map(|&a| self.stride[a]).collect();
        Ok(self.derive(shape, stride, self.offset))
    }

    /// Reverses all axes.
    pub fn transpose(&self) -> NdArray {
        let shape = self.shape.iter().rev().copied().collect();
        let stride = self.stride.iter().rev().copied().collect();
        self.derive(shape, stride, self.offset)
    }

    pub fn swap_axes(&self, a: usize, b: usize) -> Result<NdArray> {
        let rank = self.rank();
        for axis in [a, b] {
            if axis >= rank {
                return Err(ViewError::InvalidAxis { axis, rank });
            }
        }
        let mut axes: Vec<usize> = (0..rank).collect();
        axes.swap(a, b);
        self.permute(&axes)
    }
}

impl Clone for NdArray {
    fn clone(&self) -> Self {
        Self::from_parts(
            Arc::clone(&self.buffer),
            Arc::clone(&self.shape),
            Arc::clone(&self.stride),
            self.offset,
            self.ordering,
        )
    }
}

impl Drop for NdArray {
    fn drop(&mut self) {
        self.buffer.remove_referencing(self.id);
    }
}

impl fmt::Debug for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdArray")
            .field("shape", &self.shape)
            .field("stride", &self.stride)
            .field("offset", &self.offset)
            .field("ordering", &self.ordering)
            .field("buffer", &self.buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arange(shape: &[usize]) -> NdArray {
        let len: usize = shape.iter().product();
        NdArray::from_vec((0..len).map(|i| i as f64).collect(), shape, Ordering::RowMajor).unwrap()
    }

    #[test]
    fn test_from_vec_and_get() {
        let a = arange(&[2, 3]);
        assert_eq!(a.stride(), &[3, 1]);
        assert_eq!(a.get_double(&[1, 2]).unwrap(), 5.0);
        assert_eq!(a.element_wise_stride(), Some(1));
        assert!(matches!(
            a.get::<f64>(&[2, 0]),
            Err(ViewError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(a.get::<f64>(&[0]), Err(ViewError::RankMismatch(1, 2))));
    }

    #[test]
    fn test_column_major_layout() {
        let a = NdArray::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], &[2, 2], Ordering::ColumnMajor).unwrap();
        assert_eq!(a.get_double(&[1, 0]).unwrap(), 2.0);
        assert_eq!(a.get_double(&[0, 1]).unwrap(), 3.0);
        assert_eq!(a.to_vec::<f64>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        let buffer = Arc::new(DataBuffer::new(5, DataType::Double, AllocationMode::Heap));
        assert!(matches!(
            NdArray::new(buffer, &[2, 3], &[3, 1], 0, Ordering::RowMajor),
            Err(ViewError::OffsetOverflow { .. })
        ));
    }

    #[test]
    fn test_permute_shares_buffer() {
        let a = arange(&[2, 3]);
        let t = a.permute(&[1, 0]).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.element_wise_stride(), None);
        t.put(&[2, 1], 50.0f64).unwrap();
        assert_eq!(a.get_double(&[1, 2]).unwrap(), 50.0);
        assert_eq!(t.to_vec::<f64>().unwrap(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 50.0]);
        assert!(matches!(a.permute(&[0, 0]), Err(ViewError::DuplicateAxis(0))));
    }

    #[test]
    fn test_transpose_and_swap() {
        let a = arange(&[2, 3, 4]);
        let t = a.transpose();
        assert_eq!(t.shape(), &[4, 3, 2]);
        let s = a.swap_axes(0, 2).unwrap();
        assert_eq!(s.shape(), t.shape());
        assert_eq!(s.stride(), t.stride());
    }

    #[test]
    fn test_dup_and_assign() {
        let a = arange(&[2, 2]);
        let t = a.transpose();
        let d = t.dup().unwrap();
        assert_eq!(d.element_wise_stride(), Some(1));
        assert_eq!(d.to_vec::<f64>().unwrap(), vec![0.0, 2.0, 1.0, 3.0]);
        d.put(&[0, 0], 9.0f64).unwrap();
        assert_eq!(a.get_double(&[0, 0]).unwrap(), 0.0);

        // In-place transpose of an aliasing view.
        let b = arange(&[2, 2]);
        b.assign(&b.transpose()).unwrap();
        assert_eq!(b.to_vec::<f64>().unwrap(), vec![0.0, 2.0, 1.0, 3.0]);
        assert!(b.assign(&arange(&[4])).is_err());
    }

    #[test]
    fn test_referencing_follows_lifetimes() {
        let a = arange(&[4]);
        let buffer = Arc::clone(a.buffer());
        assert_eq!(buffer.references(), vec![a.id()]);
        let b = a.clone();
        assert_eq!(buffer.references().len(), 2);
        drop(b);
        drop(a);
        assert!(buffer.references().is_empty());
    }

    #[test]
    fn test_scalar_and_predicates() {
        let s = NdArray::scalar(3.5f64);
        assert_eq!(s.rank(), 0);
        assert_eq!(s.len(), 1);
        assert!(s.is_scalar());
        assert_eq!(s.get_double(&[]).unwrap(), 3.5);
        assert_eq!(s.get_linear::<f64>(0).unwrap(), 3.5);

        let row = arange(&[1, 4]);
        assert!(row.is_vector() && row.is_row_vector() && !row.is_column_vector());
        let col = arange(&[4, 1]);
        assert!(col.is_column_vector());
        assert!(arange(&[3, 3]).is_square());
        assert_eq!(arange(&[3, 5]).columns(), 5);
    }

    #[test]
    fn test_empty_axis() {
        let a = NdArray::create(&[3, 0], DataType::Float, Ordering::RowMajor, AllocationMode::Heap);
        assert!(a.is_empty());
        assert!(a.to_vec::<f32>().unwrap().is_empty());
        assert_eq!(a.offsets().count(), 0);
    }
}

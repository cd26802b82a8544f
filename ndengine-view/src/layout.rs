//! Shape and stride arithmetic.
//!
//! Pure functions over `(shape, stride, offset)` triples. Nothing here touches
//! element data.

use ndengine_traits::Ordering;

use crate::{Result, ViewError};

/// Validate that every reachable offset stays within `[0, len)`.
pub fn validate_bounds(len: usize, shape: &[usize], stride: &[isize], offset: usize) -> Result<()> {
    if shape.len() != stride.len() {
        return Err(ViewError::StrideLengthMismatch);
    }
    // Empty view: nothing is reachable.
    if shape.iter().any(|&d| d == 0) {
        return Ok(());
    }
    let overflow = ViewError::OffsetOverflow { len };
    let base = isize::try_from(offset).map_err(|_| ViewError::OffsetOverflow { len })?;
    let mut min_offset = base;
    let mut max_offset = base;
    for (&dim, &s) in shape.iter().zip(stride.iter()) {
        if dim > 1 {
            let end = s
                .checked_mul(dim as isize - 1)
                .ok_or(ViewError::OffsetOverflow { len })?;
            if end >= 0 {
                max_offset = max_offset
                    .checked_add(end)
                    .ok_or(ViewError::OffsetOverflow { len })?;
            } else {
                min_offset = min_offset
                    .checked_add(end)
                    .ok_or(ViewError::OffsetOverflow { len })?;
            }
        }
    }
    if min_offset < 0 || max_offset < 0 || max_offset as usize >= len {
        return Err(overflow);
    }
    Ok(())
}

/// Column-major strides: first index varies fastest.
pub fn col_major_strides(shape: &[usize]) -> Vec<isize> {
    let rank = shape.len();
    if rank == 0 {
        return vec![];
    }
    let mut strides = vec![1isize; rank];
    for i in 1..rank {
        strides[i] = strides[i - 1] * shape[i - 1].max(1) as isize;
    }
    strides
}

/// Row-major strides: last index varies fastest.
pub fn row_major_strides(shape: &[usize]) -> Vec<isize> {
    let rank = shape.len();
    if rank == 0 {
        return vec![];
    }
    let mut strides = vec![1isize; rank];
    for i in (0..rank - 1).rev() {
        strides[i] = strides[i + 1] * shape[i + 1].max(1) as isize;
    }
    strides
}

pub fn strides_for(shape: &[usize], ordering: Ordering) -> Vec<isize> {
    match ordering {
        Ordering::RowMajor => row_major_strides(shape),
        Ordering::ColumnMajor => col_major_strides(shape),
    }
}

/// Axes from fastest- to slowest-varying under `ordering`.
pub fn axes_fastest_first(rank: usize, ordering: Ordering) -> Vec<usize> {
    match ordering {
        Ordering::RowMajor => (0..rank).rev().collect(),
        Ordering::ColumnMajor => (0..rank).collect(),
    }
}

/// The single stride that walks the view in `ordering` as one flat run.
///
/// Linear element `i` then lives at `offset + i * ews`. Size-1 axes are
/// ignored. Returns `None` when no such stride exists.
pub fn element_wise_stride(shape: &[usize], stride: &[isize], ordering: Ordering) -> Option<isize> {
    let len: usize = shape.iter().product();
    if len <= 1 {
        return Some(1);
    }
    let mut ews: Option<isize> = None;
    let mut expected = 0isize;
    for axis in axes_fastest_first(shape.len(), ordering) {
        let dim = shape[axis];
        if dim == 1 {
            continue;
        }
        match ews {
            None => {
                ews = Some(stride[axis]);
                expected = stride[axis] * dim as isize;
            }
            Some(_) => {
                if stride[axis] != expected {
                    return None;
                }
                expected *= dim as isize;
            }
        }
    }
    ews.filter(|&s| s > 0)
}

/// Strides for viewing `(old_shape, old_stride)` as `new_shape` without
/// moving data, if possible.
///
/// Elements are matched in `ordering`. Both shapes must hold the same number
/// of elements.
pub fn attempt_nocopy_reshape(
    old_shape: &[usize],
    old_stride: &[isize],
    new_shape: &[usize],
    ordering: Ordering,
) -> Option<Vec<isize>> {
    let len: usize = old_shape.iter().product();
    if len == 0 {
        return Some(strides_for(new_shape, ordering));
    }
    match ordering {
        Ordering::RowMajor => reshape_row_major(old_shape, old_stride, new_shape),
        Ordering::ColumnMajor => {
            let rev = |v: &[usize]| v.iter().rev().copied().collect::<Vec<_>>();
            let old_stride: Vec<isize> = old_stride.iter().rev().copied().collect();
            let mut strides = reshape_row_major(&rev(old_shape), &old_stride, &rev(new_shape))?;
            strides.reverse();
            Some(strides)
        }
    }
}

fn reshape_row_major(
    old_shape: &[usize],
    old_stride: &[isize],
    new_shape: &[usize],
) -> Option<Vec<isize>> {
    let (old_dims, old_strides): (Vec<usize>, Vec<isize>) = old_shape
        .iter()
        .zip(old_stride)
        .filter(|(&d, _)| d != 1)
        .map(|(&d, &s)| (d, s))
        .unzip();
    let old_nd = old_dims.len();
    let new_nd = new_shape.len();
    let mut new_strides = vec![0isize; new_nd];

    let (mut oi, mut oj) = (0usize, 1usize);
    let (mut ni, mut nj) = (0usize, 1usize);
    while ni < new_nd && oi < old_nd {
        let mut np = new_shape[ni];
        let mut op = old_dims[oi];
        while np != op {
            if np < op {
                np *= *new_shape.get(nj)?;
                nj += 1;
            } else {
                op *= *old_dims.get(oj)?;
                oj += 1;
            }
        }
        for ok in oi..oj - 1 {
            if old_strides[ok] != old_dims[ok + 1] as isize * old_strides[ok + 1] {
                return None;
            }
        }
        new_strides[nj - 1] = old_strides[oj - 1];
        for nk in (ni + 1..nj).rev() {
            new_strides[nk - 1] = new_strides[nk] * new_shape[nk] as isize;
        }
        ni = nj;
        nj += 1;
        oi = oj;
        oj += 1;
    }

    // Trailing size-1 axes.
    let last = if ni >= 1 { new_strides[ni - 1] } else { 1 };
    for s in new_strides.iter_mut().skip(ni) {
        *s = last;
    }
    Some(new_strides)
}

/// Multi-index of linear position `linear` under `ordering`.
pub fn unravel(mut linear: usize, shape: &[usize], ordering: Ordering, out: &mut [usize]) {
    for axis in axes_fastest_first(shape.len(), ordering) {
        let dim = shape[axis].max(1);
        out[axis] = linear % dim;
        linear /= dim;
    }
}

/// Linear position of `index` under `ordering`.
pub fn ravel(index: &[usize], shape: &[usize], ordering: Ordering) -> usize {
    let mut linear = 0usize;
    let mut scale = 1usize;
    for axis in axes_fastest_first(shape.len(), ordering) {
        linear += index[axis] * scale;
        scale *= shape[axis];
    }
    linear
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_col_major_strides() {
        assert_eq!(col_major_strides(&[2, 3, 4]), vec![1, 2, 6]);
    }

    #[test]
    fn test_row_major_strides() {
        assert_eq!(row_major_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(row_major_strides(&[]), Vec::<isize>::new());
    }

    #[test]
    fn test_validate_bounds_ok() {
        assert!(validate_bounds(6, &[2, 3], &[3, 1], 0).is_ok());
        assert!(validate_bounds(0, &[0, 3], &[3, 1], 0).is_ok());
    }

    #[test]
    fn test_validate_bounds_out_of_range() {
        assert!(matches!(
            validate_bounds(5, &[2, 3], &[3, 1], 0),
            Err(ViewError::OffsetOverflow { len: 5 })
        ));
        assert!(matches!(
            validate_bounds(6, &[2], &[3, 1], 0),
            Err(ViewError::StrideLengthMismatch)
        ));
    }

    #[test]
    fn test_element_wise_stride() {
        assert_eq!(element_wise_stride(&[2, 3], &[3, 1], Ordering::RowMajor), Some(1));
        assert_eq!(element_wise_stride(&[2, 3], &[1, 2], Ordering::ColumnMajor), Some(1));
        // Transposed row-major matrix.
        assert_eq!(element_wise_stride(&[3, 2], &[1, 3], Ordering::RowMajor), None);
        // Column of a row-major matrix.
        assert_eq!(element_wise_stride(&[4], &[3], Ordering::RowMajor), Some(3));
        // Size-1 axes are ignored.
        assert_eq!(element_wise_stride(&[1, 4], &[99, 2], Ordering::RowMajor), Some(2));
        assert_eq!(element_wise_stride(&[3], &[0], Ordering::RowMajor), None);
    }

    #[test]
    fn test_nocopy_reshape() {
        assert_eq!(
            attempt_nocopy_reshape(&[2, 6], &[6, 1], &[3, 4], Ordering::RowMajor),
            Some(vec![4, 1])
        );
        assert_eq!(
            attempt_nocopy_reshape(&[2, 6], &[1, 2], &[3, 4], Ordering::ColumnMajor),
            Some(vec![1, 3])
        );
        // Strided rows of a wider matrix: splitting the last axis is fine,
        // merging rows is not.
        assert_eq!(
            attempt_nocopy_reshape(&[2, 4], &[8, 1], &[2, 2, 2], Ordering::RowMajor),
            Some(vec![8, 2, 1])
        );
        assert_eq!(
            attempt_nocopy_reshape(&[2, 4], &[8, 1], &[8], Ordering::RowMajor),
            None
        );
        // Trailing size-1 axes.
        assert_eq!(
            attempt_nocopy_reshape(&[4], &[2], &[4, 1], Ordering::RowMajor),
            Some(vec![2, 2])
        );
    }

    #[test]
    fn test_ravel_unravel() {
        let shape = [2, 3, 4];
        let mut idx = [0usize; 3];
        for ordering in [Ordering::RowMajor, Ordering::ColumnMajor] {
            for i in 0..24 {
                unravel(i, &shape, ordering, &mut idx);
                assert_eq!(ravel(&idx, &shape, ordering), i);
            }
        }
        unravel(5, &shape, Ordering::RowMajor, &mut idx);
        assert_eq!(idx, [0, 1, 1]);
        unravel(5, &shape, Ordering::ColumnMajor, &mut idx);
        assert_eq!(idx, [1, 2, 0]);
    }
}

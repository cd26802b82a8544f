//! BLAS parameter derivation for dot, axpy and gemm.
//!
//! Views are handed to a [`BlasBackend`] as raw element slices plus the
//! offsets, increments, leading dimensions and transpose flags describing
//! them. Matrices use the row-major convention: a view whose rows are
//! contiguous is passed as is, one whose columns are contiguous is passed
//! transposed. Operands that are neither are compacted by an explicit copy.

use ndengine_traits::{Element, Ordering, Real};
use ndengine_view::{can_do_directly, NdArray};

use crate::kernel::{self, with_compute_type};
use crate::{EngineError, Result};

/// BLAS matrix layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlasLayout {
    /// Rows are contiguous: stride[1] == 1
    RowMajor,
    /// Columns are contiguous: stride[0] == 1
    ColMajor,
}

/// A rank-2 view expressible as a BLAS matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlasMatrix {
    pub layout: BlasLayout,
    pub rows: usize,
    pub cols: usize,
    pub ld: usize,
    pub offset: usize,
}

/// Checks whether a rank-2 view is compatible with BLAS.
///
/// - Row-major: stride[1] == 1 and stride[0] >= cols
/// - Column-major: stride[0] == 1 and stride[1] >= rows
pub fn blas_matrix(view: &NdArray) -> Option<BlasMatrix> {
    if view.rank() != 2 {
        return None;
    }
    let (rows, cols) = (view.shape()[0], view.shape()[1]);
    let strides = view.stride();

    if strides[1] == 1 && strides[0] >= cols as isize {
        return Some(BlasMatrix {
            layout: BlasLayout::RowMajor,
            rows,
            cols,
            ld: strides[0].max(1) as usize,
            offset: view.offset(),
        });
    }
    if strides[0] == 1 && strides[1] >= rows as isize {
        return Some(BlasMatrix {
            layout: BlasLayout::ColMajor,
            rows,
            cols,
            ld: strides[1].max(1) as usize,
            offset: view.offset(),
        });
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    NoTrans,
    Trans,
}

/// Arguments of `C = alpha * op(A) * op(B) + beta * C` with row-major `C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmParams {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub trans_a: Transpose,
    pub trans_b: Transpose,
    pub lda: usize,
    pub ldb: usize,
    pub ldc: usize,
    pub a_offset: usize,
    pub b_offset: usize,
    pub c_offset: usize,
}

impl GemmParams {
    /// Derives the arguments for `a (m x k) * b (k x n) -> c (m x n)`.
    ///
    /// All three must be BLAS matrices and `c` must be row-major.
    pub fn derive(a: &NdArray, b: &NdArray, c: &NdArray) -> Result<Self> {
        let (a_info, b_info, c_info) = match (blas_matrix(a), blas_matrix(b), blas_matrix(c)) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => {
                return Err(EngineError::Unsupported(
                    "gemm operands must be rank-2 with one unit stride".into(),
                ))
            }
        };
        let (m, k, n) = (a_info.rows, a_info.cols, b_info.cols);
        if b_info.rows != k {
            return Err(EngineError::ShapeMismatch(
                vec![m, k],
                vec![b_info.rows, b_info.cols],
            ));
        }
        if c_info.rows != m || c_info.cols != n {
            return Err(EngineError::ShapeMismatch(
                vec![m, n],
                vec![c_info.rows, c_info.cols],
            ));
        }
        if c_info.layout != BlasLayout::RowMajor {
            return Err(EngineError::Unsupported("gemm output must be row-major".into()));
        }
        Ok(Self {
            m,
            n,
            k,
            trans_a: transpose_flag(a_info.layout),
            trans_b: transpose_flag(b_info.layout),
            lda: a_info.ld,
            ldb: b_info.ld,
            ldc: c_info.ld,
            a_offset: a_info.offset,
            b_offset: b_info.offset,
            c_offset: c_info.offset,
        })
    }
}

fn transpose_flag(layout: BlasLayout) -> Transpose {
    match layout {
        BlasLayout::RowMajor => Transpose::NoTrans,
        BlasLayout::ColMajor => Transpose::Trans,
    }
}

/// A strided vector: element `i` lives at `offset + i * inc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorParams {
    pub n: usize,
    pub offset: usize,
    pub inc: isize,
}

impl VectorParams {
    /// Parameters for a view walkable with one element-wise stride.
    pub fn derive(view: &NdArray) -> Option<Self> {
        let inc = view.element_wise_stride()?;
        Some(Self {
            n: view.len(),
            offset: view.offset(),
            inc,
        })
    }

    #[inline]
    fn at(&self, i: usize) -> usize {
        (self.offset as isize + i as isize * self.inc) as usize
    }
}

/// Level 1 and level 3 routines over raw buffer elements.
pub trait BlasBackend: Send + Sync {
    fn dot<T: Real>(&self, x: &VectorParams, xs: &[T], y: &VectorParams, ys: &[T]) -> T;

    /// `y = alpha * x + y`
    fn axpy<T: Real>(&self, alpha: T, x: &VectorParams, xs: &[T], y: &VectorParams, ys: &mut [T]);

    fn gemm<T: Real>(&self, p: &GemmParams, alpha: T, a: &[T], b: &[T], beta: T, c: &mut [T]);
}

/// Reference loops with the same argument conventions as CBLAS.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveBlas;

impl BlasBackend for NaiveBlas {
    fn dot<T: Real>(&self, x: &VectorParams, xs: &[T], y: &VectorParams, ys: &[T]) -> T {
        (0..x.n.min(y.n))
            .map(|i| xs[x.at(i)] * ys[y.at(i)])
            .fold(T::zero(), |acc, v| acc + v)
    }

    fn axpy<T: Real>(&self, alpha: T, x: &VectorParams, xs: &[T], y: &VectorParams, ys: &mut [T]) {
        for i in 0..x.n.min(y.n) {
            let pos = y.at(i);
            ys[pos] = alpha * xs[x.at(i)] + ys[pos];
        }
    }

    fn gemm<T: Real>(&self, p: &GemmParams, alpha: T, a: &[T], b: &[T], beta: T, c: &mut [T]) {
        let a_at = |i: usize, l: usize| match p.trans_a {
            Transpose::NoTrans => a[p.a_offset + i * p.lda + l],
            Transpose::Trans => a[p.a_offset + l * p.lda + i],
        };
        let b_at = |l: usize, j: usize| match p.trans_b {
            Transpose::NoTrans => b[p.b_offset + l * p.ldb + j],
            Transpose::Trans => b[p.b_offset + j * p.ldb + l],
        };
        for i in 0..p.m {
            for j in 0..p.n {
                let mut sum = T::zero();
                for l in 0..p.k {
                    sum += a_at(i, l) * b_at(l, j);
                }
                let pos = p.c_offset + i * p.ldc + j;
                c[pos] = alpha * sum + beta * c[pos];
            }
        }
    }
}

/// `view` itself when BLAS can address it, otherwise a compact copy.
fn blas_operand(view: &NdArray) -> Result<NdArray> {
    if blas_matrix(view).is_some() {
        return Ok(view.clone());
    }
    tracing::debug!(shape = ?view.shape(), stride = ?view.stride(), "compacting gemm operand");
    Ok(view.dup()?)
}

/// Level 1 operands paired element by element in `x`'s ordering.
///
/// Operands walkable together are passed as is. Otherwise `x` keeps its own
/// element-wise walk when it has one and `y` is flattened into a compact
/// copy visited in `x`'s ordering.
fn vector_pair(x: &NdArray, y: &NdArray) -> Result<(Operand, Operand)> {
    if can_do_directly(&[x, y]) {
        if let (Some(xp), Some(yp)) = (VectorParams::derive(x), VectorParams::derive(y)) {
            return Ok((Operand::view(x, xp), Operand::view(y, yp)));
        }
    }
    let ordering = x.ordering();
    let x = match VectorParams::derive(x) {
        Some(xp) => Operand::view(x, xp),
        None => Operand::flatten(x, ordering)?,
    };
    Ok((x, Operand::flatten(y, ordering)?))
}

/// A vector operand and the parameters BLAS addresses it with.
struct Operand {
    array: NdArray,
    params: VectorParams,
    /// Ordering the source was flattened in, when `array` is a copy.
    flattened: Option<Ordering>,
}

impl Operand {
    fn view(array: &NdArray, params: VectorParams) -> Self {
        Self {
            array: array.clone(),
            params,
            flattened: None,
        }
    }

    fn flatten(view: &NdArray, ordering: Ordering) -> Result<Self> {
        tracing::debug!(shape = ?view.shape(), stride = ?view.stride(), ?ordering, "compacting vector operand");
        let values: Vec<f64> = {
            let data = view.buffer().reader()?;
            view.offsets_in(ordering).map(|o| data.read(o)).collect()
        };
        let array = NdArray::create(
            &[values.len()],
            view.dtype(),
            ordering,
            view.buffer().allocation_mode(),
        );
        array.assign_values(&values)?;
        let params = VectorParams::derive(&array).ok_or_else(|| {
            EngineError::Unsupported("vector operand has no element-wise stride".into())
        })?;
        Ok(Self {
            array,
            params,
            flattened: Some(ordering),
        })
    }

    /// Copies a flattened operand back into `target` in the order it was read.
    fn scatter_into(&self, target: &NdArray) -> Result<()> {
        let Some(ordering) = self.flattened else {
            return Ok(());
        };
        let values = self.array.to_vec::<f64>()?;
        let mut writer = target.buffer().writer()?;
        for (pos, v) in target.offsets_in(ordering).zip(values) {
            writer.put(pos, v)?;
        }
        Ok(())
    }
}

/// Dot product of two views holding the same number of elements, paired by
/// linear position in `x`'s ordering.
pub fn dot<B: BlasBackend>(backend: &B, x: &NdArray, y: &NdArray) -> Result<f64> {
    if x.len() != y.len() {
        return Err(EngineError::ShapeMismatch(x.shape().to_vec(), y.shape().to_vec()));
    }
    let (x, y) = vector_pair(x, y)?;
    let dtype = kernel::compute_dtype(&[&x.array, &y.array]);
    with_compute_type!(dtype, T => {
        let xs = x.array.buffer().to_vec::<T>()?;
        let ys = y.array.buffer().to_vec::<T>()?;
        Ok(backend.dot(&x.params, &xs, &y.params, &ys).widen())
    })
}

/// `y = alpha * x + y`, pairing elements as [`dot`] does.
pub fn axpy<B: BlasBackend>(backend: &B, alpha: f64, x: &NdArray, y: &NdArray) -> Result<()> {
    if x.len() != y.len() {
        return Err(EngineError::ShapeMismatch(x.shape().to_vec(), y.shape().to_vec()));
    }
    let (xw, yw) = vector_pair(x, y)?;
    let dtype = kernel::compute_dtype(&[&xw.array, &yw.array]);
    with_compute_type!(dtype, T => {
        let xs = xw.array.buffer().to_vec::<T>()?;
        let mut ys = yw.array.buffer().to_vec::<T>()?;
        backend.axpy(T::narrow(alpha), &xw.params, &xs, &yw.params, &mut ys);
        write_back(&yw.array, &ys)?;
    });
    yw.scatter_into(y)
}

/// `c = alpha * a * b + beta * c` for rank-2 views.
///
/// A column-major `c` is computed as `c^T = b^T * a^T`. A `c` BLAS cannot
/// address is computed into a compact copy and assigned back.
pub fn gemm<B: BlasBackend>(
    backend: &B,
    alpha: f64,
    a: &NdArray,
    b: &NdArray,
    beta: f64,
    c: &NdArray,
) -> Result<()> {
    let a = blas_operand(a)?;
    let b = blas_operand(b)?;
    let c_work = blas_operand(c)?;
    let (a, b, c_t) = match blas_matrix(&c_work).map(|info| info.layout) {
        Some(BlasLayout::ColMajor) => (b.transpose(), a.transpose(), c_work.transpose()),
        _ => (a, b, c_work.clone()),
    };
    let params = GemmParams::derive(&a, &b, &c_t)?;
    tracing::trace!(?params, "gemm");

    let dtype = kernel::compute_dtype(&[&a, &b, &c_t]);
    with_compute_type!(dtype, T => {
        let av = a.buffer().to_vec::<T>()?;
        let bv = b.buffer().to_vec::<T>()?;
        let mut cv = c_t.buffer().to_vec::<T>()?;
        backend.gemm(&params, T::narrow(alpha), &av, &bv, T::narrow(beta), &mut cv);
        write_back(&c_t, &cv)?;
    });
    if c_work.buffer().id() != c.buffer().id() {
        c.assign(&c_work)?;
    }
    Ok(())
}

/// Copies the positions `view` covers from `values` into its buffer.
fn write_back<T: Real>(view: &NdArray, values: &[T]) -> Result<()> {
    let mut writer = view.buffer().writer()?;
    for pos in view.offsets() {
        writer.put(pos, values[pos])?;
    }
    Ok(())
}

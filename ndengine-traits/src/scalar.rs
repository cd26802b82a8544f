//! Scalar type bounds for buffers and kernels.

use crate::DataType;

/// A scalar that can be stored in a buffer.
///
/// `Pod` lets byte-addressed storage read and write elements without an
/// intermediate representation. Conversions go through `f64`, which is exact
/// for every storable type.
pub trait Element:
    bytemuck::Pod + Copy + Send + Sync + PartialOrd + std::fmt::Debug + Default + 'static
{
    /// Tag of the matching storage type.
    const DTYPE: DataType;

    /// Widen to `f64`.
    fn widen(self) -> f64;

    /// Narrow from `f64` (saturating truncation for integers).
    fn narrow(value: f64) -> Self;
}

impl Element for f32 {
    const DTYPE: DataType = DataType::Float;

    #[inline(always)]
    fn widen(self) -> f64 {
        self as f64
    }

    #[inline(always)]
    fn narrow(value: f64) -> Self {
        value as f32
    }
}

impl Element for f64 {
    const DTYPE: DataType = DataType::Double;

    #[inline(always)]
    fn widen(self) -> f64 {
        self
    }

    #[inline(always)]
    fn narrow(value: f64) -> Self {
        value
    }
}

impl Element for i32 {
    const DTYPE: DataType = DataType::Int;

    #[inline(always)]
    fn widen(self) -> f64 {
        self as f64
    }

    #[inline(always)]
    fn narrow(value: f64) -> Self {
        value as i32
    }
}

/// A floating-point compute type.
///
/// Kernels are monomorphized over `Real`; integer buffers are computed in
/// `f64` and narrowed on write.
pub trait Real: Element + num_traits::Float + std::ops::AddAssign + std::iter::Sum {}

impl<T> Real for T where T: Element + num_traits::Float + std::ops::AddAssign + std::iter::Sum {}

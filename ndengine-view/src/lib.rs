//! Strided N-dimensional views over [`DataBuffer`]s.
//!
//! # Core Types
//!
//! - [`NdArray`]: shape, stride, offset and ordering over a shared buffer
//! - [`Derived`]: result of an operation that may have fallen back to a copy
//! - [`NdIndexIter`] / [`OffsetIter`]: multi-index and buffer-offset iteration
//!
//! # Decomposition
//!
//! These derive views without touching element data whenever the result is
//! expressible as shape + stride + offset into the same buffer:
//! - `permute`, `transpose`, `swap_axes`
//! - `tensor_along_dimension`, `get_row`, `get_column`
//! - `reshape`, `linear_view` (fall back to an explicit copy when needed)

mod decompose;
mod iter;
pub mod layout;
mod view;

pub use decompose::{can_do_directly, reduced_shape, Derived};
pub use iter::{NdIndexIter, OffsetIter};
pub use layout::{col_major_strides, row_major_strides, strides_for};
pub use view::NdArray;

pub use ndengine_buffer::{AllocationMode, BufferError, DataBuffer};
pub use ndengine_traits::{DataType, Element, Ordering};

/// Errors that can occur during view construction and decomposition.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    #[error("invalid axis {axis} for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    #[error("axis {0} given more than once")]
    DuplicateAxis(usize),

    #[error("stride and shape length mismatch")]
    StrideLengthMismatch,

    /// A reachable element lies outside the backing buffer.
    #[error("offset overflow: view reaches past buffer of length {len}")]
    OffsetOverflow { len: usize },

    #[error("cannot reshape {from:?} into {to:?}")]
    InvalidReshape { from: Vec<usize>, to: Vec<usize> },

    #[error("tensor index {index} out of range for {count} tensors")]
    TensorIndexOutOfRange { index: usize, count: usize },

    #[error("index {index:?} out of bounds for shape {shape:?}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Vec<usize> },

    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Result type for view operations.
pub type Result<T> = std::result::Result<T, ViewError>;

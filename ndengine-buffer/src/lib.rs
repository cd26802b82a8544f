//! Typed linear storage for the ndengine workspace.
//!
//! A [`DataBuffer`] is a fixed-length, typed store with no knowledge of shape.
//! Its elements live in one of three allocation modes:
//!
//! - [`AllocationMode::Heap`]: a directly addressable typed vector
//! - [`AllocationMode::Direct`]: byte-addressed off-heap style storage
//! - [`AllocationMode::Device`]: a host mirror plus per-context device copies
//!   managed by a [`MemoryStrategy`]
//!
//! Element access converts transparently between the stored type and the
//! requested type. Equality compares element-wise within [`EPS_THRESHOLD`].
//!
//! # Wire format
//!
//! `[mode tag: u8][length: u64][dtype tag: u8][elements]`, all in native byte
//! order with no padding. See [`DataBuffer::write_to`].

mod buffer;
mod codec;
pub mod device;
mod storage;

pub use buffer::{AllocationMode, BufferReader, BufferWriter, DataBuffer, TypedArray};
pub use device::{
    DeviceKey, DevicePointer, HostPointer, MemoryStrategy, PageableHostStrategy,
};
pub use ndengine_traits::{DataType, Element};

/// Tolerance used by buffer equality.
pub const EPS_THRESHOLD: f64 = 1e-5;

/// Errors raised by buffer storage and memory strategies.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// Element index outside `[0, length)`.
    #[error("index {index} out of bounds for buffer of length {length}")]
    IndexOutOfBounds { index: usize, length: usize },

    /// Bulk assignment with differing index and value counts.
    #[error("indices and data length must be the same ({indices} vs {values})")]
    LengthMismatch { indices: usize, values: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested layout has no implementation for this allocation mode.
    #[error("{operation} is not supported for {mode} buffers")]
    UnsupportedLayout {
        operation: &'static str,
        mode: AllocationMode,
    },

    #[error("buffer has been destroyed")]
    Destroyed,

    /// The memory strategy could not satisfy an allocation.
    #[error("device out of memory: requested {requested} bytes, {available} available")]
    DeviceOutOfMemory { requested: usize, available: usize },

    /// No device copy exists for the calling context at this offset.
    #[error("no device pointer for offset {offset}, length {length}")]
    DevicePointerMissing { offset: usize, length: usize },

    /// Unrecognized tag byte while decoding.
    #[error("invalid {kind} tag {tag}")]
    InvalidTag { kind: &'static str, tag: u8 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for buffer operations.
pub type Result<T> = std::result::Result<T, BufferError>;

//! N-dimensional array engine.
//!
//! Typed buffers with heap, direct and device allocation modes, strided views
//! over them, and an operator layer that runs element-wise transforms and
//! reductions, decomposing the work into parallel tasks.
//!
//! # Core Types
//!
//! - [`Engine`]: configuration plus the shared worker pool; factory for arrays
//!   and entry point for the common reductions and transforms
//! - [`NdArray`]: strided view over a shared [`DataBuffer`]
//! - [`Accumulation`], [`IndexAccumulation`], [`TransformOp`], [`VectorOp`]:
//!   op kinds, each parameterized by a rule ([`Sum`], [`Variance`], [`IMax`],
//!   [`Unary`], ...)
//! - [`OpExecutioner`]: chooses between direct loops, tensor decomposition
//!   and per-dimension fan-out for each op
//!
//! # Execution paths
//!
//! 1. Operands walkable as one flat run are reduced in a single strided loop.
//! 2. Otherwise the work is split into sub-tensors along the most expensive
//!    axis; each sub-tensor re-checks whether it can be walked directly.
//! 3. Sub-tasks above the configured threshold run on the shared pool and are
//!    awaited together; their partial results are combined, then finalized once.
//!
//! # Example
//!
//! ```rust
//! use ndengine::{Engine, EngineConfig, Ordering};
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let a = engine
//!     .from_vec(vec![1.0f64, 2.0, 3.0, 4.0], &[2, 2], Ordering::RowMajor)
//!     .unwrap();
//!
//! let rows = engine.sum_along(&a, &[1]).unwrap();
//! assert_eq!(rows.to_vec::<f64>().unwrap(), vec![3.0, 7.0]);
//! assert_eq!(engine.sum(&a).unwrap(), 10.0);
//! ```

pub mod blas;
pub mod config;
mod engine;
pub mod exec;
mod kernel;
#[cfg(feature = "subscriber")]
pub mod logging;
pub mod op;
pub mod task;

pub use blas::{BlasBackend, GemmParams, NaiveBlas, Transpose, VectorParams};
pub use config::{EngineConfig, MIN_THREAD_LENGTH};
pub use engine::Engine;
pub use exec::OpExecutioner;
pub use op::{
    Accumulation, AccumulationRule, Bias, Dot, ElementwiseRule, EuclideanDistance, IAMax, IAMin,
    IMax, IMin, IndexAccumulation, IndexAccumulationRule, IndexReduction, ManhattanDistance, Max,
    Mean, Min, Norm1, Norm2, NormMax, Op, Pairwise, Prerequisite, Prod, Reduction, Scalar,
    ScalarKind, StandardDeviation, Sum, TransformOp, Unary, Variance, VectorOp,
};
pub use task::{CpuTaskFactory, Task, TaskExecutor, TaskFactory, TaskHandle};

pub use ndengine_buffer::{
    AllocationMode, BufferError, DataBuffer, DeviceKey, DevicePointer, MemoryStrategy,
    PageableHostStrategy,
};
pub use ndengine_traits::{DataType, Element, Ordering, Real};
pub use ndengine_view::{Derived, NdArray, ViewError};
pub use num_complex::Complex64;

/// Errors raised while building or executing ops.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("{op} requires operand {operand}")]
    MissingOperand {
        op: &'static str,
        operand: &'static str,
    },

    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A sub-task returned an error or panicked.
    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("task finished without reporting a result")]
    TaskDisconnected,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

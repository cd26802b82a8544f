//! Parallel decomposition of ops into tasks.
//!
//! A reduction runs as one direct task when its operands can be walked as
//! flat runs. Otherwise it fans out over sub-tensors, each of which re-checks
//! whether it can be walked directly. Reductions along dimensions fan out one
//! sub-task per output position. Sub-tasks are awaited together, then their
//! partial results are combined and finalized exactly once.

mod accumulation;
mod executor;
mod factory;
mod index_accumulation;
mod plan;
mod transform;

pub use accumulation::{
    AccumulationAlongDimensionTask, AccumulationTask, AccumulationViaTensorTask,
};
pub use executor::{join_all, TaskExecutor, TaskHandle};
pub use factory::{CpuTaskFactory, IndexResult, TaskFactory};
pub use index_accumulation::{
    IndexAccumulationAlongDimensionTask, IndexAccumulationTask, IndexAccumulationViaTensorTask,
};
pub use transform::{TransformAlongDimensionTask, TransformTask, VectorTask};

pub(crate) use accumulation::prepare_statistics;

use ndengine_buffer::AllocationMode;
use ndengine_traits::DataType;
use ndengine_view::{reduced_shape, NdArray};

use crate::{EngineError, Result};

/// A unit of work that may run on the shared pool.
pub trait Task: Send + 'static {
    type Output: Send + 'static;

    fn call(&mut self) -> Result<Self::Output>;
}

impl<T: Task + ?Sized> Task for Box<T> {
    type Output = T::Output;

    fn call(&mut self) -> Result<Self::Output> {
        (**self).call()
    }
}

/// The output view for a reduction of `x` along `dims`: the supplied `z`
/// when it has one slot per sub-tensor, or a fresh array shaped like `x` with
/// `dims` removed.
pub(crate) fn reduction_output(x: &NdArray, dims: &[usize], z: Option<&NdArray>) -> Result<NdArray> {
    let shape = reduced_shape(x.shape(), dims)?;
    if let Some(z) = z {
        let count: usize = shape.iter().product();
        if z.len() != count {
            return Err(EngineError::ShapeMismatch(shape, z.shape().to_vec()));
        }
        return Ok(z.clone());
    }
    let dtype = match x.dtype() {
        DataType::Int => DataType::Double,
        other => other,
    };
    Ok(NdArray::create(&shape, dtype, x.ordering(), AllocationMode::Heap))
}

/// Writes `values[i]` at row-major position `i` of `z`.
pub(crate) fn write_row_major(z: &NdArray, values: &[f64]) -> Result<()> {
    let positions = (0..values.len())
        .map(|i| z.row_major_offset(i))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut writer = z.buffer().writer()?;
    for (pos, &v) in positions.into_iter().zip(values) {
        writer.put(pos, v)?;
    }
    Ok(())
}

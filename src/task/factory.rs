//! Task construction per op kind.

use ndengine_view::{can_do_directly, NdArray};

use super::accumulation::{AccumulationAlongDimensionTask, AccumulationTask, AccumulationViaTensorTask};
use super::executor::TaskExecutor;
use super::index_accumulation::{
    IndexAccumulationAlongDimensionTask, IndexAccumulationTask, IndexAccumulationViaTensorTask,
};
use super::transform::{TransformAlongDimensionTask, VectorTask};
use super::Task;
use crate::op::{
    Accumulation, AccumulationRule, ElementwiseRule, IndexAccumulation, IndexAccumulationRule, Op,
    Scalar, TransformOp, VectorOp,
};

/// Index reduction result: linear position and value of the winner.
pub type IndexResult = Option<(usize, f64)>;

/// Builds the task that executes each kind of op.
pub trait TaskFactory {
    fn create_transform_task<R: ElementwiseRule>(
        &self,
        op: TransformOp<R>,
    ) -> Box<dyn Task<Output = ()>>;

    fn create_transform_along_dimension_task<R: ElementwiseRule>(
        &self,
        op: TransformOp<R>,
        dims: &[usize],
    ) -> Box<dyn Task<Output = ()>>;

    fn create_scalar_task(&self, op: TransformOp<Scalar>) -> Box<dyn Task<Output = ()>> {
        self.create_transform_task(op)
    }

    fn create_accumulation_task<R: AccumulationRule>(
        &self,
        op: Accumulation<R>,
    ) -> Box<dyn Task<Output = f64>>;

    fn create_accumulation_along_dimension_task<R: AccumulationRule>(
        &self,
        op: Accumulation<R>,
        dims: &[usize],
    ) -> Box<dyn Task<Output = NdArray>>;

    fn create_index_accumulation_task<R: IndexAccumulationRule>(
        &self,
        op: IndexAccumulation<R>,
    ) -> Box<dyn Task<Output = IndexResult>>;

    fn create_index_accumulation_along_dimension_task<R: IndexAccumulationRule>(
        &self,
        op: IndexAccumulation<R>,
        dims: &[usize],
    ) -> Box<dyn Task<Output = NdArray>>;

    fn create_vector_task(&self, op: VectorOp) -> Box<dyn Task<Output = ()>>;
}

/// Tasks for the shared CPU pool.
#[derive(Debug, Clone)]
pub struct CpuTaskFactory {
    executor: TaskExecutor,
}

impl CpuTaskFactory {
    pub fn new(executor: TaskExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }
}

impl TaskFactory for CpuTaskFactory {
    fn create_transform_task<R: ElementwiseRule>(
        &self,
        op: TransformOp<R>,
    ) -> Box<dyn Task<Output = ()>> {
        Box::new(TransformAlongDimensionTask::new(op, None, self.executor.clone()))
    }

    fn create_transform_along_dimension_task<R: ElementwiseRule>(
        &self,
        op: TransformOp<R>,
        dims: &[usize],
    ) -> Box<dyn Task<Output = ()>> {
        Box::new(TransformAlongDimensionTask::new(
            op,
            Some(dims),
            self.executor.clone(),
        ))
    }

    fn create_accumulation_task<R: AccumulationRule>(
        &self,
        op: Accumulation<R>,
    ) -> Box<dyn Task<Output = f64>> {
        let mut operands = vec![op.x()];
        operands.extend(op.y());
        if can_do_directly(&operands) {
            tracing::debug!(op = op.name(), n = op.n(), "direct accumulation");
            return Box::new(AccumulationTask::new(op, true));
        }
        Box::new(AccumulationViaTensorTask::new(op, self.executor.clone()))
    }

    fn create_accumulation_along_dimension_task<R: AccumulationRule>(
        &self,
        op: Accumulation<R>,
        dims: &[usize],
    ) -> Box<dyn Task<Output = NdArray>> {
        Box::new(AccumulationAlongDimensionTask::new(
            op,
            dims,
            self.executor.clone(),
        ))
    }

    fn create_index_accumulation_task<R: IndexAccumulationRule>(
        &self,
        op: IndexAccumulation<R>,
    ) -> Box<dyn Task<Output = IndexResult>> {
        if can_do_directly(&[op.x()]) {
            tracing::debug!(op = op.name(), n = op.n(), "direct index accumulation");
            return Box::new(IndexAccumulationTask::new(op));
        }
        Box::new(IndexAccumulationViaTensorTask::new(op, self.executor.clone()))
    }

    fn create_index_accumulation_along_dimension_task<R: IndexAccumulationRule>(
        &self,
        op: IndexAccumulation<R>,
        dims: &[usize],
    ) -> Box<dyn Task<Output = NdArray>> {
        Box::new(IndexAccumulationAlongDimensionTask::new(
            op,
            dims,
            self.executor.clone(),
        ))
    }

    fn create_vector_task(&self, op: VectorOp) -> Box<dyn Task<Output = ()>> {
        Box::new(VectorTask::new(op, self.executor.clone()))
    }
}

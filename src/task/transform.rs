//! Element-wise tasks.

use super::executor::{join_all, TaskExecutor};
use super::plan::{all_but, compute_costs, find_split_dimension};
use super::Task;
use crate::kernel::{self, with_compute_type};
use crate::op::{ElementwiseRule, Op, TransformOp, VectorOp};
use crate::Result;

#[derive(Debug)]
pub struct TransformTask<R: ElementwiseRule> {
    op: TransformOp<R>,
}

impl<R: ElementwiseRule> TransformTask<R> {
    pub fn new(op: TransformOp<R>) -> Self {
        Self { op }
    }
}

impl<R: ElementwiseRule> Task for TransformTask<R> {
    type Output = ();

    fn call(&mut self) -> Result<()> {
        let op = &self.op;
        let z = op.output();
        let mut operands = vec![op.x(), z];
        operands.extend(op.y());
        let dtype = kernel::compute_dtype(&operands);
        with_compute_type!(dtype, T => kernel::transform::<T, R>(op.rule(), op.x(), op.y(), z))
    }
}

/// Applies a transform to each tensor along `dims` as its own sub-task.
///
/// With `dims` unset, large transforms are split along their most expensive
/// axis and small ones run as one task.
#[derive(Debug)]
pub struct TransformAlongDimensionTask<R: ElementwiseRule> {
    op: TransformOp<R>,
    dims: Option<Vec<usize>>,
    executor: TaskExecutor,
}

impl<R: ElementwiseRule> TransformAlongDimensionTask<R> {
    pub fn new(op: TransformOp<R>, dims: Option<&[usize]>, executor: TaskExecutor) -> Self {
        Self {
            op,
            dims: dims.map(<[usize]>::to_vec),
            executor,
        }
    }

    /// The dimensions to fan out over, or `None` to run as one task.
    fn split_dims(&self) -> Option<Vec<usize>> {
        if let Some(dims) = &self.dims {
            return Some(dims.clone());
        }
        let x = self.op.x();
        let z = self.op.output();
        if !self.executor.should_dispatch(self.op.n()) || x.shape() != z.shape() {
            return None;
        }
        if self.op.y().is_some_and(|y| y.shape() != x.shape()) {
            return None;
        }
        let mut operands = vec![x, z];
        operands.extend(self.op.y());
        let axis = find_split_dimension(x.shape(), &compute_costs(&operands))?;
        Some(all_but(x.rank(), axis))
    }
}

impl<R: ElementwiseRule> Task for TransformAlongDimensionTask<R> {
    type Output = ();

    fn call(&mut self) -> Result<()> {
        let Some(dims) = self.split_dims() else {
            return TransformTask::new(self.op.clone()).call();
        };
        let count = self.op.x().tensors_along_dimension(&dims)?;
        let n = self.op.n();
        tracing::debug!(op = self.op.name(), dims = ?dims, count, "transform along dimensions");
        let handles = (0..count)
            .map(|i| {
                let sub = self.op.op_for_dimension(i, &dims)?;
                Ok(self.executor.execute(TransformTask::new(sub), n))
            })
            .collect::<Result<Vec<_>>>()?;
        join_all(handles)?;
        Ok(())
    }
}

/// Combines every vector along the op's dimension with the broadcast operand.
#[derive(Debug)]
pub struct VectorTask {
    op: VectorOp,
    executor: TaskExecutor,
}

impl VectorTask {
    pub fn new(op: VectorOp, executor: TaskExecutor) -> Self {
        Self { op, executor }
    }
}

impl Task for VectorTask {
    type Output = ();

    fn call(&mut self) -> Result<()> {
        let count = self.op.tensor_count()?;
        let n = self.op.n();
        tracing::debug!(op = self.op.name(), dimension = self.op.dimension(), count, "vector op");
        let handles = (0..count)
            .map(|i| {
                let sub = self.op.op_for_dimension(i)?;
                Ok(self.executor.execute(TransformTask::new(sub), n))
            })
            .collect::<Result<Vec<_>>>()?;
        join_all(handles)?;
        Ok(())
    }
}

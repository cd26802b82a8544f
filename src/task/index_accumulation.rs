//! Index-reduction tasks.

use ndengine_view::NdArray;

use super::executor::{join_all, TaskExecutor};
use super::plan::{all_but, compute_costs, find_split_dimension};
use super::{reduction_output, write_row_major, Task};
use crate::kernel;
use crate::op::{IndexAccumulation, IndexAccumulationRule, Op};
use crate::Result;

/// Position written for a sub-tensor with no elements.
const EMPTY_POSITION: f64 = -1.0;

#[derive(Debug)]
pub struct IndexAccumulationTask<R: IndexAccumulationRule> {
    op: IndexAccumulation<R>,
}

impl<R: IndexAccumulationRule> IndexAccumulationTask<R> {
    pub fn new(op: IndexAccumulation<R>) -> Self {
        Self { op }
    }
}

impl<R: IndexAccumulationRule> Task for IndexAccumulationTask<R> {
    type Output = Option<(usize, f64)>;

    fn call(&mut self) -> Result<Option<(usize, f64)>> {
        kernel::index_accumulate(self.op.rule(), self.op.x())
    }
}

/// Searches a view that cannot be walked directly sub-tensor by sub-tensor,
/// translating each local winner back to a position in the whole view.
#[derive(Debug)]
pub struct IndexAccumulationViaTensorTask<R: IndexAccumulationRule> {
    op: IndexAccumulation<R>,
    executor: TaskExecutor,
}

impl<R: IndexAccumulationRule> IndexAccumulationViaTensorTask<R> {
    pub fn new(op: IndexAccumulation<R>, executor: TaskExecutor) -> Self {
        Self { op, executor }
    }
}

impl<R: IndexAccumulationRule> Task for IndexAccumulationViaTensorTask<R> {
    type Output = Option<(usize, f64)>;

    fn call(&mut self) -> Result<Option<(usize, f64)>> {
        let x = self.op.x();
        let costs = compute_costs(&[x]);
        let Some(axis) = find_split_dimension(x.shape(), &costs) else {
            return IndexAccumulationTask::new(self.op.clone()).call();
        };
        let dims = all_but(x.rank(), axis);
        let count = x.shape()[axis];
        let n = self.op.n();
        tracing::debug!(op = self.op.name(), axis, count, "searching via sub-tensors");

        let handles = (0..count)
            .map(|i| {
                let sub = self.op.op_for_dimension(i, &dims)?;
                Ok(self.executor.execute(IndexAccumulationTask::new(sub), n))
            })
            .collect::<Result<Vec<_>>>()?;

        let rule = self.op.rule();
        let mut best: Option<(usize, f64)> = None;
        for (i, local) in join_all(handles)?.into_iter().enumerate() {
            let Some((element, value)) = local else {
                continue;
            };
            let parent = x.tad_parent_index(i, &dims, element)?;
            let candidate = (x.linear_index(&parent), value);
            best = Some(match best {
                None => candidate,
                Some(b) => rule.pick(b, candidate),
            });
        }
        Ok(best)
    }
}

/// Searches each tensor along `dims` and writes the winner's position within
/// its sub-tensor at row-major position `i` of the output.
#[derive(Debug)]
pub struct IndexAccumulationAlongDimensionTask<R: IndexAccumulationRule> {
    op: IndexAccumulation<R>,
    dims: Vec<usize>,
    executor: TaskExecutor,
}

impl<R: IndexAccumulationRule> IndexAccumulationAlongDimensionTask<R> {
    pub fn new(op: IndexAccumulation<R>, dims: &[usize], executor: TaskExecutor) -> Self {
        Self {
            op,
            dims: dims.to_vec(),
            executor,
        }
    }
}

impl<R: IndexAccumulationRule> Task for IndexAccumulationAlongDimensionTask<R> {
    type Output = NdArray;

    fn call(&mut self) -> Result<NdArray> {
        let x = self.op.x();
        let z = reduction_output(x, &self.dims, self.op.z())?;
        let count = x.tensors_along_dimension(&self.dims)?;
        let n = self.op.n();
        tracing::debug!(op = self.op.name(), dims = ?self.dims, count, "searching along dimensions");

        let handles = (0..count)
            .map(|i| {
                let sub = self.op.op_for_dimension(i, &self.dims)?;
                Ok(self.executor.execute(IndexAccumulationTask::new(sub), n))
            })
            .collect::<Result<Vec<_>>>()?;
        let positions: Vec<f64> = join_all(handles)?
            .into_iter()
            .map(|r| r.map_or(EMPTY_POSITION, |(i, _)| i as f64))
            .collect();
        write_row_major(&z, &positions)?;
        Ok(z)
    }
}

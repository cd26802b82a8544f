//! Reduction tasks.

use ndengine_traits::Element;
use ndengine_view::{can_do_directly, NdArray};
use num_complex::Complex64;

use super::executor::{join_all, TaskExecutor};
use super::plan::{all_but, compute_costs, find_split_dimension};
use super::{reduction_output, write_row_major, Task};
use crate::kernel::{self, with_compute_type};
use crate::op::{Accumulation, AccumulationRule, Bias, Mean, Op, Prerequisite};
use crate::Result;

/// Unfinalized accumulator of `op` in one strided loop, widened to `f64`.
fn raw_accumulate<R: AccumulationRule>(op: &Accumulation<R>) -> Result<f64> {
    let mut operands = vec![op.x()];
    operands.extend(op.y());
    let dtype = kernel::compute_dtype(&operands);
    with_compute_type!(dtype, T => {
        Ok(kernel::accumulate::<T, R>(op.rule(), op.x(), op.y())?.widen())
    })
}

/// Reduces a whole op in one strided loop.
///
/// An `outer` task finalizes its result; an inner one returns the raw
/// accumulator for its coordinator to combine.
#[derive(Debug)]
pub struct AccumulationTask<R: AccumulationRule> {
    op: Accumulation<R>,
    outer: bool,
}

impl<R: AccumulationRule> AccumulationTask<R> {
    pub fn new(op: Accumulation<R>, outer: bool) -> Self {
        Self { op, outer }
    }
}

impl<R: AccumulationRule> Task for AccumulationTask<R> {
    type Output = f64;

    fn call(&mut self) -> Result<f64> {
        if self.op.needs_statistics() {
            prepare_statistics(&mut self.op, None)?;
        }
        let acc = raw_accumulate(&self.op)?;
        if self.outer {
            return Ok(self.op.rule().finalize(acc, self.op.n()));
        }
        Ok(acc)
    }
}

/// Reduces a whole op that cannot be walked directly by splitting it into
/// sub-tensors along its most expensive axis.
#[derive(Debug)]
pub struct AccumulationViaTensorTask<R: AccumulationRule> {
    op: Accumulation<R>,
    executor: TaskExecutor,
}

impl<R: AccumulationRule> AccumulationViaTensorTask<R> {
    pub fn new(op: Accumulation<R>, executor: TaskExecutor) -> Self {
        Self { op, executor }
    }
}

impl<R: AccumulationRule> Task for AccumulationViaTensorTask<R> {
    type Output = f64;

    fn call(&mut self) -> Result<f64> {
        if self.op.needs_statistics() {
            prepare_statistics(&mut self.op, Some(&self.executor))?;
        }
        let x = self.op.x();
        let mut operands = vec![x];
        operands.extend(self.op.y());
        let costs = compute_costs(&operands);
        let Some(axis) = find_split_dimension(x.shape(), &costs) else {
            return AccumulationTask::new(self.op.clone(), true).call();
        };

        let dims = all_but(x.rank(), axis);
        let n = self.op.n();
        let count = x.shape()[axis];
        tracing::debug!(op = self.op.name(), axis, count, "reducing via sub-tensors");

        let handles = (0..count)
            .map(|i| {
                let piece = self.op.slice(i, &dims)?;
                Ok(self.executor.execute(AccumulationTask::new(piece, false), n))
            })
            .collect::<Result<Vec<_>>>()?;
        let rule = self.op.rule();
        let acc = join_all(handles)?
            .into_iter()
            .fold(rule.zero::<f64>(), |a, b| rule.combine(a, b));
        Ok(rule.finalize(acc, n))
    }
}

/// Reduces each tensor along `dims` independently and writes result `i` at
/// row-major position `i` of the output.
#[derive(Debug)]
pub struct AccumulationAlongDimensionTask<R: AccumulationRule> {
    op: Accumulation<R>,
    dims: Vec<usize>,
    executor: TaskExecutor,
}

impl<R: AccumulationRule> AccumulationAlongDimensionTask<R> {
    pub fn new(op: Accumulation<R>, dims: &[usize], executor: TaskExecutor) -> Self {
        Self {
            op,
            dims: dims.to_vec(),
            executor,
        }
    }
}

impl<R: AccumulationRule> Task for AccumulationAlongDimensionTask<R> {
    type Output = NdArray;

    fn call(&mut self) -> Result<NdArray> {
        let x = self.op.x();
        let z = reduction_output(x, &self.dims, self.op.z())?;
        let count = x.tensors_along_dimension(&self.dims)?;
        let n = self.op.n();
        tracing::debug!(
            op = self.op.name(),
            dims = ?self.dims,
            count,
            "reducing along dimensions"
        );

        let handles = (0..count)
            .map(|i| {
                let sub = self.op.op_for_dimension(i, &self.dims)?;
                Ok(self.executor.execute(AccumulationTask::new(sub, true), n))
            })
            .collect::<Result<Vec<_>>>()?;
        let results = join_all(handles)?;
        write_row_major(&z, &results)?;
        Ok(z)
    }
}

/// Full reduction of `op`: one direct task when possible, otherwise a
/// sub-tensor fan-out.
pub(crate) fn reduce_full<R: AccumulationRule>(
    op: Accumulation<R>,
    executor: &TaskExecutor,
) -> Result<f64> {
    let mut operands = vec![op.x()];
    operands.extend(op.y());
    if can_do_directly(&operands) {
        let n = op.n();
        tracing::trace!(op = op.name(), n, "direct reduction");
        return executor
            .execute(AccumulationTask::new(op, true), n)
            .block_until_complete();
    }
    AccumulationViaTensorTask::new(op, executor.clone()).call()
}

/// Computes the mean (and bias) that `op`'s rule depends on and binds them.
///
/// Each statistic is a complete reduction that finishes before the next one
/// starts. Without an executor they run inline.
pub(crate) fn prepare_statistics<R: AccumulationRule>(
    op: &mut Accumulation<R>,
    executor: Option<&TaskExecutor>,
) -> Result<()> {
    let prerequisite = op.rule().prerequisite();
    if prerequisite == Prerequisite::None {
        return Ok(());
    }
    let run = |sub: Accumulation<_>| -> Result<f64> {
        match executor {
            Some(executor) => reduce_full(sub, executor),
            None => AccumulationTask::new(sub, true).call(),
        }
    };
    let mean = run(op.with_rule(Mean))?;
    let mean = Complex64::new(mean, 0.0);

    let bias = if prerequisite == Prerequisite::MeanAndBias {
        let mut sub = op.with_rule(Bias::default());
        sub.bind_statistics(mean, Complex64::new(0.0, 0.0));
        let bias = match executor {
            Some(executor) => reduce_full(sub, executor)?,
            None => AccumulationTask::new(sub, true).call()?,
        };
        Complex64::new(bias, 0.0)
    } else {
        Complex64::new(0.0, 0.0)
    };
    tracing::trace!(op = op.name(), mean = mean.re, bias = bias.re, "statistics bound");
    op.bind_statistics(mean, bias);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{Sum, Variance};
    use approx::assert_relative_eq;
    use ndengine_traits::Ordering;

    fn arange(shape: &[usize]) -> NdArray {
        let len: usize = shape.iter().product();
        NdArray::from_vec(
            (1..=len).map(|i| i as f64).collect(),
            shape,
            Ordering::RowMajor,
        )
        .unwrap()
    }

    #[test]
    fn test_direct_task() {
        let op = Accumulation::new(arange(&[2, 3]), Sum).unwrap();
        assert_eq!(AccumulationTask::new(op, true).call().unwrap(), 21.0);
    }

    #[test]
    fn test_via_tensor_matches_direct() {
        let exec = TaskExecutor::new(Some(2), 0).unwrap();
        let x = arange(&[4, 5, 3]).permute(&[2, 0, 1]).unwrap();
        assert!(x.element_wise_stride().is_none());
        let op = Accumulation::new(x, Sum).unwrap();
        let total = AccumulationViaTensorTask::new(op, exec).call().unwrap();
        assert_eq!(total, (60 * 61 / 2) as f64);
    }

    #[test]
    fn test_variance_prepares_statistics_inline() {
        let op = Accumulation::new(arange(&[4]), Variance::new(true)).unwrap();
        let var = AccumulationTask::new(op, true).call().unwrap();
        assert_relative_eq!(var, 5.0 / 3.0);
    }

    #[test]
    fn test_along_dimension_writes_reduced_shape() {
        let exec = TaskExecutor::new(Some(2), 0).unwrap();
        let op = Accumulation::new(arange(&[2, 3]), Sum).unwrap();
        let z = AccumulationAlongDimensionTask::new(op, &[0], exec).call().unwrap();
        assert_eq!(z.shape(), &[3]);
        assert_eq!(z.to_vec::<f64>().unwrap(), vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_along_dimension_rejects_wrong_output() {
        let exec = TaskExecutor::new(Some(1), 0).unwrap();
        let z = NdArray::from_vec(vec![0.0f64; 4], &[4], Ordering::RowMajor).unwrap();
        let op = Accumulation::new(arange(&[2, 3]), Sum).unwrap().with_z(z);
        assert!(AccumulationAlongDimensionTask::new(op, &[1], exec).call().is_err());
    }
}

//! Op execution.
//!
//! [`OpExecutioner`] picks the task for each op kind through its
//! [`TaskFactory`], runs the coordinator in the calling thread and records
//! the final result on the op.

use ndengine_view::NdArray;
use num_complex::Complex64;
use rayon::prelude::*;

use crate::op::{
    Accumulation, AccumulationRule, Bias, ElementwiseRule, IndexAccumulation,
    IndexAccumulationRule, Mean, Op, Prerequisite, Scalar, TransformOp, VectorOp,
};
use crate::task::{prepare_statistics, CpuTaskFactory, Task, TaskExecutor, TaskFactory};
use crate::{EngineError, Result};

/// Runs ops on one shared executor.
#[derive(Debug, Clone)]
pub struct OpExecutioner {
    factory: CpuTaskFactory,
}

impl OpExecutioner {
    pub fn new(executor: TaskExecutor) -> Self {
        Self {
            factory: CpuTaskFactory::new(executor),
        }
    }

    pub fn executor(&self) -> &TaskExecutor {
        self.factory.executor()
    }

    pub fn factory(&self) -> &CpuTaskFactory {
        &self.factory
    }

    /// Full reduction of `op` to one value.
    ///
    /// Rules depending on a mean or bias get those bound first by complete
    /// reductions over the same operand.
    #[tracing::instrument(skip_all, fields(op = op.name(), n = op.n()))]
    pub fn exec_accumulation<R: AccumulationRule>(&self, op: &mut Accumulation<R>) -> Result<f64> {
        if op.needs_statistics() {
            prepare_statistics(op, Some(self.executor()))?;
        }
        let result = self.factory.create_accumulation_task(op.clone()).call()?;
        op.set_final_result(result);
        Ok(result)
    }

    /// Reduction of each tensor along `dims`; the output has `x`'s shape with
    /// `dims` removed. An empty `dims` reduces over every axis.
    #[tracing::instrument(skip_all, fields(op = op.name(), dims = ?dims))]
    pub fn exec_accumulation_along<R: AccumulationRule>(
        &self,
        op: &Accumulation<R>,
        dims: &[usize],
    ) -> Result<NdArray> {
        let dims = all_if_empty(op.x(), dims);
        self.factory
            .create_accumulation_along_dimension_task(op.clone(), &dims)
            .call()
    }

    #[tracing::instrument(skip_all, fields(op = op.name(), n = op.n()))]
    pub fn exec_index_accumulation<R: IndexAccumulationRule>(
        &self,
        op: &mut IndexAccumulation<R>,
    ) -> Result<Option<(usize, f64)>> {
        let result = self
            .factory
            .create_index_accumulation_task(op.clone())
            .call()?;
        op.set_final_result(result);
        Ok(result)
    }

    #[tracing::instrument(skip_all, fields(op = op.name(), dims = ?dims))]
    pub fn exec_index_accumulation_along<R: IndexAccumulationRule>(
        &self,
        op: &IndexAccumulation<R>,
        dims: &[usize],
    ) -> Result<NdArray> {
        let dims = all_if_empty(op.x(), dims);
        self.factory
            .create_index_accumulation_along_dimension_task(op.clone(), &dims)
            .call()
    }

    /// Runs `op` and returns its output view.
    #[tracing::instrument(skip_all, fields(op = op.name(), n = op.n()))]
    pub fn exec_transform<R: ElementwiseRule>(&self, op: TransformOp<R>) -> Result<NdArray> {
        let z = op.output().clone();
        self.factory.create_transform_task(op).call()?;
        Ok(z)
    }

    #[tracing::instrument(skip_all, fields(op = op.name(), dims = ?dims))]
    pub fn exec_transform_along<R: ElementwiseRule>(
        &self,
        op: TransformOp<R>,
        dims: &[usize],
    ) -> Result<NdArray> {
        let z = op.output().clone();
        self.factory
            .create_transform_along_dimension_task(op, dims)
            .call()?;
        Ok(z)
    }

    #[tracing::instrument(skip_all, fields(op = op.name(), n = op.n()))]
    pub fn exec_scalar(&self, op: TransformOp<Scalar>) -> Result<NdArray> {
        let z = op.output().clone();
        self.factory.create_scalar_task(op).call()?;
        Ok(z)
    }

    #[tracing::instrument(skip_all, fields(op = op.name(), dimension = op.dimension()))]
    pub fn exec_vector(&self, op: VectorOp) -> Result<NdArray> {
        let z = op.output().clone();
        self.factory.create_vector_task(op).call()?;
        Ok(z)
    }

    /// Full complex reduction of `x` (paired with `y` for two-operand rules).
    ///
    /// Operands hold interleaved `(re, im)` pairs in their own ordering.
    #[tracing::instrument(skip_all, fields(op = rule.name(), n = x.len() / 2))]
    pub fn exec_complex_accumulation<R: AccumulationRule>(
        &self,
        rule: &R,
        x: &NdArray,
        y: Option<&NdArray>,
    ) -> Result<Complex64> {
        if rule.requires_y() && y.is_none() {
            return Err(EngineError::MissingOperand {
                op: rule.name(),
                operand: "y",
            });
        }
        let xs = complex_values(x)?;
        let ys = y.map(complex_values).transpose()?;
        if let Some(ys) = &ys {
            if ys.len() != xs.len() {
                return Err(EngineError::ShapeMismatch(
                    x.shape().to_vec(),
                    y.map(|y| y.shape().to_vec()).unwrap_or_default(),
                ));
            }
        }
        let n = xs.len();

        let mut rule = rule.clone();
        let prerequisite = rule.prerequisite();
        if prerequisite != Prerequisite::None {
            let mean = Mean.finalize_complex(self.fold_complex(&Mean, &xs, None), n);
            let bias = if prerequisite == Prerequisite::MeanAndBias {
                let bias = Bias { mean };
                bias.finalize_complex(self.fold_complex(&bias, &xs, None), n)
            } else {
                Complex64::new(0.0, 0.0)
            };
            rule.bind_statistics(mean, bias);
        }
        let acc = self.fold_complex(&rule, &xs, ys.as_deref());
        Ok(rule.finalize_complex(acc, n))
    }

    /// Unfinalized complex accumulator, split into one chunk per worker when
    /// the input reaches the parallel threshold.
    fn fold_complex<R: AccumulationRule>(
        &self,
        rule: &R,
        xs: &[Complex64],
        ys: Option<&[Complex64]>,
    ) -> Complex64 {
        let executor = self.executor();
        let chunk = xs.len().div_ceil(executor.num_threads()).max(1);
        let fold = |(i, part): (usize, &[Complex64])| -> Complex64 {
            let start = i * chunk;
            part.iter()
                .enumerate()
                .fold(rule.zero_complex(), |acc, (j, &x)| match ys {
                    Some(ys) => rule.update_complex_pair(acc, x, ys[start + j]),
                    None => rule.update_complex(acc, x),
                })
        };
        if !executor.should_dispatch(xs.len()) {
            return fold((0, xs));
        }
        tracing::debug!(chunks = xs.len().div_ceil(chunk), "parallel complex reduction");
        executor.install(|| {
            xs.par_chunks(chunk)
                .enumerate()
                .map(&fold)
                .reduce(|| rule.zero_complex(), |a, b| rule.combine_complex(a, b))
        })
    }
}

fn all_if_empty(x: &NdArray, dims: &[usize]) -> Vec<usize> {
    if dims.is_empty() {
        (0..x.rank()).collect()
    } else {
        dims.to_vec()
    }
}

fn complex_values(x: &NdArray) -> Result<Vec<Complex64>> {
    if x.len() % 2 != 0 {
        return Err(EngineError::Unsupported(format!(
            "complex operand needs interleaved pairs, got {} elements",
            x.len()
        )));
    }
    Ok(x.to_vec::<f64>()?
        .chunks_exact(2)
        .map(|c| Complex64::new(c[0], c[1]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{Dot, IMin, Max, Norm2, Pairwise, ScalarKind, Sum, Unary, Variance};
    use approx::assert_relative_eq;
    use ndengine_traits::Ordering;

    fn exec(threshold: usize) -> OpExecutioner {
        OpExecutioner::new(TaskExecutor::new(Some(2), threshold).unwrap())
    }

    fn matrix() -> NdArray {
        NdArray::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], &[2, 2], Ordering::RowMajor).unwrap()
    }

    #[test]
    fn test_accumulation_records_final_result() {
        let ex = exec(1 << 15);
        let mut op = Accumulation::new(matrix(), Sum).unwrap();
        assert_eq!(ex.exec_accumulation(&mut op).unwrap(), 10.0);
        assert_eq!(op.final_result(), Some(10.0));
    }

    #[test]
    fn test_variance_on_transposed_view() {
        let ex = exec(0);
        let mut op = Accumulation::new(matrix().transpose(), Variance::new(true)).unwrap();
        assert_relative_eq!(ex.exec_accumulation(&mut op).unwrap(), 5.0 / 3.0);
        let mut op = Accumulation::new(matrix(), Variance::new(false)).unwrap();
        assert_relative_eq!(ex.exec_accumulation(&mut op).unwrap(), 1.25);
    }

    #[test]
    fn test_accumulation_along_empty_dims_reduces_all() {
        let ex = exec(0);
        let op = Accumulation::new(matrix(), Max).unwrap();
        let z = ex.exec_accumulation_along(&op, &[]).unwrap();
        assert_eq!(z.len(), 1);
        assert_eq!(z.to_vec::<f64>().unwrap(), vec![4.0]);
    }

    #[test]
    fn test_index_accumulation() {
        let ex = exec(0);
        let mut op = IndexAccumulation::new(matrix(), IMin);
        assert_eq!(ex.exec_index_accumulation(&mut op).unwrap(), Some((0, 1.0)));
        assert_eq!(op.final_result(), Some((0, 1.0)));
        let z = ex.exec_index_accumulation_along(&op, &[0]).unwrap();
        assert_eq!(z.to_vec::<f64>().unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_transform_scalar_and_vector() {
        let ex = exec(0);
        let x = matrix();
        let z = ex
            .exec_transform(TransformOp::new(x.clone(), Unary::Sqrt).unwrap())
            .unwrap();
        assert_relative_eq!(z.get::<f64>(&[1, 1]).unwrap(), 2.0);

        ex.exec_scalar(TransformOp::new(x.clone(), Scalar::new(ScalarKind::Set, 1.0)).unwrap())
            .unwrap();
        assert_eq!(x.to_vec::<f64>().unwrap(), vec![1.0; 4]);

        let row = NdArray::from_vec(vec![1.0f64, 2.0], &[2], Ordering::RowMajor).unwrap();
        ex.exec_vector(VectorOp::new(x.clone(), row, 1, Pairwise::Add).unwrap())
            .unwrap();
        assert_eq!(x.to_vec::<f64>().unwrap(), vec![2.0, 3.0, 2.0, 3.0]);
    }

    #[test]
    fn test_complex_accumulation() {
        // [3+4i, 0+0i]
        let x = NdArray::from_vec(vec![3.0f64, 4.0, 0.0, 0.0], &[4], Ordering::RowMajor).unwrap();
        for threshold in [0, 1 << 15] {
            let ex = exec(threshold);
            assert_eq!(
                ex.exec_complex_accumulation(&Sum, &x, None).unwrap(),
                Complex64::new(3.0, 4.0)
            );
            assert_relative_eq!(ex.exec_complex_accumulation(&Norm2, &x, None).unwrap().re, 5.0);
        }
    }

    #[test]
    fn test_complex_variance_and_dot() {
        let ex = exec(0);
        // [1+1i, 3+1i]: mean 2+1i, squared deviations 1 each.
        let x = NdArray::from_vec(vec![1.0f64, 1.0, 3.0, 1.0], &[4], Ordering::RowMajor).unwrap();
        let var = ex
            .exec_complex_accumulation(&Variance::new(false), &x, None)
            .unwrap();
        assert_relative_eq!(var.re, 1.0);

        assert!(ex.exec_complex_accumulation(&Dot, &x, None).is_err());
        let odd = NdArray::from_vec(vec![1.0f64; 3], &[3], Ordering::RowMajor).unwrap();
        assert!(ex.exec_complex_accumulation(&Sum, &odd, None).is_err());
    }
}

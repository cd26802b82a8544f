//! Array factory and entry point for the common ops.

use std::sync::Arc;

use ndengine_buffer::DataBuffer;
use ndengine_traits::{DataType, Element, Ordering};
use ndengine_view::NdArray;
use num_complex::Complex64;

use crate::blas::{self, NaiveBlas};
use crate::config::EngineConfig;
use crate::exec::OpExecutioner;
use crate::op::{
    Accumulation, AccumulationRule, ElementwiseRule, EuclideanDistance, IndexAccumulation,
    IndexAccumulationRule, Mean, Pairwise, Scalar, ScalarKind, StandardDeviation, Sum,
    TransformOp, Variance, VectorOp,
};
use crate::task::TaskExecutor;
use crate::{EngineError, Result};

/// Configuration plus the worker pool shared by every op it runs.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    exec: OpExecutioner,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let executor = TaskExecutor::new(config.num_threads, config.parallel_threshold)?;
        Ok(Self {
            config,
            exec: OpExecutioner::new(executor),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executioner(&self) -> &OpExecutioner {
        &self.exec
    }

    // ------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------

    /// Zero-filled array with the configured dtype, ordering and allocation.
    pub fn zeros(&self, shape: &[usize]) -> NdArray {
        self.create(shape, self.config.dtype)
    }

    pub fn create(&self, shape: &[usize], dtype: DataType) -> NdArray {
        NdArray::create(shape, dtype, self.config.ordering, self.config.allocation)
    }

    /// Array over `data` in the configured allocation mode.
    pub fn from_vec<T: Element>(
        &self,
        data: Vec<T>,
        shape: &[usize],
        ordering: Ordering,
    ) -> Result<NdArray> {
        let len: usize = shape.iter().product();
        if len != data.len() {
            return Err(EngineError::ShapeMismatch(
                shape.to_vec(),
                vec![data.len()],
            ));
        }
        let buffer = Arc::new(DataBuffer::from_vec(data, self.config.allocation));
        Ok(NdArray::from_buffer(buffer, shape, ordering)?)
    }

    /// `num` evenly spaced values from `lower` to `upper` inclusive.
    pub fn linspace(&self, lower: f64, upper: f64, num: usize) -> Result<NdArray> {
        let step = if num > 1 {
            (upper - lower) / (num - 1) as f64
        } else {
            0.0
        };
        let values: Vec<f64> = (0..num).map(|i| lower + step * i as f64).collect();
        self.from_slice(&values, &[num])
    }

    /// Rank-0 array holding `value`.
    pub fn scalar(&self, value: f64) -> Result<NdArray> {
        self.from_slice(&[value], &[])
    }

    fn from_slice(&self, values: &[f64], shape: &[usize]) -> Result<NdArray> {
        let buffer = DataBuffer::from_slice(values, self.config.dtype, self.config.allocation);
        Ok(NdArray::from_buffer(
            Arc::new(buffer),
            shape,
            self.config.ordering,
        )?)
    }

    /// Fresh output shaped like `x`; integer inputs produce doubles.
    fn output_like(&self, x: &NdArray) -> NdArray {
        let dtype = match x.dtype() {
            DataType::Int => DataType::Double,
            other => other,
        };
        NdArray::create(x.shape(), dtype, x.ordering(), self.config.allocation)
    }

    // ------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------

    /// Buffer equality within the configured `eps_threshold`.
    pub fn buffers_equal(&self, a: &DataBuffer, b: &DataBuffer) -> bool {
        a.approx_eq(b, self.config.eps_threshold)
    }

    /// Element-by-index equality within the configured `eps_threshold`.
    /// Arrays of different shapes are unequal; storage layout is ignored.
    pub fn arrays_equal(&self, x: &NdArray, y: &NdArray) -> Result<bool> {
        if x.shape() != y.shape() {
            return Ok(false);
        }
        let eps = self.config.eps_threshold;
        let (xs, ys) = (x.buffer().reader()?, y.buffer().reader()?);
        let ordering = x.ordering();
        Ok(x.offsets_in(ordering)
            .zip(y.offsets_in(ordering))
            .all(|(px, py)| (xs.read::<f64>(px) - ys.read::<f64>(py)).abs() <= eps))
    }

    // ------------------------------------------------------------------
    // Reductions
    // ------------------------------------------------------------------

    pub fn reduce<R: AccumulationRule>(&self, x: &NdArray, rule: R) -> Result<f64> {
        let mut op = Accumulation::new(x.clone(), rule)?;
        self.exec.exec_accumulation(&mut op)
    }

    pub fn reduce_pair<R: AccumulationRule>(&self, x: &NdArray, y: &NdArray, rule: R) -> Result<f64> {
        let mut op = Accumulation::with_y(x.clone(), y.clone(), rule)?;
        self.exec.exec_accumulation(&mut op)
    }

    /// One value per tensor along `dims`, shaped like `x` without `dims`.
    pub fn reduce_along<R: AccumulationRule>(
        &self,
        x: &NdArray,
        rule: R,
        dims: &[usize],
    ) -> Result<NdArray> {
        let op = Accumulation::new(x.clone(), rule)?;
        self.exec.exec_accumulation_along(&op, dims)
    }

    pub fn sum(&self, x: &NdArray) -> Result<f64> {
        self.reduce(x, Sum)
    }

    pub fn sum_along(&self, x: &NdArray, dims: &[usize]) -> Result<NdArray> {
        self.reduce_along(x, Sum, dims)
    }

    pub fn mean(&self, x: &NdArray) -> Result<f64> {
        self.reduce(x, Mean)
    }

    pub fn mean_along(&self, x: &NdArray, dims: &[usize]) -> Result<NdArray> {
        self.reduce_along(x, Mean, dims)
    }

    pub fn var(&self, x: &NdArray, bias_corrected: bool) -> Result<f64> {
        self.reduce(x, Variance::new(bias_corrected))
    }

    pub fn var_along(&self, x: &NdArray, bias_corrected: bool, dims: &[usize]) -> Result<NdArray> {
        self.reduce_along(x, Variance::new(bias_corrected), dims)
    }

    pub fn std(&self, x: &NdArray, bias_corrected: bool) -> Result<f64> {
        self.reduce(x, StandardDeviation::new(bias_corrected))
    }

    pub fn euclidean_distance(&self, x: &NdArray, y: &NdArray) -> Result<f64> {
        self.reduce_pair(x, y, EuclideanDistance)
    }

    /// Complex reduction over interleaved `(re, im)` operands.
    pub fn reduce_complex<R: AccumulationRule>(
        &self,
        x: &NdArray,
        y: Option<&NdArray>,
        rule: R,
    ) -> Result<Complex64> {
        self.exec.exec_complex_accumulation(&rule, x, y)
    }

    /// Winning `(linear position, value)`, or `None` for an empty `x`.
    pub fn index_reduce<R: IndexAccumulationRule>(
        &self,
        x: &NdArray,
        rule: R,
    ) -> Result<Option<(usize, f64)>> {
        let mut op = IndexAccumulation::new(x.clone(), rule);
        self.exec.exec_index_accumulation(&mut op)
    }

    /// Winning position within each tensor along `dims`.
    pub fn index_reduce_along<R: IndexAccumulationRule>(
        &self,
        x: &NdArray,
        rule: R,
        dims: &[usize],
    ) -> Result<NdArray> {
        let op = IndexAccumulation::new(x.clone(), rule);
        self.exec.exec_index_accumulation_along(&op, dims)
    }

    // ------------------------------------------------------------------
    // Element-wise
    // ------------------------------------------------------------------

    /// `rule` applied to each element of `x`, into a new array.
    pub fn transform<R: ElementwiseRule>(&self, x: &NdArray, rule: R) -> Result<NdArray> {
        let op = TransformOp::new(x.clone(), rule)?.with_z(self.output_like(x))?;
        self.exec.exec_transform(op)
    }

    pub fn transform_in_place<R: ElementwiseRule>(&self, x: &NdArray, rule: R) -> Result<()> {
        self.exec.exec_transform(TransformOp::new(x.clone(), rule)?)?;
        Ok(())
    }

    pub fn pairwise(&self, x: &NdArray, y: &NdArray, rule: Pairwise) -> Result<NdArray> {
        let op = TransformOp::pairwise(x.clone(), y.clone(), rule)?.with_z(self.output_like(x))?;
        self.exec.exec_transform(op)
    }

    pub fn scalar_op(&self, x: &NdArray, kind: ScalarKind, value: f64) -> Result<NdArray> {
        let op = TransformOp::new(x.clone(), Scalar::new(kind, value))?.with_z(self.output_like(x))?;
        self.exec.exec_scalar(op)
    }

    /// `x op y` with `y` repeated along every axis but `dimension`.
    pub fn broadcast(
        &self,
        x: &NdArray,
        y: &NdArray,
        dimension: usize,
        rule: Pairwise,
    ) -> Result<NdArray> {
        let z = self.output_like(x);
        let op = VectorOp::new(x.clone(), y.clone(), dimension, rule)?.with_z(z)?;
        self.exec.exec_vector(op)
    }

    // ------------------------------------------------------------------
    // BLAS
    // ------------------------------------------------------------------

    pub fn dot(&self, x: &NdArray, y: &NdArray) -> Result<f64> {
        blas::dot(&NaiveBlas, x, y)
    }

    /// `y += alpha * x`
    pub fn axpy(&self, alpha: f64, x: &NdArray, y: &NdArray) -> Result<()> {
        blas::axpy(&NaiveBlas, alpha, x, y)
    }

    /// Matrix product of `a (m x k)` and `b (k x n)` into a new `m x n` array.
    pub fn gemm(&self, a: &NdArray, b: &NdArray) -> Result<NdArray> {
        let (m, n) = match (a.shape(), b.shape()) {
            ([m, _], [_, n]) => (*m, *n),
            _ => {
                return Err(EngineError::ShapeMismatch(
                    a.shape().to_vec(),
                    b.shape().to_vec(),
                ))
            }
        };
        let c = self.zeros(&[m, n]);
        self.gemm_into(1.0, a, b, 0.0, &c)?;
        Ok(c)
    }

    /// `c = alpha * a * b + beta * c`
    pub fn gemm_into(
        &self,
        alpha: f64,
        a: &NdArray,
        b: &NdArray,
        beta: f64,
        c: &NdArray,
    ) -> Result<()> {
        blas::gemm(&NaiveBlas, alpha, a, b, beta, c)
    }
}

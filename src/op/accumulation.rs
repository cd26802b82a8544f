//! Reduction op kinds.

use ndengine_view::NdArray;
use num_complex::Complex64;

use super::{AccumulationRule, IndexAccumulationRule, Op, Prerequisite};
use crate::{EngineError, Result};

/// A reduction of `x` (paired with `y` for two-operand rules) by `rule`.
#[derive(Debug, Clone)]
pub struct Accumulation<R: AccumulationRule> {
    x: NdArray,
    y: Option<NdArray>,
    z: Option<NdArray>,
    rule: R,
    prepared: bool,
    final_result: Option<f64>,
}

impl<R: AccumulationRule> Accumulation<R> {
    pub fn new(x: NdArray, rule: R) -> Result<Self> {
        if rule.requires_y() {
            return Err(EngineError::MissingOperand {
                op: rule.name(),
                operand: "y",
            });
        }
        Ok(Self::from_parts(x, None, rule))
    }

    /// Two-operand reduction. `y` must hold as many elements as `x`; a `y` of
    /// a different shape is reshaped to `x`'s.
    pub fn with_y(x: NdArray, y: NdArray, rule: R) -> Result<Self> {
        if y.len() != x.len() {
            return Err(EngineError::ShapeMismatch(
                x.shape().to_vec(),
                y.shape().to_vec(),
            ));
        }
        let y = if y.shape() == x.shape() {
            y
        } else {
            y.reshape(x.shape())?.into_array()
        };
        Ok(Self::from_parts(x, Some(y), rule))
    }

    fn from_parts(x: NdArray, y: Option<NdArray>, rule: R) -> Self {
        let prepared = rule.prerequisite() == Prerequisite::None;
        Self {
            x,
            y,
            z: None,
            rule,
            prepared,
            final_result: None,
        }
    }

    /// Output for reductions along dimensions.
    pub fn with_z(mut self, z: NdArray) -> Self {
        self.z = Some(z);
        self
    }

    pub fn rule(&self) -> &R {
        &self.rule
    }

    /// Whether the rule still waits for its prerequisite statistics.
    pub fn needs_statistics(&self) -> bool {
        !self.prepared
    }

    pub fn bind_statistics(&mut self, mean: Complex64, bias: Complex64) {
        self.rule.bind_statistics(mean, bias);
        self.prepared = true;
    }

    /// The finalized result of the last full reduction.
    pub fn final_result(&self) -> Option<f64> {
        self.final_result
    }

    pub(crate) fn set_final_result(&mut self, value: f64) {
        self.final_result = Some(value);
    }

    /// A piece of this reduction: same rule and statistics, restricted to
    /// tensor `index` along `dims`. Partials of all pieces combine into the
    /// whole.
    pub fn slice(&self, index: usize, dims: &[usize]) -> Result<Self> {
        Ok(Self {
            x: self.x.tensor_along_dimension(index, dims)?,
            y: self
                .y
                .as_ref()
                .map(|y| y.tensor_along_dimension(index, dims))
                .transpose()?,
            z: None,
            rule: self.rule.clone(),
            prepared: self.prepared,
            final_result: None,
        })
    }

    /// Independent reduction of tensor `index` along `dims`.
    ///
    /// Rules with a prerequisite must recompute it over the sub-tensor.
    pub fn op_for_dimension(&self, index: usize, dims: &[usize]) -> Result<Self> {
        let mut op = self.slice(index, dims)?;
        op.prepared = op.rule.prerequisite() == Prerequisite::None;
        Ok(op)
    }

    /// A reduction of the same `x` under another rule.
    pub(crate) fn with_rule<S: AccumulationRule>(&self, rule: S) -> Accumulation<S> {
        Accumulation::from_parts(self.x.clone(), None, rule)
    }
}

impl<R: AccumulationRule> Op for Accumulation<R> {
    fn name(&self) -> &'static str {
        self.rule.name()
    }

    fn x(&self) -> &NdArray {
        &self.x
    }

    fn y(&self) -> Option<&NdArray> {
        self.y.as_ref()
    }

    fn z(&self) -> Option<&NdArray> {
        self.z.as_ref()
    }

    fn is_pass_through(&self) -> bool {
        self.rule.prerequisite() != Prerequisite::None
    }
}

/// A search over `x` for the element preferred by `rule`.
#[derive(Debug, Clone)]
pub struct IndexAccumulation<R: IndexAccumulationRule> {
    x: NdArray,
    z: Option<NdArray>,
    rule: R,
    final_result: Option<(usize, f64)>,
}

impl<R: IndexAccumulationRule> IndexAccumulation<R> {
    pub fn new(x: NdArray, rule: R) -> Self {
        Self {
            x,
            z: None,
            rule,
            final_result: None,
        }
    }

    pub fn with_z(mut self, z: NdArray) -> Self {
        self.z = Some(z);
        self
    }

    pub fn rule(&self) -> &R {
        &self.rule
    }

    /// Position (linear, in `x`'s ordering) and value of the winner.
    pub fn final_result(&self) -> Option<(usize, f64)> {
        self.final_result
    }

    pub(crate) fn set_final_result(&mut self, result: Option<(usize, f64)>) {
        self.final_result = result;
    }

    pub fn op_for_dimension(&self, index: usize, dims: &[usize]) -> Result<Self> {
        Ok(Self::new(
            self.x.tensor_along_dimension(index, dims)?,
            self.rule.clone(),
        ))
    }
}

impl<R: IndexAccumulationRule> Op for IndexAccumulation<R> {
    fn name(&self) -> &'static str {
        self.rule.name()
    }

    fn x(&self) -> &NdArray {
        &self.x
    }

    fn y(&self) -> Option<&NdArray> {
        None
    }

    fn z(&self) -> Option<&NdArray> {
        self.z.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{EuclideanDistance, IMax, Sum, Variance};
    use ndengine_traits::Ordering;

    fn matrix() -> NdArray {
        NdArray::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], Ordering::RowMajor)
            .unwrap()
    }

    #[test]
    fn test_requires_y() {
        let err = Accumulation::new(matrix(), EuclideanDistance).unwrap_err();
        assert!(matches!(err, EngineError::MissingOperand { operand: "y", .. }));
    }

    #[test]
    fn test_with_y_reshapes_same_length() {
        let y = NdArray::from_vec(vec![0.0f64; 6], &[6], Ordering::RowMajor).unwrap();
        let op = Accumulation::with_y(matrix(), y, EuclideanDistance).unwrap();
        assert_eq!(op.y().unwrap().shape(), &[2, 3]);

        let short = NdArray::from_vec(vec![0.0f64; 5], &[5], Ordering::RowMajor).unwrap();
        assert!(Accumulation::with_y(matrix(), short, EuclideanDistance).is_err());
    }

    #[test]
    fn test_op_for_dimension() {
        let op = Accumulation::new(matrix(), Sum).unwrap();
        let row = op.op_for_dimension(1, &[1]).unwrap();
        assert_eq!(row.n(), 3);
        assert_eq!(row.x().to_vec::<f64>().unwrap(), vec![4.0, 5.0, 6.0]);
        assert!(!op.is_pass_through());
    }

    #[test]
    fn test_statistics_reset_per_dimension() {
        let mut op = Accumulation::new(matrix(), Variance::new(true)).unwrap();
        assert!(op.is_pass_through());
        assert!(op.needs_statistics());
        op.bind_statistics(Complex64::new(3.5, 0.0), Complex64::new(0.0, 0.0));
        assert!(!op.needs_statistics());
        assert!(!op.slice(0, &[1]).unwrap().needs_statistics());
        assert!(op.op_for_dimension(0, &[1]).unwrap().needs_statistics());
    }

    #[test]
    fn test_index_op_for_dimension() {
        let op = IndexAccumulation::new(matrix(), IMax);
        let col = op.op_for_dimension(2, &[0]).unwrap();
        assert_eq!(col.x().to_vec::<f64>().unwrap(), vec![3.0, 6.0]);
        assert_eq!(col.name(), "imax");
    }
}

//! Element-wise op kinds.

use ndengine_view::NdArray;

use super::{ElementwiseRule, Op, Pairwise};
use crate::{EngineError, Result};

/// `z[i] = rule(x[i], y[i])`, pairing elements by linear position.
///
/// Without an explicit output the op writes into `x`.
#[derive(Debug, Clone)]
pub struct TransformOp<R: ElementwiseRule> {
    x: NdArray,
    y: Option<NdArray>,
    z: NdArray,
    rule: R,
}

impl<R: ElementwiseRule> TransformOp<R> {
    /// In-place unary transform (or scalar op) of `x`.
    pub fn new(x: NdArray, rule: R) -> Result<Self> {
        if rule.is_pairwise() {
            return Err(EngineError::MissingOperand {
                op: rule.name(),
                operand: "y",
            });
        }
        Ok(Self {
            z: x.clone(),
            x,
            y: None,
            rule,
        })
    }

    /// In-place pairwise transform `x = rule(x, y)`.
    pub fn pairwise(x: NdArray, y: NdArray, rule: R) -> Result<Self> {
        check_len(&x, &y)?;
        Ok(Self {
            z: x.clone(),
            x,
            y: Some(y),
            rule,
        })
    }

    /// Redirects the result into `z`, which must hold as many elements as `x`.
    pub fn with_z(mut self, z: NdArray) -> Result<Self> {
        check_len(&self.x, &z)?;
        self.z = z;
        Ok(self)
    }

    pub fn rule(&self) -> &R {
        &self.rule
    }

    pub fn output(&self) -> &NdArray {
        &self.z
    }

    /// The transform restricted to tensor `index` along `dims` of every operand.
    pub fn op_for_dimension(&self, index: usize, dims: &[usize]) -> Result<Self> {
        let sub = |a: &NdArray| -> Result<NdArray> {
            if a.shape() != self.x.shape() {
                return Err(EngineError::ShapeMismatch(
                    self.x.shape().to_vec(),
                    a.shape().to_vec(),
                ));
            }
            Ok(a.tensor_along_dimension(index, dims)?)
        };
        Ok(Self {
            x: self.x.tensor_along_dimension(index, dims)?,
            y: self.y.as_ref().map(sub).transpose()?,
            z: sub(&self.z)?,
            rule: self.rule,
        })
    }
}

fn check_len(x: &NdArray, other: &NdArray) -> Result<()> {
    if x.len() != other.len() {
        return Err(EngineError::ShapeMismatch(
            x.shape().to_vec(),
            other.shape().to_vec(),
        ));
    }
    Ok(())
}

impl<R: ElementwiseRule> Op for TransformOp<R> {
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
        Some(&self.z)
    }

    fn extra_args(&self) -> Vec<f64> {
        self.rule.extra_args()
    }
}

/// `z = rule(x, y)` where the vector `y` is broadcast along axis `dimension`
/// of `x`: every vector of `x` along that axis is combined with `y`.
#[derive(Debug, Clone)]
pub struct VectorOp {
    x: NdArray,
    y: NdArray,
    z: NdArray,
    dimension: usize,
    rule: Pairwise,
}

impl VectorOp {
    pub fn new(x: NdArray, y: NdArray, dimension: usize, rule: Pairwise) -> Result<Self> {
        let extent = x.size(dimension)?;
        if y.len() != extent {
            return Err(EngineError::ShapeMismatch(vec![extent], y.shape().to_vec()));
        }
        let y = y.linear_view()?.into_array();
        Ok(Self {
            z: x.clone(),
            x,
            y,
            dimension,
            rule,
        })
    }

    pub fn with_z(mut self, z: NdArray) -> Result<Self> {
        if z.shape() != self.x.shape() {
            return Err(EngineError::ShapeMismatch(
                self.x.shape().to_vec(),
                z.shape().to_vec(),
            ));
        }
        self.z = z;
        Ok(self)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn output(&self) -> &NdArray {
        &self.z
    }

    /// Number of vectors along the broadcast axis.
    pub fn tensor_count(&self) -> Result<usize> {
        Ok(self.x.tensors_along_dimension(&[self.dimension])?)
    }

    /// The pairwise transform of vector `index` with `y`.
    pub fn op_for_dimension(&self, index: usize) -> Result<TransformOp<Pairwise>> {
        let dims = [self.dimension];
        TransformOp::pairwise(
            self.x.vector_along_dimension(index, self.dimension)?,
            self.y.clone(),
            self.rule,
        )?
        .with_z(self.z.tensor_along_dimension(index, &dims)?)
    }
}

impl Op for VectorOp {
    fn name(&self) -> &'static str {
        self.rule.name()
    }

    fn x(&self) -> &NdArray {
        &self.x
    }

    fn y(&self) -> Option<&NdArray> {
        Some(&self.y)
    }

    fn z(&self) -> Option<&NdArray> {
        Some(&self.z)
    }
}

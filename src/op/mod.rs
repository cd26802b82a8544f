//! Op kinds and the rules that parameterize them.
//!
//! Four kinds cover every computation:
//! - [`Accumulation`]: reduction to one value per sub-tensor ([`AccumulationRule`])
//! - [`IndexAccumulation`]: reduction that also reports a position
//!   ([`IndexAccumulationRule`])
//! - [`TransformOp`]: element-wise map, including scalar ops ([`ElementwiseRule`])
//! - [`VectorOp`]: element-wise combination with a vector broadcast along one axis
//!
//! An op binds its operands once per invocation; `op_for_dimension` derives the
//! op scoped to one tensor along the given dimensions.

mod accumulation;
mod index;
mod pointwise;
mod reduce;
mod transform;

pub use accumulation::{Accumulation, IndexAccumulation};
pub use index::{IAMax, IAMin, IMax, IMin, IndexAccumulationRule, IndexReduction};
pub use pointwise::{ElementwiseRule, Pairwise, Scalar, ScalarKind, Unary};
pub use reduce::{
    AccumulationRule, Bias, Dot, EuclideanDistance, ManhattanDistance, Max, Mean, Min, Norm1,
    Norm2, NormMax, Prerequisite, Prod, Reduction, StandardDeviation, Sum, Variance,
};
pub use transform::{TransformOp, VectorOp};

use ndengine_view::NdArray;

/// Operands and arguments shared by every op kind.
pub trait Op {
    fn name(&self) -> &'static str;

    fn x(&self) -> &NdArray;

    fn y(&self) -> Option<&NdArray>;

    /// Output operand. Accumulations without one produce a scalar.
    fn z(&self) -> Option<&NdArray>;

    /// Logical element count.
    fn n(&self) -> usize {
        self.x().len()
    }

    fn extra_args(&self) -> Vec<f64> {
        Vec::new()
    }

    /// Whether the op drives its own multi-pass execution.
    fn is_pass_through(&self) -> bool {
        false
    }
}

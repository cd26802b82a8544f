//! Element-wise rules for transform, scalar and vector ops.

use std::fmt;

use ndengine_traits::Real;

/// A function applied independently to each element (and its partner in `y`
/// for pairwise rules).
pub trait ElementwiseRule: Copy + Send + Sync + fmt::Debug + 'static {
    fn name(&self) -> &'static str;

    /// Whether the rule reads a second operand.
    fn is_pairwise(&self) -> bool;

    /// Result for `x` and, for pairwise rules, `y`. Unary rules ignore `y`.
    fn apply<T: Real>(&self, x: T, y: T) -> T;

    fn extra_args(&self) -> Vec<f64> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Unary {
    Abs,
    Neg,
    Sqrt,
    Exp,
    Log,
    Tanh,
    Sigmoid,
    Sign,
    Pow(f64),
    Identity,
}

impl ElementwiseRule for Unary {
    fn name(&self) -> &'static str {
        match self {
            Unary::Abs => "abs",
            Unary::Neg => "neg",
            Unary::Sqrt => "sqrt",
            Unary::Exp => "exp",
            Unary::Log => "log",
            Unary::Tanh => "tanh",
            Unary::Sigmoid => "sigmoid",
            Unary::Sign => "sign",
            Unary::Pow(_) => "pow",
            Unary::Identity => "identity",
        }
    }

    fn is_pairwise(&self) -> bool {
        false
    }

    #[inline]
    fn apply<T: Real>(&self, x: T, _y: T) -> T {
        match *self {
            Unary::Abs => x.abs(),
            Unary::Neg => -x,
            Unary::Sqrt => x.sqrt(),
            Unary::Exp => x.exp(),
            Unary::Log => x.ln(),
            Unary::Tanh => x.tanh(),
            Unary::Sigmoid => T::one() / (T::one() + (-x).exp()),
            Unary::Sign => {
                if x > T::zero() {
                    T::one()
                } else if x < T::zero() {
                    -T::one()
                } else {
                    T::zero()
                }
            }
            Unary::Pow(e) => x.powf(T::narrow(e)),
            Unary::Identity => x,
        }
    }

    fn extra_args(&self) -> Vec<f64> {
        match self {
            Unary::Pow(e) => vec![*e],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pairwise {
    Add,
    Sub,
    Mul,
    Div,
    /// `y - x`
    RSub,
    /// `y / x`
    RDiv,
    Max,
    Min,
}

impl Pairwise {
    #[inline]
    fn eval<T: Real>(self, x: T, y: T) -> T {
        match self {
            Pairwise::Add => x + y,
            Pairwise::Sub => x - y,
            Pairwise::Mul => x * y,
            Pairwise::Div => x / y,
            Pairwise::RSub => y - x,
            Pairwise::RDiv => y / x,
            Pairwise::Max => x.max(y),
            Pairwise::Min => x.min(y),
        }
    }
}

impl ElementwiseRule for Pairwise {
    fn name(&self) -> &'static str {
        match self {
            Pairwise::Add => "add",
            Pairwise::Sub => "sub",
            Pairwise::Mul => "mul",
            Pairwise::Div => "div",
            Pairwise::RSub => "rsub",
            Pairwise::RDiv => "rdiv",
            Pairwise::Max => "max",
            Pairwise::Min => "min",
        }
    }

    fn is_pairwise(&self) -> bool {
        true
    }

    #[inline]
    fn apply<T: Real>(&self, x: T, y: T) -> T {
        self.eval(x, y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Add,
    Sub,
    Mul,
    Div,
    RSub,
    RDiv,
    Max,
    Min,
    /// Replace every element with the scalar.
    Set,
}

/// A [`ScalarKind`] bound to its scalar operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scalar {
    pub kind: ScalarKind,
    pub value: f64,
}

impl Scalar {
    pub fn new(kind: ScalarKind, value: f64) -> Self {
        Self { kind, value }
    }
}

impl ElementwiseRule for Scalar {
    fn name(&self) -> &'static str {
        match self.kind {
            ScalarKind::Add => "scalar_add",
            ScalarKind::Sub => "scalar_sub",
            ScalarKind::Mul => "scalar_mul",
            ScalarKind::Div => "scalar_div",
            ScalarKind::RSub => "scalar_rsub",
            ScalarKind::RDiv => "scalar_rdiv",
            ScalarKind::Max => "scalar_max",
            ScalarKind::Min => "scalar_min",
            ScalarKind::Set => "scalar_set",
        }
    }

    fn is_pairwise(&self) -> bool {
        false
    }

    #[inline]
    fn apply<T: Real>(&self, x: T, _y: T) -> T {
        let s = T::narrow(self.value);
        let pairwise = match self.kind {
            ScalarKind::Add => Pairwise::Add,
            ScalarKind::Sub => Pairwise::Sub,
            ScalarKind::Mul => Pairwise::Mul,
            ScalarKind::Div => Pairwise::Div,
            ScalarKind::RSub => Pairwise::RSub,
            ScalarKind::RDiv => Pairwise::RDiv,
            ScalarKind::Max => Pairwise::Max,
            ScalarKind::Min => Pairwise::Min,
            ScalarKind::Set => return s,
        };
        pairwise.eval(x, s)
    }

    fn extra_args(&self) -> Vec<f64> {
        vec![self.value]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unary() {
        assert_eq!(Unary::Abs.apply(-2.0f64, 0.0), 2.0);
        assert_eq!(Unary::Neg.apply(2.0f32, 0.0), -2.0);
        assert_eq!(Unary::Sign.apply(-0.5f64, 0.0), -1.0);
        assert_eq!(Unary::Sign.apply(0.0f64, 0.0), 0.0);
        assert_relative_eq!(Unary::Sigmoid.apply(0.0f64, 0.0), 0.5);
        assert_relative_eq!(Unary::Pow(3.0).apply(2.0f64, 0.0), 8.0);
        assert_eq!(Unary::Pow(3.0).extra_args(), vec![3.0]);
        assert!(!Unary::Exp.is_pairwise());
    }

    #[test]
    fn test_pairwise_reversed_forms() {
        assert_eq!(Pairwise::Sub.apply(5.0f64, 2.0), 3.0);
        assert_eq!(Pairwise::RSub.apply(5.0f64, 2.0), -3.0);
        assert_eq!(Pairwise::RDiv.apply(4.0f64, 2.0), 0.5);
        assert!(Pairwise::Add.is_pairwise());
    }

    #[test]
    fn test_scalar() {
        assert_eq!(Scalar::new(ScalarKind::Mul, 3.0).apply(2.0f64, 0.0), 6.0);
        assert_eq!(Scalar::new(ScalarKind::RDiv, 1.0).apply(4.0f64, 0.0), 0.25);
        assert_eq!(Scalar::new(ScalarKind::Set, 7.0).apply(4.0f64, 0.0), 7.0);
        assert_eq!(Scalar::new(ScalarKind::Max, 1.0).apply(-4.0f32, 0.0), 1.0);
    }
}

//! Accumulation rules.
//!
//! A rule supplies the per-element `update`, the associative `combine` used to
//! merge partial accumulators from independent sub-ranges, and the `finalize`
//! step applied exactly once after all partials are merged. Every rule also
//! defines the same three steps over complex values.

use std::fmt;

use ndengine_traits::Real;
use num_complex::Complex64;

/// Statistics a rule needs before its own pass can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    None,
    Mean,
    MeanAndBias,
}

/// Update, combine and finalize steps of a reduction.
pub trait AccumulationRule: Clone + Send + Sync + fmt::Debug + 'static {
    fn name(&self) -> &'static str;

    /// Identity of `combine`.
    fn zero<T: Real>(&self) -> T {
        T::zero()
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T;

    /// Update with the paired element of the second operand.
    fn update_pair<T: Real>(&self, acc: T, x: T, _y: T) -> T {
        self.update(acc, x)
    }

    fn combine<T: Real>(&self, a: T, b: T) -> T {
        a + b
    }

    /// Turns the fully combined accumulator over `n` elements into the result.
    fn finalize<T: Real>(&self, acc: T, _n: usize) -> T {
        acc
    }

    fn requires_y(&self) -> bool {
        false
    }

    fn prerequisite(&self) -> Prerequisite {
        Prerequisite::None
    }

    /// Supplies previously computed statistics. Ignored by rules without a
    /// prerequisite.
    fn bind_statistics(&mut self, _mean: Complex64, _bias: Complex64) {}

    fn zero_complex(&self) -> Complex64 {
        Complex64::new(self.zero::<f64>(), 0.0)
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64;

    fn update_complex_pair(&self, acc: Complex64, x: Complex64, _y: Complex64) -> Complex64 {
        self.update_complex(acc, x)
    }

    fn combine_complex(&self, a: Complex64, b: Complex64) -> Complex64 {
        a + b
    }

    fn finalize_complex(&self, acc: Complex64, _n: usize) -> Complex64 {
        acc
    }
}

#[inline]
fn count<T: Real>(n: usize) -> T {
    T::narrow(n as f64)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl AccumulationRule for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        acc + x
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        acc + x
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Prod;

impl AccumulationRule for Prod {
    fn name(&self) -> &'static str {
        "prod"
    }

    fn zero<T: Real>(&self) -> T {
        T::one()
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        acc * x
    }

    fn combine<T: Real>(&self, a: T, b: T) -> T {
        a * b
    }

    fn zero_complex(&self) -> Complex64 {
        Complex64::new(1.0, 0.0)
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        acc * x
    }

    fn combine_complex(&self, a: Complex64, b: Complex64) -> Complex64 {
        a * b
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

impl AccumulationRule for Mean {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        acc + x
    }

    fn finalize<T: Real>(&self, acc: T, n: usize) -> T {
        acc / count(n)
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        acc + x
    }

    fn finalize_complex(&self, acc: Complex64, n: usize) -> Complex64 {
        acc / n as f64
    }
}

/// Largest element. Complex values compare by magnitude.
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl AccumulationRule for Max {
    fn name(&self) -> &'static str {
        "max"
    }

    fn zero<T: Real>(&self) -> T {
        T::neg_infinity()
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        acc.max(x)
    }

    fn combine<T: Real>(&self, a: T, b: T) -> T {
        a.max(b)
    }

    fn zero_complex(&self) -> Complex64 {
        Complex64::new(0.0, 0.0)
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        if x.norm() > acc.norm() {
            x
        } else {
            acc
        }
    }

    fn combine_complex(&self, a: Complex64, b: Complex64) -> Complex64 {
        self.update_complex(a, b)
    }
}

/// Smallest element. Complex values compare by magnitude.
#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

impl AccumulationRule for Min {
    fn name(&self) -> &'static str {
        "min"
    }

    fn zero<T: Real>(&self) -> T {
        T::infinity()
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        acc.min(x)
    }

    fn combine<T: Real>(&self, a: T, b: T) -> T {
        a.min(b)
    }

    fn zero_complex(&self) -> Complex64 {
        Complex64::new(f64::INFINITY, 0.0)
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        if x.norm() < acc.norm() {
            x
        } else {
            acc
        }
    }

    fn combine_complex(&self, a: Complex64, b: Complex64) -> Complex64 {
        self.update_complex(a, b)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Norm1;

impl AccumulationRule for Norm1 {
    fn name(&self) -> &'static str {
        "norm1"
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        acc + x.abs()
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        acc + x.norm()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Norm2;

impl AccumulationRule for Norm2 {
    fn name(&self) -> &'static str {
        "norm2"
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        acc + x * x
    }

    fn finalize<T: Real>(&self, acc: T, _n: usize) -> T {
        acc.sqrt()
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        acc + x.norm_sqr()
    }

    fn finalize_complex(&self, acc: Complex64, _n: usize) -> Complex64 {
        Complex64::new(acc.re.sqrt(), 0.0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormMax;

impl AccumulationRule for NormMax {
    fn name(&self) -> &'static str {
        "normmax"
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        acc.max(x.abs())
    }

    fn combine<T: Real>(&self, a: T, b: T) -> T {
        a.max(b)
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        Complex64::new(acc.re.max(x.norm()), 0.0)
    }

    fn combine_complex(&self, a: Complex64, b: Complex64) -> Complex64 {
        Complex64::new(a.re.max(b.re), 0.0)
    }
}

/// Sum of deviations from a previously computed mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bias {
    pub mean: Complex64,
}

impl AccumulationRule for Bias {
    fn name(&self) -> &'static str {
        "bias"
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        acc + (x - T::narrow(self.mean.re))
    }

    fn prerequisite(&self) -> Prerequisite {
        Prerequisite::Mean
    }

    fn bind_statistics(&mut self, mean: Complex64, _bias: Complex64) {
        self.mean = mean;
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        acc + (x - self.mean)
    }
}

/// Two-pass variance around a previously computed mean.
///
/// With bias correction the result is `(acc - bias^2 / n) / (n - 1)`,
/// otherwise `acc / n`.
#[derive(Debug, Clone, Copy)]
pub struct Variance {
    pub mean: Complex64,
    pub bias: Complex64,
    pub bias_corrected: bool,
}

impl Default for Variance {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Variance {
    pub fn new(bias_corrected: bool) -> Self {
        Self {
            mean: Complex64::new(0.0, 0.0),
            bias: Complex64::new(0.0, 0.0),
            bias_corrected,
        }
    }
}

impl AccumulationRule for Variance {
    fn name(&self) -> &'static str {
        "var"
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        let d = x - T::narrow(self.mean.re);
        acc + d * d
    }

    fn finalize<T: Real>(&self, acc: T, n: usize) -> T {
        if self.bias_corrected {
            let bias = T::narrow(self.bias.re);
            (acc - bias * bias / count(n)) / (count::<T>(n) - T::one())
        } else {
            acc / count(n)
        }
    }

    fn prerequisite(&self) -> Prerequisite {
        Prerequisite::MeanAndBias
    }

    fn bind_statistics(&mut self, mean: Complex64, bias: Complex64) {
        self.mean = mean;
        self.bias = bias;
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        acc + (x - self.mean).norm_sqr()
    }

    fn finalize_complex(&self, acc: Complex64, n: usize) -> Complex64 {
        let n = n as f64;
        if self.bias_corrected {
            (acc - self.bias.norm_sqr() / n) / (n - 1.0)
        } else {
            acc / n
        }
    }
}

/// Square root of [`Variance`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDeviation(pub Variance);

impl StandardDeviation {
    pub fn new(bias_corrected: bool) -> Self {
        Self(Variance::new(bias_corrected))
    }
}

impl AccumulationRule for StandardDeviation {
    fn name(&self) -> &'static str {
        "std"
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        self.0.update(acc, x)
    }

    fn finalize<T: Real>(&self, acc: T, n: usize) -> T {
        self.0.finalize(acc, n).sqrt()
    }

    fn prerequisite(&self) -> Prerequisite {
        Prerequisite::MeanAndBias
    }

    fn bind_statistics(&mut self, mean: Complex64, bias: Complex64) {
        self.0.bind_statistics(mean, bias);
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        self.0.update_complex(acc, x)
    }

    fn finalize_complex(&self, acc: Complex64, n: usize) -> Complex64 {
        self.0.finalize_complex(acc, n).sqrt()
    }
}

/// Distance `sqrt(sum((x - y)^2))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl AccumulationRule for EuclideanDistance {
    fn name(&self) -> &'static str {
        "euclidean"
    }

    fn update<T: Real>(&self, acc: T, _x: T) -> T {
        acc
    }

    fn update_pair<T: Real>(&self, acc: T, x: T, y: T) -> T {
        let d = x - y;
        acc + d * d
    }

    fn finalize<T: Real>(&self, acc: T, _n: usize) -> T {
        acc.sqrt()
    }

    fn requires_y(&self) -> bool {
        true
    }

    fn update_complex(&self, acc: Complex64, _x: Complex64) -> Complex64 {
        acc
    }

    fn update_complex_pair(&self, acc: Complex64, x: Complex64, y: Complex64) -> Complex64 {
        acc + (x - y).norm_sqr()
    }

    fn finalize_complex(&self, acc: Complex64, _n: usize) -> Complex64 {
        Complex64::new(acc.re.sqrt(), 0.0)
    }
}

/// Distance `sum(|x - y|)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManhattanDistance;

impl AccumulationRule for ManhattanDistance {
    fn name(&self) -> &'static str {
        "manhattan"
    }

    fn update<T: Real>(&self, acc: T, _x: T) -> T {
        acc
    }

    fn update_pair<T: Real>(&self, acc: T, x: T, y: T) -> T {
        acc + (x - y).abs()
    }

    fn requires_y(&self) -> bool {
        true
    }

    fn update_complex(&self, acc: Complex64, _x: Complex64) -> Complex64 {
        acc
    }

    fn update_complex_pair(&self, acc: Complex64, x: Complex64, y: Complex64) -> Complex64 {
        acc + (x - y).norm()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Dot;

impl AccumulationRule for Dot {
    fn name(&self) -> &'static str {
        "dot"
    }

    fn update<T: Real>(&self, acc: T, _x: T) -> T {
        acc
    }

    fn update_pair<T: Real>(&self, acc: T, x: T, y: T) -> T {
        acc + x * y
    }

    fn requires_y(&self) -> bool {
        true
    }

    fn update_complex(&self, acc: Complex64, _x: Complex64) -> Complex64 {
        acc
    }

    fn update_complex_pair(&self, acc: Complex64, x: Complex64, y: Complex64) -> Complex64 {
        acc + x * y
    }
}

/// Any built-in accumulation rule, selected at runtime.
#[derive(Debug, Clone, Copy)]
pub enum Reduction {
    Sum(Sum),
    Prod(Prod),
    Mean(Mean),
    Max(Max),
    Min(Min),
    Norm1(Norm1),
    Norm2(Norm2),
    NormMax(NormMax),
    Bias(Bias),
    Variance(Variance),
    StandardDeviation(StandardDeviation),
    EuclideanDistance(EuclideanDistance),
    ManhattanDistance(ManhattanDistance),
    Dot(Dot),
}

macro_rules! dispatch {
    ($self:expr, $rule:ident => $body:expr) => {
        match $self {
            Reduction::Sum($rule) => $body,
            Reduction::Prod($rule) => $body,
            Reduction::Mean($rule) => $body,
            Reduction::Max($rule) => $body,
            Reduction::Min($rule) => $body,
            Reduction::Norm1($rule) => $body,
            Reduction::Norm2($rule) => $body,
            Reduction::NormMax($rule) => $body,
            Reduction::Bias($rule) => $body,
            Reduction::Variance($rule) => $body,
            Reduction::StandardDeviation($rule) => $body,
            Reduction::EuclideanDistance($rule) => $body,
            Reduction::ManhattanDistance($rule) => $body,
            Reduction::Dot($rule) => $body,
        }
    };
}

impl AccumulationRule for Reduction {
    fn name(&self) -> &'static str {
        dispatch!(self, r => r.name())
    }

    fn zero<T: Real>(&self) -> T {
        dispatch!(self, r => r.zero())
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        dispatch!(self, r => r.update(acc, x))
    }

    fn update_pair<T: Real>(&self, acc: T, x: T, y: T) -> T {
        dispatch!(self, r => r.update_pair(acc, x, y))
    }

    fn combine<T: Real>(&self, a: T, b: T) -> T {
        dispatch!(self, r => r.combine(a, b))
    }

    fn finalize<T: Real>(&self, acc: T, n: usize) -> T {
        dispatch!(self, r => r.finalize(acc, n))
    }

    fn requires_y(&self) -> bool {
        dispatch!(self, r => r.requires_y())
    }

    fn prerequisite(&self) -> Prerequisite {
        dispatch!(self, r => r.prerequisite())
    }

    fn bind_statistics(&mut self, mean: Complex64, bias: Complex64) {
        dispatch!(self, r => r.bind_statistics(mean, bias))
    }

    fn zero_complex(&self) -> Complex64 {
        dispatch!(self, r => r.zero_complex())
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        dispatch!(self, r => r.update_complex(acc, x))
    }

    fn update_complex_pair(&self, acc: Complex64, x: Complex64, y: Complex64) -> Complex64 {
        dispatch!(self, r => r.update_complex_pair(acc, x, y))
    }

    fn combine_complex(&self, a: Complex64, b: Complex64) -> Complex64 {
        dispatch!(self, r => r.combine_complex(a, b))
    }

    fn finalize_complex(&self, acc: Complex64, n: usize) -> Complex64 {
        dispatch!(self, r => r.finalize_complex(acc, n))
    }
}

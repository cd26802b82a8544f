//! Strided loops over views.
//!
//! Every loop first asks whether its operands can be walked as flat runs with
//! a fixed stride each; otherwise it falls back to incremental offset
//! iteration in a common ordering. Elements are paired by linear position.
//!
//! Loops read through one buffer guard per operand and touch only the
//! positions their view covers, so a sub-task over one tensor of a large
//! buffer costs the size of that tensor.

use ndengine_traits::{DataType, Real};
use ndengine_view::{can_do_directly, NdArray, OffsetIter};

use crate::op::{AccumulationRule, ElementwiseRule, IndexAccumulationRule};
use crate::Result;

/// Runs `$body` with `$T` bound to the compute type for `$dtype`: `f32` for
/// single precision, `f64` for everything else.
macro_rules! with_compute_type {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            ndengine_traits::DataType::Float => {
                type $T = f32;
                $body
            }
            ndengine_traits::DataType::Double | ndengine_traits::DataType::Int => {
                type $T = f64;
                $body
            }
        }
    };
}

pub(crate) use with_compute_type;

/// Single precision only when every operand is single precision.
pub(crate) fn compute_dtype(arrays: &[&NdArray]) -> DataType {
    if arrays.iter().all(|a| a.dtype() == DataType::Float) {
        DataType::Float
    } else {
        DataType::Double
    }
}

/// Buffer positions of a view's elements in iteration order.
#[derive(Debug, Clone)]
pub(crate) enum Positions {
    /// Flat run: `remaining` positions starting at `next`, `incr` apart.
    Run {
        next: isize,
        incr: isize,
        remaining: usize,
    },
    Walk(OffsetIter),
}

impl Iterator for Positions {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        match self {
            Positions::Run {
                next,
                incr,
                remaining,
            } => {
                if *remaining == 0 {
                    return None;
                }
                let out = *next as usize;
                *next += *incr;
                *remaining -= 1;
                Some(out)
            }
            Positions::Walk(iter) => iter.next(),
        }
    }
}

/// Position iterators for `arrays`, all in the first array's ordering.
///
/// Direct runs are used only when every operand qualifies.
pub(crate) fn positions(arrays: &[&NdArray]) -> Vec<Positions> {
    if can_do_directly(arrays) {
        return arrays
            .iter()
            .map(|a| Positions::Run {
                next: a.offset() as isize,
                incr: a.element_wise_stride().unwrap_or(1),
                remaining: a.len(),
            })
            .collect();
    }
    let ordering = arrays.first().map(|a| a.ordering()).unwrap_or_default();
    arrays
        .iter()
        .map(|a| Positions::Walk(a.offsets_in(ordering)))
        .collect()
}

/// Unfinalized accumulator of `rule` over `x`, paired with `y` when given.
pub(crate) fn accumulate<T: Real, R: AccumulationRule>(
    rule: &R,
    x: &NdArray,
    y: Option<&NdArray>,
) -> Result<T> {
    let xs = x.buffer().reader()?;
    let mut acc = rule.zero::<T>();
    match y {
        None => {
            for px in positions(&[x]).remove(0) {
                acc = rule.update(acc, xs.read(px));
            }
        }
        Some(y) => {
            let ys = y.buffer().reader()?;
            let mut walks = positions(&[x, y]).into_iter();
            if let (Some(wx), Some(wy)) = (walks.next(), walks.next()) {
                for (px, py) in wx.zip(wy) {
                    acc = rule.update_pair(acc, xs.read(px), ys.read(py));
                }
            }
        }
    }
    Ok(acc)
}

/// Winning `(linear position, value)` of `rule` over `x`, or `None` when `x`
/// is empty. Positions follow `x`'s ordering.
pub(crate) fn index_accumulate<R: IndexAccumulationRule>(
    rule: &R,
    x: &NdArray,
) -> Result<Option<(usize, f64)>> {
    let xs = x.buffer().reader()?;
    let mut best: Option<(usize, f64, f64)> = None;
    for (i, px) in positions(&[x]).remove(0).enumerate() {
        let value: f64 = xs.read(px);
        let key = rule.key(value);
        match best {
            Some((_, _, best_key)) if !rule.better(key, best_key) => {}
            _ => best = Some((i, value, key)),
        }
    }
    Ok(best.map(|(i, value, _)| (i, value)))
}

/// `z[i] = rule(x[i], y[i])` in `z`'s ordering.
///
/// All reads complete before `z` is locked for writing, so `z` may alias `x`
/// or `y`.
pub(crate) fn transform<T: Real, R: ElementwiseRule>(
    rule: &R,
    x: &NdArray,
    y: Option<&NdArray>,
    z: &NdArray,
) -> Result<()> {
    let mut operands = vec![z, x];
    operands.extend(y);
    let mut walks = positions(&operands).into_iter();
    let (Some(wz), Some(wx)) = (walks.next(), walks.next()) else {
        return Ok(());
    };

    let values: Vec<T> = {
        let xs = x.buffer().reader()?;
        match (y, walks.next()) {
            (Some(y), Some(wy)) => {
                let ys = y.buffer().reader()?;
                wx.zip(wy)
                    .map(|(px, py)| rule.apply(xs.read(px), ys.read(py)))
                    .collect()
            }
            _ => wx.map(|px| rule.apply(xs.read(px), T::zero())).collect(),
        }
    };

    let mut writer = z.buffer().writer()?;
    if let Some(slice) = writer.as_mut_slice::<T>() {
        for (pz, v) in wz.zip(values) {
            slice[pz] = v;
        }
        return Ok(());
    }
    for (pz, v) in wz.zip(values) {
        writer.put(pz, v)?;
    }
    Ok(())
}

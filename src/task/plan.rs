//! Choosing how to split a view into sub-tensors.

use ndengine_view::NdArray;

/// Per-axis split cost across several views.
///
/// Each axis costs its smallest absolute stride among the views; zero
/// strides cost 1, everything else twice the stride.
pub(crate) fn compute_costs(arrays: &[&NdArray]) -> Vec<isize> {
    let Some(first) = arrays.first() else {
        return vec![];
    };
    let mut costs = vec![isize::MAX; first.rank()];
    for a in arrays {
        for (cost, &s) in costs.iter_mut().zip(a.stride()) {
            *cost = (*cost).min(s.abs());
        }
    }
    for cost in &mut costs {
        if *cost == 0 {
            *cost = 1;
        } else {
            *cost *= 2;
        }
    }
    costs
}

/// Axis maximizing `(extent - 1) * cost`; ties go to the last axis.
///
/// Splitting there leaves sub-tensors over the cheapest strides, which are
/// the most likely to be walkable as flat runs.
pub(crate) fn find_split_dimension(shape: &[usize], costs: &[isize]) -> Option<usize> {
    let (axis, score) = shape.iter().zip(costs).enumerate().fold(
        (0usize, isize::MIN),
        |(best_i, best_v), (i, (&d, &c))| {
            let score = (d as isize - 1) * c;
            if score >= best_v {
                (i, score)
            } else {
                (best_i, best_v)
            }
        },
    );
    (!shape.is_empty() && score > 0).then_some(axis)
}

/// Every axis except `axis`.
pub(crate) fn all_but(rank: usize, axis: usize) -> Vec<usize> {
    (0..rank).filter(|&a| a != axis).collect()
}

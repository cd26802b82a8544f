//! Property-based tests for reductions and transforms.

use approx::relative_eq;
use ndengine::{Engine, EngineConfig, IMin, NdArray, Ordering, Pairwise, Unary};
use proptest::prelude::*;

// ============================================================================
// Test Utilities
// ============================================================================

fn shape_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..5, 1..=4)
}

fn ordering_strategy() -> impl Strategy<Value = Ordering> {
    prop_oneof![Just(Ordering::RowMajor), Just(Ordering::ColumnMajor)]
}

fn engine(parallel: bool) -> Engine {
    let config = EngineConfig::default().with_num_threads(2);
    let config = if parallel {
        config.with_parallel_threshold(0)
    } else {
        config
    };
    Engine::new(config).unwrap()
}

/// Distinct values, so index reductions have a unique winner.
fn distinct(shape: &[usize], ordering: Ordering, seed: u64) -> NdArray {
    let len: usize = shape.iter().product();
    let data: Vec<f64> = (0..len)
        .map(|i| ((i as u64 * 7919 + seed) % 1009) as f64 + i as f64 / 4096.0)
        .collect();
    NdArray::from_vec(data, shape, ordering).unwrap()
}

fn close(a: f64, b: f64) -> bool {
    relative_eq!(a, b, epsilon = 1e-9, max_relative = 1e-12)
}

// ============================================================================
// Reductions
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: reducing along one axis then summing the result equals the
    /// full sum, whatever the layout or execution path.
    #[test]
    fn prop_sum_along_then_sum(
        shape in shape_strategy(),
        ordering in ordering_strategy(),
        transpose in any::<bool>(),
        parallel in any::<bool>(),
        pick in any::<prop::sample::Index>(),
        seed in 0u64..1000,
    ) {
        let e = engine(parallel);
        let base = distinct(&shape, ordering, seed);
        let a = if transpose { base.transpose() } else { base };
        let axis = pick.index(a.rank());

        let partial = e.sum_along(&a, &[axis]).unwrap();
        prop_assert!(close(e.sum(&partial).unwrap(), e.sum(&a).unwrap()));
    }

    /// Property: mean along dims equals sum along dims over the reduced count.
    #[test]
    fn prop_mean_is_sum_over_count(
        shape in shape_strategy(),
        ordering in ordering_strategy(),
        parallel in any::<bool>(),
        pick in any::<prop::sample::Index>(),
    ) {
        let e = engine(parallel);
        let a = distinct(&shape, ordering, 1);
        let axis = pick.index(a.rank());
        let count = a.shape()[axis] as f64;

        let sums = e.sum_along(&a, &[axis]).unwrap().to_vec::<f64>().unwrap();
        let means = e.mean_along(&a, &[axis]).unwrap().to_vec::<f64>().unwrap();
        for (s, m) in sums.iter().zip(&means) {
            prop_assert!(close(s / count, *m));
        }
    }

    /// Property: the index found by IMin holds the minimum value.
    #[test]
    fn prop_index_min_points_at_min(
        shape in shape_strategy(),
        ordering in ordering_strategy(),
        transpose in any::<bool>(),
        seed in 0u64..1000,
    ) {
        let e = engine(true);
        let base = distinct(&shape, ordering, seed);
        let a = if transpose { base.transpose() } else { base };

        let (pos, value) = e.index_reduce(&a, IMin).unwrap().unwrap();
        prop_assert_eq!(a.get_linear::<f64>(pos).unwrap(), value);
        let min = a.to_vec::<f64>().unwrap().into_iter().fold(f64::INFINITY, f64::min);
        prop_assert_eq!(value, min);
    }

    /// Property: variance is never negative and vanishes on constant input.
    #[test]
    fn prop_variance_non_negative(
        shape in shape_strategy(),
        parallel in any::<bool>(),
        seed in 0u64..1000,
    ) {
        let e = engine(parallel);
        let a = distinct(&shape, Ordering::RowMajor, seed);
        prop_assert!(e.var(&a, false).unwrap() >= 0.0);

        a.assign_scalar(0.75f64).unwrap();
        prop_assert_eq!(e.var(&a, false).unwrap(), 0.0);
    }
}

// ============================================================================
// Transforms
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: an element-wise transform into a fresh array matches the
    /// rule applied index by index, even from a permuted source.
    #[test]
    fn prop_transform_matches_elementwise(
        shape in shape_strategy(),
        ordering in ordering_strategy(),
        parallel in any::<bool>(),
    ) {
        let e = engine(parallel);
        let a = distinct(&shape, ordering, 5).transpose();
        let out = e.transform(&a, Unary::Neg).unwrap();
        prop_assert_eq!(out.shape(), a.shape());
        for i in 0..a.len() {
            prop_assert_eq!(out.get_linear::<f64>(i).unwrap(), -a.get_linear::<f64>(i).unwrap());
        }
    }

    /// Property: x - x is zero for any layout.
    #[test]
    fn prop_pairwise_self_difference(
        shape in shape_strategy(),
        ordering in ordering_strategy(),
        parallel in any::<bool>(),
    ) {
        let e = engine(parallel);
        let a = distinct(&shape, ordering, 9);
        let d = e.pairwise(&a, &a, Pairwise::Sub).unwrap();
        prop_assert!(d.to_vec::<f64>().unwrap().iter().all(|&v| v == 0.0));
    }
}

//! Property-based tests for view decomposition.

use ndengine_view::{NdArray, Ordering};
use proptest::prelude::*;

// ============================================================================
// Test Utilities
// ============================================================================

/// Shapes of rank 1..=4 with small extents, leading 1s included.
fn shape_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..5, 1..=4)
}

fn ordering_strategy() -> impl Strategy<Value = Ordering> {
    prop_oneof![Just(Ordering::RowMajor), Just(Ordering::ColumnMajor)]
}

fn arange(shape: &[usize], ordering: Ordering) -> NdArray {
    let len: usize = shape.iter().product();
    NdArray::from_vec((0..len).map(|i| i as f64).collect(), shape, ordering).unwrap()
}

/// Non-empty subset of `0..rank` selected by `mask`.
fn dims_from_mask(rank: usize, mask: u8) -> Vec<usize> {
    let dims: Vec<usize> = (0..rank).filter(|a| mask & (1 << a) != 0).collect();
    if dims.is_empty() {
        vec![rank - 1]
    } else {
        dims
    }
}

// ============================================================================
// Reshape and linear view
// ============================================================================

proptest! {
    /// Property: reshape to rank 1 and back reproduces every element by index.
    #[test]
    fn prop_reshape_roundtrip(shape in shape_strategy(), ordering in ordering_strategy(), permute in any::<bool>()) {
        let base = arange(&shape, ordering);
        let a = if permute { base.transpose() } else { base.clone() };
        let len = a.len();

        let flat = a.reshape(&[len]).unwrap().into_array();
        let back = flat.reshape(a.shape()).unwrap().into_array();

        prop_assert_eq!(back.shape(), a.shape());
        prop_assert_eq!(back.to_vec::<f64>().unwrap(), a.to_vec::<f64>().unwrap());
    }

    /// Property: linear views of contiguous arrays alias the original.
    #[test]
    fn prop_linear_view_aliases(shape in shape_strategy(), ordering in ordering_strategy(), pick in any::<prop::sample::Index>()) {
        let a = arange(&shape, ordering);
        let lin = a.linear_view().unwrap();
        prop_assert!(!lin.is_copy());
        let lin = lin.into_array();

        let i = pick.index(a.len());
        lin.put_linear(i, -1.0f64).unwrap();
        prop_assert_eq!(a.get_linear::<f64>(i).unwrap(), -1.0);

        a.put_linear(i, -2.0f64).unwrap();
        prop_assert_eq!(lin.get_linear::<f64>(i).unwrap(), -2.0);
    }
}

// ============================================================================
// Tensor along dimension
// ============================================================================

proptest! {
    /// Property: sub-tensors for fixed dims visit every element exactly once.
    #[test]
    fn prop_tad_partition(shape in shape_strategy(), ordering in ordering_strategy(), mask in any::<u8>()) {
        let a = arange(&shape, ordering);
        let dims = dims_from_mask(a.rank(), mask);
        let count = a.tensors_along_dimension(&dims).unwrap();
        let complement: usize = (0..a.rank())
            .filter(|d| !dims.contains(d))
            .map(|d| shape[d])
            .product();
        prop_assert_eq!(count, complement);

        let mut visits = vec![0u32; a.len()];
        let mut rebuilt = vec![f64::NAN; a.len()];
        for t in 0..count {
            let tad = a.tensor_along_dimension(t, &dims).unwrap();
            for (pos, value) in tad.offsets().zip(tad.to_vec::<f64>().unwrap()) {
                visits[pos] += 1;
                rebuilt[pos] = value;
            }
        }
        prop_assert!(visits.iter().all(|&v| v == 1));
        // Buffer values equal their positions, so the rebuilt array is the identity.
        for (pos, value) in rebuilt.iter().enumerate() {
            prop_assert_eq!(*value, pos as f64);
        }
    }

    /// Property: the parent-index helper agrees with direct sub-tensor reads.
    #[test]
    fn prop_tad_parent_index(shape in shape_strategy(), mask in any::<u8>()) {
        let a = arange(&shape, Ordering::RowMajor);
        let dims = dims_from_mask(a.rank(), mask);
        let count = a.tensors_along_dimension(&dims).unwrap();
        for t in 0..count {
            let tad = a.tensor_along_dimension(t, &dims).unwrap();
            for e in 0..tad.len() {
                let parent = a.tad_parent_index(t, &dims, e).unwrap();
                prop_assert_eq!(tad.get_linear::<f64>(e).unwrap(), a.get_double(&parent).unwrap());
            }
        }
    }
}

#[test]
fn test_leading_unit_axes_follow_general_rule() {
    let a = arange(&[1, 5, 7], Ordering::RowMajor);
    assert_eq!(a.tensors_along_dimension(&[0]).unwrap(), 35);
    assert_eq!(a.tensors_along_dimension(&[1]).unwrap(), 7);
    assert_eq!(a.tensors_along_dimension(&[1, 2]).unwrap(), 1);
    let t = a.tensor_along_dimension(3, &[1]).unwrap();
    assert_eq!(t.shape(), &[5]);
    assert_eq!(t.to_vec::<f64>().unwrap(), vec![3.0, 10.0, 17.0, 24.0, 31.0]);
}

use approx::assert_relative_eq;
use std::sync::Arc;

use ndengine::{
    AccumulationRule, AllocationMode, Complex64, DataBuffer, Engine, EngineConfig, EngineError,
    IMax, Mean, NdArray, Ordering, Real, Sum, Unary, Variance,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn sequential() -> Engine {
    Engine::new(EngineConfig::default().with_num_threads(2)).unwrap()
}

/// Every sub-task goes to the pool.
fn parallel() -> Engine {
    Engine::new(
        EngineConfig::default()
            .with_num_threads(4)
            .with_parallel_threshold(0),
    )
    .unwrap()
}

fn random(rng: &mut StdRng, shape: &[usize], ordering: Ordering) -> NdArray {
    let len: usize = shape.iter().product();
    let data: Vec<f64> = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
    NdArray::from_vec(data, shape, ordering).unwrap()
}

/// Reference reduction over `axis` of a rank-3 array.
fn naive_sum_axis(a: &NdArray, axis: usize) -> Vec<f64> {
    let shape = a.shape();
    let kept: Vec<usize> = (0..3).filter(|&d| d != axis).collect();
    let mut out = Vec::new();
    for i in 0..shape[kept[0]] {
        for j in 0..shape[kept[1]] {
            let mut acc = 0.0;
            for k in 0..shape[axis] {
                let mut idx = [0usize; 3];
                idx[kept[0]] = i;
                idx[kept[1]] = j;
                idx[axis] = k;
                acc += a.get::<f64>(&idx).unwrap();
            }
            out.push(acc);
        }
    }
    out
}

#[test]
fn test_sum_along_each_axis_of_2x2() {
    for engine in [sequential(), parallel()] {
        let a = engine
            .from_vec(vec![1.0f64, 2.0, 3.0, 4.0], &[2, 2], Ordering::RowMajor)
            .unwrap();
        assert_eq!(engine.sum_along(&a, &[1]).unwrap().to_vec::<f64>().unwrap(), vec![3.0, 7.0]);
        assert_eq!(engine.sum_along(&a, &[0]).unwrap().to_vec::<f64>().unwrap(), vec![4.0, 6.0]);
    }
}

#[test]
fn test_sum_along_axis_permuted_inputs() {
    let mut rng = StdRng::seed_from_u64(7);
    let engine = parallel();
    for ordering in [Ordering::RowMajor, Ordering::ColumnMajor] {
        let a = random(&mut rng, &[4, 5, 6], ordering).permute(&[2, 0, 1]).unwrap();
        for axis in 0..3 {
            let got = engine.sum_along(&a, &[axis]).unwrap();
            let expected = naive_sum_axis(&a, axis);
            assert_eq!(got.len(), expected.len());
            for (i, e) in expected.iter().enumerate() {
                let g: f64 = got.buffer().get(got.row_major_offset(i).unwrap()).unwrap();
                assert_relative_eq!(g, *e, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn test_mean_is_sum_over_count() {
    let mut rng = StdRng::seed_from_u64(11);
    let a = random(&mut rng, &[3, 4, 5], Ordering::RowMajor);
    for engine in [sequential(), parallel()] {
        for axis in 0..3 {
            let sums = engine.sum_along(&a, &[axis]).unwrap().to_vec::<f64>().unwrap();
            let means = engine.mean_along(&a, &[axis]).unwrap().to_vec::<f64>().unwrap();
            let count = a.shape()[axis] as f64;
            for (s, m) in sums.iter().zip(&means) {
                assert_relative_eq!(s / count, *m, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn test_full_reduction_paths_agree() {
    let mut rng = StdRng::seed_from_u64(3);
    let a = random(&mut rng, &[6, 7, 8], Ordering::RowMajor);
    let t = a.permute(&[1, 2, 0]).unwrap();
    let seq = sequential();
    let par = parallel();

    let direct = seq.sum(&a).unwrap();
    assert_relative_eq!(par.sum(&t).unwrap(), direct, epsilon = 1e-10);
    assert_relative_eq!(seq.sum(&t).unwrap(), direct, epsilon = 1e-10);
    assert_relative_eq!(par.var(&t, true).unwrap(), seq.var(&a, true).unwrap(), epsilon = 1e-10);
}

#[test]
fn test_constant_variance_is_zero() {
    let engine = parallel();
    let a = engine.from_vec(vec![2.5f64; 10], &[2, 5], Ordering::RowMajor).unwrap();
    assert_eq!(engine.var(&a, true).unwrap(), 0.0);
    assert_eq!(engine.var(&a.transpose(), true).unwrap(), 0.0);
    let per_row = engine.var_along(&a, true, &[1]).unwrap();
    assert_eq!(per_row.to_vec::<f64>().unwrap(), vec![0.0, 0.0]);
}

#[test]
fn test_euclidean_distance() {
    let engine = sequential();
    let x = engine.from_vec(vec![1.0f64, 2.0, 3.0, 4.0], &[4], Ordering::RowMajor).unwrap();
    assert_eq!(engine.euclidean_distance(&x, &x.dup().unwrap()).unwrap(), 0.0);

    let x = engine.from_vec(vec![0.0f64, 0.0], &[2], Ordering::RowMajor).unwrap();
    let y = engine.from_vec(vec![3.0f64, 4.0], &[2], Ordering::RowMajor).unwrap();
    assert_relative_eq!(engine.euclidean_distance(&x, &y).unwrap(), 5.0);

    let short = engine.from_vec(vec![1.0f64], &[1], Ordering::RowMajor).unwrap();
    assert!(matches!(
        engine.euclidean_distance(&x, &short),
        Err(EngineError::ShapeMismatch(..))
    ));
}

#[test]
fn test_index_max_along_rows() {
    let engine = parallel();
    let a = engine
        .from_vec(vec![0.5f64, 3.0, -1.0, 9.0, 2.0, 9.0], &[2, 3], Ordering::RowMajor)
        .unwrap();
    let pos = engine.index_reduce_along(&a, IMax, &[1]).unwrap();
    assert_eq!(pos.to_vec::<f64>().unwrap(), vec![1.0, 0.0]);
    assert_eq!(engine.index_reduce(&a, IMax).unwrap(), Some((3, 9.0)));
}

#[test]
fn test_float_arrays_reduce_in_single_precision() {
    let engine = parallel();
    let a = engine
        .from_vec((1..=6).map(|i| i as f32).collect(), &[2, 3], Ordering::ColumnMajor)
        .unwrap();
    assert_eq!(engine.sum(&a).unwrap(), 21.0);
    let z = engine.sum_along(&a, &[0]).unwrap();
    assert_eq!(z.dtype(), ndengine::DataType::Float);
    assert_eq!(z.to_vec::<f32>().unwrap(), vec![3.0, 7.0, 11.0]);
}

#[test]
fn test_complex_mean() {
    let engine = sequential();
    let x = engine
        .from_vec(vec![1.0f64, 2.0, 3.0, -2.0], &[4], Ordering::RowMajor)
        .unwrap();
    assert_eq!(engine.reduce_complex(&x, None, Mean).unwrap(), Complex64::new(2.0, 0.0));
    let var = engine.reduce_complex(&x, None, Variance::new(false)).unwrap();
    assert_relative_eq!(var.re, 5.0);
}

#[test]
fn test_reduce_along_non_heap_and_int_buffers() {
    let (rows, cols) = (40, 30);
    let ints: Vec<i32> = (0..(rows * cols) as i32).collect();
    let expected: Vec<f64> = (0..rows)
        .map(|r| (0..cols).map(|c| (r * cols + c) as f64).sum())
        .collect();

    let sources = [
        DataBuffer::from_vec(ints.clone(), AllocationMode::Heap),
        DataBuffer::from_vec(ints.clone(), AllocationMode::Direct),
        DataBuffer::from_vec(ints.clone(), AllocationMode::Device),
        DataBuffer::from_vec(
            ints.iter().map(|&v| v as f64).collect(),
            AllocationMode::Direct,
        ),
        DataBuffer::from_vec(
            ints.iter().map(|&v| v as f32).collect(),
            AllocationMode::Device,
        ),
    ];
    for engine in [sequential(), parallel()] {
        for buffer in &sources {
            let data = Arc::new(buffer.dup().unwrap());
            let a = NdArray::from_buffer(data, &[rows, cols], Ordering::RowMajor).unwrap();
            let rows_sum = engine.sum_along(&a, &[1]).unwrap().to_vec::<f64>().unwrap();
            assert_eq!(rows_sum, expected);

            // Column sums walk a strided sub-tensor per output slot.
            let col_sum = engine.sum_along(&a, &[0]).unwrap().to_vec::<f64>().unwrap();
            assert_eq!(col_sum[0], (0..rows).map(|r| (r * cols) as f64).sum::<f64>());

            let pos = engine.index_reduce_along(&a, IMax, &[1]).unwrap();
            assert!(pos.to_vec::<f64>().unwrap().iter().all(|&p| p == (cols - 1) as f64));

            let neg = engine.transform(&a.transpose(), Unary::Neg).unwrap();
            assert_eq!(neg.get::<f64>(&[cols - 1, 1]).unwrap(), -((cols + cols - 1) as f64));
        }
    }
}

#[test]
fn test_blas_dot_agrees_with_dot_reduction_across_orderings() {
    let mut rng = StdRng::seed_from_u64(21);
    let engine = sequential();
    let a = random(&mut rng, &[3, 4, 2], Ordering::RowMajor);
    let b = a.dup().unwrap();
    let b_col = NdArray::create(
        &[3, 4, 2],
        ndengine::DataType::Double,
        Ordering::ColumnMajor,
        AllocationMode::Direct,
    );
    b_col.assign(&b).unwrap();

    for (x, y) in [(&a, &b_col), (&b_col, &a)] {
        let via_blas = engine.dot(x, y).unwrap();
        let via_reduction = engine.reduce_pair(x, y, ndengine::Dot).unwrap();
        assert_relative_eq!(via_blas, via_reduction, epsilon = 1e-12);
        let norm = engine.reduce(&a, ndengine::Norm2).unwrap();
        assert_relative_eq!(via_blas, norm * norm, epsilon = 1e-12);
    }
}

/// Sum that panics on large elements.
#[derive(Debug, Clone)]
struct Fragile;

impl AccumulationRule for Fragile {
    fn name(&self) -> &'static str {
        "fragile"
    }

    fn update<T: Real>(&self, acc: T, x: T) -> T {
        if x.widen() > 100.0 {
            panic!("element out of range");
        }
        acc + x
    }

    fn update_complex(&self, acc: Complex64, x: Complex64) -> Complex64 {
        acc + x
    }
}

#[test]
fn test_sub_task_failure_aborts_combination() {
    let engine = parallel();
    let a = engine
        .from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 500.0, 6.0], &[3, 2], Ordering::RowMajor)
        .unwrap();
    match engine.reduce_along(&a, Fragile, &[1]) {
        Err(EngineError::TaskFailed(msg)) => assert!(msg.contains("out of range")),
        other => panic!("expected task failure, got {other:?}"),
    }
    // The pool keeps working afterwards.
    assert_eq!(engine.reduce(&a.get_row(0).unwrap(), Sum).unwrap(), 3.0);
}

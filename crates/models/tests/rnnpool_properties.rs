use burn::module::Module;
use burn::nn::Initializer;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use models::{CellKind, RnnPool, RnnPoolConfig, StaticMasks, TopMagnitude};

type B = NdArray<f32>;

fn device() -> <B as burn::tensor::backend::Backend>::Device {
    Default::default()
}

/// Fixed pseudo-random pattern in [-0.5, 0.5).
fn pattern_grid(dims: [usize; 4]) -> Tensor<B, 4> {
    let n: usize = dims.iter().product();
    let data: Vec<f32> = (0..n)
        .map(|i| ((i * 37 + 11) % 101) as f32 / 101.0 - 0.5)
        .collect();
    Tensor::from_data(TensorData::new(data, dims), &device())
}

fn values<const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
    t.into_data().to_vec::<f32>().unwrap_or_default()
}

fn assert_close(a: &[f32], b: &[f32], tol: f32) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() <= tol, "index {i}: {x} vs {y}");
    }
}

/// Splits `[batch, 2 * h2]` rows into (first half, second half), flattened.
fn halves(out: &[f32], batch: usize, h2: usize) -> (Vec<f32>, Vec<f32>) {
    let mut first = Vec::new();
    let mut second = Vec::new();
    for b in 0..batch {
        let row = &out[b * 2 * h2..(b + 1) * 2 * h2];
        first.extend_from_slice(&row[..h2]);
        second.extend_from_slice(&row[h2..]);
    }
    (first, second)
}

#[test]
fn output_is_twice_hidden_bidir_for_any_batch() {
    let pool: RnnPool<B> = RnnPoolConfig::new(3, 4, 5, 6, 2).init(&device());
    for batch in [1, 2, 5] {
        let out = pool.forward(pattern_grid([batch, 2, 3, 4]));
        assert_eq!(out.dims(), [batch, 12]);
    }
}

#[test]
fn repeated_forward_is_deterministic() {
    for kind in CellKind::ALL {
        let pool: RnnPool<B> = RnnPoolConfig::new(4, 4, 6, 5, 3)
            .with_cell(kind)
            .init(&device());
        let grid = pattern_grid([2, 3, 4, 4]);
        let first = values(pool.forward(grid.clone()));
        let second = values(pool.forward(grid));
        assert_eq!(first, second, "{kind}");
    }
}

#[test]
fn zero_grid_with_zero_bias_gives_zero_output() {
    for kind in CellKind::ALL {
        let pool: RnnPool<B> = RnnPoolConfig::new(5, 5, 8, 6, 4)
            .with_cell(kind)
            .with_bias_init(0.0)
            .init(&device());
        let out = pool.forward(Tensor::zeros([2, 4, 5, 5], &device()));
        assert!(values(out).iter().all(|v| *v == 0.0), "{kind}");
    }
}

#[test]
fn transposing_a_square_grid_swaps_the_halves() {
    for kind in CellKind::ALL {
        let pool: RnnPool<B> = RnnPoolConfig::new(4, 4, 6, 5, 3)
            .with_cell(kind)
            .init(&device());
        let grid = pattern_grid([2, 3, 4, 4]);
        let (row, col) = halves(&values(pool.forward(grid.clone())), 2, 5);
        let (row_t, col_t) = halves(&values(pool.forward(grid.swap_dims(2, 3))), 2, 5);
        assert_close(&row_t, &col, 1e-6);
        assert_close(&col_t, &row, 1e-6);
    }
}

#[test]
fn transposing_a_rectangular_grid_matches_the_swapped_config() {
    let constant = Initializer::Constant { value: 0.05 };
    let wide: RnnPool<B> = RnnPoolConfig::new(2, 3, 4, 3, 2)
        .with_weight_init(constant.clone())
        .init(&device());
    let tall: RnnPool<B> = RnnPoolConfig::new(3, 2, 4, 3, 2)
        .with_weight_init(constant)
        .init(&device());
    let grid = pattern_grid([2, 2, 2, 3]);
    let (row, col) = halves(&values(wide.forward(grid.clone())), 2, 3);
    let (row_t, col_t) = halves(&values(tall.forward(grid.swap_dims(2, 3))), 2, 3);
    assert_close(&row_t, &col, 1e-6);
    assert_close(&col_t, &row, 1e-6);
}

#[test]
fn cell_kinds_share_every_intermediate_shape() {
    let grid = pattern_grid([3, 4, 5, 6]);
    for kind in CellKind::ALL {
        let pool: RnnPool<B> = RnnPoolConfig::new(5, 6, 7, 4, 4)
            .with_cell(kind)
            .init(&device());
        assert_eq!(pool.cell_kind(), kind);
        assert_eq!(pool.row_pass(grid.clone()).dims(), [3, 4]);
        assert_eq!(pool.col_pass(grid.clone()).dims(), [3, 4]);
        assert_eq!(pool.forward(grid.clone()).dims(), [3, 8]);
        assert_eq!(pool.output_dims(), 8);
    }
}

#[test]
fn dense_keep_ratio_matches_unmasked_pool() {
    let grid = pattern_grid([2, 3, 4, 4]);
    for kind in CellKind::ALL {
        let pool: RnnPool<B> = RnnPoolConfig::new(4, 4, 6, 5, 3)
            .with_cell(kind)
            .init(&device());
        let expected = values(pool.forward(grid.clone()));
        let sparsified = pool.sparsify(&TopMagnitude).unwrap();
        assert_eq!(values(sparsified.forward(grid.clone())), expected, "{kind}");
    }
}

#[test]
fn top_magnitude_masking_changes_the_output() {
    let grid = pattern_grid([2, 3, 4, 4]);
    let pool: RnnPool<B> = RnnPoolConfig::new(4, 4, 6, 5, 3)
        .with_sparsity(0.3, 0.3, 0.3, 0.3)
        .init(&device());
    let dense = values(pool.forward(grid.clone()));
    let sparse = values(pool.sparsify(&TopMagnitude).unwrap().forward(grid));
    assert_eq!(dense.len(), sparse.len());
    assert!(dense.iter().zip(&sparse).any(|(a, b)| (a - b).abs() > 1e-6));
}

#[test]
fn all_true_static_masks_match_unmasked_pool() {
    // FastGRNN, D=2, H=3, H2=2: stage1.w 2x3, stage1.u 3x3, stage2.w 3x2, stage2.u 2x2.
    let pool: RnnPool<B> = RnnPoolConfig::new(3, 3, 3, 2, 2)
        .with_sparsity(0.5, 0.5, 0.5, 0.5)
        .init(&device());
    let masks = StaticMasks::new()
        .with_mask("stage1.w", vec![true; 6])
        .with_mask("stage1.u", vec![true; 9])
        .with_mask("stage2.w", vec![true; 6])
        .with_mask("stage2.u", vec![true; 4]);
    let grid = pattern_grid([1, 2, 3, 3]);
    let expected = values(pool.forward(grid.clone()));
    let masked = pool.sparsify(&masks).unwrap();
    assert_close(&values(masked.forward(grid)), &expected, 1e-7);
}

#[test]
fn static_masks_missing_a_weight_fail() {
    let pool: RnnPool<B> = RnnPoolConfig::new(3, 3, 3, 2, 2)
        .with_sparsity(0.5, 1.0, 1.0, 1.0)
        .init(&device());
    let masks = StaticMasks::new().with_mask("stage2.w", vec![true; 6]);
    assert!(pool.sparsify(&masks).is_err());
}

#[test]
fn end_to_end_7x7_grid_with_320_channels() {
    let pool: RnnPool<B> = RnnPoolConfig::new(7, 7, 80, 80, 320).init(&device());
    let grid = pattern_grid([2, 320, 7, 7]);
    let out = pool.forward(grid.clone());
    assert_eq!(out.dims(), [2, 160]);
    let first = values(out);
    assert!(first.iter().all(|v| v.is_finite()));
    assert_eq!(first, values(pool.forward(grid)));
}

#[test]
fn end_to_end_7x7_grid_matches_recorded_values() {
    // Constant weights make every hidden unit equal, so each half is one repeated value.
    let pool: RnnPool<B> = RnnPoolConfig::new(7, 7, 80, 80, 320)
        .with_weight_init(Initializer::Constant { value: 0.02 })
        .with_bias_init(0.0)
        .init(&device());
    let out = values(pool.forward(pattern_grid([2, 320, 7, 7])));
    assert_eq!(out.len(), 320);
    let pinned: Vec<f32> = [0, 79, 80, 159, 160, 239, 240, 319]
        .iter()
        .map(|&i| out[i])
        .collect();
    let expected = [
        -1.929_859_4,
        -1.929_859_4,
        -1.933_895_4,
        -1.933_895_4,
        -1.932_567_5,
        -1.932_567_5,
        -1.931_388_0,
        -1.931_388_0,
    ];
    assert_close(&pinned, &expected, 1e-4);
}

#[test]
fn forward_concatenates_row_pass_then_col_pass() {
    let pool: RnnPool<B> = RnnPoolConfig::new(3, 5, 4, 3, 2).init(&device());
    let grid = pattern_grid([2, 2, 3, 5]);
    let out = values(pool.forward(grid.clone()));
    let (first, second) = halves(&out, 2, 3);
    assert_eq!(first, values(pool.row_pass(grid.clone())));
    assert_eq!(second, values(pool.col_pass(grid)));
}

#[test]
fn two_by_two_grid_matches_hand_computed_values() {
    // One channel, H = H2 = 1, every weight 0.5, zero biases, zeta/nu saturated.
    let pool: RnnPool<B> = RnnPoolConfig::new(2, 2, 1, 1, 1)
        .with_weight_init(Initializer::Constant { value: 0.5 })
        .with_bias_init(0.0)
        .init(&device());
    let grid = Tensor::<B, 4>::from_data(
        TensorData::new(vec![1.0, 2.0, 3.0, 4.0], [1, 1, 2, 2]),
        &device(),
    );
    let out = values(pool.forward(grid));
    assert_close(&out, &[0.236_874_92, 0.235_129_39], 1e-5);
}

#[test]
fn checkpoint_round_trip_restores_outputs() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("rnnpool.bin");
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let cfg = RnnPoolConfig::new(3, 3, 4, 4, 2).with_cell(CellKind::Lstm);
    let grid = pattern_grid([1, 2, 3, 3]);

    let saved: RnnPool<B> = cfg.init(&device());
    let expected = values(saved.forward(grid.clone()));
    saved
        .save_file(path.clone(), &recorder)
        .expect("save checkpoint");

    let fresh: RnnPool<B> = cfg.init(&device());
    assert_ne!(values(fresh.forward(grid.clone())), expected);
    let loaded = fresh
        .load_file(path, &recorder, &device())
        .expect("load checkpoint");
    assert_eq!(values(loaded.forward(grid)), expected);
}

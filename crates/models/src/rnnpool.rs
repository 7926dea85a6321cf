//! RNNPool: recurrent spatial pooling of a `[batch, channels, rows, cols]` feature grid.
//!
//! Row pass: every column is read top to bottom by the stage-1 cell (all `cols * batch`
//! sequences in one batched scan), then the resulting per-column summaries are read left to
//! right and right to left by the stage-2 cell. The column pass is the same with rows and
//! columns exchanged. Both passes share the two cells. Output is `[row_pass, col_pass]`,
//! `2 * hidden_bidir` wide.

use burn::module::Module;
use burn::nn::Initializer;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::cell::{scan, scan_bidirectional, CellConfig, CellKind, RecurrentCell, RnnCell};
use crate::error::{ModelError, ModelResult};
use crate::nonlinearity::Nonlinearity;
use crate::sparsity::MaskStrategy;

#[derive(Debug, Clone)]
pub struct RnnPoolConfig {
    pub rows: usize,
    pub cols: usize,
    /// Stage-1 hidden width (H).
    pub hidden: usize,
    /// Stage-2 hidden width (H2).
    pub hidden_bidir: usize,
    /// Channels of the incoming grid (D).
    pub input_dims: usize,
    pub w1_sparsity: f32,
    pub u1_sparsity: f32,
    pub w2_sparsity: f32,
    pub u2_sparsity: f32,
    pub gate_nonlinearity: Nonlinearity,
    pub update_nonlinearity: Nonlinearity,
    pub cell: CellKind,
    pub weight_init: Initializer,
    pub bias_init: f32,
    pub zeta_init: f32,
    pub nu_init: f32,
}

impl RnnPoolConfig {
    pub fn new(
        rows: usize,
        cols: usize,
        hidden: usize,
        hidden_bidir: usize,
        input_dims: usize,
    ) -> Self {
        Self {
            rows,
            cols,
            hidden,
            hidden_bidir,
            input_dims,
            w1_sparsity: 1.0,
            u1_sparsity: 1.0,
            w2_sparsity: 1.0,
            u2_sparsity: 1.0,
            gate_nonlinearity: Nonlinearity::Sigmoid,
            update_nonlinearity: Nonlinearity::Tanh,
            cell: CellKind::FastGrnn,
            weight_init: Initializer::Normal {
                mean: 0.0,
                std: 0.1,
            },
            bias_init: 1.0,
            // sigmoid(100) = 1 and sigmoid(-100) = 0: FastGRNN reduces to a plain gated update.
            zeta_init: 100.0,
            nu_init: -100.0,
        }
    }

    pub fn with_cell(mut self, cell: CellKind) -> Self {
        self.cell = cell;
        self
    }

    pub fn with_sparsity(mut self, w1: f32, u1: f32, w2: f32, u2: f32) -> Self {
        self.w1_sparsity = w1;
        self.u1_sparsity = u1;
        self.w2_sparsity = w2;
        self.u2_sparsity = u2;
        self
    }

    pub fn with_nonlinearities(mut self, gate: Nonlinearity, update: Nonlinearity) -> Self {
        self.gate_nonlinearity = gate;
        self.update_nonlinearity = update;
        self
    }

    pub fn with_weight_init(mut self, init: Initializer) -> Self {
        self.weight_init = init;
        self
    }

    pub fn with_bias_init(mut self, value: f32) -> Self {
        self.bias_init = value;
        self
    }

    pub fn stage1_config(&self) -> CellConfig {
        self.cell_config(self.input_dims, self.hidden)
            .with_sparsity(self.w1_sparsity, self.u1_sparsity)
    }

    pub fn stage2_config(&self) -> CellConfig {
        self.cell_config(self.hidden, self.hidden_bidir)
            .with_sparsity(self.w2_sparsity, self.u2_sparsity)
    }

    fn cell_config(&self, input: usize, hidden: usize) -> CellConfig {
        CellConfig::new(self.cell, input, hidden)
            .with_nonlinearities(self.gate_nonlinearity, self.update_nonlinearity)
            .with_weight_init(self.weight_init.clone())
            .with_bias_init(self.bias_init)
            .with_zeta_nu(self.zeta_init, self.nu_init)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(ModelError::InvalidConfig(format!(
                "RNNPool grid must be non-empty, got {}x{}",
                self.rows, self.cols
            )));
        }
        self.stage1_config().validate()?;
        self.stage2_config().validate()
    }

    pub fn output_dims(&self) -> usize {
        2 * self.hidden_bidir
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> RnnPool<B> {
        RnnPool::new(self, device)
    }
}

#[derive(Module, Debug)]
pub struct RnnPool<B: Backend> {
    stage1: RnnCell<B>,
    stage2: RnnCell<B>,
    rows: usize,
    cols: usize,
    input_dims: usize,
}

impl<B: Backend> RnnPool<B> {
    /// Builds both stages through the cell factory. Weight masks stay empty until
    /// [`RnnPool::sparsify`] runs on the final weights.
    pub fn new(cfg: &RnnPoolConfig, device: &B::Device) -> Self {
        Self {
            stage1: cfg.stage1_config().init(device),
            stage2: cfg.stage2_config().init(device),
            rows: cfg.rows,
            cols: cfg.cols,
            input_dims: cfg.input_dims,
        }
    }

    pub fn cell_kind(&self) -> CellKind {
        self.stage1.kind()
    }

    pub fn grid_size(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn input_dims(&self) -> usize {
        self.input_dims
    }

    pub fn output_dims(&self) -> usize {
        2 * self.stage2.hidden_size()
    }

    /// `[batch, input_dims, rows, cols]` -> `[batch, 2 * hidden_bidir]`.
    ///
    /// The first `hidden_bidir` columns are [`RnnPool::row_pass`] (stage 1 runs down each
    /// column), the last are [`RnnPool::col_pass`] (stage 1 runs along each row). Heads trained
    /// with the along-row summary first need their input halves swapped.
    ///
    /// The grid shape is a precondition; use [`RnnPool::try_forward`] to have it checked.
    pub fn forward(&self, grid: Tensor<B, 4>) -> Tensor<B, 2> {
        debug_assert!(
            self.check_grid(grid.dims()).is_ok(),
            "RNNPool grid shape mismatch: {:?}",
            grid.dims()
        );
        let row = self.row_pass(grid.clone());
        let col = self.col_pass(grid);
        Tensor::cat(vec![row, col], 1)
    }

    pub fn try_forward(&self, grid: Tensor<B, 4>) -> ModelResult<Tensor<B, 2>> {
        self.check_grid(grid.dims())?;
        Ok(self.forward(grid))
    }

    pub fn check_grid(&self, dims: [usize; 4]) -> ModelResult<()> {
        let [batch, channels, rows, cols] = dims;
        if batch == 0 || channels != self.input_dims || rows != self.rows || cols != self.cols {
            return Err(ModelError::GridShape {
                channels: self.input_dims,
                rows: self.rows,
                cols: self.cols,
                got: dims,
            });
        }
        Ok(())
    }

    /// Stage 1 down every column, stage 2 across the column summaries: `[batch, hidden_bidir]`.
    pub fn row_pass(&self, grid: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, dims, rows, cols] = grid.dims();
        // [rows, cols * batch, dims]: one sequence per (column, sample), index col * batch + b.
        let sequences = grid.permute([2, 3, 0, 1]).reshape([rows, cols * batch, dims]);
        self.summarize(sequences, cols, batch)
    }

    /// Stage 1 along every row, stage 2 across the row summaries: `[batch, hidden_bidir]`.
    pub fn col_pass(&self, grid: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, dims, rows, cols] = grid.dims();
        let sequences = grid.permute([3, 2, 0, 1]).reshape([cols, rows * batch, dims]);
        self.summarize(sequences, rows, batch)
    }

    fn summarize(&self, sequences: Tensor<B, 3>, groups: usize, batch: usize) -> Tensor<B, 2> {
        let final_state = scan(&self.stage1, sequences, false);
        let summaries = self
            .stage1
            .extract_output(&final_state)
            .reshape([groups, batch, self.stage1.hidden_size()]);
        scan_bidirectional(&self.stage2, summaries)
    }

    /// Recomputes every weight mask from the current weights (`stage1.*`, `stage2.*`).
    pub fn sparsify(mut self, strategy: &dyn MaskStrategy) -> ModelResult<Self> {
        self.stage1 = self.stage1.sparsify("stage1", strategy)?;
        self.stage2 = self.stage2.sparsify("stage2", strategy)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn config_wires_stage_sizes() {
        let cfg = RnnPoolConfig::new(7, 7, 80, 40, 320).with_sparsity(0.5, 0.6, 0.7, 0.8);
        let s1 = cfg.stage1_config();
        let s2 = cfg.stage2_config();
        assert_eq!((s1.input_size, s1.hidden_size), (320, 80));
        assert_eq!((s2.input_size, s2.hidden_size), (80, 40));
        assert_eq!((s1.w_sparsity, s1.u_sparsity), (0.5, 0.6));
        assert_eq!((s2.w_sparsity, s2.u_sparsity), (0.7, 0.8));
        assert_eq!(cfg.output_dims(), 80);
    }

    #[test]
    fn validate_rejects_empty_grid() {
        assert!(RnnPoolConfig::new(0, 7, 8, 8, 4).validate().is_err());
        assert!(RnnPoolConfig::new(7, 7, 8, 8, 4).validate().is_ok());
    }

    #[test]
    fn try_forward_reports_shape_mismatch() {
        let device = Default::default();
        let pool: RnnPool<B> = RnnPoolConfig::new(3, 3, 4, 4, 2).init(&device);
        let wrong = Tensor::<B, 4>::zeros([1, 2, 3, 4], &device);
        match pool.try_forward(wrong) {
            Err(ModelError::GridShape { got, .. }) => assert_eq!(got, [1, 2, 3, 4]),
            other => panic!("expected shape error, got {other:?}"),
        }
        let right = Tensor::<B, 4>::zeros([1, 2, 3, 3], &device);
        assert_eq!(pool.try_forward(right).unwrap().dims(), [1, 8]);
    }
}

use burn::module::{Ignored, Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::{bias_param, CellConfig, RecurrentCell};
use crate::error::ModelResult;
use crate::nonlinearity::Nonlinearity;
use crate::sparsity::{MaskStrategy, SparseLinear};

/// GRU with reset gate `r`, update gate `z` and candidate `c`.
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    w_r: SparseLinear<B>,
    w_z: SparseLinear<B>,
    w_c: SparseLinear<B>,
    u_r: SparseLinear<B>,
    u_z: SparseLinear<B>,
    u_c: SparseLinear<B>,
    bias_r: Param<Tensor<B, 2>>,
    bias_z: Param<Tensor<B, 2>>,
    bias_c: Param<Tensor<B, 2>>,
    gate_nonlinearity: Ignored<Nonlinearity>,
    update_nonlinearity: Ignored<Nonlinearity>,
    input_size: usize,
    hidden_size: usize,
}

impl<B: Backend> GruCell<B> {
    pub fn new(cfg: &CellConfig, device: &B::Device) -> Self {
        let (input, hidden) = (cfg.input_size, cfg.hidden_size);
        let w = || SparseLinear::new(input, hidden, cfg.w_sparsity, &cfg.weight_init, device);
        let u = || SparseLinear::new(hidden, hidden, cfg.u_sparsity, &cfg.weight_init, device);
        Self {
            w_r: w(),
            w_z: w(),
            w_c: w(),
            u_r: u(),
            u_z: u(),
            u_c: u(),
            bias_r: bias_param(cfg.bias_init, hidden, device),
            bias_z: bias_param(cfg.bias_init, hidden, device),
            bias_c: bias_param(cfg.bias_init, hidden, device),
            gate_nonlinearity: Ignored(cfg.gate_nonlinearity),
            update_nonlinearity: Ignored(cfg.update_nonlinearity),
            input_size: input,
            hidden_size: hidden,
        }
    }

    pub fn sparsify(mut self, prefix: &str, strategy: &dyn MaskStrategy) -> ModelResult<Self> {
        self.w_r = self.w_r.sparsify(&format!("{prefix}.w_r"), strategy)?;
        self.w_z = self.w_z.sparsify(&format!("{prefix}.w_z"), strategy)?;
        self.w_c = self.w_c.sparsify(&format!("{prefix}.w_c"), strategy)?;
        self.u_r = self.u_r.sparsify(&format!("{prefix}.u_r"), strategy)?;
        self.u_z = self.u_z.sparsify(&format!("{prefix}.u_z"), strategy)?;
        self.u_c = self.u_c.sparsify(&format!("{prefix}.u_c"), strategy)?;
        Ok(self)
    }
}

impl<B: Backend> RecurrentCell<B> for GruCell<B> {
    type State = Tensor<B, 2>;

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn init_state(&self, batch_size: usize, device: &B::Device) -> Self::State {
        Tensor::zeros([batch_size, self.hidden_size], device)
    }

    fn step(&self, state: Self::State, input: Tensor<B, 2>) -> Self::State {
        let gate = self.gate_nonlinearity.0;
        let update = self.update_nonlinearity.0;

        let r = gate.apply(
            self.w_r.forward(input.clone()) + self.u_r.forward(state.clone()) + self.bias_r.val(),
        );
        let z = gate.apply(
            self.w_z.forward(input.clone()) + self.u_z.forward(state.clone()) + self.bias_z.val(),
        );
        let c = update.apply(
            self.w_c.forward(input) + self.u_c.forward(r * state.clone()) + self.bias_c.val(),
        );
        z.clone() * state + (z.ones_like() - z) * c
    }

    fn extract_output(&self, state: &Self::State) -> Tensor<B, 2> {
        state.clone()
    }
}

use burn::module::{Ignored, Module, Param};
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::{bias_param, CellConfig, RecurrentCell};
use crate::error::ModelResult;
use crate::nonlinearity::Nonlinearity;
use crate::sparsity::{MaskStrategy, SparseLinear};

/// FastGRNN: one shared pre-activation feeds both the gate and the update.
///
/// `h' = z * h + (sigmoid(zeta) * (1 - z) + sigmoid(nu)) * c`
#[derive(Module, Debug)]
pub struct FastGrnnCell<B: Backend> {
    w: SparseLinear<B>,
    u: SparseLinear<B>,
    bias_gate: Param<Tensor<B, 2>>,
    bias_update: Param<Tensor<B, 2>>,
    zeta: Param<Tensor<B, 2>>,
    nu: Param<Tensor<B, 2>>,
    gate_nonlinearity: Ignored<Nonlinearity>,
    update_nonlinearity: Ignored<Nonlinearity>,
    input_size: usize,
    hidden_size: usize,
}

impl<B: Backend> FastGrnnCell<B> {
    pub fn new(cfg: &CellConfig, device: &B::Device) -> Self {
        let hidden = cfg.hidden_size;
        Self {
            w: SparseLinear::new(cfg.input_size, hidden, cfg.w_sparsity, &cfg.weight_init, device),
            u: SparseLinear::new(hidden, hidden, cfg.u_sparsity, &cfg.weight_init, device),
            bias_gate: bias_param(cfg.bias_init, hidden, device),
            bias_update: bias_param(cfg.bias_init, hidden, device),
            zeta: bias_param(cfg.zeta_init, 1, device),
            nu: bias_param(cfg.nu_init, 1, device),
            gate_nonlinearity: Ignored(cfg.gate_nonlinearity),
            update_nonlinearity: Ignored(cfg.update_nonlinearity),
            input_size: cfg.input_size,
            hidden_size: hidden,
        }
    }

    pub fn sparsify(mut self, prefix: &str, strategy: &dyn MaskStrategy) -> ModelResult<Self> {
        self.w = self.w.sparsify(&format!("{prefix}.w"), strategy)?;
        self.u = self.u.sparsify(&format!("{prefix}.u"), strategy)?;
        Ok(self)
    }
}

impl<B: Backend> RecurrentCell<B> for FastGrnnCell<B> {
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
        let pre = self.w.forward(input) + self.u.forward(state.clone());
        let z = self.gate_nonlinearity.0.apply(pre.clone() + self.bias_gate.val());
        let c = self.update_nonlinearity.0.apply(pre + self.bias_update.val());
        let zeta = sigmoid(self.zeta.val());
        let nu = sigmoid(self.nu.val());
        let keep = z.clone() * state;
        let update_scale = (z.ones_like() - z) * zeta + nu;
        keep + update_scale * c
    }

    fn extract_output(&self, state: &Self::State) -> Tensor<B, 2> {
        state.clone()
    }
}

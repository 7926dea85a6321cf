use burn::module::{Ignored, Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::{bias_param, CellConfig, RecurrentCell};
use crate::error::ModelResult;
use crate::nonlinearity::Nonlinearity;
use crate::sparsity::{MaskStrategy, SparseLinear};

#[derive(Debug, Clone)]
pub struct LstmState<B: Backend> {
    pub hidden: Tensor<B, 2>,
    pub cell: Tensor<B, 2>,
}

/// LSTM with input `i`, forget `f`, output `o` gates and candidate `g`.
#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    w_i: SparseLinear<B>,
    w_f: SparseLinear<B>,
    w_o: SparseLinear<B>,
    w_g: SparseLinear<B>,
    u_i: SparseLinear<B>,
    u_f: SparseLinear<B>,
    u_o: SparseLinear<B>,
    u_g: SparseLinear<B>,
    bias_i: Param<Tensor<B, 2>>,
    bias_f: Param<Tensor<B, 2>>,
    bias_o: Param<Tensor<B, 2>>,
    bias_g: Param<Tensor<B, 2>>,
    gate_nonlinearity: Ignored<Nonlinearity>,
    update_nonlinearity: Ignored<Nonlinearity>,
    input_size: usize,
    hidden_size: usize,
}

impl<B: Backend> LstmCell<B> {
    pub fn new(cfg: &CellConfig, device: &B::Device) -> Self {
        let (input, hidden) = (cfg.input_size, cfg.hidden_size);
        let w = || SparseLinear::new(input, hidden, cfg.w_sparsity, &cfg.weight_init, device);
        let u = || SparseLinear::new(hidden, hidden, cfg.u_sparsity, &cfg.weight_init, device);
        Self {
            w_i: w(),
            w_f: w(),
            w_o: w(),
            w_g: w(),
            u_i: u(),
            u_f: u(),
            u_o: u(),
            u_g: u(),
            bias_i: bias_param(cfg.bias_init, hidden, device),
            bias_f: bias_param(cfg.bias_init, hidden, device),
            bias_o: bias_param(cfg.bias_init, hidden, device),
            bias_g: bias_param(cfg.bias_init, hidden, device),
            gate_nonlinearity: Ignored(cfg.gate_nonlinearity),
            update_nonlinearity: Ignored(cfg.update_nonlinearity),
            input_size: input,
            hidden_size: hidden,
        }
    }

    pub fn sparsify(mut self, prefix: &str, strategy: &dyn MaskStrategy) -> ModelResult<Self> {
        self.w_i = self.w_i.sparsify(&format!("{prefix}.w_i"), strategy)?;
        self.w_f = self.w_f.sparsify(&format!("{prefix}.w_f"), strategy)?;
        self.w_o = self.w_o.sparsify(&format!("{prefix}.w_o"), strategy)?;
        self.w_g = self.w_g.sparsify(&format!("{prefix}.w_g"), strategy)?;
        self.u_i = self.u_i.sparsify(&format!("{prefix}.u_i"), strategy)?;
        self.u_f = self.u_f.sparsify(&format!("{prefix}.u_f"), strategy)?;
        self.u_o = self.u_o.sparsify(&format!("{prefix}.u_o"), strategy)?;
        self.u_g = self.u_g.sparsify(&format!("{prefix}.u_g"), strategy)?;
        Ok(self)
    }
}

impl<B: Backend> RecurrentCell<B> for LstmCell<B> {
    type State = LstmState<B>;

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn init_state(&self, batch_size: usize, device: &B::Device) -> Self::State {
        LstmState {
            hidden: Tensor::zeros([batch_size, self.hidden_size], device),
            cell: Tensor::zeros([batch_size, self.hidden_size], device),
        }
    }

    fn step(&self, state: Self::State, input: Tensor<B, 2>) -> Self::State {
        let gate = self.gate_nonlinearity.0;
        let update = self.update_nonlinearity.0;
        let h = state.hidden;

        let i = gate.apply(
            self.w_i.forward(input.clone()) + self.u_i.forward(h.clone()) + self.bias_i.val(),
        );
        let f = gate.apply(
            self.w_f.forward(input.clone()) + self.u_f.forward(h.clone()) + self.bias_f.val(),
        );
        let o = gate.apply(
            self.w_o.forward(input.clone()) + self.u_o.forward(h.clone()) + self.bias_o.val(),
        );
        let g = update.apply(self.w_g.forward(input) + self.u_g.forward(h) + self.bias_g.val());

        let cell = f * state.cell + i * g;
        let hidden = o * update.apply(cell.clone());
        LstmState { hidden, cell }
    }

    fn extract_output(&self, state: &Self::State) -> Tensor<B, 2> {
        state.hidden.clone()
    }
}

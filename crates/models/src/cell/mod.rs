//! Recurrent cells used by RNNPool and the scan helpers that drive them.
//!
//! The scans only see the [`RecurrentCell`] trait: a cell hands out a zero state, advances it one
//! step per input and exposes the hidden output of a state. The state type is cell specific (a
//! single hidden tensor for FastGRNN/GRU, a hidden/cell pair for LSTM).

mod fastgrnn;
mod gru;
mod lstm;

use std::fmt;
use std::str::FromStr;

use burn::module::Module;
use burn::nn::Initializer;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::nonlinearity::Nonlinearity;
use crate::sparsity::{check_keep_ratio, MaskStrategy};

pub use fastgrnn::FastGrnnCell;
pub use gru::GruCell;
pub use lstm::{LstmCell, LstmState};

pub trait RecurrentCell<B: Backend> {
    type State: Clone;

    fn input_size(&self) -> usize;
    fn hidden_size(&self) -> usize;
    /// Zero state for `batch_size` independent sequences.
    fn init_state(&self, batch_size: usize, device: &B::Device) -> Self::State;
    fn step(&self, state: Self::State, input: Tensor<B, 2>) -> Self::State;
    /// Hidden output `[batch, hidden]` of a state.
    fn extract_output(&self, state: &Self::State) -> Tensor<B, 2>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    #[default]
    FastGrnn,
    Gru,
    Lstm,
}

impl CellKind {
    pub const ALL: [CellKind; 3] = [CellKind::FastGrnn, CellKind::Gru, CellKind::Lstm];

    /// Short name used in arch strings and log file names.
    pub fn abbr(self) -> &'static str {
        match self {
            CellKind::FastGrnn => "fg",
            CellKind::Gru => "gru",
            CellKind::Lstm => "lstm",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CellKind::FastGrnn => "FastGRNN",
            CellKind::Gru => "GRU",
            CellKind::Lstm => "LSTM",
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CellKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fg" | "fastgrnn" | "fast_grnn" => Ok(CellKind::FastGrnn),
            "gru" => Ok(CellKind::Gru),
            "lstm" => Ok(CellKind::Lstm),
            other => Err(ModelError::InvalidConfig(format!("unknown cell kind {other:?}"))),
        }
    }
}

/// Construction parameters shared by all cell kinds.
#[derive(Debug, Clone)]
pub struct CellConfig {
    pub kind: CellKind,
    pub input_size: usize,
    pub hidden_size: usize,
    pub gate_nonlinearity: Nonlinearity,
    pub update_nonlinearity: Nonlinearity,
    /// Keep ratio of the input-to-hidden weights.
    pub w_sparsity: f32,
    /// Keep ratio of the hidden-to-hidden weights.
    pub u_sparsity: f32,
    pub weight_init: Initializer,
    pub bias_init: f32,
    /// FastGRNN only.
    pub zeta_init: f32,
    /// FastGRNN only.
    pub nu_init: f32,
}

impl CellConfig {
    pub fn new(kind: CellKind, input_size: usize, hidden_size: usize) -> Self {
        Self {
            kind,
            input_size,
            hidden_size,
            gate_nonlinearity: Nonlinearity::Sigmoid,
            update_nonlinearity: Nonlinearity::Tanh,
            w_sparsity: 1.0,
            u_sparsity: 1.0,
            weight_init: Initializer::Normal {
                mean: 0.0,
                std: 0.1,
            },
            bias_init: 1.0,
            zeta_init: 1.0,
            nu_init: -4.0,
        }
    }

    pub fn with_nonlinearities(mut self, gate: Nonlinearity, update: Nonlinearity) -> Self {
        self.gate_nonlinearity = gate;
        self.update_nonlinearity = update;
        self
    }

    pub fn with_sparsity(mut self, w_sparsity: f32, u_sparsity: f32) -> Self {
        self.w_sparsity = w_sparsity;
        self.u_sparsity = u_sparsity;
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

    pub fn with_zeta_nu(mut self, zeta_init: f32, nu_init: f32) -> Self {
        self.zeta_init = zeta_init;
        self.nu_init = nu_init;
        self
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.input_size == 0 || self.hidden_size == 0 {
            return Err(ModelError::InvalidConfig(format!(
                "{} cell needs non-zero sizes (input {}, hidden {})",
                self.kind, self.input_size, self.hidden_size
            )));
        }
        check_keep_ratio("w", self.w_sparsity)?;
        check_keep_ratio("u", self.u_sparsity)?;
        Ok(())
    }

    /// Builds the cell selected by `kind`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> RnnCell<B> {
        match self.kind {
            CellKind::FastGrnn => RnnCell::FastGrnn(FastGrnnCell::new(self, device)),
            CellKind::Gru => RnnCell::Gru(GruCell::new(self, device)),
            CellKind::Lstm => RnnCell::Lstm(LstmCell::new(self, device)),
        }
    }
}

/// A cell of any kind, chosen at construction time.
#[derive(Module, Debug)]
pub enum RnnCell<B: Backend> {
    FastGrnn(FastGrnnCell<B>),
    Gru(GruCell<B>),
    Lstm(LstmCell<B>),
}

#[derive(Debug, Clone)]
pub enum CellState<B: Backend> {
    Hidden(Tensor<B, 2>),
    Lstm(LstmState<B>),
}

impl<B: Backend> CellState<B> {
    fn into_hidden(self) -> Tensor<B, 2> {
        match self {
            CellState::Hidden(hidden) => hidden,
            CellState::Lstm(state) => state.hidden,
        }
    }

    fn into_lstm(self) -> LstmState<B> {
        match self {
            CellState::Hidden(hidden) => LstmState {
                cell: hidden.zeros_like(),
                hidden,
            },
            CellState::Lstm(state) => state,
        }
    }
}

impl<B: Backend> RnnCell<B> {
    pub fn kind(&self) -> CellKind {
        match self {
            RnnCell::FastGrnn(_) => CellKind::FastGrnn,
            RnnCell::Gru(_) => CellKind::Gru,
            RnnCell::Lstm(_) => CellKind::Lstm,
        }
    }

    /// Recomputes the weight masks; `prefix` names the cell in mask lookups (`stage1`, ...).
    pub fn sparsify(self, prefix: &str, strategy: &dyn MaskStrategy) -> ModelResult<Self> {
        Ok(match self {
            RnnCell::FastGrnn(cell) => RnnCell::FastGrnn(cell.sparsify(prefix, strategy)?),
            RnnCell::Gru(cell) => RnnCell::Gru(cell.sparsify(prefix, strategy)?),
            RnnCell::Lstm(cell) => RnnCell::Lstm(cell.sparsify(prefix, strategy)?),
        })
    }
}

impl<B: Backend> RecurrentCell<B> for RnnCell<B> {
    type State = CellState<B>;

    fn input_size(&self) -> usize {
        match self {
            RnnCell::FastGrnn(cell) => cell.input_size(),
            RnnCell::Gru(cell) => cell.input_size(),
            RnnCell::Lstm(cell) => cell.input_size(),
        }
    }

    fn hidden_size(&self) -> usize {
        match self {
            RnnCell::FastGrnn(cell) => cell.hidden_size(),
            RnnCell::Gru(cell) => cell.hidden_size(),
            RnnCell::Lstm(cell) => cell.hidden_size(),
        }
    }

    fn init_state(&self, batch_size: usize, device: &B::Device) -> Self::State {
        match self {
            RnnCell::FastGrnn(cell) => CellState::Hidden(cell.init_state(batch_size, device)),
            RnnCell::Gru(cell) => CellState::Hidden(cell.init_state(batch_size, device)),
            RnnCell::Lstm(cell) => CellState::Lstm(cell.init_state(batch_size, device)),
        }
    }

    fn step(&self, state: Self::State, input: Tensor<B, 2>) -> Self::State {
        match self {
            RnnCell::FastGrnn(cell) => CellState::Hidden(cell.step(state.into_hidden(), input)),
            RnnCell::Gru(cell) => CellState::Hidden(cell.step(state.into_hidden(), input)),
            RnnCell::Lstm(cell) => CellState::Lstm(cell.step(state.into_lstm(), input)),
        }
    }

    fn extract_output(&self, state: &Self::State) -> Tensor<B, 2> {
        match state {
            CellState::Hidden(hidden) => hidden.clone(),
            CellState::Lstm(state) => state.hidden.clone(),
        }
    }
}

/// Runs `cell` over `sequence: [steps, batch, input]` from a zero state and returns the final
/// state. `reverse` walks the steps back to front.
pub fn scan<B: Backend, C: RecurrentCell<B>>(
    cell: &C,
    sequence: Tensor<B, 3>,
    reverse: bool,
) -> C::State {
    let [steps, batch, _] = sequence.dims();
    let device = sequence.device();
    let mut state = cell.init_state(batch, &device);
    let mut inputs: Vec<Tensor<B, 2>> = sequence
        .chunk(steps, 0)
        .into_iter()
        .map(|step| step.squeeze::<2>(0))
        .collect();
    if reverse {
        inputs.reverse();
    }
    for input in inputs {
        state = cell.step(state, input);
    }
    state
}

/// Forward and backward scans with the same cell, each from its own zero state. The two final
/// outputs are summed, so the result keeps the cell's hidden width: `[batch, hidden]`.
pub fn scan_bidirectional<B: Backend, C: RecurrentCell<B>>(
    cell: &C,
    sequence: Tensor<B, 3>,
) -> Tensor<B, 2> {
    let forward = scan(cell, sequence.clone(), false);
    let backward = scan(cell, sequence, true);
    cell.extract_output(&forward) + cell.extract_output(&backward)
}

pub(crate) fn bias_param<B: Backend>(
    value: f32,
    hidden_size: usize,
    device: &B::Device,
) -> burn::module::Param<Tensor<B, 2>> {
    Initializer::Constant {
        value: value as f64,
    }
    .init([1, hidden_size], device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn constant_config(kind: CellKind) -> CellConfig {
        CellConfig::new(kind, 1, 1)
            .with_weight_init(Initializer::Constant { value: 0.5 })
            .with_bias_init(0.0)
            .with_zeta_nu(100.0, -100.0)
    }

    fn sequence(values: Vec<f32>) -> Tensor<B, 3> {
        let n = values.len();
        Tensor::from_data(TensorData::new(values, [n, 1, 1]), &Default::default())
    }

    fn first(t: Tensor<B, 2>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn factory_builds_requested_kind() {
        let device = Default::default();
        for kind in CellKind::ALL {
            let cell: RnnCell<B> = CellConfig::new(kind, 4, 3).init(&device);
            assert_eq!(cell.kind(), kind);
            assert_eq!(cell.input_size(), 4);
            assert_eq!(cell.hidden_size(), 3);
        }
    }

    #[test]
    fn single_step_matches_hand_computation() {
        let device = Default::default();
        // pre = 0.5 * 1.0; h = (1 - sigmoid(pre)) * tanh(pre)
        let expected_gated = 0.174_468_02;
        for kind in [CellKind::FastGrnn, CellKind::Gru] {
            let cell: RnnCell<B> = constant_config(kind).init(&device);
            let state = scan(&cell, sequence(vec![1.0]), false);
            let h = first(cell.extract_output(&state));
            assert!((h - expected_gated).abs() < 1e-5, "{kind}: {h}");
        }
        // h = sigmoid(pre) * tanh(sigmoid(pre) * tanh(pre))
        let cell: RnnCell<B> = constant_config(CellKind::Lstm).init(&device);
        let state = scan(&cell, sequence(vec![1.0]), false);
        let h = first(cell.extract_output(&state));
        assert!((h - 0.174_269_72).abs() < 1e-5, "lstm: {h}");
    }

    #[test]
    fn reverse_scan_visits_steps_back_to_front() {
        let device = Default::default();
        let cell: RnnCell<B> = constant_config(CellKind::FastGrnn).init(&device);
        let forward = first(cell.extract_output(&scan(&cell, sequence(vec![1.0, 3.0]), false)));
        let reversed = first(cell.extract_output(&scan(&cell, sequence(vec![3.0, 1.0]), true)));
        let backward = first(cell.extract_output(&scan(&cell, sequence(vec![1.0, 3.0]), true)));
        assert!((forward - reversed).abs() < 1e-7);
        assert!((forward - backward).abs() > 1e-4);
    }

    #[test]
    fn bidirectional_sums_both_directions() {
        let device = Default::default();
        let cell: RnnCell<B> = constant_config(CellKind::Gru).init(&device);
        let seq = sequence(vec![0.25, -1.0, 2.0]);
        let fwd = first(cell.extract_output(&scan(&cell, seq.clone(), false)));
        let bwd = first(cell.extract_output(&scan(&cell, seq.clone(), true)));
        let both = first(scan_bidirectional(&cell, seq));
        assert!((both - (fwd + bwd)).abs() < 1e-6);
    }

    #[test]
    fn cell_kind_round_trips_through_abbreviation() {
        for kind in CellKind::ALL {
            assert_eq!(kind.abbr().parse::<CellKind>().unwrap(), kind);
        }
        assert!("rnn".parse::<CellKind>().is_err());
    }

    #[test]
    fn validate_rejects_bad_configs() {
        assert!(CellConfig::new(CellKind::Gru, 0, 4).validate().is_err());
        assert!(CellConfig::new(CellKind::Gru, 4, 4)
            .with_sparsity(0.0, 1.0)
            .validate()
            .is_err());
        assert!(CellConfig::new(CellKind::Lstm, 4, 4).validate().is_ok());
    }
}

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("feature grid shape mismatch: expected [_, {channels}, {rows}, {cols}], got {got:?}")]
    GridShape {
        channels: usize,
        rows: usize,
        cols: usize,
        got: [usize; 4],
    },
    #[error("invalid model config: {0}")]
    InvalidConfig(String),
    #[error("keep ratio for {name} out of range (0, 1]: {ratio}")]
    InvalidKeepRatio { name: String, ratio: f32 },
    #[error("no static mask supplied for {0}")]
    MissingMask(String),
    #[error("mask for {name} has {got} entries, weight has {expected}")]
    MaskShape {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("unknown nonlinearity {0:?} (expected sigmoid, tanh, relu, quant_tanh, quant_sigm)")]
    UnknownNonlinearity(String),
    #[error("unknown model arch {0:?} (expected mobilenet_<fg|gru|lstm>_<front|last|fl>)")]
    UnknownArch(String),
    #[error("failed to read weights for {name}: {msg}")]
    WeightData { name: String, msg: String },
}

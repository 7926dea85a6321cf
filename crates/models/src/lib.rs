//! Burn models for the RNNPool Visual Wake Words experiments.
//!
//! This crate defines the architectures compared across the nine experiment variants:
//! - `RnnPool`: recurrent spatial pooling of a feature grid (row pass + column pass).
//! - `RnnCell`: FastGRNN / GRU / LSTM cells behind the `RecurrentCell` trait.
//! - `VwwModel`: MobileNetV2 backbone with RNNPool at the front, the end, or both.
//!
//! These are pure Burn Modules. Checkpoint loading, image preprocessing and the evaluation CLI
//! live in the `inference` crate.
//!
//! ## Design Note
//! Cell kind is an explicit construction parameter (`CellConfig::init` is the factory); the
//! scans in `cell` only depend on the `RecurrentCell` trait, so a cell's state may be a single
//! hidden tensor or a hidden/cell pair.

pub mod cell;
pub mod error;
pub mod mobilenet;
pub mod nonlinearity;
pub mod rnnpool;
pub mod sparsity;
pub mod vww;

pub use cell::{
    scan, scan_bidirectional, CellConfig, CellKind, CellState, FastGrnnCell, GruCell, LstmCell,
    LstmState, RecurrentCell, RnnCell,
};
pub use error::{ModelError, ModelResult};
pub use mobilenet::{make_divisible, BlockSetting, ConvBnRelu, InvertedResidual, MobileNetFeatures};
pub use nonlinearity::Nonlinearity;
pub use rnnpool::{RnnPool, RnnPoolConfig};
pub use sparsity::{MaskStrategy, SparseLinear, StaticMasks, TopMagnitude};
pub use vww::{ModelArch, PatchPool, PoolPosition, VwwModel, VwwModelConfig};

pub mod prelude {
    pub use super::{
        CellKind, ModelArch, Nonlinearity, PoolPosition, RnnPool, RnnPoolConfig, VwwModel,
        VwwModelConfig,
    };
}

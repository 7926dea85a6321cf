//! Evaluation side of the VWW experiments: checkpoint loading, image preprocessing and the
//! person / no-person verdict used by the `vww-eval` binary.
//!
//! The backend is chosen at compile time: NdArray by default, Wgpu with `backend-wgpu`.

#![recursion_limit = "256"]

pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod error;
pub mod images;
pub mod preprocess;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use checkpoint::{load_model, resolve_checkpoint, save_model};
pub use classify::{Classifier, Prediction, Verdict};
pub use config::EvalConfig;
pub use error::{EvalError, EvalResult};
pub use images::list_images;
pub use preprocess::ImageTransform;

/// Installs the `fmt` subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub mod prelude {
    pub use crate::{
        Classifier, EvalConfig, EvalError, ImageTransform, InferenceBackend, Prediction, Verdict,
    };
}

use std::path::PathBuf;

use models::ModelError;

pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("checkpoint not found: {}", .0.display())]
    MissingCheckpoint(PathBuf),
    #[error("failed to load checkpoint {}: {msg}", path.display())]
    Checkpoint { path: PathBuf, msg: String },
    #[error("failed to decode image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {msg}", path.display())]
    Config { path: PathBuf, msg: String },
    #[error("invalid preprocessing: {0}")]
    Preprocess(String),
    #[error("failed to read model output: {0}")]
    TensorData(String),
    #[error("expected at least 2 logits, got {0}")]
    Logits(usize),
    #[error(transparent)]
    Model(#[from] ModelError),
}

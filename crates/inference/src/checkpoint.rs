//! Burn checkpoints for `VwwModel`.
//!
//! Checkpoints are `BinFileRecorder<FullPrecisionSettings>` files. Sparsity masks are not stored:
//! they are recomputed from the loaded weights with [`TopMagnitude`] right after loading.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use models::{TopMagnitude, VwwModel, VwwModelConfig};

use crate::error::{EvalError, EvalResult};

/// Accepts the path as given or with the recorder's `.bin` extension added.
pub fn resolve_checkpoint(path: &Path) -> EvalResult<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    let with_ext = path.with_extension("bin");
    if with_ext.is_file() {
        return Ok(with_ext);
    }
    Err(EvalError::MissingCheckpoint(path.to_path_buf()))
}

pub fn load_model<B: Backend>(
    cfg: &VwwModelConfig,
    path: &Path,
    device: &B::Device,
) -> EvalResult<VwwModel<B>> {
    cfg.validate()?;
    let resolved = resolve_checkpoint(path)?;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = cfg
        .init::<B>(device)
        .load_file(resolved.clone(), &recorder, device)
        .map_err(|e| EvalError::Checkpoint {
            path: resolved.clone(),
            msg: e.to_string(),
        })?;
    tracing::info!(arch = %cfg.arch, path = %resolved.display(), "loaded checkpoint");
    Ok(model.sparsify(&TopMagnitude)?)
}

pub fn save_model<B: Backend>(model: VwwModel<B>, path: &Path) -> EvalResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| EvalError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .save_file(path.to_path_buf(), &recorder)
        .map_err(|e| EvalError::Checkpoint {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })?;
    tracing::debug!(path = %path.display(), "saved checkpoint");
    Ok(())
}

//! Optional TOML configuration for `vww-eval`.
//!
//! Lookup order: `--config`, then `VWW_EVAL_CONFIG`, then `vww-eval.toml` in the working
//! directory. Command-line flags override file values; file values override defaults.
//!
//! ```toml
//! weights = "checkpoints/mobilenet_gru_front.bin"
//! image_folder = "~/vww/samples"
//! model_arch = "mobilenet_gru_front"
//! extensions = ["jpg", "jpeg"]
//!
//! [model]
//! num_classes = 2
//! width_mult = 0.35
//!
//! [transform]
//! resize = 256
//! crop = 224
//! ```

use std::path::{Path, PathBuf};

use models::{ModelArch, VwwModelConfig};
use serde::Deserialize;

use crate::error::{EvalError, EvalResult};
use crate::preprocess::ImageTransform;

pub const DEFAULT_CONFIG_NAME: &str = "vww-eval.toml";
pub const CONFIG_ENV: &str = "VWW_EVAL_CONFIG";

#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub weights: Option<PathBuf>,
    pub image_folder: Option<PathBuf>,
    pub model_arch: ModelArch,
    pub num_classes: usize,
    pub width_mult: f32,
    pub last_channel: usize,
    pub extensions: Vec<String>,
    pub transform: ImageTransform,
}

impl Default for EvalConfig {
    fn default() -> Self {
        let model = VwwModelConfig::default();
        Self {
            weights: None,
            image_folder: None,
            model_arch: model.arch,
            num_classes: model.num_classes,
            width_mult: model.width_mult,
            last_channel: model.last_channel,
            extensions: vec!["jpg".to_string()],
            transform: ImageTransform::default(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EvalConfigFile {
    weights: Option<String>,
    image_folder: Option<String>,
    model_arch: Option<ModelArch>,
    extensions: Option<Vec<String>>,
    model: Option<ModelSection>,
    transform: Option<TransformSection>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelSection {
    num_classes: Option<usize>,
    width_mult: Option<f32>,
    last_channel: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TransformSection {
    resize: Option<u32>,
    crop: Option<u32>,
    mean: Option<[f32; 3]>,
    std: Option<[f32; 3]>,
}

impl EvalConfig {
    /// Resolves the config file to use; no file at all yields the defaults.
    pub fn load(explicit: Option<&Path>) -> EvalResult<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(raw) = std::env::var(CONFIG_ENV) {
            if !raw.trim().is_empty() {
                return Self::from_path(&expand_home(&raw));
            }
        }
        let fallback = Path::new(DEFAULT_CONFIG_NAME);
        if fallback.is_file() {
            return Self::from_path(fallback);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> EvalResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| EvalError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: EvalConfigFile = toml::from_str(&raw).map_err(|e| EvalError::Config {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded eval config");
        Ok(Self::from_file(file))
    }

    fn from_file(file: EvalConfigFile) -> Self {
        let defaults = Self::default();
        let model = file.model.unwrap_or_default();
        let transform = file.transform.unwrap_or_default();
        Self {
            weights: file.weights.map(|v| expand_home(&v)),
            image_folder: file.image_folder.map(|v| expand_home(&v)),
            model_arch: file.model_arch.unwrap_or(defaults.model_arch),
            num_classes: model.num_classes.unwrap_or(defaults.num_classes),
            width_mult: model.width_mult.unwrap_or(defaults.width_mult),
            last_channel: model.last_channel.unwrap_or(defaults.last_channel),
            extensions: file
                .extensions
                .filter(|exts| !exts.is_empty())
                .unwrap_or(defaults.extensions),
            transform: ImageTransform {
                resize: transform.resize.unwrap_or(defaults.transform.resize),
                crop: transform.crop.unwrap_or(defaults.transform.crop),
                mean: transform.mean.unwrap_or(defaults.transform.mean),
                std: transform.std.unwrap_or(defaults.transform.std),
            },
        }
    }

    pub fn model_config(&self) -> VwwModelConfig {
        VwwModelConfig {
            arch: self.model_arch,
            num_classes: self.num_classes,
            width_mult: self.width_mult,
            last_channel: self.last_channel,
            ..VwwModelConfig::default()
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(format!("{home}{rest}"));
        }
    }
    PathBuf::from(raw)
}

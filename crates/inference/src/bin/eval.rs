use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use inference::{list_images, load_model, Classifier, EvalConfig, EvalError, InferenceBackend};
use models::ModelArch;

#[derive(Parser, Debug)]
#[command(
    name = "vww-eval",
    about = "Classify a folder of images as person / no person with a trained VWW checkpoint"
)]
struct Args {
    /// Checkpoint to load (BinFileRecorder, full precision).
    #[arg(long)]
    weights: Option<PathBuf>,
    /// Folder containing the images to classify.
    #[arg(long)]
    image_folder: Option<PathBuf>,
    /// Architecture variant, e.g. mobilenet_gru_front or mobilenet_lstm_fl.
    #[arg(long)]
    model_arch: Option<ModelArch>,
    /// Number of output classes of the checkpoint.
    #[arg(long)]
    num_classes: Option<usize>,
    /// TOML config file (falls back to VWW_EVAL_CONFIG, then vww-eval.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    fn apply(self, cfg: &mut EvalConfig) {
        if let Some(weights) = self.weights {
            cfg.weights = Some(weights);
        }
        if let Some(folder) = self.image_folder {
            cfg.image_folder = Some(folder);
        }
        if let Some(arch) = self.model_arch {
            cfg.model_arch = arch;
        }
        if let Some(n) = self.num_classes {
            cfg.num_classes = n;
        }
    }
}

fn main() -> anyhow::Result<()> {
    inference::init_tracing();
    let args = Args::parse();
    let mut cfg = EvalConfig::load(args.config.as_deref()).context("loading eval config")?;
    args.apply(&mut cfg);

    let weights = cfg
        .weights
        .clone()
        .ok_or_else(|| anyhow!("no checkpoint: pass --weights or set `weights` in the config"))?;
    let folder = cfg
        .image_folder
        .clone()
        .ok_or_else(|| anyhow!("no images: pass --image-folder or set `image_folder`"))?;

    println!("Model: {}\n", cfg.model_arch);

    let device = <InferenceBackend as burn::tensor::backend::Backend>::Device::default();
    let model = load_model::<InferenceBackend>(&cfg.model_config(), &weights, &device)
        .with_context(|| format!("loading {} from {}", cfg.model_arch, weights.display()))?;
    let classifier = Classifier::new(model, cfg.transform.clone(), device);
    println!("Parameters: {}\n", format_count(classifier.num_params()));

    let images = list_images(&folder, &cfg.extensions)
        .with_context(|| format!("listing images in {}", folder.display()))?;
    if images.is_empty() {
        tracing::warn!(
            folder = %folder.display(),
            extensions = ?cfg.extensions,
            "no matching images"
        );
        return Ok(());
    }

    for path in images {
        match classifier.classify_path(&path) {
            Ok(pred) => {
                println!("{}", pred.path.display());
                println!("{:?}", pred.logits);
                println!("{}\n", pred.verdict);
            }
            Err(err @ EvalError::Image { .. }) => {
                tracing::warn!("skipping: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// `1234567` -> `1.235M`.
fn format_count(n: usize) -> String {
    let n = n as f64;
    if n >= 1e9 {
        format!("{:.3}G", n / 1e9)
    } else if n >= 1e6 {
        format!("{:.3}M", n / 1e6)
    } else if n >= 1e3 {
        format!("{:.3}K", n / 1e3)
    } else {
        format!("{n}")
    }
}

use std::fmt;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::TensorData;
use image::DynamicImage;
use models::VwwModel;
use serde::Serialize;

use crate::error::{EvalError, EvalResult};
use crate::preprocess::{open_image, ImageTransform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Person,
    NoPerson,
}

impl Verdict {
    /// Class 0 is "no person": the image has a person unless `logits[0] > logits[1]`.
    pub fn from_logits(logits: &[f32]) -> EvalResult<Self> {
        match logits {
            [no_person, person, ..] if no_person > person => Ok(Verdict::NoPerson),
            [_, _, ..] => Ok(Verdict::Person),
            _ => Err(EvalError::Logits(logits.len())),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Person => f.write_str("Person present"),
            Verdict::NoPerson => f.write_str("No person present"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub path: PathBuf,
    pub logits: Vec<f32>,
    pub verdict: Verdict,
}

/// A loaded model plus the transform its inputs go through.
pub struct Classifier<B: Backend> {
    model: VwwModel<B>,
    transform: ImageTransform,
    device: B::Device,
}

impl<B: Backend> Classifier<B> {
    pub fn new(model: VwwModel<B>, transform: ImageTransform, device: B::Device) -> Self {
        Self {
            model,
            transform,
            device,
        }
    }

    pub fn num_params(&self) -> usize {
        self.model.num_params()
    }

    pub fn logits(&self, img: &DynamicImage) -> EvalResult<Vec<f32>> {
        let input = self.transform.to_tensor::<B>(img, &self.device)?;
        tensor_values(self.model.forward(input).into_data())
    }

    pub fn classify_path(&self, path: &Path) -> EvalResult<Prediction> {
        let img = open_image(path)?;
        let logits = self.logits(&img)?;
        let verdict = Verdict::from_logits(&logits)?;
        tracing::debug!(path = %path.display(), ?logits, %verdict, "classified");
        Ok(Prediction {
            path: path.to_path_buf(),
            logits,
            verdict,
        })
    }
}

fn tensor_values(data: TensorData) -> EvalResult<Vec<f32>> {
    data.to_vec::<f32>().map_err(|e| EvalError::TensorData(format!("{e:?}")))
}

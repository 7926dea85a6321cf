//! Weight sparsity for the recurrent cells.
//!
//! Each weight matrix carries a keep ratio (fraction of entries retained, 1.0 = dense). Masks are
//! not part of the checkpoint record: they are computed from the current weights through a
//! [`MaskStrategy`] after the weights are loaded, and multiplied into the weight on every forward.

use std::collections::HashMap;

use burn::module::{Module, Param};
use burn::nn::Initializer;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::error::{ModelError, ModelResult};

/// Chooses which entries of a weight matrix survive masking.
pub trait MaskStrategy {
    /// Returns one flag per entry of `weights` (row-major), `true` meaning the entry is kept.
    fn mask(&self, name: &str, weights: &[f32], keep_ratio: f32) -> ModelResult<Vec<bool>>;
}

/// Keeps the `round(keep_ratio * n)` entries of largest magnitude (at least one).
#[derive(Debug, Clone, Copy, Default)]
pub struct TopMagnitude;

impl MaskStrategy for TopMagnitude {
    fn mask(&self, name: &str, weights: &[f32], keep_ratio: f32) -> ModelResult<Vec<bool>> {
        check_keep_ratio(name, keep_ratio)?;
        let n = weights.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let keep = keep_count(n, keep_ratio);
        let mut order: Vec<usize> = (0..n).collect();
        // Ties go to the lower index so the mask is reproducible.
        order.sort_by(|&a, &b| {
            weights[b]
                .abs()
                .total_cmp(&weights[a].abs())
                .then_with(|| a.cmp(&b))
        });
        let mut flags = vec![false; n];
        for &idx in &order[..keep] {
            flags[idx] = true;
        }
        Ok(flags)
    }
}

/// Externally supplied masks keyed by weight name (e.g. `stage1.w`, `stage2.u_c`).
#[derive(Debug, Clone, Default)]
pub struct StaticMasks {
    masks: HashMap<String, Vec<bool>>,
}

impl StaticMasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mask(mut self, name: impl Into<String>, mask: Vec<bool>) -> Self {
        self.masks.insert(name.into(), mask);
        self
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

impl MaskStrategy for StaticMasks {
    fn mask(&self, name: &str, weights: &[f32], _keep_ratio: f32) -> ModelResult<Vec<bool>> {
        let mask = self
            .masks
            .get(name)
            .ok_or_else(|| ModelError::MissingMask(name.to_string()))?;
        if mask.len() != weights.len() {
            return Err(ModelError::MaskShape {
                name: name.to_string(),
                expected: weights.len(),
                got: mask.len(),
            });
        }
        Ok(mask.clone())
    }
}

pub fn keep_count(n: usize, keep_ratio: f32) -> usize {
    ((keep_ratio as f64 * n as f64).round() as usize).clamp(1, n.max(1))
}

pub fn check_keep_ratio(name: &str, ratio: f32) -> ModelResult<()> {
    if ratio.is_nan() || ratio <= 0.0 || ratio > 1.0 {
        return Err(ModelError::InvalidKeepRatio {
            name: name.to_string(),
            ratio,
        });
    }
    Ok(())
}

/// Bias-free projection `x · W` with `W: [d_input, d_output]` and an optional constant mask.
#[derive(Module, Debug)]
pub struct SparseLinear<B: Backend> {
    pub weight: Param<Tensor<B, 2>>,
    mask: Option<Tensor<B, 2>>,
    keep_ratio: f32,
}

impl<B: Backend> SparseLinear<B> {
    pub fn new(
        d_input: usize,
        d_output: usize,
        keep_ratio: f32,
        init: &Initializer,
        device: &B::Device,
    ) -> Self {
        Self {
            weight: init.init([d_input, d_output], device),
            mask: None,
            keep_ratio,
        }
    }

    pub fn from_weight(weight: Tensor<B, 2>, keep_ratio: f32) -> Self {
        Self {
            weight: Param::from_tensor(weight),
            mask: None,
            keep_ratio,
        }
    }

    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        input.matmul(self.effective_weight())
    }

    /// Weight with the mask applied.
    pub fn effective_weight(&self) -> Tensor<B, 2> {
        let weight = self.weight.val();
        match &self.mask {
            Some(mask) => weight * mask.clone(),
            None => weight,
        }
    }

    pub fn keep_ratio(&self) -> f32 {
        self.keep_ratio
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Number of weight entries that participate in the projection.
    pub fn active_weights(&self) -> usize {
        let [rows, cols] = self.weight.val().dims();
        match &self.mask {
            Some(mask) => mask
                .clone()
                .into_data()
                .to_vec::<f32>()
                .unwrap_or_default()
                .iter()
                .filter(|v| **v > 0.5)
                .count(),
            None => rows * cols,
        }
    }

    /// Recomputes the mask from the current weights. Dense weights (ratio 1.0) stay unmasked.
    pub fn sparsify(mut self, name: &str, strategy: &dyn MaskStrategy) -> ModelResult<Self> {
        check_keep_ratio(name, self.keep_ratio)?;
        if self.keep_ratio >= 1.0 {
            self.mask = None;
            return Ok(self);
        }
        let weight = self.weight.val();
        let dims = weight.dims();
        let device = weight.device();
        let values = weight
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ModelError::WeightData {
                name: name.to_string(),
                msg: format!("{e:?}"),
            })?;
        let flags = strategy.mask(name, &values, self.keep_ratio)?;
        let kept = flags.iter().filter(|f| **f).count();
        tracing::debug!(
            weight = name,
            kept,
            total = flags.len(),
            "computed sparsity mask"
        );
        let data: Vec<f32> = flags
            .into_iter()
            .map(|keep| if keep { 1.0 } else { 0.0 })
            .collect();
        self.mask = Some(Tensor::from_data(TensorData::new(data, dims), &device));
        Ok(self)
    }
}

//! Visual Wake Words person detector: MobileNetV2 backbone with RNNPool at the front, at the end,
//! or both.

use std::fmt;
use std::str::FromStr;

use burn::module::Module;
use burn::nn::{Initializer, Linear, LinearConfig, Unfold4d, Unfold4dConfig};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::cell::CellKind;
use crate::error::{ModelError, ModelResult};
use crate::mobilenet::{
    make_divisible, ConvBnRelu, MobileNetFeatures, BLOCKS_AFTER_FRONT_POOL, BLOCKS_NO_FRONT_POOL,
};
use crate::rnnpool::{RnnPool, RnnPoolConfig};
use crate::sparsity::MaskStrategy;

pub const PATCH_SIZE: usize = 6;
pub const PATCH_STRIDE: usize = 4;
pub const FRONT_HIDDEN: usize = 16;
pub const FRONT_STEM_CHANNELS: usize = 8;
pub const STEM_CHANNELS: usize = 32;
pub const END_GRID: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolPosition {
    Front,
    Last,
    FrontLast,
}

impl PoolPosition {
    pub const ALL: [PoolPosition; 3] = [PoolPosition::Front, PoolPosition::Last, PoolPosition::FrontLast];

    pub fn has_front(self) -> bool {
        matches!(self, PoolPosition::Front | PoolPosition::FrontLast)
    }

    pub fn has_last(self) -> bool {
        matches!(self, PoolPosition::Last | PoolPosition::FrontLast)
    }

    pub fn abbr(self) -> &'static str {
        match self {
            PoolPosition::Front => "front",
            PoolPosition::Last => "last",
            PoolPosition::FrontLast => "fl",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PoolPosition::Front => "Front",
            PoolPosition::Last => "Last",
            PoolPosition::FrontLast => "FrontLast",
        }
    }
}

impl FromStr for PoolPosition {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(PoolPosition::Front),
            "last" => Ok(PoolPosition::Last),
            "fl" | "front_last" | "frontlast" => Ok(PoolPosition::FrontLast),
            other => Err(ModelError::InvalidConfig(format!(
                "unknown pool position {other:?}"
            ))),
        }
    }
}

/// One of the nine experiment variants, e.g. `mobilenet_gru_last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelArch {
    pub cell: CellKind,
    pub position: PoolPosition,
}

impl ModelArch {
    pub fn new(cell: CellKind, position: PoolPosition) -> Self {
        Self { cell, position }
    }

    /// All variants, cell-major: FastGRNN, GRU, LSTM x Front, Last, FrontLast.
    pub fn all() -> Vec<ModelArch> {
        CellKind::ALL
            .iter()
            .flat_map(|&cell| PoolPosition::ALL.iter().map(move |&pos| ModelArch::new(cell, pos)))
            .collect()
    }

    /// FastGRNN at the front is the baseline the other eight are compared against.
    pub fn is_baseline(self) -> bool {
        self.cell == CellKind::FastGrnn && self.position == PoolPosition::Front
    }

    /// Display label, e.g. `GRU+Last`.
    pub fn label(self) -> String {
        format!("{}+{}", self.cell.label(), self.position.label())
    }
}

impl Default for ModelArch {
    fn default() -> Self {
        Self::new(CellKind::Gru, PoolPosition::Front)
    }
}

impl fmt::Display for ModelArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mobilenet_{}_{}", self.cell.abbr(), self.position.abbr())
    }
}

impl FromStr for ModelArch {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ModelError::UnknownArch(s.to_string());
        let rest = s.trim().strip_prefix("mobilenet_").ok_or_else(unknown)?;
        let (cell, position) = rest.split_once('_').ok_or_else(unknown)?;
        Ok(ModelArch::new(
            cell.parse().map_err(|_| unknown())?,
            position.parse().map_err(|_| unknown())?,
        ))
    }
}

impl Serialize for ModelArch {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelArch {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone)]
pub struct VwwModelConfig {
    pub arch: ModelArch,
    pub num_classes: usize,
    pub width_mult: f32,
    pub last_channel: usize,
    pub round_nearest: usize,
    /// Keep ratios `[w1, u1, w2, u2]` shared by every RNNPool in the model.
    pub pool_sparsity: [f32; 4],
}

impl Default for VwwModelConfig {
    fn default() -> Self {
        Self {
            arch: ModelArch::default(),
            num_classes: 2,
            width_mult: 0.35,
            last_channel: 320,
            round_nearest: 8,
            pool_sparsity: [1.0; 4],
        }
    }
}

impl VwwModelConfig {
    pub fn new(arch: ModelArch) -> Self {
        Self {
            arch,
            ..Default::default()
        }
    }

    pub fn last_channel(&self) -> usize {
        make_divisible(
            self.last_channel as f32 * self.width_mult.max(1.0),
            self.round_nearest,
            None,
        )
    }

    pub fn front_pool_config(&self) -> RnnPoolConfig {
        let [w1, u1, w2, u2] = self.pool_sparsity;
        RnnPoolConfig::new(
            PATCH_SIZE,
            PATCH_SIZE,
            FRONT_HIDDEN,
            FRONT_HIDDEN,
            make_divisible(FRONT_STEM_CHANNELS as f32, self.round_nearest, None),
        )
        .with_cell(self.arch.cell)
        .with_sparsity(w1, u1, w2, u2)
    }

    pub fn end_pool_config(&self) -> RnnPoolConfig {
        let last = self.last_channel();
        let [w1, u1, w2, u2] = self.pool_sparsity;
        RnnPoolConfig::new(END_GRID, END_GRID, last / 4, last / 4, last)
            .with_cell(self.arch.cell)
            .with_sparsity(w1, u1, w2, u2)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.num_classes == 0 {
            return Err(ModelError::InvalidConfig("num_classes must be > 0".into()));
        }
        if self.width_mult.is_nan() || self.width_mult <= 0.0 {
            return Err(ModelError::InvalidConfig(format!(
                "width_mult must be positive, got {}",
                self.width_mult
            )));
        }
        if self.round_nearest == 0 {
            return Err(ModelError::InvalidConfig("round_nearest must be > 0".into()));
        }
        if self.arch.position.has_last() && self.last_channel() < 4 {
            return Err(ModelError::InvalidConfig(format!(
                "last_channel {} too small for end pooling",
                self.last_channel()
            )));
        }
        if self.arch.position.has_front() {
            self.front_pool_config().validate()?;
        }
        if self.arch.position.has_last() {
            self.end_pool_config().validate()?;
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> VwwModel<B> {
        VwwModel::new(self, device)
    }
}

/// Unfolds `PATCH_SIZE` patches with stride `PATCH_STRIDE`, pools each patch with an RNNPool and
/// folds the pooled vectors back into a map, replicate-padded by one row and one column.
#[derive(Module, Debug)]
pub struct PatchPool<B: Backend> {
    unfold: Unfold4d,
    pool: RnnPool<B>,
    patch: usize,
    stride: usize,
}

impl<B: Backend> PatchPool<B> {
    pub fn new(cfg: &RnnPoolConfig, stride: usize, device: &B::Device) -> Self {
        let patch = cfg.rows;
        let unfold = Unfold4dConfig::new([cfg.rows, cfg.cols])
            .with_stride([stride, stride])
            .init();
        Self {
            unfold,
            pool: cfg.init(device),
            patch,
            stride,
        }
    }

    pub fn output_channels(&self) -> usize {
        self.pool.output_dims()
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = input.dims();
        let out_h = (height - self.patch) / self.stride + 1;
        let out_w = (width - self.patch) / self.stride + 1;
        let locations = out_h * out_w;

        // [batch, channels * patch * patch, locations] -> [batch * locations, channels, patch, patch]
        let patches = self
            .unfold
            .forward(input)
            .swap_dims(1, 2)
            .reshape([batch * locations, channels, self.patch, self.patch]);
        let pooled = self.pool.forward(patches);
        let features = pooled.dims()[1];
        let map = pooled
            .reshape([batch, out_h, out_w, features])
            .permute([0, 3, 1, 2]);
        replicate_pad_bottom_right(map)
    }

    pub fn sparsify(mut self, strategy: &dyn MaskStrategy) -> ModelResult<Self> {
        self.pool = self.pool.sparsify(strategy)?;
        Ok(self)
    }
}

fn replicate_pad_bottom_right<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [b, c, h, w] = x.dims();
    let last_col = x.clone().slice([0..b, 0..c, 0..h, w - 1..w]);
    let x = Tensor::cat(vec![x, last_col], 3);
    let last_row = x.clone().slice([0..b, 0..c, h - 1..h, 0..w + 1]);
    Tensor::cat(vec![x, last_row], 2)
}

#[derive(Module, Debug)]
pub struct VwwModel<B: Backend> {
    stem: ConvBnRelu<B>,
    front_pool: Option<PatchPool<B>>,
    features: MobileNetFeatures<B>,
    end_pool: Option<RnnPool<B>>,
    classifier: Linear<B>,
}

impl<B: Backend> VwwModel<B> {
    pub fn new(cfg: &VwwModelConfig, device: &B::Device) -> Self {
        let position = cfg.arch.position;
        let last_channel = cfg.last_channel();

        let (stem_channels, settings) = if position.has_front() {
            (FRONT_STEM_CHANNELS, &BLOCKS_AFTER_FRONT_POOL)
        } else {
            (STEM_CHANNELS, &BLOCKS_NO_FRONT_POOL)
        };
        let stem_channels = make_divisible(stem_channels as f32, cfg.round_nearest, None);
        let stem = ConvBnRelu::new(3, stem_channels, 3, 2, 1, device);

        let front_pool = position
            .has_front()
            .then(|| PatchPool::new(&cfg.front_pool_config(), PATCH_STRIDE, device));
        let block_input = front_pool
            .as_ref()
            .map(PatchPool::output_channels)
            .unwrap_or(stem_channels);

        let features = MobileNetFeatures::new(
            settings,
            block_input,
            cfg.width_mult,
            cfg.round_nearest,
            last_channel,
            device,
        );

        let end_pool = position
            .has_last()
            .then(|| cfg.end_pool_config().init(device));
        let head_input = end_pool
            .as_ref()
            .map(RnnPool::output_dims)
            .unwrap_or(last_channel);
        let classifier = LinearConfig::new(head_input, cfg.num_classes)
            .with_initializer(Initializer::Normal {
                mean: 0.0,
                std: 0.01,
            })
            .init(device);

        tracing::debug!(
            arch = %cfg.arch,
            stem_channels,
            block_input,
            head_input,
            "built VWW model"
        );

        Self {
            stem,
            front_pool,
            features,
            end_pool,
            classifier,
        }
    }

    /// `[batch, 3, 224, 224]` -> class scores `[batch, num_classes]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let pooled = self.pooled_features(images);
        self.classifier.forward(pooled)
    }

    /// Vector fed to the classifier: end RNNPool output, or global average pooling.
    pub fn pooled_features(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(images);
        if let Some(front) = &self.front_pool {
            x = front.forward(x);
        }
        let x = self.features.forward(x);
        match &self.end_pool {
            Some(pool) => pool.forward(x),
            None => {
                let [batch, channels, _, _] = x.dims();
                x.mean_dim(3).mean_dim(2).reshape([batch, channels])
            }
        }
    }

    pub fn has_front_pool(&self) -> bool {
        self.front_pool.is_some()
    }

    pub fn has_end_pool(&self) -> bool {
        self.end_pool.is_some()
    }

    /// Recomputes the weight masks of every RNNPool in the model.
    pub fn sparsify(mut self, strategy: &dyn MaskStrategy) -> ModelResult<Self> {
        if let Some(front) = self.front_pool.take() {
            self.front_pool = Some(front.sparsify(strategy)?);
        }
        if let Some(end) = self.end_pool.take() {
            self.end_pool = Some(end.sparsify(strategy)?);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn arch_strings_round_trip() {
        for arch in ModelArch::all() {
            let name = arch.to_string();
            assert_eq!(name.parse::<ModelArch>().unwrap(), arch);
        }
        assert_eq!(
            "mobilenet_lstm_fl".parse::<ModelArch>().unwrap(),
            ModelArch::new(CellKind::Lstm, PoolPosition::FrontLast)
        );
        assert!("mobilenet_rnn_last".parse::<ModelArch>().is_err());
        assert!("resnet_gru_last".parse::<ModelArch>().is_err());
    }

    #[test]
    fn nine_variants_with_one_baseline() {
        let all = ModelArch::all();
        assert_eq!(all.len(), 9);
        assert_eq!(all.iter().filter(|a| a.is_baseline()).count(), 1);
        assert_eq!(all[0].label(), "FastGRNN+Front");
        assert_eq!(all[8].label(), "LSTM+FrontLast");
    }

    #[test]
    fn pool_configs_follow_last_channel() {
        let cfg = VwwModelConfig::new("mobilenet_gru_fl".parse().unwrap());
        let end = cfg.end_pool_config();
        assert_eq!((end.rows, end.hidden, end.hidden_bidir, end.input_dims), (7, 80, 80, 320));
        assert_eq!(end.cell, CellKind::Gru);
        let front = cfg.front_pool_config();
        assert_eq!((front.rows, front.hidden, front.input_dims), (6, 16, 8));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn patch_pool_folds_to_padded_map() {
        let device = Default::default();
        let cfg = RnnPoolConfig::new(6, 6, 4, 4, 3);
        let pool = PatchPool::<B>::new(&cfg, 4, &device);
        // (22 - 6) / 4 + 1 = 5 patches per side, padded to 6.
        let out = pool.forward(Tensor::<B, 4>::ones([2, 3, 22, 22], &device));
        assert_eq!(out.dims(), [2, 8, 6, 6]);
    }

    #[test]
    fn replicate_pad_copies_edges() {
        let device = Default::default();
        let x = Tensor::<B, 4>::from_data(
            burn::tensor::TensorData::new(vec![1.0, 2.0, 3.0, 4.0], [1, 1, 2, 2]),
            &device,
        );
        let padded = replicate_pad_bottom_right(x);
        assert_eq!(padded.dims(), [1, 1, 3, 3]);
        assert_eq!(
            padded.into_data().to_vec::<f32>().unwrap(),
            vec![1.0, 2.0, 2.0, 3.0, 4.0, 4.0, 3.0, 4.0, 4.0]
        );
    }
}

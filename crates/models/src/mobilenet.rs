//! MobileNetV2 building blocks: conv/bn/relu6 units, inverted residual blocks and the block stack.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Rounds `v` to a multiple of `divisor` (at least `min_value`, default `divisor`) without
/// dropping more than 10% below `v`.
pub fn make_divisible(v: f32, divisor: usize, min_value: Option<usize>) -> usize {
    let min_value = min_value.unwrap_or(divisor);
    let rounded = ((v + divisor as f32 / 2.0) as usize) / divisor * divisor;
    let mut new_v = min_value.max(rounded);
    if (new_v as f32) < 0.9 * v {
        new_v += divisor;
    }
    new_v
}

/// One row of the inverted residual table: expansion `t`, channels `c`, repeats `n`, stride `s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSetting {
    pub expand_ratio: usize,
    pub channels: usize,
    pub repeats: usize,
    pub stride: usize,
}

const fn block(expand_ratio: usize, channels: usize, repeats: usize, stride: usize) -> BlockSetting {
    BlockSetting {
        expand_ratio,
        channels,
        repeats,
        stride,
    }
}

/// Block table when the stem output goes straight into the blocks (112x112 -> 7x7).
pub const BLOCKS_NO_FRONT_POOL: [BlockSetting; 7] = [
    block(1, 16, 1, 1),
    block(6, 24, 2, 2),
    block(6, 32, 3, 2),
    block(6, 64, 4, 2),
    block(6, 96, 3, 1),
    block(6, 160, 3, 2),
    block(6, 320, 1, 1),
];

/// Block table after a front RNNPool has already reduced the map to 28x28 (28x28 -> 7x7).
pub const BLOCKS_AFTER_FRONT_POOL: [BlockSetting; 7] = [
    block(1, 16, 1, 1),
    block(6, 24, 2, 1),
    block(6, 32, 3, 1),
    block(6, 64, 4, 2),
    block(6, 96, 3, 1),
    block(6, 160, 3, 2),
    block(6, 320, 1, 1),
];

fn conv_init() -> Initializer {
    Initializer::KaimingNormal {
        gain: std::f64::consts::SQRT_2,
        fan_out_only: true,
    }
}

/// Conv2d -> BatchNorm (momentum 0.01) -> ReLU6.
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBnRelu<B> {
    pub fn new(
        in_planes: usize,
        out_planes: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        let padding = (kernel_size - 1) / 2;
        let conv = Conv2dConfig::new([in_planes, out_planes], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .with_initializer(conv_init())
            .init(device);
        let bn = BatchNormConfig::new(out_planes)
            .with_momentum(0.01)
            .init(device);
        Self { conv, bn }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.bn.forward(x);
        x.clamp(0.0, 6.0)
    }
}

#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    expand: Option<ConvBnRelu<B>>,
    depthwise: ConvBnRelu<B>,
    project: Conv2d<B>,
    project_bn: BatchNorm<B, 2>,
    use_residual: bool,
}

impl<B: Backend> InvertedResidual<B> {
    pub fn new(
        inp: usize,
        oup: usize,
        stride: usize,
        expand_ratio: usize,
        device: &B::Device,
    ) -> Self {
        debug_assert!(stride == 1 || stride == 2, "stride must be 1 or 2");
        let hidden = inp * expand_ratio;
        let expand = (expand_ratio != 1).then(|| ConvBnRelu::new(inp, hidden, 1, 1, 1, device));
        let depthwise = ConvBnRelu::new(hidden, hidden, 3, stride, hidden, device);
        let project = Conv2dConfig::new([hidden, oup], [1, 1])
            .with_bias(false)
            .with_initializer(conv_init())
            .init(device);
        let project_bn = BatchNormConfig::new(oup).with_momentum(0.01).init(device);
        Self {
            expand,
            depthwise,
            project,
            project_bn,
            use_residual: stride == 1 && inp == oup,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input.clone();
        if let Some(expand) = &self.expand {
            x = expand.forward(x);
        }
        let x = self.depthwise.forward(x);
        let x = self.project_bn.forward(self.project.forward(x));
        if self.use_residual {
            input + x
        } else {
            x
        }
    }

    pub fn has_residual(&self) -> bool {
        self.use_residual
    }
}

/// Inverted residual stack followed by the 1x1 expansion to `last_channel`.
#[derive(Module, Debug)]
pub struct MobileNetFeatures<B: Backend> {
    blocks: Vec<InvertedResidual<B>>,
    last: ConvBnRelu<B>,
    last_channel: usize,
}

impl<B: Backend> MobileNetFeatures<B> {
    pub fn new(
        settings: &[BlockSetting],
        input_channel: usize,
        width_mult: f32,
        round_nearest: usize,
        last_channel: usize,
        device: &B::Device,
    ) -> Self {
        let mut blocks = Vec::new();
        let mut channels = input_channel;
        for setting in settings {
            let output = make_divisible(setting.channels as f32 * width_mult, round_nearest, None);
            for i in 0..setting.repeats {
                let stride = if i == 0 { setting.stride } else { 1 };
                blocks.push(InvertedResidual::new(
                    channels,
                    output,
                    stride,
                    setting.expand_ratio,
                    device,
                ));
                channels = output;
            }
        }
        let last = ConvBnRelu::new(channels, last_channel, 1, 1, 1, device);
        Self {
            blocks,
            last,
            last_channel,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input;
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.last.forward(x)
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn last_channel(&self) -> usize {
        self.last_channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn make_divisible_matches_width_035_table() {
        let widths: Vec<usize> = BLOCKS_NO_FRONT_POOL
            .iter()
            .map(|s| make_divisible(s.channels as f32 * 0.35, 8, None))
            .collect();
        assert_eq!(widths, vec![8, 8, 16, 24, 32, 56, 112]);
        assert_eq!(make_divisible(320.0, 8, None), 320);
        assert_eq!(make_divisible(3.0, 8, None), 8);
    }

    #[test]
    fn residual_only_when_shape_is_preserved() {
        let device = Default::default();
        assert!(InvertedResidual::<B>::new(16, 16, 1, 6, &device).has_residual());
        assert!(!InvertedResidual::<B>::new(16, 16, 2, 6, &device).has_residual());
        assert!(!InvertedResidual::<B>::new(16, 24, 1, 6, &device).has_residual());
    }

    #[test]
    fn inverted_residual_downsamples_with_stride_two() {
        let device = Default::default();
        let block = InvertedResidual::<B>::new(8, 16, 2, 6, &device);
        let out = block.forward(Tensor::<B, 4>::ones([2, 8, 10, 10], &device));
        assert_eq!(out.dims(), [2, 16, 5, 5]);
    }

    #[test]
    fn features_reduce_112_to_7() {
        let device = Default::default();
        let features =
            MobileNetFeatures::<B>::new(&BLOCKS_NO_FRONT_POOL, 32, 0.35, 8, 320, &device);
        assert_eq!(features.num_blocks(), 17);
        let out = features.forward(Tensor::<B, 4>::zeros([1, 32, 112, 112], &device));
        assert_eq!(out.dims(), [1, 320, 7, 7]);
    }
}

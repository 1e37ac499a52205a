//! # Convolutional Feature Extractor
//!
//! [`ExtractorConfig`] implements [`Config`], and provides
//! [`ExtractorConfig::init`] to initialize an [`Extractor`].
//!
//! The extractor is a `ResNet`-style stem (7x7 conv/norm/relu, 3x3 max-pool)
//! followed by one [`ResidualBlock`] per stage. Every stage after the first
//! halves the resolution.

use crate::layers::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Config, Tensor};
use burn::tensor::activation::relu;

/// Stride of the stem max-pool.
const POOL_STRIDE: usize = 2;

/// [`Extractor`] Config.
#[derive(Config, Debug)]
pub struct ExtractorConfig {
    /// Input image channels.
    #[config(default = "3")]
    pub in_channels: usize,

    /// Stem output channels.
    #[config(default = "32")]
    pub stem_width: usize,

    /// Output channels of each residual stage.
    pub stage_widths: Vec<usize>,

    /// Pretrained weights for the extractor: a local record path or URL.
    #[config(default = "None")]
    pub pretrained: Option<String>,
}

impl ExtractorConfig {
    /// Output feature planes.
    pub fn out_planes(&self) -> usize {
        self.stage_widths.last().copied().unwrap_or(self.stem_width)
    }

    /// Total resolution reduction factor.
    pub fn reduction(&self) -> usize {
        // Stem conv and pool are /2 each; every stage after the first is /2.
        4 * (1 << self.stage_widths.len().saturating_sub(1))
    }

    /// Initialize an [`Extractor`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Extractor<B> {
        let stem = ConvNorm2dConfig::from(
            Conv2dConfig::new([self.in_channels, self.stem_width], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false),
        );

        let mut in_planes = self.stem_width;
        let stages = self
            .stage_widths
            .iter()
            .enumerate()
            .map(|(idx, &out_planes)| {
                let stride = if idx == 0 { 1 } else { 2 };
                let block = ResidualBlockConfig::new(in_planes, out_planes)
                    .with_stride(stride)
                    .init(device);
                in_planes = out_planes;
                block
            })
            .collect();

        Extractor {
            stem: stem.init(device),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([POOL_STRIDE, POOL_STRIDE])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            stages,
        }
    }
}

/// Convolutional feature extractor.
#[derive(Module, Debug)]
pub struct Extractor<B: Backend> {
    /// Stem conv/norm/relu.
    pub stem: ConvNorm2d<B>,

    /// Stem pool.
    pub pool: MaxPool2d,

    /// Residual stages.
    pub stages: Vec<ResidualBlock<B>>,
}

impl<B: Backend> Extractor<B> {
    /// Output feature planes.
    pub fn out_planes(&self) -> usize {
        self.stages
            .last()
            .map_or(self.stem.out_channels(), |s| s.out_planes())
    }

    /// Feature map ``[height, width]`` for an input of ``[height, width]``.
    pub fn output_size(
        &self,
        [height, width]: [usize; 2],
    ) -> [usize; 2] {
        // Every conv and the pool are "same" padded; only stride shrinks.
        let strides = [self.stem.stride()[0], POOL_STRIDE]
            .into_iter()
            .chain(self.stages.iter().map(|stage| stage.stride()));
        strides.fold([height, width], |[h, w], stride| {
            [
                h.saturating_sub(1) / stride + 1,
                w.saturating_sub(1) / stride + 1,
            ]
        })
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_planes, height / reduction, width / reduction]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.stem.forward(input);
        let x = self.pool.forward(x);
        self.stages.iter().fold(x, |x, stage| stage.forward(x))
    }
}

/// [`ResidualBlock`] Config.
#[derive(Config, Debug)]
pub struct ResidualBlockConfig {
    /// Input planes.
    pub in_planes: usize,

    /// Output planes.
    pub out_planes: usize,

    /// Stride of the first conv, and of the downsample.
    #[config(default = "1")]
    pub stride: usize,
}

impl ResidualBlockConfig {
    /// Initialize a [`ResidualBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ResidualBlock<B> {
        let stride = self.stride;

        let downsample = if stride != 1 || self.in_planes != self.out_planes {
            ConvNorm2dConfig::from(
                Conv2dConfig::new([self.in_planes, self.out_planes], [1, 1])
                    .with_stride([stride, stride])
                    .with_bias(false),
            )
            .with_relu(false)
            .init(device)
            .into()
        } else {
            None
        };

        ResidualBlock {
            downsample,
            cn1: ConvNorm2dConfig::from(
                Conv2dConfig::new([self.in_planes, self.out_planes], [3, 3])
                    .with_stride([stride, stride])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_bias(false),
            )
            .init(device),
            cn2: ConvNorm2dConfig::from(
                Conv2dConfig::new([self.out_planes, self.out_planes], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_bias(false),
            )
            .with_relu(false)
            .init(device),
        }
    }
}

/// Two 3x3 conv/norm layers with a residual connection.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    /// Optional downsample for the residual connection.
    pub downsample: Option<ConvNorm2d<B>>,

    /// First Conv/Norm/Relu.
    pub cn1: ConvNorm2d<B>,

    /// Second Conv/Norm.
    pub cn2: ConvNorm2d<B>,
}

impl<B: Backend> ResidualBlock<B> {
    /// Input planes.
    pub fn in_planes(&self) -> usize {
        self.cn1.in_channels()
    }

    /// Output planes.
    pub fn out_planes(&self) -> usize {
        self.cn2.out_channels()
    }

    /// Block stride.
    pub fn stride(&self) -> usize {
        self.cn1.stride()[0]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_planes, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_planes", "in_height", "in_width"],
            &input,
            &["batch"],
            &[("in_planes", self.in_planes())],
        );

        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.cn1.forward(input);
        let x = self.cn2.forward(x);
        let x = relu(x + identity);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[("batch", batch), ("out_planes", self.out_planes())]
        );

        x
    }
}

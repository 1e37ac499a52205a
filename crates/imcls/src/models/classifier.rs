//! # Hybrid Image Classifier
//!
//! [`ClassifierConfig`] implements [`Config`], and provides
//! [`ClassifierConfig::init`] to initialize a [`Classifier`], and
//! [`ClassifierConfig::init_pretrained`] to additionally load the weights named
//! by the config's `pretrained` fields.
//!
//! [`Classifier`] implements [`Module`], and provides
//! [`Classifier::forward`] (logits) and [`Classifier::forward_test`] (test-time
//! class scores).

use crate::cache::disk::DiskCacheConfig;
use crate::cache::weights::PretrainedSource;
use crate::models::extractor::{Extractor, ExtractorConfig};
use crate::models::vit::{Vit, VitConfig};
use anyhow::anyhow;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::{Backend, Config, Tensor};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::activation::softmax;
use std::path::PathBuf;

/// The recorder used for all weight files.
pub type WeightsRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// [`Classifier`] Config.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Convolutional feature extractor.
    pub extractor: ExtractorConfig,

    /// Token transformer over the extractor features.
    pub vit: VitConfig,

    /// Number of classification classes.
    pub num_classes: usize,

    /// Apply softmax to test-time scores.
    #[config(default = "true")]
    pub softmax: bool,

    /// Pretrained weights for the whole model: a local record path or URL.
    #[config(default = "None")]
    pub pretrained: Option<String>,
}

impl ClassifierConfig {
    /// A small hybrid classifier; suitable for ``112x112`` face crops.
    pub fn tiny(num_classes: usize) -> Self {
        Self::new(
            ExtractorConfig::new(vec![32, 64, 128]),
            VitConfig::new(128, 4, 2).with_max_tokens(64),
            num_classes,
        )
    }

    /// Initialize a [`Classifier`] with random weights.
    ///
    /// Ignores every `pretrained` field.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Classifier<B> {
        let extractor = self.extractor.init(device);
        let vit = self.vit.init(extractor.out_planes(), device);
        let head = LinearConfig::new(self.vit.d_model, self.num_classes).init(device);

        Classifier {
            extractor,
            vit,
            head,
            softmax: self.softmax,
        }
    }

    /// Initialize a [`Classifier`], then load pretrained weights.
    ///
    /// Whole-model weights load first; `extractor` and `vit` weights then
    /// replace their sub-modules.
    pub fn init_pretrained<B: Backend>(
        &self,
        device: &B::Device,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<Classifier<B>> {
        let recorder = WeightsRecorder::new();
        let mut model = self.init(device);

        if let Some(path) = resolve_pretrained("model", &self.pretrained, disk_cache)? {
            tracing::info!(path = %path.display(), "loading pretrained model weights");
            model = model
                .load_file(path, &recorder, device)
                .map_err(|err| anyhow!("loading pretrained model: {err:?}"))?;
        }

        if let Some(path) = resolve_pretrained("extractor", &self.extractor.pretrained, disk_cache)? {
            tracing::info!(path = %path.display(), "loading pretrained extractor weights");
            model.extractor = model
                .extractor
                .load_file(path, &recorder, device)
                .map_err(|err| anyhow!("loading pretrained extractor: {err:?}"))?;
        }

        if let Some(path) = resolve_pretrained("vit", &self.vit.pretrained, disk_cache)? {
            tracing::info!(path = %path.display(), "loading pretrained vit weights");
            model.vit = model
                .vit
                .load_file(path, &recorder, device)
                .map_err(|err| anyhow!("loading pretrained vit: {err:?}"))?;
        }

        Ok(model)
    }
}

fn resolve_pretrained(
    name: &str,
    pretrained: &Option<String>,
    disk_cache: &DiskCacheConfig,
) -> anyhow::Result<Option<PathBuf>> {
    pretrained
        .as_deref()
        .map(|value| PretrainedSource::parse(value).resolve(name, disk_cache))
        .transpose()
}

/// Hybrid convolution / transformer image classifier.
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    /// Convolutional feature extractor.
    pub extractor: Extractor<B>,

    /// Token transformer.
    pub vit: Vit<B>,

    /// Classification head.
    pub head: Linear<B>,

    /// Apply softmax to test-time scores.
    pub softmax: bool,
}

impl<B: Backend> Classifier<B> {
    /// Number of output classes.
    pub fn num_classes(&self) -> usize {
        self.head.weight.dims()[1]
    }

    /// Transformer tokens for an input of ``[height, width]``.
    pub fn token_count(
        &self,
        size: [usize; 2],
    ) -> usize {
        let [height, width] = self.extractor.output_size(size);
        height * width
    }

    /// The most transformer tokens an input may produce.
    pub fn max_tokens(&self) -> usize {
        self.vit.max_tokens
    }

    /// Forward pass to logits.
    ///
    /// # Arguments
    ///
    /// - `images`: ``[batch, channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]``
    pub fn forward(
        &self,
        images: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x = self.extractor.forward(images);
        let x = self.vit.forward(x);
        self.head.forward(x)
    }

    /// Test-time forward pass to class scores.
    ///
    /// Softmax probabilities when the model was configured with `softmax`;
    /// otherwise logits.
    pub fn forward_test(
        &self,
        images: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let logits = self.forward(images);
        if self.softmax {
            softmax(logits, 1)
        } else {
            logits
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tiny_classifier_config;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_tiny_config() {
        let config = ClassifierConfig::tiny(7);
        assert_eq!(config.num_classes, 7);
        assert!(config.softmax);
        assert_eq!(config.extractor.reduction(), 16);
        // 112 / 16 = 7; 7 * 7 tokens.
        assert!(config.vit.max_tokens >= 49);
    }

    #[test]
    fn test_forward_test_scores() {
        type B = NdArray;
        let device = Default::default();

        let model: Classifier<B> = tiny_classifier_config(5).init(&device);
        assert_eq!(model.num_classes(), 5);

        let scores = model.forward_test(Tensor::ones([1, 3, 32, 32], &device));
        assert_shape_contract!(
            ["batch", "classes"],
            &scores,
            &[("batch", 1), ("classes", 5)],
        );

        let total = scores.sum().into_scalar();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_token_count() {
        type B = NdArray;
        let device = Default::default();

        let model: Classifier<B> = tiny_classifier_config(3).init(&device);
        assert_eq!(model.token_count([32, 32]), 16);
        assert_eq!(model.token_count([200, 200]), 625);
        assert_eq!(model.max_tokens(), 64);
    }

    #[test]
    fn test_forward_test_logits() {
        type B = NdArray;
        let device = Default::default();

        let model: Classifier<B> = tiny_classifier_config(3)
            .with_softmax(false)
            .init(&device);
        let input = Tensor::ones([1, 3, 32, 32], &device);

        model
            .forward_test(input.clone())
            .to_data()
            .assert_eq(&model.forward(input).to_data(), true);
    }

    #[test]
    fn test_init_pretrained_from_local_records() {
        type B = NdArray;
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let recorder = WeightsRecorder::new();

        let config = tiny_classifier_config(3);
        let source: Classifier<B> = config.init(&device);

        let extractor_path = dir.path().join("extractor");
        source
            .extractor
            .clone()
            .save_file(extractor_path.clone(), &recorder)
            .unwrap();

        let mut config = config;
        config.extractor.pretrained = Some(extractor_path.to_string_lossy().to_string());

        let loaded: Classifier<B> = config
            .init_pretrained(&device, &DiskCacheConfig::default())
            .unwrap();

        loaded
            .extractor
            .stem
            .conv
            .weight
            .to_data()
            .assert_eq(&source.extractor.stem.conv.weight.to_data(), true);
    }

    #[test]
    fn test_init_pretrained_missing_weights() {
        type B = NdArray;
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();

        let config = tiny_classifier_config(3)
            .with_pretrained(Some(dir.path().join("nope").to_string_lossy().to_string()));

        let result: anyhow::Result<Classifier<B>> =
            config.init_pretrained(&device, &DiskCacheConfig::default());
        assert!(result.is_err());
    }
}

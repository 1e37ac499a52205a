//! # Model Initialization and Inference
//!
//! [`init_model`] (or the [`ModelInit`] builder) resolves a configuration,
//! builds a [`Classifier`], loads an optional checkpoint, and resolves the
//! class labels into an [`InferenceModel`].
//!
//! [`inference_model`] (or [`InferenceModel::infer`]) classifies one image:
//!
//! 1. adapt the stored test pipeline to the input kind;
//! 2. run the pipeline;
//! 3. collate a batch of one on the model device;
//! 4. run the test-time forward pass;
//! 5. normalize the scores against the labels.
//!
//! Inference does not modify the model or its stored configuration.

use crate::batch::{ImageBatch, collate};
use crate::checkpoint::load_checkpoint;
use crate::config::{ConfigOptions, ConfigSource, InferenceConfig, clear_pretrained, resolve_config};
use crate::errors::{InferError, InferResult};
use crate::labels::LabelResolver;
use crate::models::Classifier;
use crate::pipeline::{Compose, ImageInput, Sample, adapt_pipeline, initial_sample};
use crate::result::{ClassificationResult, normalize_scores};
use burn::module::Module;
use burn::prelude::Backend;
use burn::tensor::backend::AutodiffBackend;
use std::path::{Path, PathBuf};

/// Builder for an [`InferenceModel`].
#[derive(Debug, Clone)]
pub struct ModelInit {
    source: ConfigSource,
    checkpoint: Option<PathBuf>,
    options: Option<ConfigOptions>,
    default_classes: Option<Vec<String>>,
}

impl ModelInit {
    /// Start from a config source.
    pub fn new<S: Into<ConfigSource>>(source: S) -> Self {
        Self {
            source: source.into(),
            checkpoint: None,
            options: None,
            default_classes: None,
        }
    }

    /// Load weights from a checkpoint path.
    pub fn with_checkpoint<P: Into<PathBuf>>(
        mut self,
        checkpoint: P,
    ) -> Self {
        self.checkpoint = Some(checkpoint.into());
        self
    }

    /// Merge override options into the config.
    pub fn with_options(
        mut self,
        options: ConfigOptions,
    ) -> Self {
        self.options = Some(options);
        self
    }

    /// Labels to use when the checkpoint carries none.
    pub fn with_default_classes<I, S>(
        mut self,
        classes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_classes = Some(classes.into_iter().map(Into::into).collect());
        self
    }

    /// Build the model on `device`.
    ///
    /// Every `pretrained` field is cleared; weights come only from the
    /// checkpoint. Without a checkpoint the model has no labels.
    ///
    /// # Errors
    ///
    /// - [`InferError::AutodiffBackend`] if `B` is an autodiff backend; see
    ///   [`ModelInit::init_valid`].
    /// - [`InferError::ConfigOption`] if ``model.vit.n_heads`` does not divide
    ///   ``model.vit.d_model``.
    #[tracing::instrument(skip_all)]
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> InferResult<InferenceModel<B>> {
        // Batch norm picks training behavior from the backend, not the params.
        if B::ad_enabled() {
            return Err(InferError::AutodiffBackend);
        }

        let mut config = resolve_config(self.source, self.options.as_ref())?;
        clear_pretrained(&mut config);
        config
            .model
            .vit
            .check_heads()
            .map_err(|message| InferError::config_option("model.vit.n_heads", message))?;

        let classifier = config.model.init::<B>(device);

        let (classifier, classes) = match &self.checkpoint {
            Some(path) => {
                let (classifier, meta) = load_checkpoint(classifier, path, device)?;
                let resolver =
                    LabelResolver::with_fallbacks(self.default_classes, config.default_classes.clone());
                (classifier, Some(resolver.resolve(meta.as_ref())))
            }
            None => {
                tracing::warn!("no checkpoint; model weights are random and labels are unset");
                (classifier, None)
            }
        };

        tracing::info!(
            num_classes = config.model.num_classes,
            labels = classes.as_ref().map(Vec::len),
            "initialized model"
        );

        Ok(InferenceModel {
            classifier: classifier.no_grad(),
            classes,
            device: device.clone(),
            config,
        })
    }

    /// Build the model for an autodiff backend on its inner backend.
    ///
    /// The returned model runs in evaluation mode.
    pub fn init_valid<B: AutodiffBackend>(
        self,
        device: &B::Device,
    ) -> InferResult<InferenceModel<B::InnerBackend>> {
        self.init::<B::InnerBackend>(device)
    }
}

/// Initialize an [`InferenceModel`].
///
/// # Arguments
///
/// - `configuration`: a config file path or an [`InferenceConfig`].
/// - `checkpoint`: optional checkpoint path; see [`crate::checkpoint`].
/// - `device`: the device to build and run the model on.
/// - `options`: optional dotted-key config overrides.
pub fn init_model<B: Backend, S: Into<ConfigSource>>(
    configuration: S,
    checkpoint: Option<&Path>,
    device: &B::Device,
    options: Option<&ConfigOptions>,
) -> InferResult<InferenceModel<B>> {
    let mut init = ModelInit::new(configuration);
    if let Some(checkpoint) = checkpoint {
        init = init.with_checkpoint(checkpoint);
    }
    if let Some(options) = options {
        init = init.with_options(options.clone());
    }
    init.init(device)
}

/// Classify one image with `model`.
#[tracing::instrument(skip_all)]
pub fn inference_model<B: Backend>(
    model: &InferenceModel<B>,
    image: impl Into<ImageInput>,
) -> InferResult<ClassificationResult> {
    model.infer(image)
}

/// An initialized classifier, ready for inference.
#[derive(Debug)]
pub struct InferenceModel<B: Backend> {
    classifier: Classifier<B>,
    classes: Option<Vec<String>>,
    device: B::Device,
    config: InferenceConfig,
}

impl<B: Backend> InferenceModel<B> {
    /// The classifier module.
    pub fn classifier(&self) -> &Classifier<B> {
        &self.classifier
    }

    /// The resolved class labels; `None` without a checkpoint.
    pub fn classes(&self) -> Option<&[String]> {
        self.classes.as_deref()
    }

    /// The model device.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// The resolved configuration.
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Run the adapted test pipeline on `input`.
    pub fn preprocess(
        &self,
        input: ImageInput,
    ) -> InferResult<Sample> {
        let pipeline = Compose::new(adapt_pipeline(self.config.test_pipeline(), input.kind()));
        pipeline.apply(initial_sample(input))
    }

    /// Raw test-time scores for the first image of `batch`.
    ///
    /// # Errors
    ///
    /// [`InferError::InputSize`] if the images are too large for the model.
    pub fn forward_scores(
        &self,
        batch: ImageBatch<B>,
    ) -> InferResult<Vec<f32>> {
        let [_, _, height, width] = batch.images.dims();
        let tokens = self.classifier.token_count([height, width]);
        let max_tokens = self.classifier.max_tokens();
        if tokens > max_tokens {
            return Err(InferError::InputSize {
                height,
                width,
                tokens,
                max_tokens,
            });
        }

        let scores = self.classifier.forward_test(batch.images);
        let [batch_size, num_classes] = scores.dims();
        tracing::debug!(batch_size, num_classes, "forward pass");

        Ok(scores.slice([0..1]).into_data().iter::<f32>().collect())
    }

    /// Classify one image.
    pub fn infer(
        &self,
        image: impl Into<ImageInput>,
    ) -> InferResult<ClassificationResult> {
        let classes = self.classes.as_deref().ok_or(InferError::MissingClasses)?;

        let sample = self.preprocess(image.into())?;
        let batch = collate::<B>(vec![sample], &self.device)?;
        let scores = self.forward_scores(batch)?;

        normalize_scores(classes, &scores)
    }
}

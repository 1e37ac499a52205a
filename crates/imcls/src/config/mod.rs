//! # Inference Configuration
//!
//! [`InferenceConfig`] is the canonical configuration object: the model
//! construction parameters, the test-time preprocessing pipeline, and an
//! optional configured fallback label set.
//!
//! [`resolve_config`] normalizes a [`ConfigSource`] (file path or in-memory
//! config) into an [`InferenceConfig`], merging override [`ConfigOptions`].

pub mod options;
pub mod source;

pub use options::ConfigOptions;
pub use source::ConfigSource;

use crate::errors::InferResult;
use crate::models::ClassifierConfig;
use crate::pipeline::TransformStage;
use burn::config::Config;

/// Top-level inference configuration.
#[derive(Config, Debug)]
pub struct InferenceConfig {
    /// Model construction parameters.
    pub model: ClassifierConfig,

    /// Data pipelines.
    pub data: DataConfig,

    /// Fallback class labels, for checkpoints without label metadata.
    #[config(default = "None")]
    pub default_classes: Option<Vec<String>>,
}

/// Data section of an [`InferenceConfig`].
#[derive(Config, Debug)]
pub struct DataConfig {
    /// The test-time dataset settings.
    pub test: DatasetConfig,
}

/// Per-split dataset settings.
#[derive(Config, Debug)]
pub struct DatasetConfig {
    /// Ordered preprocessing stages.
    pub pipeline: Vec<TransformStage>,
}

impl InferenceConfig {
    /// The test-time preprocessing pipeline.
    pub fn test_pipeline(&self) -> &[TransformStage] {
        &self.data.test.pipeline
    }
}

/// Normalize a configuration source into an [`InferenceConfig`].
///
/// Paths are loaded from JSON; `options`, when given, are merged afterward.
pub fn resolve_config<S: Into<ConfigSource>>(
    source: S,
    options: Option<&ConfigOptions>,
) -> InferResult<InferenceConfig> {
    let config = source.into().load()?;
    match options {
        Some(options) if !options.is_empty() => options.merge_into(&config),
        _ => Ok(config),
    }
}

/// Force-clear every `pretrained` field.
///
/// Clears the model's, the `extractor`'s, and the `vit`'s pretrained weights,
/// so that weights only come from an explicit checkpoint.
pub fn clear_pretrained(config: &mut InferenceConfig) {
    config.model.pretrained = None;
    config.model.extractor.pretrained = None;
    config.model.vit.pretrained = None;
}

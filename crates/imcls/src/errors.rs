//! # Inference Errors

use std::path::PathBuf;
use thiserror::Error;

/// Result type for `imcls` operations.
pub type InferResult<T> = Result<T, InferError>;

/// Error taxonomy for model initialization and inference.
#[derive(Error, Debug)]
pub enum InferError {
    /// The configuration source was neither a path nor a config object.
    #[error("config must be a filename or Config object, but got {found}")]
    ConfigType {
        /// Name of the offending type.
        found: String,
    },

    /// A configuration file could not be loaded.
    #[error("failed to load config `{}`: {message}", path.display())]
    ConfigLoad {
        /// The config file path.
        path: PathBuf,
        /// Loader message.
        message: String,
    },

    /// An override option could not be merged into the configuration.
    #[error("invalid config option `{key}`: {message}")]
    ConfigOption {
        /// The dotted option key.
        key: String,
        /// Merge failure message.
        message: String,
    },

    /// Checkpoint weights could not be loaded (or saved).
    #[error("checkpoint `{}`: {message}", path.display())]
    Checkpoint {
        /// The checkpoint path.
        path: PathBuf,
        /// Recorder message.
        message: String,
    },

    /// The checkpoint metadata sidecar is not valid JSON.
    #[error("invalid checkpoint metadata: {0}")]
    CheckpointMeta(#[from] serde_json::Error),

    /// A preprocessing stage failed.
    #[error("pipeline stage `{stage}` failed: {message}")]
    Pipeline {
        /// The stage type name.
        stage: String,
        /// Failure message.
        message: String,
    },

    /// Image decoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The preprocessed image is too large for the model.
    #[error(
        "input of {height}x{width} makes {tokens} tokens; the model accepts at most {max_tokens}"
    )]
    InputSize {
        /// Input height.
        height: usize,
        /// Input width.
        width: usize,
        /// Feature-map tokens the input would produce.
        tokens: usize,
        /// Token limit of the model.
        max_tokens: usize,
    },

    /// The model would run in training mode.
    #[error("autodiff backends run normalization in training mode; use `ModelInit::init_valid`")]
    AutodiffBackend,

    /// The model has no resolved class labels.
    #[error("model has no class labels; initialize it with a checkpoint")]
    MissingClasses,

    /// A score index has no matching class label.
    #[error("class index {index} out of range for {num_classes} classes")]
    ClassIndex {
        /// The score index.
        index: usize,
        /// The number of known class labels.
        num_classes: usize,
    },

    /// The model produced no scores.
    #[error("empty score vector")]
    EmptyScores,

    /// Pretrained weight resolution failed.
    #[error("pretrained weights: {0}")]
    Pretrained(#[from] anyhow::Error),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InferError {
    /// Build a [`InferError::Pipeline`] error.
    pub fn pipeline(
        stage: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Pipeline {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Build a [`InferError::ConfigOption`] error.
    pub fn config_option(
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConfigOption {
            key: key.into(),
            message: message.into(),
        }
    }
}

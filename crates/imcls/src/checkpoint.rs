//! # Checkpoints
//!
//! A checkpoint is a weights record (``<path>.mpk``) plus an optional JSON
//! metadata sidecar (``<path>.meta.json``).
//!
//! The sidecar is a JSON object; only ``CLASSES`` is interpreted, other
//! fields round-trip untouched.

use crate::errors::{InferError, InferResult};
use crate::models::{Classifier, WeightsRecorder};
use burn::module::Module;
use burn::prelude::Backend;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Checkpoint metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Ordered class labels.
    #[serde(rename = "CLASSES", default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,

    /// Other metadata fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CheckpointMeta {
    /// Metadata carrying `classes`.
    pub fn with_classes<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: Some(classes.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }
}

/// The weights record path for a checkpoint path.
pub fn weights_path(path: &Path) -> PathBuf {
    path.with_extension("mpk")
}

/// The metadata sidecar path for a checkpoint path.
pub fn meta_path(path: &Path) -> PathBuf {
    path.with_extension("meta.json")
}

/// Save `classifier` weights and `meta`.
pub fn save_checkpoint<B: Backend>(
    classifier: &Classifier<B>,
    path: &Path,
    meta: &CheckpointMeta,
) -> InferResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    classifier
        .clone()
        .save_file(path, &WeightsRecorder::new())
        .map_err(|err| InferError::Checkpoint {
            path: path.to_path_buf(),
            message: format!("{err:?}"),
        })?;

    std::fs::write(meta_path(path), serde_json::to_string_pretty(meta)?)?;

    tracing::info!(path = %path.display(), "saved checkpoint");
    Ok(())
}

/// Read the metadata sidecar, if present.
pub fn read_meta(path: &Path) -> InferResult<Option<CheckpointMeta>> {
    let meta_path = meta_path(path);
    if !meta_path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&meta_path)?;
    Ok(Some(serde_json::from_str(&text)?))
}

/// Load checkpoint weights into `classifier` on `device`.
///
/// Returns the loaded model and the metadata sidecar, if present.
pub fn load_checkpoint<B: Backend>(
    classifier: Classifier<B>,
    path: &Path,
    device: &B::Device,
) -> InferResult<(Classifier<B>, Option<CheckpointMeta>)> {
    tracing::info!(path = %path.display(), "loading checkpoint");

    let classifier = classifier
        .load_file(path, &WeightsRecorder::new(), device)
        .map_err(|err| InferError::Checkpoint {
            path: path.to_path_buf(),
            message: format!("{err:?}"),
        })?;

    let meta = read_meta(path)?;
    Ok((classifier, meta))
}

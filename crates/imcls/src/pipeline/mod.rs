//! # Test-Time Preprocessing
//!
//! A pipeline is an ordered list of [`TransformStage`] descriptors, applied by
//! [`Compose`] to a [`Sample`] record.
//!
//! [`adapt_pipeline`] derives the per-call pipeline for an [`ImageInput`]:
//! path inputs need a leading load-from-file stage, decoded inputs must not
//! have one.

pub mod adapter;
pub mod compose;
pub mod image;
pub mod stages;

pub use adapter::{adapt_pipeline, adapt_pipeline_in_place, initial_sample};
pub use compose::Compose;
pub use self::image::{ChannelOrder, ImageArray};
pub use stages::{CropSize, Interpolation, ResizeSize, TransformStage};

use ::image::DynamicImage;
use burn::tensor::TensorData;
use std::path::{Path, PathBuf};

/// Source file info for a path input.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    /// The image file name; joined to any ``image_path_prefix``.
    pub filename: PathBuf,
}

/// The record threaded through a pipeline.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    /// Source file info, for path inputs.
    pub image_info: Option<ImageInfo>,

    /// Directory prefix for ``image_info.filename``.
    pub image_path_prefix: Option<PathBuf>,

    /// The resolved file name, once loaded.
    pub filename: Option<PathBuf>,

    /// The pixel buffer.
    pub image: Option<ImageArray>,

    /// ``[height, width, channels]`` as loaded.
    pub ori_shape: Option<[usize; 3]>,

    /// ``[height, width, channels]`` after the latest stage.
    pub img_shape: Option<[usize; 3]>,

    /// ``[channels, height, width]`` image tensor.
    pub tensor: Option<TensorData>,
}

/// Kinds of inference input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// An image file path.
    Path,

    /// An already decoded pixel buffer.
    Decoded,
}

/// An inference input image.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// An image file path.
    Path(PathBuf),

    /// An already decoded pixel buffer.
    Decoded(ImageArray),
}

impl ImageInput {
    /// The input kind.
    pub fn kind(&self) -> InputKind {
        match self {
            Self::Path(_) => InputKind::Path,
            Self::Decoded(_) => InputKind::Decoded,
        }
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<&PathBuf> for ImageInput {
    fn from(path: &PathBuf) -> Self {
        Self::Path(path.clone())
    }
}

impl From<&str> for ImageInput {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<String> for ImageInput {
    fn from(path: String) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<ImageArray> for ImageInput {
    fn from(image: ImageArray) -> Self {
        Self::Decoded(image)
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(image: DynamicImage) -> Self {
        Self::Decoded(image.into())
    }
}

//! Shared test fixtures.

use crate::config::{DataConfig, DatasetConfig, InferenceConfig};
use crate::models::ClassifierConfig;
use crate::models::extractor::ExtractorConfig;
use crate::models::vit::VitConfig;
use crate::pipeline::{CropSize, Interpolation, ResizeSize, TransformStage};
use image::{Rgb, RgbImage};
use std::path::PathBuf;
use tempfile::TempDir;

/// A classifier small enough for `NdArray` tests.
pub fn tiny_classifier_config(num_classes: usize) -> ClassifierConfig {
    ClassifierConfig::new(
        ExtractorConfig::new(vec![8, 16]).with_stem_width(8),
        VitConfig::new(16, 2, 1).with_max_tokens(64),
        num_classes,
    )
}

/// A tiny classifier with a ``32x32`` test pipeline.
///
/// Stage 0 loads from file; stage 1 is a `Resize`.
pub fn tiny_inference_config(num_classes: usize) -> InferenceConfig {
    InferenceConfig::new(
        tiny_classifier_config(num_classes),
        DataConfig::new(DatasetConfig::new(vec![
            TransformStage::load_from_file(),
            TransformStage::Resize {
                size: ResizeSize::Shape([36, -1]),
                interpolation: Interpolation::Bilinear,
            },
            TransformStage::CenterCrop {
                crop_size: CropSize::Square(32),
            },
            TransformStage::Normalize {
                mean: [123.675, 116.28, 103.53],
                std: [58.395, 57.12, 57.375],
                to_rgb: true,
            },
            TransformStage::ImageToTensor {
                keys: vec!["img".to_string()],
            },
            TransformStage::Collect {
                keys: vec!["img".to_string()],
            },
        ])),
    )
}

/// Write a gradient PNG of `height x width` into `dir`.
pub fn write_test_image(
    dir: &TempDir,
    name: &str,
    height: u32,
    width: u32,
) -> PathBuf {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8])
    });
    let path = dir.path().join(name);
    image.save(&path).unwrap();
    path
}

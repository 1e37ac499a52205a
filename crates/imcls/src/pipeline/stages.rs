//! # Transform Stages
//!
//! [`TransformStage`] descriptors serialize as ``{"type": "<Name>", ...params}``,
//! and each stage maps a [`Sample`] to a [`Sample`].

use crate::errors::{InferError, InferResult};
use crate::pipeline::image::{ChannelOrder, ImageArray};
use crate::pipeline::Sample;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

/// The only sample key the tensor stages understand.
pub const IMAGE_KEY: &str = "img";

/// Resize target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResizeSize {
    /// Square ``size x size``.
    Square(u32),

    /// ``[height, width]``; ``[size, -1]`` resizes the short edge to ``size``.
    Shape([i64; 2]),
}

impl ResizeSize {
    /// Target ``(height, width)`` for an image of ``(height, width)``.
    pub fn target(
        &self,
        height: u32,
        width: u32,
    ) -> Result<(u32, u32), String> {
        match *self {
            Self::Square(size) if size > 0 => Ok((size, size)),
            Self::Shape([size, -1]) if size > 0 => {
                let size = to_extent(size)?;
                if width < height {
                    let h = size as u64 * height as u64 / width.max(1) as u64;
                    Ok((to_extent(h)?, size))
                } else {
                    let w = size as u64 * width as u64 / height.max(1) as u64;
                    Ok((size, to_extent(w)?))
                }
            }
            Self::Shape([h, w]) if h > 0 && w > 0 => Ok((to_extent(h)?, to_extent(w)?)),
            other => Err(format!("unsupported resize size: {other:?}")),
        }
    }
}

fn to_extent<T>(value: T) -> Result<u32, String>
where
    T: Copy + std::fmt::Display,
    u32: TryFrom<T>,
{
    u32::try_from(value).map_err(|_| format!("resize extent {value} out of range"))
}

/// Crop window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CropSize {
    /// Square ``size x size``.
    Square(u32),

    /// ``[height, width]``.
    Shape([u32; 2]),
}

impl CropSize {
    /// ``(height, width)``.
    pub fn hw(&self) -> (u32, u32) {
        match *self {
            Self::Square(size) => (size, size),
            Self::Shape([h, w]) => (h, w),
        }
    }
}

/// Resize interpolation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Nearest neighbor.
    Nearest,

    /// Bilinear.
    #[default]
    Bilinear,

    /// Bicubic.
    Bicubic,

    /// Lanczos (window 3).
    Lanczos,
}

impl Interpolation {
    /// The `image` resampling filter.
    pub fn filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
            Self::Lanczos => FilterType::Lanczos3,
        }
    }
}

fn load_channel_order() -> ChannelOrder {
    ChannelOrder::Bgr
}

fn default_true() -> bool {
    true
}

/// A test-time preprocessing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransformStage {
    /// Decode the image file named by the sample's ``image_info``.
    LoadImageFromFile {
        /// Channel order of the decoded buffer.
        #[serde(default = "load_channel_order")]
        channel_order: ChannelOrder,
    },

    /// Resize the image buffer.
    Resize {
        /// Target size.
        size: ResizeSize,

        /// Resampling method.
        #[serde(default)]
        interpolation: Interpolation,
    },

    /// Crop the center of the image buffer.
    CenterCrop {
        /// Crop window; clipped to the image.
        crop_size: CropSize,
    },

    /// Per-channel ``(x - mean) / std``.
    Normalize {
        /// Per-channel mean, in RGB order when `to_rgb`.
        mean: [f32; 3],

        /// Per-channel standard deviation.
        std: [f32; 3],

        /// Convert BGR buffers to RGB first.
        #[serde(default = "default_true")]
        to_rgb: bool,
    },

    /// Convert the image buffer to a CHW tensor.
    ImageToTensor {
        /// Sample keys to convert.
        keys: Vec<String>,
    },

    /// Keep only the listed keys.
    Collect {
        /// Sample keys to keep.
        keys: Vec<String>,
    },
}

impl TransformStage {
    /// A default load-from-file stage.
    pub fn load_from_file() -> Self {
        Self::LoadImageFromFile {
            channel_order: load_channel_order(),
        }
    }

    /// The stage ``type`` name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadImageFromFile { .. } => "LoadImageFromFile",
            Self::Resize { .. } => "Resize",
            Self::CenterCrop { .. } => "CenterCrop",
            Self::Normalize { .. } => "Normalize",
            Self::ImageToTensor { .. } => "ImageToTensor",
            Self::Collect { .. } => "Collect",
        }
    }

    /// Is this a load-from-file stage?
    pub fn is_load_from_file(&self) -> bool {
        matches!(self, Self::LoadImageFromFile { .. })
    }

    /// Apply the stage.
    pub fn apply(
        &self,
        sample: Sample,
    ) -> InferResult<Sample> {
        match self {
            Self::LoadImageFromFile { channel_order } => load_image(sample, *channel_order),
            Self::Resize {
                size,
                interpolation,
            } => self.map_image(sample, |image| resize(image, size, *interpolation)),
            Self::CenterCrop { crop_size } => {
                self.map_image(sample, |image| Ok(center_crop(image, crop_size.hw())))
            }
            Self::Normalize { mean, std, to_rgb } => {
                if std.iter().any(|s| *s == 0.0) {
                    return Err(InferError::pipeline(self.name(), "std must be non-zero"));
                }
                self.map_image(sample, |image| Ok(normalize(image, mean, std, *to_rgb)))
            }
            Self::ImageToTensor { keys } => {
                self.check_keys(keys)?;
                let mut sample = sample;
                let image = sample
                    .image
                    .take()
                    .ok_or_else(|| InferError::pipeline(self.name(), "sample has no image"))?;
                sample.tensor = Some(image.to_chw_data());
                Ok(sample)
            }
            Self::Collect { keys } => {
                self.check_keys(keys)?;
                let mut sample = sample;
                if sample.tensor.is_none() {
                    return Err(InferError::pipeline(
                        self.name(),
                        "sample has no tensor; add an ImageToTensor stage",
                    ));
                }
                sample.image = None;
                Ok(sample)
            }
        }
    }

    fn check_keys(
        &self,
        keys: &[String],
    ) -> InferResult<()> {
        match keys.iter().find(|k| k.as_str() != IMAGE_KEY) {
            Some(key) => Err(InferError::pipeline(
                self.name(),
                format!("unsupported key `{key}`"),
            )),
            None => Ok(()),
        }
    }

    fn map_image<F>(
        &self,
        mut sample: Sample,
        f: F,
    ) -> InferResult<Sample>
    where
        F: FnOnce(ImageArray) -> Result<ImageArray, String>,
    {
        let image = sample
            .image
            .take()
            .ok_or_else(|| InferError::pipeline(self.name(), "sample has no image"))?;
        let image = f(image).map_err(|message| InferError::pipeline(self.name(), message))?;
        sample.img_shape = Some(image.shape());
        sample.image = Some(image);
        Ok(sample)
    }
}

fn load_image(
    mut sample: Sample,
    order: ChannelOrder,
) -> InferResult<Sample> {
    let info = sample.image_info.as_ref().ok_or_else(|| {
        InferError::pipeline("LoadImageFromFile", "sample has no image_info")
    })?;
    let filename = match &sample.image_path_prefix {
        Some(prefix) => prefix.join(&info.filename),
        None => info.filename.clone(),
    };

    tracing::debug!(path = %filename.display(), "decoding image");
    let decoded = image::open(&filename)?;
    let image = ImageArray::from_dynamic(&decoded, order);

    sample.ori_shape = Some(image.shape());
    sample.img_shape = Some(image.shape());
    sample.filename = Some(filename);
    sample.image = Some(image);
    Ok(sample)
}

// `image` clamps float samples to the unit range while resampling.
fn resize(
    image: ImageArray,
    size: &ResizeSize,
    interpolation: Interpolation,
) -> Result<ImageArray, String> {
    let (h, w) = size.target(image.height() as u32, image.width() as u32)?;
    if (h as usize, w as usize) == (image.height(), image.width()) {
        return Ok(image);
    }

    let order = image.channel_order();
    let unit = image.map_values(|_, v| v / 255.0);
    let resized = imageops::resize(unit.pixels(), w, h, interpolation.filter());

    Ok(ImageArray::new(resized, order).map_values(|_, v| v * 255.0))
}

fn crop_window(
    extent: u32,
    crop: u32,
) -> (u32, u32) {
    if crop >= extent {
        return (0, extent);
    }
    let offset = ((extent - crop) as f64 / 2.0).round() as u32;
    (offset, crop.min(extent - offset))
}

fn center_crop(
    image: ImageArray,
    (crop_h, crop_w): (u32, u32),
) -> ImageArray {
    let (y, h) = crop_window(image.height() as u32, crop_h);
    let (x, w) = crop_window(image.width() as u32, crop_w);

    let order = image.channel_order();
    let cropped = imageops::crop_imm(image.pixels(), x, y, w, h).to_image();
    ImageArray::new(cropped, order)
}

fn normalize(
    image: ImageArray,
    mean: &[f32; 3],
    std: &[f32; 3],
    to_rgb: bool,
) -> ImageArray {
    let image = if to_rgb {
        image.with_order(ChannelOrder::Rgb)
    } else {
        image
    };
    image.map_values(|c, v| (v - mean[c]) / std[c])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ImageInfo;
    use indoc::indoc;

    fn gradient(
        height: usize,
        width: usize,
    ) -> ImageArray {
        let data = (0..height * width)
            .flat_map(|i| {
                let v = i as f32;
                [v, v + 1.0, v + 2.0]
            })
            .collect();
        ImageArray::from_hwc(height, width, data, ChannelOrder::Rgb).unwrap()
    }

    fn with_image(image: ImageArray) -> Sample {
        Sample {
            image: Some(image),
            ..Default::default()
        }
    }

    #[test]
    fn test_stage_serde() {
        let stages: Vec<TransformStage> = serde_json::from_str(indoc! {r#"
            [
                {"type": "LoadImageFromFile"},
                {"type": "Resize", "size": [256, -1]},
                {"type": "CenterCrop", "crop_size": 224},
                {"type": "Normalize", "mean": [123.675, 116.28, 103.53], "std": [58.395, 57.12, 57.375]},
                {"type": "ImageToTensor", "keys": ["img"]},
                {"type": "Collect", "keys": ["img"]}
            ]
        "#})
        .unwrap();

        assert_eq!(stages[0], TransformStage::load_from_file());
        assert_eq!(
            stages[1],
            TransformStage::Resize {
                size: ResizeSize::Shape([256, -1]),
                interpolation: Interpolation::Bilinear,
            }
        );
        assert_eq!(
            stages[2],
            TransformStage::CenterCrop {
                crop_size: CropSize::Square(224)
            }
        );
        match &stages[3] {
            TransformStage::Normalize { to_rgb, .. } => assert!(*to_rgb),
            other => panic!("unexpected stage: {other:?}"),
        }
        let names: Vec<_> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "LoadImageFromFile",
                "Resize",
                "CenterCrop",
                "Normalize",
                "ImageToTensor",
                "Collect"
            ]
        );

        let value = serde_json::to_value(&stages[0]).unwrap();
        assert_eq!(value["type"], "LoadImageFromFile");
        assert_eq!(value["channel_order"], "bgr");
    }

    #[test]
    fn test_resize_targets() {
        assert_eq!(ResizeSize::Square(32).target(100, 50), Ok((32, 32)));
        assert_eq!(ResizeSize::Shape([20, 10]).target(100, 50), Ok((20, 10)));
        // Short edge.
        assert_eq!(ResizeSize::Shape([25, -1]).target(100, 50), Ok((50, 25)));
        assert_eq!(ResizeSize::Shape([25, -1]).target(50, 100), Ok((25, 50)));
        assert!(ResizeSize::Shape([-1, 25]).target(50, 100).is_err());
        assert!(ResizeSize::Square(0).target(50, 100).is_err());
    }

    #[test]
    fn test_resize_targets_out_of_range() {
        let too_big = 1i64 << 40;

        let err = ResizeSize::Shape([too_big, 10]).target(50, 100).unwrap_err();
        assert!(err.contains("out of range"), "{err}");
        assert!(ResizeSize::Shape([10, too_big]).target(50, 100).is_err());
        assert!(ResizeSize::Shape([too_big, -1]).target(50, 100).is_err());

        // The scaled long edge overflows even though the short edge fits.
        assert!(ResizeSize::Shape([1 << 30, -1]).target(1, 100).is_err());

        let stage = TransformStage::Resize {
            size: ResizeSize::Shape([too_big, too_big]),
            interpolation: Interpolation::Nearest,
        };
        assert!(matches!(
            stage.apply(with_image(gradient(2, 2))),
            Err(InferError::Pipeline { .. })
        ));
    }

    #[test]
    fn test_resize_stage() {
        let stage = TransformStage::Resize {
            size: ResizeSize::Shape([4, 6]),
            interpolation: Interpolation::Nearest,
        };
        let mut image = gradient(2, 3);
        image = image.map_values(|_, _| 200.0);

        let sample = stage.apply(with_image(image)).unwrap();
        let image = sample.image.unwrap();
        assert_eq!(image.shape(), [4, 6, 3]);
        assert_eq!(sample.img_shape, Some([4, 6, 3]));
        for value in image.get(3, 5) {
            assert!((value - 200.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_center_crop_stage() {
        let stage = TransformStage::CenterCrop {
            crop_size: CropSize::Shape([2, 2]),
        };
        let sample = stage.apply(with_image(gradient(4, 4))).unwrap();
        let image = sample.image.unwrap();
        assert_eq!(image.shape(), [2, 2, 3]);
        // Row 1, col 1 of the 4x4 gradient.
        assert_eq!(image.get(0, 0)[0], 5.0);

        // Oversized crops clip to the image.
        let stage = TransformStage::CenterCrop {
            crop_size: CropSize::Square(10),
        };
        let sample = stage.apply(with_image(gradient(3, 5))).unwrap();
        assert_eq!(sample.img_shape, Some([3, 5, 3]));
    }

    #[test]
    fn test_normalize_stage() {
        let image = ImageArray::from_hwc(1, 1, vec![30.0, 20.0, 10.0], ChannelOrder::Bgr).unwrap();
        let stage = TransformStage::Normalize {
            mean: [0.0, 10.0, 20.0],
            std: [2.0, 4.0, 5.0],
            to_rgb: true,
        };
        let image = stage.apply(with_image(image)).unwrap().image.unwrap();
        assert_eq!(image.channel_order(), ChannelOrder::Rgb);
        assert_eq!(image.get(0, 0), [5.0, 2.5, 2.0]);

        let stage = TransformStage::Normalize {
            mean: [0.0; 3],
            std: [1.0, 0.0, 1.0],
            to_rgb: false,
        };
        let err = stage.apply(with_image(gradient(1, 1))).unwrap_err();
        assert!(matches!(err, InferError::Pipeline { .. }));
    }

    #[test]
    fn test_tensor_stages() {
        let keys = vec![IMAGE_KEY.to_string()];
        let sample = TransformStage::ImageToTensor { keys: keys.clone() }
            .apply(with_image(gradient(2, 3)))
            .unwrap();
        assert!(sample.image.is_none());
        assert_eq!(sample.tensor.as_ref().unwrap().shape, vec![3, 2, 3]);

        let sample = TransformStage::Collect { keys }.apply(sample).unwrap();
        assert!(sample.tensor.is_some());

        let err = TransformStage::Collect {
            keys: vec![IMAGE_KEY.to_string()],
        }
        .apply(with_image(gradient(1, 1)))
        .unwrap_err();
        assert!(matches!(err, InferError::Pipeline { .. }));

        let err = TransformStage::ImageToTensor {
            keys: vec!["gt_label".to_string()],
        }
        .apply(with_image(gradient(1, 1)))
        .unwrap_err();
        assert!(err.to_string().contains("gt_label"));
    }

    #[test]
    fn test_load_image_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut rgb = image::RgbImage::new(5, 4);
        rgb.put_pixel(0, 0, image::Rgb([1, 2, 3]));
        rgb.save(dir.path().join("face.png")).unwrap();

        let sample = Sample {
            image_info: Some(ImageInfo {
                filename: "face.png".into(),
            }),
            image_path_prefix: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let sample = TransformStage::load_from_file().apply(sample).unwrap();

        assert_eq!(sample.ori_shape, Some([4, 5, 3]));
        assert_eq!(sample.filename, Some(dir.path().join("face.png")));
        let image = sample.image.unwrap();
        assert_eq!(image.channel_order(), ChannelOrder::Bgr);
        assert_eq!(image.get(0, 0), [3.0, 2.0, 1.0]);

        let missing = Sample {
            image_info: Some(ImageInfo {
                filename: dir.path().join("missing.png"),
            }),
            ..Default::default()
        };
        assert!(matches!(
            TransformStage::load_from_file().apply(missing),
            Err(InferError::Image(_))
        ));
    }
}

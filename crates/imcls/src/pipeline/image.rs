//! # Decoded Image Buffers

use crate::errors::{InferError, InferResult};
use burn::tensor::TensorData;
use image::{DynamicImage, Rgb, Rgb32FImage};
use serde::{Deserialize, Serialize};

/// Channel order of a 3-channel pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// Red, green, blue.
    Rgb,

    /// Blue, green, red.
    Bgr,
}

/// A decoded 3-channel image.
///
/// Pixels are ``f32`` in ``[height, width, channel]`` layout; decoded images
/// carry values in ``0.0..=255.0`` until normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArray {
    pixels: Rgb32FImage,
    order: ChannelOrder,
}

impl ImageArray {
    /// Wrap a pixel buffer.
    pub fn new(
        pixels: Rgb32FImage,
        order: ChannelOrder,
    ) -> Self {
        Self { pixels, order }
    }

    /// Build from raw ``[height, width, 3]`` values.
    pub fn from_hwc(
        height: usize,
        width: usize,
        data: Vec<f32>,
        order: ChannelOrder,
    ) -> InferResult<Self> {
        let expected = height * width * 3;
        if data.len() != expected {
            return Err(InferError::pipeline(
                "ImageArray",
                format!(
                    "expected {expected} values for [{height}, {width}, 3], got {}",
                    data.len()
                ),
            ));
        }
        let pixels = Rgb32FImage::from_raw(width as u32, height as u32, data).ok_or_else(|| {
            InferError::pipeline("ImageArray", "buffer does not match dimensions")
        })?;
        Ok(Self::new(pixels, order))
    }

    /// Convert a decoded image; values are ``0.0..=255.0``.
    pub fn from_dynamic(
        image: &DynamicImage,
        order: ChannelOrder,
    ) -> Self {
        let rgb = image.to_rgb8();
        let pixels = Rgb32FImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let Rgb(channels) = *rgb.get_pixel(x, y);
            Rgb(channels.map(f32::from))
        });

        Self::new(pixels, ChannelOrder::Rgb).with_order(order)
    }

    /// Image height.
    pub fn height(&self) -> usize {
        self.pixels.height() as usize
    }

    /// Image width.
    pub fn width(&self) -> usize {
        self.pixels.width() as usize
    }

    /// ``[height, width, channels]``.
    pub fn shape(&self) -> [usize; 3] {
        [self.height(), self.width(), 3]
    }

    /// Channel order.
    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    /// The pixel buffer.
    pub fn pixels(&self) -> &Rgb32FImage {
        &self.pixels
    }

    /// Consume into the pixel buffer.
    pub fn into_pixels(self) -> Rgb32FImage {
        self.pixels
    }

    /// Reorder channels, swapping red and blue if the order changes.
    pub fn with_order(
        mut self,
        order: ChannelOrder,
    ) -> Self {
        if order != self.order {
            for Rgb([a, _, c]) in self.pixels.pixels_mut() {
                std::mem::swap(a, c);
            }
            self.order = order;
        }
        self
    }

    /// Apply `f(channel, value)` to every value.
    pub fn map_values<F>(
        mut self,
        f: F,
    ) -> Self
    where
        F: Fn(usize, f32) -> f32,
    {
        for Rgb(channels) in self.pixels.pixels_mut() {
            for (idx, value) in channels.iter_mut().enumerate() {
                *value = f(idx, *value);
            }
        }
        self
    }

    /// Values at one pixel, in buffer channel order.
    pub fn get(
        &self,
        row: usize,
        col: usize,
    ) -> [f32; 3] {
        self.pixels.get_pixel(col as u32, row as u32).0
    }

    /// Convert to ``[channels, height, width]`` tensor data.
    pub fn to_chw_data(&self) -> TensorData {
        let [height, width, channels] = self.shape();
        let plane = height * width;
        let mut data = vec![0.0f32; channels * plane];
        for (idx, Rgb(values)) in self.pixels.pixels().enumerate() {
            for (c, value) in values.iter().enumerate() {
                data[c * plane + idx] = *value;
            }
        }
        TensorData::new(data, [channels, height, width])
    }
}

impl From<DynamicImage> for ImageArray {
    fn from(image: DynamicImage) -> Self {
        Self::from_dynamic(&image, ChannelOrder::Rgb)
    }
}

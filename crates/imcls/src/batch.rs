//! # Batch Assembly

use crate::errors::{InferError, InferResult};
use crate::pipeline::Sample;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::{Backend, Tensor};
use burn::tensor::TensorData;

/// A batch of preprocessed images.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// ``[batch, channels, height, width]``.
    pub images: Tensor<B, 4>,
}

impl<B: Backend> ImageBatch<B> {
    /// Number of images.
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stacks ``[channels, height, width]`` image tensors into an [`ImageBatch`].
///
/// All items must share one shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageBatcher;

impl<B: Backend> Batcher<B, TensorData, ImageBatch<B>> for ImageBatcher {
    fn batch(
        &self,
        items: Vec<TensorData>,
        device: &B::Device,
    ) -> ImageBatch<B> {
        let images: Vec<Tensor<B, 4>> = items
            .into_iter()
            .map(|data| Tensor::<B, 3>::from_data(data, device).unsqueeze_dim(0))
            .collect();
        let images = Tensor::cat(images, 0);

        assert_shape_contract_periodically!(
            ["batch", "channels", "height", "width"],
            &images,
            &[("channels", 3)]
        );

        ImageBatch { images }
    }
}

/// Collate pipeline samples into a batch on `device`.
pub fn collate<B: Backend>(
    samples: Vec<Sample>,
    device: &B::Device,
) -> InferResult<ImageBatch<B>> {
    if samples.is_empty() {
        return Err(InferError::pipeline("collate", "no samples"));
    }

    let items = samples
        .into_iter()
        .map(|sample| {
            sample
                .tensor
                .ok_or_else(|| InferError::pipeline("collate", "sample has no tensor"))
        })
        .collect::<InferResult<Vec<_>>>()?;

    let batch = ImageBatcher.batch(items, device);

    let [batch_size, height, width] = unpack_shape_contract!(
        ["batch", "channels", "height", "width"],
        &batch.images,
        &["batch", "height", "width"],
        &[("channels", 3)]
    );
    tracing::debug!(batch_size, height, width, "collated batch");

    Ok(batch)
}

//! # Pipeline Composition

use crate::errors::InferResult;
use crate::pipeline::{Sample, TransformStage};

/// An ordered sequence of stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Compose {
    stages: Vec<TransformStage>,
}

impl Compose {
    /// Compose `stages`, in order.
    pub fn new(stages: Vec<TransformStage>) -> Self {
        Self { stages }
    }

    /// The stages.
    pub fn stages(&self) -> &[TransformStage] {
        &self.stages
    }

    /// Apply every stage in order; stops at the first failure.
    pub fn apply(
        &self,
        sample: Sample,
    ) -> InferResult<Sample> {
        self.stages.iter().try_fold(sample, |sample, stage| {
            tracing::trace!(stage = stage.name(), "applying stage");
            stage.apply(sample)
        })
    }
}

impl From<Vec<TransformStage>> for Compose {
    fn from(stages: Vec<TransformStage>) -> Self {
        Self::new(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InferError;
    use crate::pipeline::{ChannelOrder, CropSize, ImageArray};

    #[test]
    fn test_compose_applies_in_order() {
        let pipeline = Compose::new(vec![
            TransformStage::CenterCrop {
                crop_size: CropSize::Square(2),
            },
            TransformStage::ImageToTensor {
                keys: vec!["img".to_string()],
            },
            TransformStage::Collect {
                keys: vec!["img".to_string()],
            },
        ]);
        assert_eq!(pipeline.stages().len(), 3);

        let image = ImageArray::from_hwc(3, 3, vec![1.0; 27], ChannelOrder::Rgb).unwrap();
        let sample = pipeline
            .apply(Sample {
                image: Some(image),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(sample.img_shape, Some([2, 2, 3]));
        assert_eq!(sample.tensor.unwrap().shape, vec![3, 2, 2]);
    }

    #[test]
    fn test_compose_stops_at_failure() {
        let pipeline: Compose = vec![
            TransformStage::Collect {
                keys: vec!["img".to_string()],
            },
            TransformStage::ImageToTensor {
                keys: vec!["img".to_string()],
            },
        ]
        .into();

        match pipeline.apply(Sample::default()) {
            Err(InferError::Pipeline { stage, .. }) => assert_eq!(stage, "Collect"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

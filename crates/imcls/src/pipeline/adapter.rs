//! # Pipeline Adaptation
//!
//! Only position 0 is inspected: a load-from-file stage, when used, must be
//! the first stage. A load stage at a later position is left in place and
//! logged.

use crate::pipeline::{ImageInfo, ImageInput, InputKind, Sample, TransformStage};

/// Derive the pipeline for an input of `kind` from a base pipeline.
///
/// The base pipeline is not modified; the result is a call-local copy.
pub fn adapt_pipeline(
    base: &[TransformStage],
    kind: InputKind,
) -> Vec<TransformStage> {
    let mut pipeline = base.to_vec();
    adapt_pipeline_in_place(&mut pipeline, kind);
    pipeline
}

/// Adapt `pipeline` for an input of `kind`, in place.
///
/// - [`InputKind::Path`]: insert a default load stage at 0, if absent.
/// - [`InputKind::Decoded`]: remove the load stage at 0, if present.
pub fn adapt_pipeline_in_place(
    pipeline: &mut Vec<TransformStage>,
    kind: InputKind,
) {
    let leading_load = pipeline
        .first()
        .is_some_and(TransformStage::is_load_from_file);

    match kind {
        InputKind::Path if !leading_load => {
            pipeline.insert(0, TransformStage::load_from_file());
        }
        InputKind::Decoded if leading_load => {
            pipeline.remove(0);
        }
        _ => (),
    }

    let first_stage = match kind {
        InputKind::Path => 1,
        InputKind::Decoded => 0,
    };
    if let Some(index) = pipeline
        .iter()
        .skip(first_stage)
        .position(TransformStage::is_load_from_file)
    {
        tracing::warn!(
            index = index + first_stage,
            ?kind,
            "load-from-file stage found past position 0; leaving it in place"
        );
    }
}

/// Build the initial pipeline record for `input`.
pub fn initial_sample(input: ImageInput) -> Sample {
    match input {
        ImageInput::Path(filename) => Sample {
            image_info: Some(ImageInfo { filename }),
            image_path_prefix: None,
            ..Default::default()
        },
        ImageInput::Decoded(image) => Sample {
            image: Some(image),
            ..Default::default()
        },
    }
}

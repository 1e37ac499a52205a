//! # Classifier Models
//!
//! * [`classifier`] - the hybrid classifier and its builder.
//! * [`extractor`] - the convolutional feature extractor.
//! * [`vit`] - the token transformer over extractor features.

pub mod classifier;
pub mod extractor;
pub mod vit;

pub use classifier::{Classifier, ClassifierConfig, WeightsRecorder};

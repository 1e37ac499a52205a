#![warn(missing_docs)]
//!# imcls - Single-Image Classifier Inference
//!
//! ## Notable Components
//!
//! * [`inference`] - model initialization and single-image inference.
//!   * [`inference::init_model`] / [`inference::ModelInit`] - build a model from a config and checkpoint.
//!   * [`inference::inference_model`] - classify one image.
//! * [`config`] - the inference config, config sources, and override options.
//! * [`checkpoint`] - weight records plus label metadata.
//! * [`labels`] - named label sets and label resolution.
//! * [`pipeline`] - test-time preprocessing stages and per-input adaptation.
//! * [`batch`] - batch assembly.
//! * [`result`] - score normalization and result records.
//! * [`models`] - the hybrid convolution / transformer classifier.
//! * [`layers`] - reusable neural network modules.
//! * [`cache`] - pretrained weight cache.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

#[cfg(test)]
#[allow(dead_code)]
pub(crate) mod testing;

pub mod errors;

pub mod cache;
pub mod layers;
pub mod models;

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod inference;
pub mod labels;
pub mod pipeline;
pub mod result;

pub use errors::{InferError, InferResult};
pub use inference::{InferenceModel, ModelInit, inference_model, init_model};

//! # Pretrained Weight Caches
//!
//! * [`disk`] - the on-disk cache layout and URL read-through.
//! * [`weights`] - resolving `pretrained` config fields to local weight files.

pub mod disk;
pub mod weights;

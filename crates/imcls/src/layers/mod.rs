//! Common low-level modules.
pub mod conv_norm;

//! Repository traits for metadata operations.

pub mod transform_indexes;

pub use transform_indexes::{FingerprintPair, TransformIndexRepo};

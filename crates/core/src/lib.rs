//! Core domain types and shared logic for the darkroom image variant cache.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Asset descriptors and output format detection
//! - Transform definitions (geometry, quality, interlace, position)
//! - Deterministic transform fingerprints used as cache keys
//! - Artifact path derivation
//! - Shared configuration

pub mod asset;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod paths;
pub mod transform;

pub use asset::{Asset, FocalPoint};
pub use error::{Error, Result};
pub use fingerprint::{index_fingerprint, parse_transform_string, transform_string};
pub use transform::{ImageFormat, Interlace, Position, Transform, TransformMode};

/// Default number of times a worker re-reads a peer's in-progress row before
/// attempting generation itself.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;

/// Default spacing between poll attempts, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

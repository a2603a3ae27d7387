//! Transform index coordination and generation pipeline.
//!
//! The [`ImageTransformer`] ties the pieces together: it resolves a
//! (asset, transform) request to an index row, decides between serving an
//! existing artifact, deferring to the job queue, waiting on a concurrent
//! worker, or generating locally, and reuses pixel-identical artifacts
//! instead of re-rastering where geometry fingerprints permit.
//!
//! Collaborator boundaries are traits: [`RasterEngine`] for pixel work,
//! [`JobQueue`] for deferred generation, [`AssetSource`] for reading
//! source records and bytes, [`TransformRegistry`] for resolving named
//! transform definitions.

pub mod coordinator;
pub mod eager;
pub mod editor;
pub mod error;
pub mod events;
pub mod queue;
pub mod raster;
pub mod reuse;
pub mod source;
pub mod validator;

pub use coordinator::ImageTransformer;
pub use eager::EagerCache;
pub use editor::EditSession;
pub use error::{TransformError, TransformResult};
pub use events::{TransformGenerated, TransformObserver};
pub use queue::{ChannelQueue, GenerateTransformJob, JobQueue};
pub use raster::{ImageRsEngine, ProgressHook, RasterEngine};
pub use source::{AssetSource, NoNamedTransforms, TransformRegistry};

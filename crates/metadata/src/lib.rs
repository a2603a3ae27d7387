//! Transform index persistence for the darkroom image variant cache.
//!
//! One row per (asset, transform geometry, output format) combination,
//! tracking whether the derived artifact exists, is being generated, or
//! failed. The `(asset_id, transform_string, format)` triple is a soft
//! unique key: uniqueness is maintained by lookup-before-create and
//! delete-stale-then-insert in the callers, not by a constraint.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{NewTransformIndex, TransformIndexRow};
pub use repos::TransformIndexRepo;
pub use store::{MetadataStore, SqliteStore};

use darkroom_core::config::MetadataConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store = SqliteStore::with_busy_timeout(
        &config.db_path,
        Duration::from_secs(config.busy_timeout_secs),
    )
    .await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}

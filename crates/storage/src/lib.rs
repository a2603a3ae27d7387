//! Artifact storage abstraction and backends for darkroom.
//!
//! This crate provides:
//! - The [`ArtifactStore`] contract the generation pipeline writes through
//! - Capability traits for URL serving and local re-verification
//! - A local filesystem backend with atomic writes

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{ArtifactMeta, ArtifactStore, LocalVerify};

use darkroom_core::config::StorageConfig;
use std::sync::Arc;

/// Create an artifact store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ArtifactStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path, root_url } => {
            let backend = FilesystemBackend::new(path, root_url.clone()).await?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::path::PathBuf;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempfile::tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("artifacts"),
            root_url: Some("https://cdn.example.com/transforms".to_string()),
        };

        let store = from_config(&config).await.unwrap();
        store
            .put("photos/_t/beach.jpg", Bytes::from_static(b"pixels"))
            .await
            .unwrap();
        assert!(store.exists("photos/_t/beach.jpg").await.unwrap());
        assert_eq!(store.root_url(), Some("https://cdn.example.com/transforms"));
    }

    #[tokio::test]
    async fn from_config_rejects_empty_path() {
        let config = StorageConfig::Filesystem {
            path: PathBuf::new(),
            root_url: None,
        };
        match from_config(&config).await {
            Err(StorageError::Config(_)) => {}
            other => panic!("expected Config error, got {:?}", other.map(|_| ())),
        }
    }
}

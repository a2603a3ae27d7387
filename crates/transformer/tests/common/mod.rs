//! Shared test harness: in-memory collaborators around a real SQLite store
//! and filesystem backend.

// Each integration test binary uses a different slice of the harness.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use darkroom_core::config::GeneratorConfig;
use darkroom_core::{Asset, FocalPoint, ImageFormat, Transform};
use darkroom_metadata::SqliteStore;
use darkroom_storage::FilesystemBackend;
use darkroom_transformer::{
    AssetSource, GenerateTransformJob, ImageTransformer, JobQueue, ProgressHook, RasterEngine,
    TransformError, TransformRegistry, TransformResult,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};

pub const ROOT_URL: &str = "https://cdn.test/transforms";

/// Asset source over a fixed in-memory map.
#[derive(Default)]
pub struct MemoryAssets {
    inner: Mutex<HashMap<i64, (Asset, Bytes)>>,
}

impl MemoryAssets {
    pub fn insert(&self, asset: Asset, bytes: Bytes) {
        self.inner.lock().unwrap().insert(asset.id, (asset, bytes));
    }
}

#[async_trait]
impl AssetSource for MemoryAssets {
    async fn asset(&self, id: i64) -> TransformResult<Option<Asset>> {
        Ok(self.inner.lock().unwrap().get(&id).map(|(a, _)| a.clone()))
    }

    async fn read(&self, asset: &Asset) -> TransformResult<Bytes> {
        self.inner
            .lock()
            .unwrap()
            .get(&asset.id)
            .map(|(_, b)| b.clone())
            .ok_or(TransformError::AssetNotFound(asset.id))
    }
}

/// Raster engine that writes a marker file instead of real pixels and
/// counts invocations.
#[derive(Default)]
pub struct CountingEngine {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl RasterEngine for CountingEngine {
    async fn transform_image(
        &self,
        _source: Bytes,
        _transform: &Transform,
        _focal_point: Option<FocalPoint>,
        format: ImageFormat,
        output: &Path,
        progress: Option<ProgressHook>,
    ) -> TransformResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = progress {
            hook();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransformError::Raster("forced raster failure".to_string()));
        }
        tokio::fs::write(output, format!("pixels-{format}"))
            .await
            .map_err(|e| TransformError::Raster(e.to_string()))?;
        Ok(())
    }
}

/// Job queue that records every enqueued job.
#[derive(Default)]
pub struct RecordingQueue {
    pub jobs: Mutex<Vec<GenerateTransformJob>>,
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job: GenerateTransformJob) -> TransformResult<()> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// Transform registry over a fixed map of named definitions.
#[derive(Default)]
pub struct MemoryRegistry {
    inner: Mutex<HashMap<String, Transform>>,
}

impl MemoryRegistry {
    pub fn insert(&self, name: &str, transform: Transform) {
        self.inner
            .lock()
            .unwrap()
            .insert(name.to_string(), transform);
    }
}

#[async_trait]
impl TransformRegistry for MemoryRegistry {
    async fn by_name(&self, name: &str) -> TransformResult<Option<Transform>> {
        Ok(self.inner.lock().unwrap().get(name).cloned())
    }
}

pub struct Harness {
    pub transformer: ImageTransformer,
    pub store: Arc<SqliteStore>,
    pub artifacts: Arc<FilesystemBackend>,
    pub engine: Arc<CountingEngine>,
    pub queue: Arc<RecordingQueue>,
    pub assets: Arc<MemoryAssets>,
    pub registry: Arc<MemoryRegistry>,
    pub dir: tempfile::TempDir,
}

pub async fn harness() -> Harness {
    // Tight polling keeps the wait-loop tests fast.
    harness_with(GeneratorConfig {
        poll_attempts: 5,
        poll_interval_ms: 10,
        ..GeneratorConfig::default()
    })
    .await
}

pub async fn harness_with(config: GeneratorConfig) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::new(dir.path().join("metadata.db")).await.unwrap());
    let artifacts = Arc::new(
        FilesystemBackend::new(dir.path().join("artifacts"), Some(ROOT_URL.to_string()))
            .await
            .unwrap(),
    );
    let engine = Arc::new(CountingEngine::default());
    let queue = Arc::new(RecordingQueue::default());
    let assets = Arc::new(MemoryAssets::default());
    let registry = Arc::new(MemoryRegistry::default());

    let transformer = ImageTransformer::new(
        store.clone(),
        artifacts.clone(),
        engine.clone(),
        queue.clone(),
        assets.clone(),
        registry.clone(),
    )
    .with_config(config);

    Harness {
        transformer,
        store,
        artifacts,
        engine,
        queue,
        assets,
        registry,
        dir,
    }
}

/// A source asset last modified comfortably in the past, so fresh index
/// rows validate against it.
pub fn asset(id: i64, filename: &str) -> Asset {
    Asset {
        id,
        filename: filename.to_string(),
        folder_path: "photos/".to_string(),
        width: Some(4000),
        height: Some(3000),
        date_modified: OffsetDateTime::now_utc() - Duration::days(1),
        focal_point: None,
    }
}

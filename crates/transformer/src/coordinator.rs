//! The generation coordinator.
//!
//! Resolves (asset, transform) requests to index rows and drives each row
//! through its lifecycle: pending, claimed, generated (or failed). Multiple
//! workers may race on the same row; the only coordination primitive is the
//! compare-and-swap claim on `in_progress`, and losers fall back to polling
//! the winner's row.

use crate::eager::EagerCache;
use crate::editor::EditSession;
use crate::error::{TransformError, TransformResult};
use crate::events::{TransformGenerated, TransformObserver};
use crate::queue::{GenerateTransformJob, JobQueue};
use crate::raster::{self, ProgressHook, RasterEngine};
use crate::reuse;
use crate::source::{AssetSource, TransformRegistry};
use crate::validator::is_index_valid;
use darkroom_core::config::GeneratorConfig;
use darkroom_core::paths::artifact_key;
use darkroom_core::{
    index_fingerprint, parse_transform_string, transform_string, Asset, ImageFormat, Transform,
};
use darkroom_metadata::repos::FingerprintPair;
use darkroom_metadata::{MetadataError, MetadataStore, NewTransformIndex, TransformIndexRow};
use darkroom_storage::{ArtifactStore, StorageError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

/// What a polling worker observed about a peer's in-progress row.
enum PeerOutcome {
    /// The peer finished; the artifact exists.
    Completed(TransformIndexRow),
    /// The peer released the row without finishing it.
    Cleared(TransformIndexRow),
    /// The poll budget ran out with the row still claimed.
    Exhausted(TransformIndexRow),
}

/// Coordinates transform index rows and artifact generation.
pub struct ImageTransformer {
    store: Arc<dyn MetadataStore>,
    artifacts: Arc<dyn ArtifactStore>,
    engine: Arc<dyn RasterEngine>,
    queue: Arc<dyn JobQueue>,
    assets: Arc<dyn AssetSource>,
    registry: Arc<dyn TransformRegistry>,
    observers: Vec<Arc<dyn TransformObserver>>,
    config: GeneratorConfig,
}

impl ImageTransformer {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        artifacts: Arc<dyn ArtifactStore>,
        engine: Arc<dyn RasterEngine>,
        queue: Arc<dyn JobQueue>,
        assets: Arc<dyn AssetSource>,
        registry: Arc<dyn TransformRegistry>,
    ) -> Self {
        Self {
            store,
            artifacts,
            engine,
            queue,
            assets,
            registry,
            observers: Vec::new(),
            config: GeneratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn TransformObserver>) {
        self.observers.push(observer);
    }

    /// The URL a transformed variant of `asset` is (or will be) served at.
    ///
    /// Returns the final artifact URL when the artifact exists or
    /// `immediately` forces generation; otherwise enqueues a generation job
    /// and returns a placeholder action URL that resolves once the job ran.
    #[instrument(skip(self, asset, transform, eager), fields(asset_id = asset.id))]
    pub async fn get_transform_url(
        &self,
        asset: &Asset,
        transform: &Transform,
        immediately: bool,
        eager: Option<&EagerCache>,
    ) -> TransformResult<String> {
        let root_url = self
            .artifacts
            .root_url()
            .ok_or(TransformError::NotSupported)?
            .to_string();
        transform.validate()?;

        let mut index = self.get_transform_index(asset, transform, eager).await?;

        // The index can drift from local storage (manual deletion, restored
        // backups). Re-verify cheaply where the backend allows it and
        // downgrade the row rather than serving a dead URL.
        if index.file_exists {
            if let Some(local) = self.artifacts.local() {
                let key = self.artifact_key_for(asset, &index);
                if !local.verify_exists(&key).await? {
                    warn!(index_id = index.id, key = %key, "index row claims an artifact that is gone");
                    index.file_exists = false;
                    self.store.update_index(&index).await?;
                }
            }
        }

        if !index.file_exists {
            if !immediately {
                self.queue
                    .enqueue(GenerateTransformJob { index_id: index.id })
                    .await?;
                return Ok(format!(
                    "{}?transformId={}",
                    self.config.placeholder_path, index.id
                ));
            }
            index = self.ensure_generated(asset, transform, index).await?;
        }

        Ok(self.final_url(&root_url, asset, &index))
    }

    /// Look up (or create) the index row for one (asset, transform) request.
    ///
    /// A stale row (asset or named definition changed since indexing) is
    /// replaced: its artifact is deleted, the row dropped, and a fresh
    /// pending row created. At most one fresh row exists per fingerprint.
    #[instrument(skip(self, asset, transform, eager), fields(asset_id = asset.id))]
    pub async fn get_transform_index(
        &self,
        asset: &Asset,
        transform: &Transform,
        eager: Option<&EagerCache>,
    ) -> TransformResult<TransformIndexRow> {
        if let Some(cache) = eager {
            if let Some(row) = cache.get(&index_fingerprint(asset.id, transform)) {
                return Ok(row.clone());
            }
        }

        let fingerprint = transform_string(transform, false);
        let format = transform.format.map(|f| f.as_str().to_string());

        if let Some(existing) = self
            .store
            .find_by_fingerprint(asset.id, &fingerprint, format.as_deref())
            .await?
        {
            // Error rows are terminal until a lookup replaces them.
            if !existing.error && is_index_valid(&existing, transform, asset) {
                return Ok(existing);
            }
            debug!(index_id = existing.id, "replacing stale transform index");
            self.delete_transform_artifact(asset, &existing).await?;
            self.store.delete_by_ids(&[existing.id]).await?;
        }

        let row = NewTransformIndex::pending(
            asset.id,
            fingerprint,
            format,
            OffsetDateTime::now_utc(),
        );
        let id = self.store.create_index(&row).await?;
        self.index_by_id(id).await
    }

    /// Drive an index row to a completed artifact, coordinating with
    /// concurrent workers on the same row.
    pub async fn ensure_generated(
        &self,
        asset: &Asset,
        transform: &Transform,
        mut index: TransformIndexRow,
    ) -> TransformResult<TransformIndexRow> {
        loop {
            if index.file_exists {
                return Ok(index);
            }

            if index.in_progress {
                match self.wait_for_peer(index.id).await? {
                    PeerOutcome::Completed(row) => return Ok(row),
                    PeerOutcome::Cleared(row) => {
                        index = row;
                        continue;
                    }
                    PeerOutcome::Exhausted(row) => {
                        if row.file_exists {
                            return Ok(row);
                        }
                        // The claim holder is presumed dead. Take the row
                        // over; the wait budget has already been spent, so
                        // no second claim round.
                        warn!(index_id = row.id, "peer never finished; generating anyway");
                        index = row;
                        index.in_progress = true;
                        self.store.update_index(&index).await?;
                        return self.run_generation(asset, transform, index).await;
                    }
                }
            }

            if self.store.try_begin_generation(index.id).await? {
                index = self.index_by_id(index.id).await?;
                return self.run_generation(asset, transform, index).await;
            }

            // Lost the claim race; re-read and wait on the winner.
            index = self.index_by_id(index.id).await?;
        }
    }

    /// Poll a peer's claimed row until it resolves or the budget runs out.
    async fn wait_for_peer(&self, id: i64) -> TransformResult<PeerOutcome> {
        for _ in 0..self.config.poll_attempts {
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
            let row = self.index_by_id(id).await?;
            if row.error {
                return Err(TransformError::generation(
                    id,
                    "a concurrent worker failed to generate this transform",
                ));
            }
            if row.file_exists {
                return Ok(PeerOutcome::Completed(row));
            }
            if !row.in_progress {
                return Ok(PeerOutcome::Cleared(row));
            }
        }
        let row = self.index_by_id(id).await?;
        Ok(PeerOutcome::Exhausted(row))
    }

    /// Generate the artifact for a claimed row and record the outcome.
    #[instrument(skip(self, asset, transform, index), fields(index_id = index.id, asset_id = asset.id))]
    async fn run_generation(
        &self,
        asset: &Asset,
        transform: &Transform,
        mut index: TransformIndexRow,
    ) -> TransformResult<TransformIndexRow> {
        let resolved_format = transform
            .format
            .unwrap_or_else(|| asset.detect_transform_format());
        index.filename = Some(format!("{}.{resolved_format}", asset.filename_stem()));
        let key = self.artifact_key_for(asset, &index);

        self.drop_outdated_artifact(asset, transform, &index, &key)
            .await;

        if let Err(err) = self
            .produce_artifact(asset, transform, resolved_format, &index, &key)
            .await
        {
            let reason = err.to_string();
            index.error = true;
            index.in_progress = false;
            index.file_exists = false;
            self.store.update_index(&index).await?;
            return Err(TransformError::generation(index.id, reason));
        }

        // Final gate before declaring success: the artifact must actually
        // be there, whichever path claimed to produce it.
        if !self.artifacts.exists(&key).await? {
            index.error = true;
            index.in_progress = false;
            index.file_exists = false;
            self.store.update_index(&index).await?;
            return Err(TransformError::generation(
                index.id,
                format!("artifact missing after generation: {key}"),
            ));
        }

        index.file_exists = true;
        index.in_progress = false;
        index.error = false;
        index.date_indexed = Some(OffsetDateTime::now_utc());
        self.store.update_index(&index).await?;
        info!(index_id = index.id, key = %key, "transform artifact generated");

        // Re-read for the refreshed date_updated; it feeds cache busting.
        self.index_by_id(index.id).await
    }

    /// Produce the artifact: copy a pixel-identical donor if one exists,
    /// otherwise raster from source bytes.
    async fn produce_artifact(
        &self,
        asset: &Asset,
        transform: &Transform,
        resolved_format: ImageFormat,
        index: &TransformIndexRow,
        key: &str,
    ) -> TransformResult<()> {
        if let Some(donor) =
            reuse::find_reusable(self.store.as_ref(), asset, transform, resolved_format, index)
                .await?
        {
            // Already copied by an earlier attempt.
            if self.artifacts.exists(key).await? {
                return Ok(());
            }
            let donor_key = self.artifact_key_for(asset, &donor);
            debug!(
                index_id = index.id,
                donor_id = donor.id,
                "reusing pixel-identical artifact"
            );
            self.artifacts.copy(&donor_key, key).await?;
            return Ok(());
        }

        let source = self.assets.read(asset).await?;
        // Removed on drop, success or failure.
        let temp = tempfile::Builder::new()
            .prefix("darkroom-")
            .suffix(&format!(".{resolved_format}"))
            .tempfile()
            .map_err(|e| TransformError::Raster(format!("temp file: {e}")))?
            .into_temp_path();

        // Long rasters heartbeat through the row's date_updated so polling
        // workers can tell a slow claim holder from a dead one.
        let heartbeat: ProgressHook = {
            let store = Arc::clone(&self.store);
            let index_id = index.id;
            Arc::new(move || {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    if let Err(err) = store.touch_index(index_id).await {
                        debug!(index_id, error = %err, "generation heartbeat failed");
                    }
                });
            })
        };

        self.engine
            .transform_image(
                source,
                transform,
                asset.focal_point,
                resolved_format,
                &temp,
                Some(heartbeat),
            )
            .await?;

        // An observer may substitute a post-processed file; it owns cleanup
        // of the original in that case, we own the replacement.
        let mut replacement: Option<PathBuf> = None;
        {
            let event = TransformGenerated {
                asset,
                index,
                key,
                temp_path: &temp,
            };
            for observer in &self.observers {
                if let Some(path) = observer.transform_generated(&event) {
                    replacement = Some(path);
                    break;
                }
            }
        }
        let upload_path = replacement.clone().unwrap_or_else(|| temp.to_path_buf());

        let written = self.artifacts.write_file(key, &upload_path).await;
        if let Some(path) = replacement {
            let _ = tokio::fs::remove_file(path).await;
        }
        if let Err(err) = written {
            warn!(key, error = %err, "failed to store transform artifact");
            return Err(err.into());
        }
        Ok(())
    }

    /// Delete a stored artifact that predates the current named-transform
    /// definition, so a stale file cannot satisfy the existence gate.
    async fn drop_outdated_artifact(
        &self,
        asset: &Asset,
        transform: &Transform,
        index: &TransformIndexRow,
        key: &str,
    ) {
        if !transform.is_named() {
            return;
        }
        let Some(changed) = transform.parameter_change_time else {
            return;
        };
        match self.artifacts.metadata(key).await {
            Ok(meta) => {
                let outdated = meta.last_modified.map(|m| m < changed).unwrap_or(true);
                if outdated {
                    if let Err(err) = self.delete_transform_artifact(asset, index).await {
                        warn!(key, error = %err, "failed to drop outdated artifact");
                    }
                }
            }
            Err(StorageError::NotFound(_)) => {}
            Err(err) => warn!(key, error = %err, "could not inspect stored artifact"),
        }
    }

    /// Queue-worker entry point: generate the artifact for a stored index
    /// row, reconstructing the transform from its fingerprint.
    #[instrument(skip(self))]
    pub async fn generate_transform(&self, index_id: i64) -> TransformResult<TransformIndexRow> {
        let index = self.index_by_id(index_id).await?;
        let asset = self
            .assets
            .asset(index.asset_id)
            .await?
            .ok_or(TransformError::AssetNotFound(index.asset_id))?;
        let transform = self.transform_for_row(&index).await?;
        self.ensure_generated(&asset, &transform, index).await
    }

    /// Reconstruct the transform an index row was created for. Anonymous
    /// fingerprints parse directly; name forms resolve through the registry.
    async fn transform_for_row(&self, row: &TransformIndexRow) -> TransformResult<Transform> {
        let mut transform = match parse_transform_string(&row.transform_string) {
            Ok(t) => t,
            Err(_) => {
                let name = row.transform_string.trim_start_matches('_');
                self.registry
                    .by_name(name)
                    .await?
                    .ok_or_else(|| TransformError::TransformNotFound(name.to_string()))?
            }
        };
        transform.format = match &row.format {
            Some(format) => Some(ImageFormat::parse(format)?),
            None => None,
        };
        Ok(transform)
    }

    /// Delete every index row and stored artifact for an asset.
    #[instrument(skip(self, asset), fields(asset_id = asset.id))]
    pub async fn invalidate_asset_transforms(&self, asset: &Asset) -> TransformResult<()> {
        let rows = self.store.list_for_asset(asset.id).await?;
        for row in &rows {
            if row.file_exists {
                self.delete_transform_artifact(asset, row).await?;
            }
        }
        self.store.delete_by_asset(asset.id).await?;
        Ok(())
    }

    /// Delete the stored artifact for an index row. Missing artifacts are
    /// not an error.
    pub async fn delete_transform_artifact(
        &self,
        asset: &Asset,
        index: &TransformIndexRow,
    ) -> TransformResult<()> {
        let key = self.artifact_key_for(asset, index);
        for observer in &self.observers {
            observer.artifact_deleting(asset, index, &key);
        }
        match self.artifacts.delete(&key).await {
            Ok(()) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Ids of rows that have never been attempted.
    pub async fn pending_transform_ids(&self) -> TransformResult<Vec<i64>> {
        Ok(self.store.list_pending().await?)
    }

    /// Fetch an index row by id, erroring if it is gone.
    pub async fn index_by_id(&self, id: i64) -> TransformResult<TransformIndexRow> {
        self.store.find_index(id).await?.ok_or_else(|| {
            TransformError::Metadata(MetadataError::NotFound(format!(
                "transform index {id} not found"
            )))
        })
    }

    /// Preload index rows for every (asset, transform) combination in one
    /// query. Only rows that are still valid land in the cache; stale rows
    /// fall through to the per-request path, which replaces them.
    #[instrument(skip_all, fields(assets = assets.len(), transforms = transforms.len()))]
    pub async fn eager_load_transforms(
        &self,
        assets: &[Asset],
        transforms: &[Transform],
    ) -> TransformResult<EagerCache> {
        let mut cache = EagerCache::new();
        if assets.is_empty() || transforms.is_empty() {
            return Ok(cache);
        }

        let ids: Vec<i64> = assets.iter().map(|a| a.id).collect();
        let pairs: Vec<FingerprintPair> = transforms
            .iter()
            .map(|t| FingerprintPair {
                transform_string: transform_string(t, false),
                format: t.format.map(|f| f.as_str().to_string()),
            })
            .collect();

        let rows = self.store.find_for_assets(&ids, &pairs).await?;
        let mut invalid = Vec::new();
        for row in rows {
            let Some(asset) = assets.iter().find(|a| a.id == row.asset_id) else {
                continue;
            };
            let Some(transform) = transforms.iter().zip(&pairs).find_map(|(t, pair)| {
                (pair.transform_string == row.transform_string && pair.format == row.format)
                    .then_some(t)
            }) else {
                continue;
            };
            if row.error || !is_index_valid(&row, transform, asset) {
                invalid.push(row.id);
                continue;
            }
            let fingerprint = row.fingerprint();
            // Rows come back ordered by id; the lowest id wins, matching
            // the per-request lookup.
            if cache.get(&fingerprint).is_none() {
                cache.insert(fingerprint, row);
            }
        }
        if !invalid.is_empty() {
            debug!(count = invalid.len(), "dropping invalidated rows found during eager load");
            self.store.delete_by_ids(&invalid).await?;
        }
        Ok(cache)
    }

    /// Open an edit session on the asset's source image.
    pub async fn start_editing(&self, asset: &Asset) -> TransformResult<EditSession> {
        let bytes = self.assets.read(asset).await?;
        let format = asset.detect_transform_format();
        let image = tokio::task::spawn_blocking(move || raster::decode(&bytes))
            .await
            .map_err(|e| TransformError::Raster(format!("decode task panicked: {e}")))??;
        Ok(EditSession::new(image, format))
    }

    fn artifact_key_for(&self, asset: &Asset, index: &TransformIndexRow) -> String {
        artifact_key(asset, &index.transform_string, index.filename.as_deref())
    }

    /// Final artifact URL, cache-busted by the row's last update time.
    fn final_url(&self, root_url: &str, asset: &Asset, index: &TransformIndexRow) -> String {
        let key = self.artifact_key_for(asset, index);
        format!(
            "{root_url}/{key}?v={}",
            index.date_updated.unix_timestamp()
        )
    }
}

//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::TransformIndexRepo;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: TransformIndexRepo + Send + Sync {
    /// Create the schema if it doesn't exist yet.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS transform_indexes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_id INTEGER NOT NULL,
    transformer TEXT NOT NULL DEFAULT 'darkroom',
    filename TEXT,
    format TEXT,
    transform_string TEXT NOT NULL,
    file_exists INTEGER NOT NULL DEFAULT 0,
    in_progress INTEGER NOT NULL DEFAULT 0,
    error INTEGER NOT NULL DEFAULT 0,
    date_indexed TEXT,
    date_updated TEXT NOT NULL,
    date_created TEXT NOT NULL
);

-- (asset_id, transform_string, format) is a soft unique key: enforced by
-- lookup-before-create in the coordinator, not by a constraint.
CREATE INDEX IF NOT EXISTS idx_transform_indexes_lookup
    ON transform_indexes (asset_id, transform_string);
CREATE INDEX IF NOT EXISTS idx_transform_indexes_pending
    ON transform_indexes (file_exists, in_progress, error);
"#;

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) a SQLite store at the given path and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        Self::with_busy_timeout(path, Duration::from_secs(5)).await
    }

    /// Open with an explicit busy timeout.
    pub async fn with_busy_timeout(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures under worker
            // concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::{NewTransformIndex, TransformIndexRow};
    use crate::repos::FingerprintPair;
    use time::OffsetDateTime;
    use tracing::instrument;

    #[async_trait]
    impl TransformIndexRepo for SqliteStore {
        #[instrument(skip(self, row), fields(asset_id = row.asset_id, transform_string = %row.transform_string))]
        async fn create_index(&self, row: &NewTransformIndex) -> MetadataResult<i64> {
            let now = OffsetDateTime::now_utc();
            let result = sqlx::query(
                r#"
                INSERT INTO transform_indexes (
                    asset_id, transformer, filename, format, transform_string,
                    file_exists, in_progress, error, date_indexed,
                    date_updated, date_created
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.asset_id)
            .bind(&row.transformer)
            .bind(&row.filename)
            .bind(&row.format)
            .bind(&row.transform_string)
            .bind(row.file_exists)
            .bind(row.in_progress)
            .bind(row.error)
            .bind(row.date_indexed)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.message().contains("constraint") => {
                    MetadataError::Constraint(db_err.message().to_string())
                }
                _ => MetadataError::Database(e),
            })?;

            Ok(result.last_insert_rowid())
        }

        #[instrument(skip(self, row), fields(id = row.id))]
        async fn update_index(&self, row: &TransformIndexRow) -> MetadataResult<()> {
            let result = sqlx::query(
                r#"
                UPDATE transform_indexes SET
                    asset_id = ?, transformer = ?, filename = ?, format = ?,
                    transform_string = ?, file_exists = ?, in_progress = ?,
                    error = ?, date_indexed = ?, date_updated = ?
                WHERE id = ?
                "#,
            )
            .bind(row.asset_id)
            .bind(&row.transformer)
            .bind(&row.filename)
            .bind(&row.format)
            .bind(&row.transform_string)
            .bind(row.file_exists)
            .bind(row.in_progress)
            .bind(row.error)
            .bind(row.date_indexed)
            .bind(OffsetDateTime::now_utc())
            .bind(row.id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "transform index {} not found",
                    row.id
                )));
            }
            Ok(())
        }

        async fn find_index(&self, id: i64) -> MetadataResult<Option<TransformIndexRow>> {
            let row = sqlx::query_as::<_, TransformIndexRow>(
                "SELECT * FROM transform_indexes WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn find_by_fingerprint(
            &self,
            asset_id: i64,
            transform_string: &str,
            format: Option<&str>,
        ) -> MetadataResult<Option<TransformIndexRow>> {
            let row = match format {
                Some(format) => {
                    sqlx::query_as::<_, TransformIndexRow>(
                        "SELECT * FROM transform_indexes \
                         WHERE asset_id = ? AND transform_string = ? AND format = ? \
                         ORDER BY id LIMIT 1",
                    )
                    .bind(asset_id)
                    .bind(transform_string)
                    .bind(format)
                    .fetch_optional(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, TransformIndexRow>(
                        "SELECT * FROM transform_indexes \
                         WHERE asset_id = ? AND transform_string = ? AND format IS NULL \
                         ORDER BY id LIMIT 1",
                    )
                    .bind(asset_id)
                    .bind(transform_string)
                    .fetch_optional(&self.pool)
                    .await?
                }
            };
            Ok(row)
        }

        async fn find_similar(
            &self,
            asset_id: i64,
            transform_strings: &[String],
            format: &str,
            exclude_id: i64,
        ) -> MetadataResult<Option<TransformIndexRow>> {
            if transform_strings.is_empty() {
                return Ok(None);
            }

            let placeholders: Vec<&str> = transform_strings.iter().map(|_| "?").collect();
            // Donors are matched on the resolved output format; NULL-format
            // (auto-detect) rows never satisfy the equality.
            let query = format!(
                "SELECT * FROM transform_indexes \
                 WHERE asset_id = ? AND file_exists = 1 AND format = ? \
                   AND transform_string IN ({}) AND id != ? \
                 ORDER BY id LIMIT 1",
                placeholders.join(", ")
            );

            let mut query_builder = sqlx::query_as::<_, TransformIndexRow>(&query)
                .bind(asset_id)
                .bind(format);
            for transform_string in transform_strings {
                query_builder = query_builder.bind(transform_string);
            }
            let row = query_builder
                .bind(exclude_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn find_for_assets(
            &self,
            asset_ids: &[i64],
            fingerprints: &[FingerprintPair],
        ) -> MetadataResult<Vec<TransformIndexRow>> {
            if asset_ids.is_empty() || fingerprints.is_empty() {
                return Ok(Vec::new());
            }

            let id_placeholders: Vec<&str> = asset_ids.iter().map(|_| "?").collect();
            let pair_conditions: Vec<&str> = fingerprints
                .iter()
                .map(|pair| {
                    if pair.format.is_some() {
                        "(transform_string = ? AND format = ?)"
                    } else {
                        "(transform_string = ? AND format IS NULL)"
                    }
                })
                .collect();

            let query = format!(
                "SELECT * FROM transform_indexes \
                 WHERE asset_id IN ({}) AND ({}) \
                 ORDER BY id",
                id_placeholders.join(", "),
                pair_conditions.join(" OR ")
            );

            let mut query_builder = sqlx::query_as::<_, TransformIndexRow>(&query);
            for asset_id in asset_ids {
                query_builder = query_builder.bind(asset_id);
            }
            for pair in fingerprints {
                query_builder = query_builder.bind(&pair.transform_string);
                if let Some(format) = &pair.format {
                    query_builder = query_builder.bind(format);
                }
            }

            let rows = query_builder.fetch_all(&self.pool).await?;
            Ok(rows)
        }

        async fn list_pending(&self) -> MetadataResult<Vec<i64>> {
            let rows: Vec<(i64,)> = sqlx::query_as(
                "SELECT id FROM transform_indexes \
                 WHERE file_exists = 0 AND in_progress = 0 AND error = 0 \
                 ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(|(id,)| id).collect())
        }

        async fn list_for_asset(&self, asset_id: i64) -> MetadataResult<Vec<TransformIndexRow>> {
            let rows = sqlx::query_as::<_, TransformIndexRow>(
                "SELECT * FROM transform_indexes WHERE asset_id = ? ORDER BY id",
            )
            .bind(asset_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_by_asset(&self, asset_id: i64) -> MetadataResult<()> {
            sqlx::query("DELETE FROM transform_indexes WHERE asset_id = ?")
                .bind(asset_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn delete_by_ids(&self, ids: &[i64]) -> MetadataResult<()> {
            if ids.is_empty() {
                return Ok(());
            }
            let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
            let query = format!(
                "DELETE FROM transform_indexes WHERE id IN ({})",
                placeholders.join(", ")
            );
            let mut query_builder = sqlx::query(&query);
            for id in ids {
                query_builder = query_builder.bind(id);
            }
            query_builder.execute(&self.pool).await?;
            Ok(())
        }

        #[instrument(skip(self))]
        async fn try_begin_generation(&self, id: i64) -> MetadataResult<bool> {
            // Compare-and-swap: only one worker can flip the flag. Losing
            // workers fall back to polling.
            let result = sqlx::query(
                "UPDATE transform_indexes SET in_progress = 1, date_updated = ? \
                 WHERE id = ? AND in_progress = 0",
            )
            .bind(OffsetDateTime::now_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn touch_index(&self, id: i64) -> MetadataResult<()> {
            // Conditional on the claim so a heartbeat that fires late
            // cannot bump a completed row.
            sqlx::query(
                "UPDATE transform_indexes SET date_updated = ? \
                 WHERE id = ? AND in_progress = 1",
            )
            .bind(OffsetDateTime::now_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTransformIndex;
    use crate::repos::FingerprintPair;
    use time::OffsetDateTime;

    async fn store() -> SqliteStore {
        let dir = tempfile::tempdir().unwrap();
        // Keep the tempdir alive by leaking it; the test process cleans up.
        let path = dir.keep().join("metadata.db");
        SqliteStore::new(path).await.unwrap()
    }

    fn pending(asset_id: i64, transform_string: &str, format: Option<&str>) -> NewTransformIndex {
        NewTransformIndex::pending(
            asset_id,
            transform_string.to_string(),
            format.map(str::to_string),
            OffsetDateTime::now_utc(),
        )
    }

    #[tokio::test]
    async fn create_and_find_by_id() {
        let store = store().await;
        let id = store.create_index(&pending(1, "_t", None)).await.unwrap();
        assert!(id > 0);

        let row = store.find_index(id).await.unwrap().unwrap();
        assert_eq!(row.asset_id, 1);
        assert_eq!(row.transform_string, "_t");
        assert!(!row.file_exists);
        assert!(!row.in_progress);
        assert!(!row.error);
    }

    #[tokio::test]
    async fn fingerprint_lookup_is_format_exact() {
        let store = store().await;
        let auto = store.create_index(&pending(1, "_t", None)).await.unwrap();
        let webp = store
            .create_index(&pending(1, "_t", Some("webp")))
            .await
            .unwrap();

        let found = store
            .find_by_fingerprint(1, "_t", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, auto);

        let found = store
            .find_by_fingerprint(1, "_t", Some("webp"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, webp);

        assert!(store
            .find_by_fingerprint(1, "_t", Some("png"))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_fingerprint(2, "_t", None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_overwrites_and_refreshes_date_updated() {
        let store = store().await;
        let id = store.create_index(&pending(1, "_t", None)).await.unwrap();
        let mut row = store.find_index(id).await.unwrap().unwrap();
        let created_updated = row.date_updated;

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        row.file_exists = true;
        row.filename = Some("beach.jpg".to_string());
        store.update_index(&row).await.unwrap();

        let row = store.find_index(id).await.unwrap().unwrap();
        assert!(row.file_exists);
        assert_eq!(row.filename.as_deref(), Some("beach.jpg"));
        assert!(row.date_updated > created_updated);
    }

    #[tokio::test]
    async fn update_missing_row_is_not_found() {
        let store = store().await;
        let id = store.create_index(&pending(1, "_t", None)).await.unwrap();
        let mut row = store.find_index(id).await.unwrap().unwrap();
        row.id = 9999;
        match store.update_index(&row).await {
            Err(MetadataError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_pending_excludes_attempted_rows() {
        let store = store().await;
        let fresh = store.create_index(&pending(1, "_a", None)).await.unwrap();

        let in_progress = store.create_index(&pending(1, "_b", None)).await.unwrap();
        assert!(store.try_begin_generation(in_progress).await.unwrap());

        let done = store.create_index(&pending(1, "_c", None)).await.unwrap();
        let mut row = store.find_index(done).await.unwrap().unwrap();
        row.file_exists = true;
        store.update_index(&row).await.unwrap();

        let failed = store.create_index(&pending(1, "_d", None)).await.unwrap();
        let mut row = store.find_index(failed).await.unwrap().unwrap();
        row.error = true;
        store.update_index(&row).await.unwrap();

        assert_eq!(store.list_pending().await.unwrap(), vec![fresh]);
    }

    #[tokio::test]
    async fn cas_claim_wins_once() {
        let store = store().await;
        let id = store.create_index(&pending(1, "_t", None)).await.unwrap();

        assert!(store.try_begin_generation(id).await.unwrap());
        assert!(!store.try_begin_generation(id).await.unwrap());

        let row = store.find_index(id).await.unwrap().unwrap();
        assert!(row.in_progress);
    }

    #[tokio::test]
    async fn find_similar_prefers_lowest_id_and_excludes_self() {
        let store = store().await;

        let mut first = pending(1, "_100x100_crop_center-center_none", Some("jpg"));
        first.file_exists = true;
        let first_id = store.create_index(&first).await.unwrap();

        let mut second = pending(1, "_thumb", Some("jpg"));
        second.file_exists = true;
        let second_id = store.create_index(&second).await.unwrap();

        let current = store.create_index(&pending(1, "_other", Some("jpg"))).await.unwrap();

        let candidates = vec![
            "_100x100_crop_center-center_none".to_string(),
            "_thumb".to_string(),
        ];
        let found = store
            .find_similar(1, &candidates, "jpg", current)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first_id);

        // Excluding the lowest id falls through to the next candidate.
        let found = store
            .find_similar(1, &candidates, "jpg", first_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, second_id);

        // A different format matches nothing.
        assert!(store
            .find_similar(1, &candidates, "webp", current)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn find_similar_skips_auto_detect_rows() {
        let store = store().await;
        let mut auto = pending(1, "_thumb", None);
        auto.file_exists = true;
        store.create_index(&auto).await.unwrap();

        // A NULL-format row never satisfies the format equality.
        assert!(store
            .find_similar(1, &["_thumb".to_string()], "jpg", 0)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn find_similar_requires_file_exists() {
        let store = store().await;
        store.create_index(&pending(1, "_t", Some("jpg"))).await.unwrap();
        let found = store
            .find_similar(1, &["_t".to_string()], "jpg", 0)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn touch_refreshes_claimed_rows_only() {
        let store = store().await;
        let id = store.create_index(&pending(1, "_t", None)).await.unwrap();
        let before = store.find_index(id).await.unwrap().unwrap();

        // Unclaimed rows are left alone.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.touch_index(id).await.unwrap();
        let row = store.find_index(id).await.unwrap().unwrap();
        assert_eq!(row.date_updated, before.date_updated);

        assert!(store.try_begin_generation(id).await.unwrap());
        let claimed = store.find_index(id).await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store.touch_index(id).await.unwrap();
        let row = store.find_index(id).await.unwrap().unwrap();
        assert!(row.date_updated > claimed.date_updated);
        assert!(row.in_progress);
        assert_eq!(row.date_indexed, claimed.date_indexed);

        // Missing rows are a quiet no-op, like released ones.
        store.touch_index(9999).await.unwrap();
    }

    #[tokio::test]
    async fn find_for_assets_bulk_query() {
        let store = store().await;
        let a = store.create_index(&pending(1, "_t", None)).await.unwrap();
        let b = store
            .create_index(&pending(2, "_t", Some("webp")))
            .await
            .unwrap();
        // Not matched: wrong fingerprint, wrong asset.
        store.create_index(&pending(1, "_u", None)).await.unwrap();
        store.create_index(&pending(3, "_t", None)).await.unwrap();

        let rows = store
            .find_for_assets(
                &[1, 2],
                &[
                    FingerprintPair {
                        transform_string: "_t".to_string(),
                        format: None,
                    },
                    FingerprintPair {
                        transform_string: "_t".to_string(),
                        format: Some("webp".to_string()),
                    },
                ],
            )
            .await
            .unwrap();

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn delete_by_asset_and_by_ids() {
        let store = store().await;
        let a = store.create_index(&pending(1, "_a", None)).await.unwrap();
        let b = store.create_index(&pending(1, "_b", None)).await.unwrap();
        let c = store.create_index(&pending(2, "_a", None)).await.unwrap();

        store.delete_by_asset(1).await.unwrap();
        assert!(store.find_index(a).await.unwrap().is_none());
        assert!(store.find_index(b).await.unwrap().is_none());
        assert!(store.find_index(c).await.unwrap().is_some());

        store.delete_by_ids(&[c]).await.unwrap();
        assert!(store.find_index(c).await.unwrap().is_none());

        // Empty id list is a no-op, not a SQL error.
        store.delete_by_ids(&[]).await.unwrap();
    }
}

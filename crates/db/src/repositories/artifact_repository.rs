use chrono::Utc;
use pipeline_core::Step;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{ArtifactRecord, ArtifactRow, CreateArtifact};

/// Registry mapping artifact ids to object-storage paths. Rollback deletes
/// rows here after the objects themselves are purged.
#[derive(Clone)]
pub struct ArtifactRepository {
    pool: SqlitePool,
}

impl ArtifactRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn register(&self, input: CreateArtifact) -> Result<ArtifactRecord, DbError> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO artifacts (
                id, pipeline_id, step, storage_path, mime_type, is_source, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.id.to_string())
        .bind(input.pipeline_id.to_string())
        .bind(input.step.number() as i64)
        .bind(&input.storage_path)
        .bind(&input.mime_type)
        .bind(input.is_source as i64)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(ArtifactRecord {
            id: input.id,
            pipeline_id: input.pipeline_id,
            step: input.step,
            storage_path: input.storage_path,
            mime_type: input.mime_type,
            is_source: input.is_source,
            created_at: now,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ArtifactRecord>, DbError> {
        let row = sqlx::query_as::<_, ArtifactRow>(r#"SELECT * FROM artifacts WHERE id = ?"#)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    /// Derived artifacts registered at or beyond `from`, for rollback
    /// purging. The source artifact is never included.
    pub async fn list_from_step(
        &self,
        pipeline_id: Uuid,
        from: Step,
    ) -> Result<Vec<ArtifactRecord>, DbError> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT * FROM artifacts
            WHERE pipeline_id = ? AND step >= ? AND is_source = 0
            ORDER BY created_at
            "#,
        )
        .bind(pipeline_id.to_string())
        .bind(from.number() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    /// Storage paths for a set of ids, for purging objects before the rows.
    /// Unknown ids are skipped.
    pub async fn storage_paths(&self, ids: &[Uuid]) -> Result<Vec<String>, DbError> {
        let mut paths = Vec::with_capacity(ids.len());
        for id in ids {
            let path: Option<String> =
                sqlx::query_scalar(r#"SELECT storage_path FROM artifacts WHERE id = ?"#)
                    .bind(id.to_string())
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some(path) = path {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Removes registry rows. The source artifact is protected and never
    /// deleted through this path.
    pub async fn delete_many(&self, ids: &[Uuid]) -> Result<u64, DbError> {
        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query(r#"DELETE FROM artifacts WHERE id = ? AND is_source = 0"#)
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
            deleted += result.rows_affected();
        }
        debug!(count = deleted, "Deleted artifact registry rows");
        Ok(deleted)
    }
}

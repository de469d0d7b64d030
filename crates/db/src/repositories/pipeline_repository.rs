use pipeline_core::{PhaseGuard, Pipeline};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::PipelineRow;

/// Store for the pipeline aggregate. Every write revalidates the
/// phase/step pair before touching the database; the schema triggers
/// enforce the same mapping underneath.
#[derive(Clone)]
pub struct PipelineRepository {
    pool: SqlitePool,
}

impl PipelineRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, pipeline: &Pipeline) -> Result<(), DbError> {
        PhaseGuard::validate(&pipeline.phase, pipeline.current_step.number())?;

        sqlx::query(
            r#"
            INSERT INTO pipelines (
                id, owner, current_step, phase, mode, resolution, aspect_ratio,
                source_artifact_id, spaces, last_error, step_outputs,
                step_retry_state, total_retry_count, version, completed_at,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(pipeline.id.to_string())
        .bind(&pipeline.owner)
        .bind(pipeline.current_step.number() as i64)
        .bind(pipeline.phase.as_token())
        .bind(pipeline.mode.as_str())
        .bind(pipeline.quality.resolution.as_str())
        .bind(pipeline.quality.aspect_ratio.as_str())
        .bind(pipeline.source_artifact_id.to_string())
        .bind(serde_json::to_string(&pipeline.spaces)?)
        .bind(&pipeline.last_error)
        .bind(serde_json::to_string(&pipeline.step_outputs)?)
        .bind(serde_json::to_string(&pipeline.step_retry_state)?)
        .bind(pipeline.total_retry_count as i64)
        .bind(pipeline.version)
        .bind(pipeline.completed_at.map(|t| t.timestamp_millis()))
        .bind(pipeline.created_at.timestamp_millis())
        .bind(pipeline.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        debug!(pipeline_id = %pipeline.id, "Created pipeline");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Pipeline, DbError> {
        let row = sqlx::query_as::<_, PipelineRow>(
            r#"SELECT * FROM pipelines WHERE id = ?"#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::PipelineNotFound(id))?;

        row.into_domain()
    }

    /// Compare-and-swap update. Succeeds only when the stored version still
    /// equals `pipeline.version`; on success the stored version is bumped
    /// and the new value is returned.
    pub async fn update(&self, pipeline: &Pipeline) -> Result<i64, DbError> {
        PhaseGuard::validate(&pipeline.phase, pipeline.current_step.number())?;

        let result = sqlx::query(
            r#"
            UPDATE pipelines SET
                current_step = ?,
                phase = ?,
                spaces = ?,
                last_error = ?,
                step_outputs = ?,
                step_retry_state = ?,
                total_retry_count = ?,
                version = version + 1,
                completed_at = ?,
                updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(pipeline.current_step.number() as i64)
        .bind(pipeline.phase.as_token())
        .bind(serde_json::to_string(&pipeline.spaces)?)
        .bind(&pipeline.last_error)
        .bind(serde_json::to_string(&pipeline.step_outputs)?)
        .bind(serde_json::to_string(&pipeline.step_retry_state)?)
        .bind(pipeline.total_retry_count as i64)
        .bind(pipeline.completed_at.map(|t| t.timestamp_millis()))
        .bind(pipeline.updated_at.timestamp_millis())
        .bind(pipeline.id.to_string())
        .bind(pipeline.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar(r#"SELECT 1 FROM pipelines WHERE id = ?"#)
                    .bind(pipeline.id.to_string())
                    .fetch_optional(&self.pool)
                    .await?;
            return Err(if exists.is_some() {
                DbError::VersionConflict {
                    id: pipeline.id,
                    expected: pipeline.version,
                }
            } else {
                DbError::PipelineNotFound(pipeline.id)
            });
        }

        Ok(pipeline.version + 1)
    }

    pub async fn list_for_owner(&self, owner: &str) -> Result<Vec<Pipeline>, DbError> {
        let rows = sqlx::query_as::<_, PipelineRow>(
            r#"SELECT * FROM pipelines WHERE owner = ? ORDER BY created_at DESC"#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }
}

use chrono::Utc;
use pipeline_core::Step;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{CreatePipelineEvent, PipelineEventRow, StoredEvent};

/// Durable audit log. Discarded retries and crash recoveries land here so
/// operators can reconstruct what happened. Pipeline-level rows survive
/// rollback; step-scoped rows are purged with their step.
#[derive(Clone)]
pub struct EventLogRepository {
    pool: SqlitePool,
}

impl EventLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, input: CreatePipelineEvent) -> Result<StoredEvent, DbError> {
        let now = Utc::now();
        let payload = serde_json::to_string(&input.payload)?;

        let result = sqlx::query(
            r#"
            INSERT INTO pipeline_events (pipeline_id, step, event_type, payload, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.pipeline_id.to_string())
        .bind(input.step.map(|s| s as i64))
        .bind(&input.event_type)
        .bind(&payload)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(StoredEvent {
            id: result.last_insert_rowid(),
            pipeline_id: input.pipeline_id,
            step: input.step,
            event_type: input.event_type,
            payload: input.payload,
            created_at: now,
        })
    }

    pub async fn list_for_pipeline(&self, pipeline_id: Uuid) -> Result<Vec<StoredEvent>, DbError> {
        let rows = sqlx::query_as::<_, PipelineEventRow>(
            r#"SELECT * FROM pipeline_events WHERE pipeline_id = ? ORDER BY id"#,
        )
        .bind(pipeline_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    /// Removes the step-scoped entries at or beyond `from`. Rows without a
    /// step (creation, analysis, rollback itself) are kept.
    pub async fn delete_from_step(&self, pipeline_id: Uuid, from: Step) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"DELETE FROM pipeline_events WHERE pipeline_id = ? AND step IS NOT NULL AND step >= ?"#,
        )
        .bind(pipeline_id.to_string())
        .bind(from.number() as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

use chrono::Utc;
use pipeline_core::Step;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{CreateSpaceRecord, SpaceRecord, SpaceRecordRow};

/// Per-space outputs of the batch steps. Cleared from a step onward when
/// that step is rolled back.
#[derive(Clone)]
pub struct SpaceRecordRepository {
    pool: SqlitePool,
}

impl SpaceRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, input: CreateSpaceRecord) -> Result<SpaceRecord, DbError> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO space_records (
                pipeline_id, step, space_name, artifact_id, decision, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(input.pipeline_id.to_string())
        .bind(input.step.number() as i64)
        .bind(&input.space_name)
        .bind(input.artifact_id.to_string())
        .bind(input.decision.as_str())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(SpaceRecord {
            id: result.last_insert_rowid(),
            pipeline_id: input.pipeline_id,
            step: input.step,
            space_name: input.space_name,
            artifact_id: input.artifact_id,
            decision: input.decision,
            created_at: now,
        })
    }

    pub async fn list_for_step(
        &self,
        pipeline_id: Uuid,
        step: Step,
    ) -> Result<Vec<SpaceRecord>, DbError> {
        let rows = sqlx::query_as::<_, SpaceRecordRow>(
            r#"
            SELECT * FROM space_records
            WHERE pipeline_id = ? AND step = ?
            ORDER BY id
            "#,
        )
        .bind(pipeline_id.to_string())
        .bind(step.number() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    pub async fn delete_from_step(&self, pipeline_id: Uuid, from: Step) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"DELETE FROM space_records WHERE pipeline_id = ? AND step >= ?"#,
        )
        .bind(pipeline_id.to_string())
        .bind(from.number() as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

use chrono::Utc;
use pipeline_core::Step;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{CreateJudgeResult, JudgeResultRecord, JudgeResultRow};

/// Append-only log of raw judge verdicts, one row per inspected candidate.
#[derive(Clone)]
pub struct JudgeResultRepository {
    pool: SqlitePool,
}

impl JudgeResultRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, input: CreateJudgeResult) -> Result<JudgeResultRecord, DbError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let reasons = serde_json::to_string(&input.verdict.reasons)?;

        sqlx::query(
            r#"
            INSERT INTO judge_results (
                id, pipeline_id, step, attempt_index, candidate_index,
                judge_type, decision, score, reasons, qa_executed, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.pipeline_id.to_string())
        .bind(input.step.number() as i64)
        .bind(input.attempt_index as i64)
        .bind(input.candidate_index as i64)
        .bind(input.judge_type.as_str())
        .bind(input.verdict.decision.as_str())
        .bind(input.verdict.score as i64)
        .bind(&reasons)
        .bind(input.verdict.qa_executed as i64)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(JudgeResultRecord {
            id,
            pipeline_id: input.pipeline_id,
            step: input.step,
            attempt_index: input.attempt_index,
            candidate_index: input.candidate_index,
            judge_type: input.judge_type.as_str().to_string(),
            verdict: input.verdict,
            created_at: now,
        })
    }

    pub async fn list_for_step(
        &self,
        pipeline_id: Uuid,
        step: Step,
    ) -> Result<Vec<JudgeResultRecord>, DbError> {
        let rows = sqlx::query_as::<_, JudgeResultRow>(
            r#"
            SELECT * FROM judge_results
            WHERE pipeline_id = ? AND step = ?
            ORDER BY attempt_index, candidate_index
            "#,
        )
        .bind(pipeline_id.to_string())
        .bind(step.number() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    pub async fn delete_from_step(&self, pipeline_id: Uuid, from: Step) -> Result<u64, DbError> {
        let result =
            sqlx::query(r#"DELETE FROM judge_results WHERE pipeline_id = ? AND step >= ?"#)
                .bind(pipeline_id.to_string())
                .bind(from.number() as i64)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

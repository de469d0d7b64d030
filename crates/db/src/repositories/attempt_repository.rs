use chrono::Utc;
use pipeline_core::Step;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{AttemptRecord, AttemptRow, CreateAttempt};

/// Append-only audit trail of generated candidates. Rows are never updated;
/// the only deletion path is a rollback, which purges the records of the
/// rewound step onward so attempt indices can restart at zero.
#[derive(Clone)]
pub struct AttemptRepository {
    pool: SqlitePool,
}

impl AttemptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, input: CreateAttempt) -> Result<AttemptRecord, DbError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let reasons = serde_json::to_string(&input.reasons)?;

        sqlx::query(
            r#"
            INSERT INTO attempts (
                id, pipeline_id, step, attempt_index, candidate_index,
                artifact_id, prompt, model, decision, score, reasons,
                qa_executed, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.pipeline_id.to_string())
        .bind(input.step.number() as i64)
        .bind(input.attempt_index as i64)
        .bind(input.candidate_index as i64)
        .bind(input.artifact_id.to_string())
        .bind(&input.prompt)
        .bind(&input.model)
        .bind(input.decision.map(|d| d.as_str()))
        .bind(input.score.map(|s| s as i64))
        .bind(&reasons)
        .bind(input.qa_executed as i64)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(AttemptRecord {
            id,
            pipeline_id: input.pipeline_id,
            step: input.step,
            attempt_index: input.attempt_index,
            candidate_index: input.candidate_index,
            artifact_id: input.artifact_id,
            prompt: input.prompt,
            model: input.model,
            decision: input.decision,
            score: input.score,
            reasons: input.reasons,
            qa_executed: input.qa_executed,
            created_at: now,
        })
    }

    pub async fn list_for_step(
        &self,
        pipeline_id: Uuid,
        step: Step,
    ) -> Result<Vec<AttemptRecord>, DbError> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT * FROM attempts
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
            sqlx::query(r#"DELETE FROM attempts WHERE pipeline_id = ? AND step >= ?"#)
                .bind(pipeline_id.to_string())
                .bind(from.number() as i64)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::setup_test_db;
    use crate::repositories::PipelineRepository;
    use pipeline_core::{JudgeDecision, Pipeline, PipelineMode, QualityPolicy};

    async fn seeded_pipeline(pool: &SqlitePool) -> Pipeline {
        let p = Pipeline::new(
            "owner-1",
            PipelineMode::Linear,
            QualityPolicy::default(),
            Uuid::new_v4(),
        );
        PipelineRepository::new(pool.clone()).create(&p).await.unwrap();
        p
    }

    fn attempt(pipeline_id: Uuid, attempt_index: u32, candidate_index: u32) -> CreateAttempt {
        CreateAttempt {
            pipeline_id,
            step: Step::Structure,
            attempt_index,
            candidate_index,
            artifact_id: Uuid::new_v4(),
            prompt: "prompt".to_string(),
            model: "image-model-1".to_string(),
            decision: Some(JudgeDecision::Rejected),
            score: Some(40),
            reasons: vec![],
            qa_executed: true,
        }
    }

    #[tokio::test]
    async fn test_record_and_list_ordered() {
        let pool = setup_test_db().await;
        let p = seeded_pipeline(&pool).await;
        let repo = AttemptRepository::new(pool);

        repo.record(attempt(p.id, 1, 0)).await.unwrap();
        repo.record(attempt(p.id, 0, 1)).await.unwrap();
        repo.record(attempt(p.id, 0, 0)).await.unwrap();

        let listed = repo.list_for_step(p.id, Step::Structure).await.unwrap();
        let order: Vec<(u32, u32)> = listed
            .iter()
            .map(|a| (a.attempt_index, a.candidate_index))
            .collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0)]);
    }

    #[tokio::test]
    async fn test_delete_from_step_frees_the_slot() {
        let pool = setup_test_db().await;
        let p = seeded_pipeline(&pool).await;
        let repo = AttemptRepository::new(pool);

        repo.record(attempt(p.id, 0, 0)).await.unwrap();
        let mut style = attempt(p.id, 0, 0);
        style.step = Step::Style;
        repo.record(style).await.unwrap();

        let deleted = repo.delete_from_step(p.id, Step::Style).await.unwrap();
        assert_eq!(deleted, 1);
        // Earlier steps keep their history; the purged slot is reusable.
        assert_eq!(
            repo.list_for_step(p.id, Step::Structure).await.unwrap().len(),
            1
        );
        let mut again = attempt(p.id, 0, 0);
        again.step = Step::Style;
        assert!(repo.record(again).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_slot_rejected() {
        let pool = setup_test_db().await;
        let p = seeded_pipeline(&pool).await;
        let repo = AttemptRepository::new(pool);

        repo.record(attempt(p.id, 0, 0)).await.unwrap();
        assert!(repo.record(attempt(p.id, 0, 0)).await.is_err());
    }
}

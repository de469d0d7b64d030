use chrono::{DateTime, Utc};
use pipeline_core::{JudgeDecision, JudgeType, JudgeVerdict, Step};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::pipeline::{millis, parse_uuid};

#[derive(Debug, Clone)]
pub struct CreateJudgeResult {
    pub pipeline_id: Uuid,
    pub step: Step,
    pub attempt_index: u32,
    pub candidate_index: u32,
    pub judge_type: JudgeType,
    pub verdict: JudgeVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeResultRecord {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub step: Step,
    pub attempt_index: u32,
    pub candidate_index: u32,
    pub judge_type: String,
    pub verdict: JudgeVerdict,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JudgeResultRow {
    pub id: String,
    pub pipeline_id: String,
    pub step: i64,
    pub attempt_index: i64,
    pub candidate_index: i64,
    pub judge_type: String,
    pub decision: String,
    pub score: i64,
    pub reasons: String,
    pub qa_executed: i64,
    pub created_at: i64,
}

impl JudgeResultRow {
    pub fn into_domain(self) -> Result<JudgeResultRecord, DbError> {
        let step = u8::try_from(self.step)
            .ok()
            .and_then(Step::from_number)
            .ok_or_else(|| DbError::decode("step", format!("out of range: {}", self.step)))?;
        let decision = JudgeDecision::parse(&self.decision)
            .ok_or_else(|| DbError::decode("decision", self.decision.clone()))?;
        Ok(JudgeResultRecord {
            id: parse_uuid("id", &self.id)?,
            pipeline_id: parse_uuid("pipeline_id", &self.pipeline_id)?,
            step,
            attempt_index: self.attempt_index as u32,
            candidate_index: self.candidate_index as u32,
            judge_type: self.judge_type,
            verdict: JudgeVerdict {
                decision,
                score: self.score.clamp(0, 100) as u8,
                reasons: serde_json::from_str(&self.reasons)?,
                qa_executed: self.qa_executed != 0,
            },
            created_at: millis("created_at", self.created_at)?,
        })
    }
}

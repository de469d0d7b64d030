use chrono::{DateTime, Utc};
use pipeline_core::{JudgeDecision, JudgeReason, Step};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::pipeline::{millis, parse_uuid};

/// Input for one immutable attempt row. One row per generated candidate;
/// the judge columns are filled in the same insert once the verdict is known.
#[derive(Debug, Clone)]
pub struct CreateAttempt {
    pub pipeline_id: Uuid,
    pub step: Step,
    pub attempt_index: u32,
    pub candidate_index: u32,
    pub artifact_id: Uuid,
    pub prompt: String,
    pub model: String,
    pub decision: Option<JudgeDecision>,
    pub score: Option<u8>,
    pub reasons: Vec<JudgeReason>,
    pub qa_executed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub step: Step,
    pub attempt_index: u32,
    pub candidate_index: u32,
    pub artifact_id: Uuid,
    pub prompt: String,
    pub model: String,
    pub decision: Option<JudgeDecision>,
    pub score: Option<u8>,
    pub reasons: Vec<JudgeReason>,
    pub qa_executed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttemptRow {
    pub id: String,
    pub pipeline_id: String,
    pub step: i64,
    pub attempt_index: i64,
    pub candidate_index: i64,
    pub artifact_id: String,
    pub prompt: String,
    pub model: String,
    pub decision: Option<String>,
    pub score: Option<i64>,
    pub reasons: String,
    pub qa_executed: i64,
    pub created_at: i64,
}

impl AttemptRow {
    pub fn into_domain(self) -> Result<AttemptRecord, DbError> {
        let step = u8::try_from(self.step)
            .ok()
            .and_then(Step::from_number)
            .ok_or_else(|| DbError::decode("step", format!("out of range: {}", self.step)))?;
        let decision = self
            .decision
            .as_deref()
            .map(|d| {
                JudgeDecision::parse(d).ok_or_else(|| DbError::decode("decision", d.to_string()))
            })
            .transpose()?;
        Ok(AttemptRecord {
            id: parse_uuid("id", &self.id)?,
            pipeline_id: parse_uuid("pipeline_id", &self.pipeline_id)?,
            step,
            attempt_index: self.attempt_index as u32,
            candidate_index: self.candidate_index as u32,
            artifact_id: parse_uuid("artifact_id", &self.artifact_id)?,
            prompt: self.prompt,
            model: self.model,
            decision,
            score: self.score.map(|s| s.clamp(0, 100) as u8),
            reasons: serde_json::from_str(&self.reasons)?,
            qa_executed: self.qa_executed != 0,
            created_at: millis("created_at", self.created_at)?,
        })
    }
}

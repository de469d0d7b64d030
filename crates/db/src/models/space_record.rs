use chrono::{DateTime, Utc};
use pipeline_core::{JudgeDecision, Step};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::pipeline::{millis, parse_uuid};

/// Per-space output of a batch step in multi-space mode.
#[derive(Debug, Clone)]
pub struct CreateSpaceRecord {
    pub pipeline_id: Uuid,
    pub step: Step,
    pub space_name: String,
    pub artifact_id: Uuid,
    pub decision: JudgeDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceRecord {
    pub id: i64,
    pub pipeline_id: Uuid,
    pub step: Step,
    pub space_name: String,
    pub artifact_id: Uuid,
    pub decision: JudgeDecision,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SpaceRecordRow {
    pub id: i64,
    pub pipeline_id: String,
    pub step: i64,
    pub space_name: String,
    pub artifact_id: String,
    pub decision: String,
    pub created_at: i64,
}

impl SpaceRecordRow {
    pub fn into_domain(self) -> Result<SpaceRecord, DbError> {
        let step = u8::try_from(self.step)
            .ok()
            .and_then(Step::from_number)
            .ok_or_else(|| DbError::decode("step", format!("out of range: {}", self.step)))?;
        let decision = JudgeDecision::parse(&self.decision)
            .ok_or_else(|| DbError::decode("decision", self.decision.clone()))?;
        Ok(SpaceRecord {
            id: self.id,
            pipeline_id: parse_uuid("pipeline_id", &self.pipeline_id)?,
            step,
            space_name: self.space_name,
            artifact_id: parse_uuid("artifact_id", &self.artifact_id)?,
            decision,
            created_at: millis("created_at", self.created_at)?,
        })
    }
}

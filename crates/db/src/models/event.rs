use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::pipeline::{millis, parse_uuid};

/// Append-only audit log entry input.
#[derive(Debug, Clone)]
pub struct CreatePipelineEvent {
    pub pipeline_id: Uuid,
    pub step: Option<u8>,
    pub event_type: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    pub pipeline_id: Uuid,
    pub step: Option<u8>,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PipelineEventRow {
    pub id: i64,
    pub pipeline_id: String,
    pub step: Option<i64>,
    pub event_type: String,
    pub payload: String,
    pub created_at: i64,
}

impl PipelineEventRow {
    pub fn into_domain(self) -> Result<StoredEvent, DbError> {
        Ok(StoredEvent {
            id: self.id,
            pipeline_id: parse_uuid("pipeline_id", &self.pipeline_id)?,
            step: self.step.map(|s| s as u8),
            event_type: self.event_type,
            payload: serde_json::from_str(&self.payload)?,
            created_at: millis("created_at", self.created_at)?,
        })
    }
}

use chrono::{DateTime, Utc};
use pipeline_core::Step;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::pipeline::{millis, parse_uuid};

/// Registry entry for one stored binary object. The bytes themselves live in
/// object storage at `storage_path`.
#[derive(Debug, Clone)]
pub struct CreateArtifact {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub step: Step,
    pub storage_path: String,
    pub mime_type: String,
    pub is_source: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub step: Step,
    pub storage_path: String,
    pub mime_type: String,
    pub is_source: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArtifactRow {
    pub id: String,
    pub pipeline_id: String,
    pub step: i64,
    pub storage_path: String,
    pub mime_type: String,
    pub is_source: i64,
    pub created_at: i64,
}

impl ArtifactRow {
    pub fn into_domain(self) -> Result<ArtifactRecord, DbError> {
        let step = u8::try_from(self.step)
            .ok()
            .and_then(Step::from_number)
            .ok_or_else(|| DbError::decode("step", format!("out of range: {}", self.step)))?;
        Ok(ArtifactRecord {
            id: parse_uuid("id", &self.id)?,
            pipeline_id: parse_uuid("pipeline_id", &self.pipeline_id)?,
            step,
            storage_path: self.storage_path,
            mime_type: self.mime_type,
            is_source: self.is_source != 0,
            created_at: millis("created_at", self.created_at)?,
        })
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pipeline_core::{
    AspectRatio, Phase, Pipeline, PipelineMode, QualityPolicy, ResolutionTier, RetryState,
    SpaceInfo, Step, StepOutputSlot,
};
use uuid::Uuid;

use crate::error::DbError;

/// Raw pipeline row. Structured columns (spaces, step outputs, retry state)
/// are JSON text; everything else is flat so the guard triggers and indexes
/// can see it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PipelineRow {
    pub id: String,
    pub owner: String,
    pub current_step: i64,
    pub phase: String,
    pub mode: String,
    pub resolution: String,
    pub aspect_ratio: String,
    pub source_artifact_id: String,
    pub spaces: String,
    pub last_error: Option<String>,
    pub step_outputs: String,
    pub step_retry_state: String,
    pub total_retry_count: i64,
    pub version: i64,
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PipelineRow {
    pub fn into_domain(self) -> Result<Pipeline, DbError> {
        let id = parse_uuid("id", &self.id)?;
        let phase = Phase::parse(&self.phase)
            .ok_or_else(|| DbError::decode("phase", format!("unknown token: {}", self.phase)))?;
        let current_step = u8::try_from(self.current_step)
            .ok()
            .and_then(Step::from_number)
            .ok_or_else(|| {
                DbError::decode("current_step", format!("out of range: {}", self.current_step))
            })?;
        let mode = PipelineMode::parse(&self.mode)
            .ok_or_else(|| DbError::decode("mode", self.mode.clone()))?;
        let resolution = ResolutionTier::parse(&self.resolution)
            .ok_or_else(|| DbError::decode("resolution", self.resolution.clone()))?;
        let aspect_ratio = AspectRatio::parse(&self.aspect_ratio)
            .ok_or_else(|| DbError::decode("aspect_ratio", self.aspect_ratio.clone()))?;

        let spaces: Vec<SpaceInfo> = serde_json::from_str(&self.spaces)?;
        let step_outputs: BTreeMap<u8, StepOutputSlot> = serde_json::from_str(&self.step_outputs)?;
        let step_retry_state: BTreeMap<u8, RetryState> =
            serde_json::from_str(&self.step_retry_state)?;

        Ok(Pipeline {
            id,
            owner: self.owner,
            current_step,
            phase,
            mode,
            quality: QualityPolicy {
                resolution,
                aspect_ratio,
            },
            source_artifact_id: parse_uuid("source_artifact_id", &self.source_artifact_id)?,
            spaces,
            last_error: self.last_error,
            step_outputs,
            step_retry_state,
            total_retry_count: self.total_retry_count as u32,
            version: self.version,
            completed_at: self.completed_at.map(|ms| millis("completed_at", ms)).transpose()?,
            created_at: millis("created_at", self.created_at)?,
            updated_at: millis("updated_at", self.updated_at)?,
        })
    }
}

pub(crate) fn parse_uuid(column: &'static str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::decode(column, e.to_string()))
}

pub(crate) fn millis(column: &'static str, ms: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::decode(column, format!("timestamp out of range: {ms}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> PipelineRow {
        PipelineRow {
            id: Uuid::new_v4().to_string(),
            owner: "owner-1".to_string(),
            current_step: 2,
            phase: "style_review".to_string(),
            mode: "linear".to_string(),
            resolution: "standard".to_string(),
            aspect_ratio: "landscape".to_string(),
            source_artifact_id: Uuid::new_v4().to_string(),
            spaces: "[]".to_string(),
            last_error: None,
            step_outputs: "{}".to_string(),
            step_retry_state: "{}".to_string(),
            total_retry_count: 0,
            version: 3,
            completed_at: None,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_into_domain() {
        let p = row().into_domain().unwrap();
        assert_eq!(p.current_step, Step::Style);
        assert_eq!(p.phase.as_token(), "style_review");
        assert_eq!(p.version, 3);
    }

    #[test]
    fn test_rejects_unknown_phase_token() {
        let mut r = row();
        r.phase = "style_done".to_string();
        assert!(matches!(
            r.into_domain(),
            Err(DbError::Decode { column: "phase", .. })
        ));
    }
}

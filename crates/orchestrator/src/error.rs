use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(Uuid),

    #[error("Pipeline {0} belongs to another owner")]
    NotOwner(Uuid),

    #[error("Pipeline is in phase {actual}, expected {expected}")]
    PhaseMismatch { expected: String, actual: String },

    #[error("Step {0} cannot be invoked here")]
    InvalidStep(u8),

    #[error("Step {0} requires manual approval of the structural output first")]
    ApprovalRequired(u8),

    #[error("No usable input image below step {0}")]
    InputImageMissing(u8),

    #[error("Stale retry: observed reset counter {observed}, current {current}")]
    StaleRetry { observed: u32, current: u32 },

    #[error("Concurrent write lost on pipeline {0}")]
    WriteConflict(Uuid),

    #[error(transparent)]
    Gateway(#[from] gateway::GatewayError),

    #[error("Database error: {0}")]
    Database(db::DbError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<db::DbError> for OrchestratorError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::PipelineNotFound(id) => Self::PipelineNotFound(id),
            db::DbError::VersionConflict { id, .. } => Self::WriteConflict(id),
            other => Self::Database(other),
        }
    }
}

impl OrchestratorError {
    /// Stable machine-readable code, surfaced in API responses, `last_error`
    /// and the audit log.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PipelineNotFound(_) => "PIPELINE_NOT_FOUND",
            Self::NotOwner(_) => "NOT_OWNER",
            Self::PhaseMismatch { .. } => "PHASE_MISMATCH",
            Self::InvalidStep(_) => "INVALID_STEP",
            Self::ApprovalRequired(_) => "APPROVAL_REQUIRED",
            Self::InputImageMissing(_) => "INPUT_IMAGE_MISSING",
            Self::StaleRetry { .. } => "STALE_RETRY",
            Self::WriteConflict(_) => "WRITE_CONFLICT",
            Self::Gateway(e) => e.code(),
            Self::Database(db::DbError::PhaseGuard(_)) => "PHASE_MISMATCH",
            Self::Database(_) | Self::Serialization(_) => "PERSISTENCE_WRITE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            OrchestratorError::PhaseMismatch {
                expected: "style_pending".to_string(),
                actual: "style_running".to_string(),
            }
            .code(),
            "PHASE_MISMATCH"
        );
        assert_eq!(
            OrchestratorError::ApprovalRequired(2).code(),
            "APPROVAL_REQUIRED"
        );
        assert_eq!(
            OrchestratorError::StaleRetry {
                observed: 3,
                current: 4,
            }
            .code(),
            "STALE_RETRY"
        );
        assert_eq!(
            OrchestratorError::Gateway(gateway::GatewayError::MissingCredentials).code(),
            "AUTH_INVALID"
        );
    }

    #[test]
    fn test_db_errors_map_to_domain_errors() {
        let id = Uuid::new_v4();
        let e: OrchestratorError = db::DbError::PipelineNotFound(id).into();
        assert_eq!(e.code(), "PIPELINE_NOT_FOUND");

        let e: OrchestratorError = db::DbError::VersionConflict { id, expected: 2 }.into();
        assert_eq!(e.code(), "WRITE_CONFLICT");
    }
}

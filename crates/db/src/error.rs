use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(Uuid),

    #[error("Version conflict on pipeline {id}: expected version {expected}")]
    VersionConflict { id: Uuid, expected: i64 },

    #[error("Phase invariant violation: {0}")]
    PhaseGuard(#[from] pipeline_core::CoreError),

    #[error("Corrupt column {column}: {message}")]
    Decode {
        column: &'static str,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub(crate) fn decode(column: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            column,
            message: message.into(),
        }
    }
}

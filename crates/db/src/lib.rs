mod error;
pub mod models;
mod pool;
pub mod repositories;

pub use error::DbError;
pub use models::{
    ArtifactRecord, AttemptRecord, CreateArtifact, CreateAttempt, CreateJudgeResult,
    CreatePipelineEvent, CreateSpaceRecord, JudgeResultRecord, SpaceRecord, StoredEvent,
};
pub use pool::{create_pool, run_migrations};
pub use repositories::{
    ArtifactRepository, AttemptRepository, EventLogRepository, JudgeResultRepository,
    PipelineRepository, SpaceRecordRepository,
};

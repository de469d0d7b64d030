mod artifact_repository;
mod attempt_repository;
mod event_log_repository;
mod judge_result_repository;
mod pipeline_repository;
mod space_record_repository;

pub use artifact_repository::ArtifactRepository;
pub use attempt_repository::AttemptRepository;
pub use event_log_repository::EventLogRepository;
pub use judge_result_repository::JudgeResultRepository;
pub use pipeline_repository::PipelineRepository;
pub use space_record_repository::SpaceRecordRepository;

#[cfg(test)]
pub(crate) async fn setup_test_db() -> sqlx::SqlitePool {
    let pool = crate::pool::create_pool("sqlite::memory:").await.unwrap();
    crate::pool::run_migrations(&pool).await.unwrap();
    pool
}

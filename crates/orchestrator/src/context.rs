use std::sync::Arc;

use db::{
    ArtifactRepository, AttemptRepository, CreateArtifact, CreatePipelineEvent,
    EventLogRepository, JudgeResultRepository, PipelineRepository, SpaceRecordRepository,
};
use events::{Event, EventBus, EventEnvelope};
use gateway::{GeneratedImage, ImageGenerator, ImageRef, ObjectStore, QualityJudge};
use pipeline_core::{Pipeline, Step, DEFAULT_MAX_ATTEMPTS, GLOBAL_RETRY_BUDGET};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

/// Tunables for step execution. Defaults mirror production behavior; tests
/// dial them down.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Per-step auto-retry ceiling for the quality-gated steps.
    pub max_attempts: u32,
    /// Shared auto-retry budget across the whole pipeline run.
    pub global_retry_budget: u32,
    /// Bounded synchronous self-correction loop of the panorama step.
    pub panorama_max_attempts: u32,
    /// Candidates rendered per invocation when the caller does not ask for
    /// a specific count. Clamped to 1..=4 either way.
    pub default_candidates: u32,
    /// Master switch for the asynchronous retry path. When off, a fully
    /// rejected step goes straight to `blocked_for_human`.
    pub auto_retry_enabled: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            global_retry_budget: GLOBAL_RETRY_BUDGET,
            panorama_max_attempts: 4,
            default_candidates: 4,
            auto_retry_enabled: true,
        }
    }
}

impl ExecutorConfig {
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_global_retry_budget(mut self, budget: u32) -> Self {
        self.global_retry_budget = budget;
        self
    }

    pub fn with_panorama_max_attempts(mut self, max: u32) -> Self {
        self.panorama_max_attempts = max;
        self
    }

    pub fn with_default_candidates(mut self, count: u32) -> Self {
        self.default_candidates = count;
        self
    }

    pub fn with_auto_retry_enabled(mut self, enabled: bool) -> Self {
        self.auto_retry_enabled = enabled;
        self
    }
}

/// Shared collaborators of every pipeline operation.
pub struct ExecutorContext {
    pub pipelines: PipelineRepository,
    pub attempts: AttemptRepository,
    pub judge_results: JudgeResultRepository,
    pub event_log: EventLogRepository,
    pub artifacts: ArtifactRepository,
    pub space_records: SpaceRecordRepository,
    pub generator: Arc<dyn ImageGenerator>,
    pub judge: Arc<dyn QualityJudge>,
    pub store: Arc<dyn ObjectStore>,
    pub event_bus: EventBus,
    pub config: ExecutorConfig,
}

impl ExecutorContext {
    pub fn new(
        pool: SqlitePool,
        generator: Arc<dyn ImageGenerator>,
        judge: Arc<dyn QualityJudge>,
        store: Arc<dyn ObjectStore>,
        event_bus: EventBus,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            pipelines: PipelineRepository::new(pool.clone()),
            attempts: AttemptRepository::new(pool.clone()),
            judge_results: JudgeResultRepository::new(pool.clone()),
            event_log: EventLogRepository::new(pool.clone()),
            artifacts: ArtifactRepository::new(pool.clone()),
            space_records: SpaceRecordRepository::new(pool),
            generator,
            judge,
            store,
            event_bus,
            config,
        }
    }

    /// Loads a pipeline and enforces ownership.
    pub async fn load_owned(&self, id: Uuid, owner: &str) -> Result<Pipeline> {
        let pipeline = self.pipelines.get(id).await?;
        if pipeline.owner != owner {
            return Err(OrchestratorError::NotOwner(id));
        }
        Ok(pipeline)
    }

    /// Publishes to live subscribers and appends to the durable audit log.
    /// A failed log write is reported but never fails the operation that
    /// emitted the event.
    pub async fn emit(&self, event: Event) {
        if let Some(pipeline_id) = event.pipeline_id() {
            let entry = CreatePipelineEvent {
                pipeline_id,
                step: event.step(),
                event_type: event.kind().to_string(),
                payload: serde_json::to_value(&event).unwrap_or_default(),
            };
            if let Err(e) = self.event_log.append(entry).await {
                warn!(error = %e, kind = event.kind(), "Failed to persist audit event");
            }
        }
        self.event_bus.publish(EventEnvelope::new(event));
    }

    /// Stores the bytes of one generated candidate and registers it.
    /// Returns the new artifact id.
    pub async fn store_candidate(
        &self,
        pipeline_id: Uuid,
        step: Step,
        image: &GeneratedImage,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let path = artifact_path(pipeline_id, step, id, &image.mime_type);
        self.store.write(&path, &image.bytes, &image.mime_type).await?;
        self.artifacts
            .register(CreateArtifact {
                id,
                pipeline_id,
                step,
                storage_path: path,
                mime_type: image.mime_type.clone(),
                is_source: false,
            })
            .await?;
        Ok(id)
    }

    /// Reads a registered artifact back as a wire image.
    pub async fn load_image(&self, artifact_id: Uuid) -> Result<ImageRef> {
        let record = self
            .artifacts
            .get(artifact_id)
            .await?
            .ok_or_else(|| OrchestratorError::InputImageMissing(0))?;
        let bytes = self.store.read(&record.storage_path).await?;
        Ok(ImageRef::from_bytes(&bytes, record.mime_type))
    }
}

pub(crate) fn artifact_path(pipeline_id: Uuid, step: Step, id: Uuid, mime_type: &str) -> String {
    let ext = match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    };
    format!("pipelines/{pipeline_id}/step_{}/{id}.{ext}", step.number())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_layout() {
        let pipeline_id = Uuid::nil();
        let id = Uuid::nil();
        let path = artifact_path(pipeline_id, Step::Style, id, "image/png");
        assert_eq!(
            path,
            format!("pipelines/{pipeline_id}/step_2/{id}.png")
        );
        assert!(artifact_path(pipeline_id, Step::Merge, id, "image/jpeg").ends_with(".jpg"));
    }

    #[test]
    fn test_config_builder() {
        let config = ExecutorConfig::default()
            .with_max_attempts(2)
            .with_global_retry_budget(6)
            .with_panorama_max_attempts(1)
            .with_default_candidates(3)
            .with_auto_retry_enabled(false);
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.global_retry_budget, 6);
        assert_eq!(config.panorama_max_attempts, 1);
        assert_eq!(config.default_candidates, 3);
        assert!(!config.auto_retry_enabled);
    }
}

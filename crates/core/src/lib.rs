pub mod domain;
pub mod error;

pub use domain::phase::{Phase, PhaseGuard, Stage};
pub use domain::pipeline::{
    CreatePipelineRequest, OutputSummary, Pipeline, PipelineMode, StepOutputSlot,
    DEFAULT_MAX_ATTEMPTS, GLOBAL_RETRY_BUDGET,
};
pub use domain::quality::{AspectRatio, QualityPolicy, ResolutionTier, SpaceInfo};
pub use domain::retry::{AttemptSummary, RetryDelta, RetryState, RetryStatus, StepAttemptVerdict};
pub use domain::step::{JudgeType, Step};
pub use domain::verdict::{
    JudgeDecision, JudgeReason, JudgeVerdict, RejectionCategory, StepVerdict,
};
pub use error::CoreError;

mod artifact;
mod attempt;
mod event;
mod judge_result;
mod pipeline;
mod space_record;

pub use artifact::{ArtifactRecord, ArtifactRow, CreateArtifact};
pub use attempt::{AttemptRecord, AttemptRow, CreateAttempt};
pub use event::{CreatePipelineEvent, PipelineEventRow, StoredEvent};
pub use judge_result::{CreateJudgeResult, JudgeResultRecord, JudgeResultRow};
pub use pipeline::PipelineRow;
pub use space_record::{CreateSpaceRecord, SpaceRecord, SpaceRecordRow};

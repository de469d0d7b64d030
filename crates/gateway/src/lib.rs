//! Gateways to the external generative-image service, the visual QA judge,
//! and binary object storage.
//!
//! These are thin, fail-closed wrappers: they own timeouts, bounded backoff
//! and response parsing, and expose trait seams so the orchestrator can be
//! exercised against fakes.

mod error;
mod generation;
mod judge;
mod storage;
mod types;

pub use error::{GatewayError, GatewayResult};
pub use generation::{GenerationClient, ImageGenerator};
pub use judge::{JudgeClient, QualityJudge, JUDGE_TIMEOUT};
pub use storage::{FsObjectStore, ObjectStore};
pub use types::{GeneratedImage, GenerationRequest, ImageRef};

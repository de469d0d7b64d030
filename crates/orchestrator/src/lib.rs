pub mod context;
pub mod error;
pub mod executor;
pub mod lifecycle;
mod panorama;
pub mod pose;
pub mod prompts;
pub mod queue;
pub mod retry;
pub mod rollback;

pub use context::{ExecutorConfig, ExecutorContext};
pub use error::{OrchestratorError, Result};
pub use executor::{run_step, RunOptions, StepRunOutcome};
pub use lifecycle::{
    approve_structure, create_pipeline, reset_blocked, run_analysis, select_output,
};
pub use queue::RetryQueue;
pub use retry::{RetryController, RetryDecision, RetryTicket};
pub use rollback::{rollback_one_step, RollbackReport};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown phase token: {0}")]
    UnknownPhase(String),

    #[error("Phase {phase} does not belong to step {step}")]
    PhaseStepMismatch { phase: String, step: u8 },

    #[error("Invalid step number: {0}")]
    InvalidStep(u8),

    #[error("Validation error: {0}")]
    Validation(String),
}

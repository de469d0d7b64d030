//! Event types for the pipeline event system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All possible events in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A pipeline was created with a registered source image
    #[serde(rename = "pipeline.created")]
    PipelineCreated { pipeline_id: Uuid, owner: String },

    /// Step-0 space analysis completed
    #[serde(rename = "pipeline.analyzed")]
    AnalysisCompleted { pipeline_id: Uuid, space_count: usize },

    /// A step invocation took the single-flight lock and started generating
    #[serde(rename = "step.started")]
    StepStarted {
        pipeline_id: Uuid,
        step: u8,
        attempt: u32,
    },

    /// A step invocation finished with an aggregated verdict
    #[serde(rename = "step.completed")]
    StepCompleted {
        pipeline_id: Uuid,
        step: u8,
        verdict: String,
        approved: usize,
        rejected: usize,
    },

    /// One candidate was judged
    #[serde(rename = "candidate.judged")]
    CandidateJudged {
        pipeline_id: Uuid,
        step: u8,
        candidate_index: u32,
        decision: String,
        score: u8,
        qa_executed: bool,
    },

    /// The retry controller scheduled an asynchronous auto-retry
    #[serde(rename = "retry.scheduled")]
    AutoRetryScheduled {
        pipeline_id: Uuid,
        step: u8,
        attempt: u32,
        max_attempts: u32,
    },

    /// A queued retry was discarded because the reset counter moved
    #[serde(rename = "retry.discarded")]
    RetryDiscarded {
        pipeline_id: Uuid,
        step: u8,
        observed_counter: u32,
        current_counter: u32,
    },

    /// A step exhausted its retry budget and needs a human
    #[serde(rename = "step.blocked")]
    BlockedForHuman {
        pipeline_id: Uuid,
        step: u8,
        attempts: u32,
    },

    /// A reviewed candidate was selected and the pipeline advanced
    #[serde(rename = "output.selected")]
    OutputSelected {
        pipeline_id: Uuid,
        step: u8,
        candidate_index: u32,
    },

    /// The pipeline was rewound by one step
    #[serde(rename = "pipeline.rolled_back")]
    RolledBack {
        pipeline_id: Uuid,
        from_step: u8,
        to_step: u8,
        deleted_artifacts: usize,
        reset_counter: u32,
    },

    /// Generic error event
    #[serde(rename = "error")]
    Error {
        pipeline_id: Option<Uuid>,
        code: String,
        message: String,
    },
}

impl Event {
    /// Get the pipeline ID associated with this event, if any
    pub fn pipeline_id(&self) -> Option<Uuid> {
        match self {
            Event::PipelineCreated { pipeline_id, .. }
            | Event::AnalysisCompleted { pipeline_id, .. }
            | Event::StepStarted { pipeline_id, .. }
            | Event::StepCompleted { pipeline_id, .. }
            | Event::CandidateJudged { pipeline_id, .. }
            | Event::AutoRetryScheduled { pipeline_id, .. }
            | Event::RetryDiscarded { pipeline_id, .. }
            | Event::BlockedForHuman { pipeline_id, .. }
            | Event::OutputSelected { pipeline_id, .. }
            | Event::RolledBack { pipeline_id, .. } => Some(*pipeline_id),
            Event::Error { pipeline_id, .. } => *pipeline_id,
        }
    }

    /// Stable type tag, used as the persisted event-log discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            Event::PipelineCreated { .. } => "pipeline.created",
            Event::AnalysisCompleted { .. } => "pipeline.analyzed",
            Event::StepStarted { .. } => "step.started",
            Event::StepCompleted { .. } => "step.completed",
            Event::CandidateJudged { .. } => "candidate.judged",
            Event::AutoRetryScheduled { .. } => "retry.scheduled",
            Event::RetryDiscarded { .. } => "retry.discarded",
            Event::BlockedForHuman { .. } => "step.blocked",
            Event::OutputSelected { .. } => "output.selected",
            Event::RolledBack { .. } => "pipeline.rolled_back",
            Event::Error { .. } => "error",
        }
    }

    /// The step this event concerns, if step-scoped. Used by rollback to
    /// purge the audit log at or beyond the rewound step.
    pub fn step(&self) -> Option<u8> {
        match self {
            Event::StepStarted { step, .. }
            | Event::StepCompleted { step, .. }
            | Event::CandidateJudged { step, .. }
            | Event::AutoRetryScheduled { step, .. }
            | Event::RetryDiscarded { step, .. }
            | Event::BlockedForHuman { step, .. }
            | Event::OutputSelected { step, .. } => Some(*step),
            _ => None,
        }
    }
}

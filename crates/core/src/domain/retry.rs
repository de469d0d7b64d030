use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::verdict::{JudgeVerdict, RejectionCategory};

/// Retry position of a single step within the aggregate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStatus {
    #[default]
    Pending,
    QaFail,
    QaPass,
    BlockedForHuman,
}

impl RetryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::QaFail => "qa_fail",
            Self::QaPass => "qa_pass",
            Self::BlockedForHuman => "blocked_for_human",
        }
    }
}

/// Prompt and parameter adjustments derived from a rejection, applied to the
/// next attempt. Corrective clauses come from the structured rejection
/// categories, never from re-parsed prose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryDelta {
    pub categories: Vec<RejectionCategory>,
    pub corrective_clauses: Vec<String>,
    pub seed: u64,
    pub temperature: f32,
}

/// One entry of a step's ordered attempt history. The immutable audit rows
/// live in the attempt table; this summary is what the aggregate carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptSummary {
    pub attempt_index: u32,
    pub artifact_ids: Vec<Uuid>,
    pub verdict: StepAttemptVerdict,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepAttemptVerdict {
    Approved,
    Rejected,
    PartialSuccess,
}

/// Per-step retry bookkeeping. Preserved (status `qa_pass`) rather than
/// deleted once a step finally passes, so the attempt history stays
/// auditable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryState {
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub status: RetryStatus,
    pub last_judge_result: Option<JudgeVerdict>,
    pub attempts: Vec<AttemptSummary>,
    pub last_delta: Option<RetryDelta>,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            max_attempts,
            status: RetryStatus::Pending,
            last_judge_result: None,
            attempts: Vec::new(),
            last_delta: None,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// Appends to the ordered history. Attempt indices are strictly
    /// increasing; out-of-order appends are a programming error.
    pub fn record_attempt(&mut self, summary: AttemptSummary) {
        debug_assert!(self
            .attempts
            .last()
            .map(|a| a.attempt_index < summary.attempt_index)
            .unwrap_or(true));
        self.attempts.push(summary);
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(super::pipeline::DEFAULT_MAX_ATTEMPTS)
    }
}

//! Auto-retry policy for the quality-gated steps. A fully rejected run of
//! steps 1-3 is retried asynchronously with a corrective prompt, a fresh
//! seed and progressively lower temperature, until either the per-step
//! ceiling or the pipeline-wide budget runs out.

use pipeline_core::{Pipeline, RejectionCategory, RetryDelta, Step};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ExecutorConfig;
use crate::prompts;

const BASE_TEMPERATURE: f32 = 1.0;
const TEMPERATURE_STEP: f32 = 0.15;
const MIN_TEMPERATURE: f32 = 0.4;

/// What to do after a fully rejected attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Schedule another attempt with these adjustments.
    Schedule(RetryDelta),
    /// Retries are exhausted or not allowed here; a human must act.
    Block,
}

/// Work item handed to the retry queue. `observed_reset_counter` is the
/// fencing token: the consumer discards the ticket when the pipeline's
/// counter has moved past it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryTicket {
    pub pipeline_id: Uuid,
    pub owner: String,
    pub step: Step,
    pub observed_reset_counter: u32,
    pub delta: RetryDelta,
}

pub struct RetryController;

impl RetryController {
    /// Policy decision after a fully rejected run of `step`. The caller has
    /// already recorded the attempt, so `attempt_count` includes it.
    pub fn decide(
        pipeline: &Pipeline,
        step: Step,
        categories: Vec<RejectionCategory>,
        config: &ExecutorConfig,
    ) -> RetryDecision {
        if !config.auto_retry_enabled || !step.auto_retry_eligible() {
            return RetryDecision::Block;
        }

        let attempt_count = pipeline
            .step_retry_state
            .get(&step.number())
            .map(|s| s.attempt_count)
            .unwrap_or(0);

        if attempt_count >= config.max_attempts {
            return RetryDecision::Block;
        }
        if pipeline.total_retry_count >= config.global_retry_budget {
            return RetryDecision::Block;
        }

        RetryDecision::Schedule(Self::delta(categories, attempt_count))
    }

    /// Adjustments for the next attempt: one corrective clause per distinct
    /// rejection category, a fresh random seed and a lower temperature.
    pub fn delta(categories: Vec<RejectionCategory>, attempt_count: u32) -> RetryDelta {
        let corrective_clauses = categories
            .iter()
            .map(|c| prompts::corrective_clause(*c).to_string())
            .collect();
        RetryDelta {
            categories,
            corrective_clauses,
            seed: rand::random(),
            temperature: Self::temperature(attempt_count),
        }
    }

    /// Decreasing schedule: each retry renders more conservatively.
    pub fn temperature(attempt_count: u32) -> f32 {
        (BASE_TEMPERATURE - TEMPERATURE_STEP * attempt_count as f32).max(MIN_TEMPERATURE)
    }
}

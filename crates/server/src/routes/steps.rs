use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use orchestrator::{executor, RunOptions};
use pipeline_core::{OutputSummary, Pipeline, Step, StepVerdict};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::{require_owner, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct RunStepBody {
    /// Candidates to render, clamped server-side to 1..=4.
    #[serde(default)]
    pub candidates: Option<u32>,
}

#[derive(Serialize)]
pub struct StepRunResponse {
    pub pipeline: Pipeline,
    pub step: u8,
    pub verdict: StepVerdict,
    pub attempt: u32,
    pub outputs: Vec<OutputSummary>,
    /// True when the run was fully rejected and an auto-retry was queued.
    pub retry_scheduled: bool,
}

/// Steps are addressed by name (`style`) or number (`2`) in the path.
fn parse_step(raw: &str) -> Result<Step, AppError> {
    Step::parse(raw)
        .or_else(|| raw.parse::<u8>().ok().and_then(Step::from_number))
        .ok_or_else(|| AppError::BadRequest(format!("unknown step: {raw}")))
}

pub async fn run_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, raw_step)): Path<(Uuid, String)>,
    Json(body): Json<RunStepBody>,
) -> Result<Json<StepRunResponse>, AppError> {
    let owner = require_owner(&headers)?;
    let step = parse_step(&raw_step)?;

    let opts = RunOptions {
        candidates: body.candidates,
        delta: None,
        observed_reset_counter: None,
    };
    let outcome = executor::run_step(&state.ctx, id, &owner, step, opts).await?;

    let retry_scheduled = match outcome.scheduled_retry {
        Some(ticket) => {
            if !state.retry_queue.enqueue(ticket).await {
                warn!(pipeline_id = %id, "Retry queue worker is gone, ticket dropped");
                false
            } else {
                true
            }
        }
        None => false,
    };

    Ok(Json(StepRunResponse {
        step: outcome.step.number(),
        verdict: outcome.verdict,
        attempt: outcome.attempt,
        outputs: outcome.outputs,
        retry_scheduled,
        pipeline: outcome.pipeline,
    }))
}

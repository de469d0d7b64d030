//! Step execution: precondition checks, the single-flight running lock,
//! candidate generation and judging, verdict aggregation and the one
//! compare-and-swap write that publishes the result.

use db::{CreateAttempt, CreateJudgeResult, CreateSpaceRecord};
use events::Event;
use gateway::{GenerationRequest, ImageRef};
use pipeline_core::{
    AspectRatio, AttemptSummary, JudgeVerdict, OutputSummary, Phase, Pipeline, PipelineMode,
    RetryDelta, RetryStatus, Stage, Step, StepAttemptVerdict, StepOutputSlot, StepVerdict,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::ExecutorContext;
use crate::error::{OrchestratorError, Result};
use crate::panorama;
use crate::prompts;
use crate::retry::{RetryController, RetryDecision, RetryTicket};

/// Camera angles assigned to the candidates of the angle-variation step,
/// in candidate order.
const ANGLE_KEYWORDS: [&str; 4] = ["corner", "doorway", "window", "overhead"];

const MAX_CANDIDATES: u32 = 4;

/// Caller-supplied knobs for one invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Candidates to render, clamped to 1..=4. Ignored by steps with a
    /// fixed count.
    pub candidates: Option<u32>,
    /// Adjustments from the retry controller, present on retry invocations.
    pub delta: Option<RetryDelta>,
    /// Fencing token of a queued retry. The run is refused when the
    /// pipeline's reset counter no longer matches.
    pub observed_reset_counter: Option<u32>,
}

/// What one invocation produced.
#[derive(Debug)]
pub struct StepRunOutcome {
    pub pipeline: Pipeline,
    pub step: Step,
    pub verdict: StepVerdict,
    pub outputs: Vec<OutputSummary>,
    pub attempt: u32,
    /// Ticket for the retry queue when the run was fully rejected and the
    /// controller scheduled another attempt.
    pub scheduled_retry: Option<RetryTicket>,
}

/// Runs one step invocation end to end.
pub async fn run_step(
    ctx: &ExecutorContext,
    pipeline_id: Uuid,
    owner: &str,
    step: Step,
    opts: RunOptions,
) -> Result<StepRunOutcome> {
    let mut pipeline = ctx.load_owned(pipeline_id, owner).await?;

    if step == Step::Analysis {
        return Err(OrchestratorError::InvalidStep(0));
    }
    if let Some(observed) = opts.observed_reset_counter {
        if observed != pipeline.total_retry_count {
            return Err(OrchestratorError::StaleRetry {
                observed,
                current: pipeline.total_retry_count,
            });
        }
    }
    check_runnable(&pipeline, step)?;

    // The structural output needs a human sign-off before styling starts.
    if step == Step::Style {
        let approved = pipeline
            .step_output(Step::Structure)
            .and_then(|slot| slot.usable_output())
            .map(|o| o.manually_approved)
            .unwrap_or(false);
        if !approved {
            return Err(OrchestratorError::ApprovalRequired(step.number()));
        }
    }

    let input_artifact = if step == Step::Structure {
        pipeline.source_artifact_id
    } else {
        pipeline
            .resolve_input(step)
            .map(|(_, output)| output.artifact_id)
            .ok_or(OrchestratorError::InputImageMissing(step.number()))?
    };
    let input = ctx.load_image(input_artifact).await?;

    let attempt = pipeline
        .step_retry_state
        .get(&step.number())
        .map(|s| s.attempt_count)
        .unwrap_or(0);

    // Single flight: only the writer that wins this compare-and-swap runs
    // the step; a concurrent invocation loses with a write conflict.
    pipeline.set_phase(Phase::running(step));
    pipeline.version = ctx.pipelines.update(&pipeline).await?;

    ctx.emit(Event::StepStarted {
        pipeline_id,
        step: step.number(),
        attempt,
    })
    .await;

    match execute_body(ctx, &mut pipeline, step, &opts, &input, attempt).await {
        Ok(outcome) => Ok(outcome),
        Err(e) => {
            // Crash safety: release the lock and leave the step re-runnable
            // with the failure recorded.
            pipeline.set_phase(Phase::pending(step));
            pipeline.last_error = Some(e.code().to_string());
            if let Err(reset_err) = ctx.pipelines.update(&pipeline).await {
                warn!(
                    pipeline_id = %pipeline_id,
                    error = %reset_err,
                    "Failed to reset phase after step failure"
                );
            }
            ctx.emit(Event::Error {
                pipeline_id: Some(pipeline_id),
                code: e.code().to_string(),
                message: e.to_string(),
            })
            .await;
            Err(e)
        }
    }
}

fn check_runnable(pipeline: &Pipeline, step: Step) -> Result<()> {
    let expected = Phase::pending(step).as_token();
    let actual = pipeline.phase.as_token();
    if pipeline.is_complete()
        || pipeline.current_step != step
        || !matches!(pipeline.phase.stage, Stage::Pending | Stage::QaFailed)
    {
        return Err(OrchestratorError::PhaseMismatch { expected, actual });
    }
    Ok(())
}

async fn execute_body(
    ctx: &ExecutorContext,
    pipeline: &mut Pipeline,
    step: Step,
    opts: &RunOptions,
    input: &ImageRef,
    attempt: u32,
) -> Result<StepRunOutcome> {
    let (outputs, verdicts) = if step == Step::Panorama {
        let outcome = panorama::run_loop(ctx, pipeline, input, attempt).await?;
        let state = pipeline.retry_state_mut(step);
        state.attempt_count += outcome.attempts_used - 1;
        (vec![outcome.output], vec![outcome.verdict])
    } else {
        generate_and_judge(ctx, pipeline, step, opts, input, attempt).await?
    };

    let verdict = StepVerdict::from_verdicts(verdicts.iter());
    let rejected = verdicts.iter().filter(|v| !v.is_approved()).count();

    // Attempt bookkeeping on the aggregate.
    let artifact_ids: Vec<Uuid> = outputs.iter().map(|o| o.artifact_id).collect();
    let last_verdict = verdicts
        .iter()
        .find(|v| !v.is_approved())
        .or(verdicts.last())
        .cloned();
    let max_attempts = ctx.config.max_attempts;
    let state = pipeline.retry_state_mut(step);
    state.max_attempts = max_attempts;
    state.attempt_count += 1;
    state.record_attempt(AttemptSummary {
        attempt_index: attempt,
        artifact_ids,
        verdict: match verdict {
            StepVerdict::Approved => StepAttemptVerdict::Approved,
            StepVerdict::Rejected => StepAttemptVerdict::Rejected,
            StepVerdict::PartialSuccess => StepAttemptVerdict::PartialSuccess,
        },
        recorded_at: chrono::Utc::now(),
    });
    state.last_judge_result = last_verdict;

    let slot = if outputs.len() == 1 && !step.is_batch() {
        StepOutputSlot::Single(outputs[0].clone())
    } else {
        StepOutputSlot::Candidates(outputs.clone())
    };
    pipeline.step_outputs.insert(step.number(), slot);

    let mut scheduled_retry = None;
    if verdict.proceeds_to_review() {
        pipeline.retry_state_mut(step).status = RetryStatus::QaPass;
        pipeline.set_phase(Phase::review(step));
    } else {
        let categories: Vec<_> = verdicts
            .iter()
            .flat_map(|v| v.categories())
            .fold(Vec::new(), |mut acc, c| {
                if !acc.contains(&c) {
                    acc.push(c);
                }
                acc
            });
        match RetryController::decide(pipeline, step, categories, &ctx.config) {
            RetryDecision::Schedule(delta) => {
                pipeline.total_retry_count += 1;
                let state = pipeline.retry_state_mut(step);
                state.status = RetryStatus::QaFail;
                state.last_delta = Some(delta.clone());
                pipeline.set_phase(Phase::new(step, Stage::QaFailed));
                scheduled_retry = Some(RetryTicket {
                    pipeline_id: pipeline.id,
                    owner: pipeline.owner.clone(),
                    step,
                    observed_reset_counter: pipeline.total_retry_count,
                    delta,
                });
            }
            RetryDecision::Block => {
                pipeline.retry_state_mut(step).status = RetryStatus::BlockedForHuman;
                pipeline.set_phase(Phase::new(step, Stage::Blocked));
            }
        }
    }

    pipeline.last_error = None;
    pipeline.version = ctx.pipelines.update(pipeline).await?;

    // Persist per-space records for the batch steps.
    for output in outputs.iter().filter(|o| o.space.is_some()) {
        ctx.space_records
            .record(CreateSpaceRecord {
                pipeline_id: pipeline.id,
                step,
                space_name: output.space.clone().unwrap_or_default(),
                artifact_id: output.artifact_id,
                decision: output.decision,
            })
            .await?;
    }

    ctx.emit(Event::StepCompleted {
        pipeline_id: pipeline.id,
        step: step.number(),
        verdict: verdict.as_str().to_string(),
        approved: verdicts.len() - rejected,
        rejected,
    })
    .await;

    if let Some(ticket) = &scheduled_retry {
        ctx.emit(Event::AutoRetryScheduled {
            pipeline_id: pipeline.id,
            step: step.number(),
            attempt: pipeline
                .step_retry_state
                .get(&step.number())
                .map(|s| s.attempt_count)
                .unwrap_or(0),
            max_attempts: ctx.config.max_attempts,
        })
        .await;
        info!(
            pipeline_id = %pipeline.id,
            step = step.number(),
            counter = ticket.observed_reset_counter,
            "Scheduled auto-retry"
        );
    } else if pipeline.phase.stage == Stage::Blocked {
        ctx.emit(Event::BlockedForHuman {
            pipeline_id: pipeline.id,
            step: step.number(),
            attempts: pipeline
                .step_retry_state
                .get(&step.number())
                .map(|s| s.attempt_count)
                .unwrap_or(0),
        })
        .await;
    }

    Ok(StepRunOutcome {
        step,
        verdict,
        outputs,
        attempt,
        scheduled_retry,
        pipeline: pipeline.clone(),
    })
}

/// Renders and judges the candidates of one invocation for the
/// non-panorama steps.
async fn generate_and_judge(
    ctx: &ExecutorContext,
    pipeline: &Pipeline,
    step: Step,
    opts: &RunOptions,
    input: &ImageRef,
    attempt: u32,
) -> Result<(Vec<OutputSummary>, Vec<JudgeVerdict>)> {
    // Batch steps render one candidate per analyzed space; everything else
    // renders a clamped candidate count against the single input.
    let spaces: Vec<Option<String>> = if step.is_batch()
        && pipeline.mode == PipelineMode::MultiSpace
        && !pipeline.spaces.is_empty()
    {
        pipeline.spaces.iter().map(|s| Some(s.name.clone())).collect()
    } else if step.single_candidate() {
        vec![None]
    } else {
        let count = opts
            .candidates
            .unwrap_or(ctx.config.default_candidates)
            .clamp(1, MAX_CANDIDATES);
        vec![None; count as usize]
    };

    let judge_type = step
        .judge_type()
        .ok_or(OrchestratorError::InvalidStep(step.number()))?;
    let clauses = opts
        .delta
        .as_ref()
        .map(|d| d.corrective_clauses.as_slice())
        .unwrap_or(&[]);
    let aspect_ratio = if step.is_panorama() {
        AspectRatio::Wide
    } else {
        pipeline.quality.aspect_ratio
    };
    let pose = step
        .is_panorama()
        .then(|| crate::pose::derive_pose(pipeline.nearest_camera_angle(step)));

    let mut outputs = Vec::with_capacity(spaces.len());
    let mut verdicts = Vec::with_capacity(spaces.len());

    for (index, space) in spaces.iter().enumerate() {
        let candidate_index = index as u32;
        let mut prompt = prompts::compose(step, clauses, space.as_deref());
        let camera_angle = if step == Step::Angles {
            let keyword = ANGLE_KEYWORDS[index % ANGLE_KEYWORDS.len()];
            prompt.push_str(&format!(" Camera position: from the {keyword}."));
            Some(keyword.to_string())
        } else if let Some(pose) = pose {
            prompt.push_str(&format!(" Viewpoint: {}.", pose.description));
            Some(pose.keyword.to_string())
        } else {
            None
        };

        let request = GenerationRequest {
            prompt: prompt.clone(),
            reference_images: vec![input.clone()],
            size_tier: pipeline.quality.resolution,
            aspect_ratio,
            temperature: opts.delta.as_ref().map(|d| d.temperature).unwrap_or(1.0),
            seed: opts.delta.as_ref().map(|d| d.seed),
        };
        let image = ctx.generator.generate(&request).await?;
        let artifact_id = ctx.store_candidate(pipeline.id, step, &image).await?;

        let candidate = ImageRef::from_bytes(&image.bytes, image.mime_type.clone());
        let verdict = ctx.judge.judge(&candidate, judge_type, &prompt).await?;

        ctx.attempts
            .record(CreateAttempt {
                pipeline_id: pipeline.id,
                step,
                attempt_index: attempt,
                candidate_index,
                artifact_id,
                prompt: prompt.clone(),
                model: image.model.unwrap_or_default(),
                decision: Some(verdict.decision),
                score: Some(verdict.score),
                reasons: verdict.reasons.clone(),
                qa_executed: verdict.qa_executed,
            })
            .await?;
        ctx.judge_results
            .record(CreateJudgeResult {
                pipeline_id: pipeline.id,
                step,
                attempt_index: attempt,
                candidate_index,
                judge_type,
                verdict: verdict.clone(),
            })
            .await?;
        ctx.emit(Event::CandidateJudged {
            pipeline_id: pipeline.id,
            step: step.number(),
            candidate_index,
            decision: verdict.decision.as_str().to_string(),
            score: verdict.score,
            qa_executed: verdict.qa_executed,
        })
        .await;

        outputs.push(OutputSummary {
            artifact_id,
            decision: verdict.decision,
            reason: verdict.reasons.first().map(|r| r.description.clone()),
            prompt,
            manually_approved: false,
            selected: false,
            space: space.clone(),
            camera_angle,
        });
        verdicts.push(verdict);
    }

    Ok((outputs, verdicts))
}

//! Pipeline lifecycle operations outside the quality-gated step loop:
//! creation, the single-attempt space analysis, review actions and the
//! human unblock path.

use chrono::Utc;
use db::CreateArtifact;
use events::Event;
use gateway::ImageRef;
use pipeline_core::{
    CreatePipelineRequest, JudgeDecision, Phase, Pipeline, Stage, Step,
};
use tracing::info;
use uuid::Uuid;

use crate::context::{artifact_path, ExecutorContext};
use crate::error::{OrchestratorError, Result};

/// Registers the source image and creates the aggregate at
/// `analysis_pending`.
pub async fn create_pipeline(
    ctx: &ExecutorContext,
    request: CreatePipelineRequest,
) -> Result<Pipeline> {
    let source = ImageRef {
        data: request.source_image,
        mime_type: request.source_mime,
    };
    let bytes = source.decode()?;

    let source_artifact_id = Uuid::new_v4();
    let pipeline = Pipeline::new(
        request.owner,
        request.mode,
        request.quality,
        source_artifact_id,
    );

    ctx.pipelines.create(&pipeline).await?;

    let path = artifact_path(
        pipeline.id,
        Step::Analysis,
        source_artifact_id,
        &source.mime_type,
    );
    ctx.store.write(&path, &bytes, &source.mime_type).await?;
    ctx.artifacts
        .register(CreateArtifact {
            id: source_artifact_id,
            pipeline_id: pipeline.id,
            step: Step::Analysis,
            storage_path: path,
            mime_type: source.mime_type,
            is_source: true,
        })
        .await?;

    info!(pipeline_id = %pipeline.id, owner = %pipeline.owner, "Created pipeline");
    ctx.emit(Event::PipelineCreated {
        pipeline_id: pipeline.id,
        owner: pipeline.owner.clone(),
    })
    .await;

    Ok(pipeline)
}

/// Step 0: single-attempt structural analysis of the source image. Not
/// quality-gated; a failure leaves the step re-runnable with the error
/// recorded.
pub async fn run_analysis(ctx: &ExecutorContext, pipeline_id: Uuid, owner: &str) -> Result<Pipeline> {
    let mut pipeline = ctx.load_owned(pipeline_id, owner).await?;

    if pipeline.phase != Phase::pending(Step::Analysis) {
        return Err(OrchestratorError::PhaseMismatch {
            expected: Phase::pending(Step::Analysis).as_token(),
            actual: pipeline.phase.as_token(),
        });
    }

    pipeline.set_phase(Phase::running(Step::Analysis));
    pipeline.version = ctx.pipelines.update(&pipeline).await?;

    let source = ctx.load_image(pipeline.source_artifact_id).await;
    let spaces = match source {
        Ok(image) => ctx.judge.analyze_spaces(&image).await,
        Err(e) => {
            fail_analysis(ctx, &mut pipeline, &e).await;
            return Err(e);
        }
    };

    match spaces {
        Ok(spaces) => {
            let space_count = spaces.len();
            pipeline.spaces = spaces;
            pipeline.last_error = None;
            pipeline.set_phase(Phase::pending(Step::Structure));
            pipeline.version = ctx.pipelines.update(&pipeline).await?;

            info!(pipeline_id = %pipeline_id, space_count, "Analysis completed");
            ctx.emit(Event::AnalysisCompleted {
                pipeline_id,
                space_count,
            })
            .await;
            Ok(pipeline)
        }
        Err(e) => {
            let e = OrchestratorError::from(e);
            fail_analysis(ctx, &mut pipeline, &e).await;
            Err(e)
        }
    }
}

async fn fail_analysis(ctx: &ExecutorContext, pipeline: &mut Pipeline, e: &OrchestratorError) {
    pipeline.set_phase(Phase::pending(Step::Analysis));
    pipeline.last_error = Some(e.code().to_string());
    if let Err(reset_err) = ctx.pipelines.update(pipeline).await {
        tracing::warn!(
            pipeline_id = %pipeline.id,
            error = %reset_err,
            "Failed to reset analysis phase"
        );
    }
    ctx.emit(Event::Error {
        pipeline_id: Some(pipeline.id),
        code: e.code().to_string(),
        message: e.to_string(),
    })
    .await;
}

/// Human sign-off on the structural output. Marks it approved and selected
/// and advances to the style step; the executor refuses step 2 without it.
pub async fn approve_structure(
    ctx: &ExecutorContext,
    pipeline_id: Uuid,
    owner: &str,
) -> Result<Pipeline> {
    let mut pipeline = ctx.load_owned(pipeline_id, owner).await?;

    if pipeline.phase != Phase::review(Step::Structure) {
        return Err(OrchestratorError::PhaseMismatch {
            expected: Phase::review(Step::Structure).as_token(),
            actual: pipeline.phase.as_token(),
        });
    }

    let slot = pipeline
        .step_outputs
        .get_mut(&Step::Structure.number())
        .ok_or(OrchestratorError::InputImageMissing(Step::Structure.number()))?;
    let output = slot
        .summaries_mut()
        .iter_mut()
        .find(|o| o.decision == JudgeDecision::Approved)
        .ok_or(OrchestratorError::ApprovalRequired(Step::Style.number()))?;
    output.manually_approved = true;
    output.selected = true;

    pipeline.set_phase(Phase::pending(Step::Style));
    pipeline.version = ctx.pipelines.update(&pipeline).await?;

    info!(pipeline_id = %pipeline_id, "Structural output approved");
    ctx.emit(Event::OutputSelected {
        pipeline_id,
        step: Step::Structure.number(),
        candidate_index: 0,
    })
    .await;

    Ok(pipeline)
}

/// Picks one approved candidate of the step under review and advances the
/// pipeline. Selecting the merge output completes the run; the phase stays
/// at `merge_review` with `completed_at` set.
pub async fn select_output(
    ctx: &ExecutorContext,
    pipeline_id: Uuid,
    owner: &str,
    step: Step,
    candidate_index: u32,
) -> Result<Pipeline> {
    let mut pipeline = ctx.load_owned(pipeline_id, owner).await?;

    if pipeline.is_complete() || pipeline.phase != Phase::review(step) {
        return Err(OrchestratorError::PhaseMismatch {
            expected: Phase::review(step).as_token(),
            actual: pipeline.phase.as_token(),
        });
    }

    let slot = pipeline
        .step_outputs
        .get_mut(&step.number())
        .ok_or(OrchestratorError::InvalidStep(step.number()))?;
    let summaries = slot.summaries_mut();
    let index = candidate_index as usize;
    // Only approved candidates are selectable.
    if summaries
        .get(index)
        .map(|o| o.decision != JudgeDecision::Approved)
        .unwrap_or(true)
    {
        return Err(OrchestratorError::InvalidStep(step.number()));
    }
    for (i, output) in summaries.iter_mut().enumerate() {
        output.selected = i == index;
    }

    if step == Step::Merge {
        // Terminal: the phase vocabulary has no completed stage, so the
        // pipeline rests at merge_review with a completion timestamp.
        pipeline.completed_at = Some(Utc::now());
    } else if let Some(next) = step.next() {
        pipeline.set_phase(Phase::pending(next));
    }
    pipeline.version = ctx.pipelines.update(&pipeline).await?;

    ctx.emit(Event::OutputSelected {
        pipeline_id,
        step: step.number(),
        candidate_index,
    })
    .await;

    Ok(pipeline)
}

/// Human intervention on a blocked step: puts the step back to pending for
/// another run. The attempt count keeps climbing so recorded attempt
/// indices stay unique, and the pipeline-wide retry budget is deliberately
/// left as spent.
pub async fn reset_blocked(
    ctx: &ExecutorContext,
    pipeline_id: Uuid,
    owner: &str,
) -> Result<Pipeline> {
    let mut pipeline = ctx.load_owned(pipeline_id, owner).await?;

    if pipeline.phase.stage != Stage::Blocked {
        return Err(OrchestratorError::PhaseMismatch {
            expected: Phase::new(pipeline.current_step, Stage::Blocked).as_token(),
            actual: pipeline.phase.as_token(),
        });
    }

    let step = pipeline.current_step;
    let state = pipeline.retry_state_mut(step);
    // attempt_count stays: it doubles as the next attempt index, and the
    // recorded attempts of the blocked runs keep their slots.
    state.status = pipeline_core::RetryStatus::Pending;
    state.last_delta = None;

    pipeline.set_phase(Phase::pending(step));
    pipeline.version = ctx.pipelines.update(&pipeline).await?;

    info!(pipeline_id = %pipeline_id, step = step.number(), "Blocked step reset by operator");
    Ok(pipeline)
}

//! Bounded self-correction loop of the panorama step. Unlike the
//! asynchronous retry path of the earlier steps, this runs its attempts
//! synchronously inside one invocation, quoting the judge's feedback
//! verbatim into the next prompt, and does not touch the pipeline-wide
//! retry budget.

use db::{CreateAttempt, CreateJudgeResult};
use events::Event;
use gateway::{GenerationRequest, ImageRef};
use pipeline_core::{
    AspectRatio, JudgeType, JudgeVerdict, OutputSummary, Pipeline, Step,
};
use tracing::{info, warn};

use crate::context::ExecutorContext;
use crate::error::Result;
use crate::pose;
use crate::prompts;

pub(crate) struct PanoramaOutcome {
    pub output: OutputSummary,
    pub verdict: JudgeVerdict,
    pub attempts_used: u32,
}

/// Runs up to `panorama_max_attempts` generate-judge rounds. Returns after
/// the first approval or once the rounds are spent; the caller decides the
/// resulting phase.
pub(crate) async fn run_loop(
    ctx: &ExecutorContext,
    pipeline: &Pipeline,
    input: &ImageRef,
    attempt_base: u32,
) -> Result<PanoramaOutcome> {
    let step = Step::Panorama;
    let pose = pose::derive_pose(pipeline.nearest_camera_angle(step));
    let base = format!(
        "{} Viewpoint: {}.",
        prompts::base_prompt(step),
        pose.description
    );

    let mut feedback: Vec<String> = Vec::new();
    let mut last: Option<(OutputSummary, JudgeVerdict)> = None;
    let max_attempts = ctx.config.panorama_max_attempts.max(1);

    for round in 0..max_attempts {
        let attempt_index = attempt_base + round;
        let prompt = prompts::panorama_retry(&base, &feedback);

        let request = GenerationRequest {
            prompt: prompt.clone(),
            reference_images: vec![input.clone()],
            size_tier: pipeline.quality.resolution,
            aspect_ratio: AspectRatio::Wide,
            temperature: 1.0,
            seed: Some(rand::random()),
        };
        let image = ctx.generator.generate(&request).await?;
        let artifact_id = ctx.store_candidate(pipeline.id, step, &image).await?;

        let candidate = ImageRef::from_bytes(&image.bytes, image.mime_type.clone());
        let verdict = ctx
            .judge
            .judge(&candidate, JudgeType::Panorama, &prompt)
            .await?;

        ctx.attempts
            .record(CreateAttempt {
                pipeline_id: pipeline.id,
                step,
                attempt_index,
                candidate_index: 0,
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
                attempt_index,
                candidate_index: 0,
                judge_type: JudgeType::Panorama,
                verdict: verdict.clone(),
            })
            .await?;
        ctx.emit(Event::CandidateJudged {
            pipeline_id: pipeline.id,
            step: step.number(),
            candidate_index: 0,
            decision: verdict.decision.as_str().to_string(),
            score: verdict.score,
            qa_executed: verdict.qa_executed,
        })
        .await;

        let output = OutputSummary {
            artifact_id,
            decision: verdict.decision,
            reason: verdict.reasons.first().map(|r| r.description.clone()),
            prompt,
            manually_approved: false,
            selected: false,
            space: None,
            camera_angle: Some(pose.keyword.to_string()),
        };

        if verdict.is_approved() {
            info!(
                pipeline_id = %pipeline.id,
                round = round + 1,
                "Panorama approved"
            );
            return Ok(PanoramaOutcome {
                output,
                verdict,
                attempts_used: round + 1,
            });
        }

        warn!(
            pipeline_id = %pipeline.id,
            round = round + 1,
            max = max_attempts,
            "Panorama rejected, feeding judge feedback back"
        );
        feedback = verdict.reasons.iter().map(|r| r.description.clone()).collect();
        last = Some((output, verdict));
    }

    // max_attempts >= 1, so at least one round ran.
    let (output, verdict) = last.expect("at least one panorama round");
    Ok(PanoramaOutcome {
        output,
        verdict,
        attempts_used: max_attempts,
    })
}

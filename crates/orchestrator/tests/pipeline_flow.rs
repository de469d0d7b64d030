//! End-to-end orchestration tests against an in-memory store and scripted
//! gateway fakes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use events::{Event, EventBus};
use gateway::{
    FsObjectStore, GatewayError, GatewayResult, GeneratedImage, GenerationRequest, ImageGenerator,
    ImageRef, ObjectStore, QualityJudge,
};
use orchestrator::{
    executor, lifecycle, rollback, ExecutorConfig, ExecutorContext, OrchestratorError,
    RetryQueue, RetryTicket, RunOptions,
};
use pipeline_core::{
    CreatePipelineRequest, JudgeDecision, JudgeReason, JudgeType, JudgeVerdict, Phase, Pipeline,
    PipelineMode, QualityPolicy, RejectionCategory, RetryStatus, SpaceInfo, Stage, Step,
    StepVerdict,
};
use uuid::Uuid;

struct FakeGenerator {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GatewayResult<GeneratedImage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                message: "synthetic failure".to_string(),
                status_code: Some(500),
            });
        }
        assert!(!request.prompt.is_empty());
        Ok(GeneratedImage {
            bytes: format!("image-{call}").into_bytes(),
            mime_type: "image/png".to_string(),
            model: Some("fake-image-model".to_string()),
        })
    }
}

struct FakeJudge {
    script: Mutex<VecDeque<JudgeVerdict>>,
    spaces: Vec<SpaceInfo>,
}

impl FakeJudge {
    fn new(spaces: Vec<SpaceInfo>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            spaces,
        }
    }

    fn push(&self, verdict: JudgeVerdict) {
        self.script.lock().unwrap().push_back(verdict);
    }

    fn rejected(category: RejectionCategory, description: &str) -> JudgeVerdict {
        JudgeVerdict::rejected(
            30,
            vec![JudgeReason {
                category,
                description: description.to_string(),
            }],
        )
    }
}

#[async_trait]
impl QualityJudge for FakeJudge {
    async fn judge(
        &self,
        _image: &ImageRef,
        _judge_type: JudgeType,
        _context: &str,
    ) -> GatewayResult<JudgeVerdict> {
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| JudgeVerdict::approved(90)))
    }

    async fn analyze_spaces(&self, _image: &ImageRef) -> GatewayResult<Vec<SpaceInfo>> {
        Ok(self.spaces.clone())
    }
}

struct Harness {
    ctx: Arc<ExecutorContext>,
    judge: Arc<FakeJudge>,
    generator: Arc<FakeGenerator>,
    bus: EventBus,
    _dir: tempfile::TempDir,
}

async fn harness(config: ExecutorConfig, spaces: Vec<SpaceInfo>) -> Harness {
    let pool = db::create_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
    let generator = Arc::new(FakeGenerator::new());
    let judge = Arc::new(FakeJudge::new(spaces));
    let bus = EventBus::new();

    let ctx = Arc::new(ExecutorContext::new(
        pool,
        generator.clone(),
        judge.clone(),
        store,
        bus.clone(),
        config,
    ));
    Harness {
        ctx,
        judge,
        generator,
        bus,
        _dir: dir,
    }
}

fn create_request(mode: PipelineMode) -> CreatePipelineRequest {
    let source = ImageRef::from_bytes(b"source floor plan", "image/jpeg");
    CreatePipelineRequest {
        owner: "owner-1".to_string(),
        mode,
        quality: QualityPolicy::default(),
        source_image: source.data,
        source_mime: source.mime_type,
    }
}

async fn created(h: &Harness, mode: PipelineMode) -> Pipeline {
    let p = lifecycle::create_pipeline(&h.ctx, create_request(mode)).await.unwrap();
    lifecycle::run_analysis(&h.ctx, p.id, "owner-1").await.unwrap()
}

async fn run(h: &Harness, id: Uuid, step: Step) -> executor::StepRunOutcome {
    executor::run_step(&h.ctx, id, "owner-1", step, RunOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_full_linear_run_to_completion() {
    let h = harness(
        ExecutorConfig::default().with_default_candidates(2),
        vec![],
    )
    .await;
    let p = created(&h, PipelineMode::Linear).await;
    assert_eq!(p.phase, Phase::pending(Step::Structure));

    let outcome = run(&h, p.id, Step::Structure).await;
    assert_eq!(outcome.verdict, StepVerdict::Approved);
    assert_eq!(outcome.outputs.len(), 1);
    assert_eq!(outcome.pipeline.phase, Phase::review(Step::Structure));

    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();

    for step in [
        Step::Style,
        Step::Angles,
        Step::Panorama,
        Step::SpaceRenders,
        Step::SpacePanoramas,
        Step::Merge,
    ] {
        let outcome = run(&h, p.id, step).await;
        assert!(outcome.verdict.proceeds_to_review(), "step {}", step.name());
        lifecycle::select_output(&h.ctx, p.id, "owner-1", step, 0)
            .await
            .unwrap();
    }

    let done = h.ctx.pipelines.get(p.id).await.unwrap();
    assert!(done.is_complete());
    assert_eq!(done.phase, Phase::review(Step::Merge));

    // A completed pipeline refuses further runs.
    let err = executor::run_step(&h.ctx, p.id, "owner-1", Step::Merge, RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PHASE_MISMATCH");

    // Audit log covers the whole run.
    let log = h.ctx.event_log.list_for_pipeline(p.id).await.unwrap();
    assert!(log.iter().any(|e| e.event_type == "pipeline.created"));
    assert!(log.iter().any(|e| e.event_type == "step.started"));
    assert!(log.iter().any(|e| e.event_type == "output.selected"));
}

#[tokio::test]
async fn test_style_requires_manual_structure_approval() {
    let h = harness(ExecutorConfig::default(), vec![]).await;
    let p = created(&h, PipelineMode::Linear).await;

    run(&h, p.id, Step::Structure).await;

    // Force the pipeline forward without the sign-off.
    let mut loaded = h.ctx.pipelines.get(p.id).await.unwrap();
    loaded.set_phase(Phase::pending(Step::Style));
    h.ctx.pipelines.update(&loaded).await.unwrap();

    let err = executor::run_step(&h.ctx, p.id, "owner-1", Step::Style, RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "APPROVAL_REQUIRED");
}

#[tokio::test]
async fn test_full_rejection_schedules_retry_and_retry_succeeds() {
    let h = harness(
        ExecutorConfig::default().with_default_candidates(2),
        vec![],
    )
    .await;
    let p = created(&h, PipelineMode::Linear).await;
    run(&h, p.id, Step::Structure).await;
    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();

    h.judge.push(FakeJudge::rejected(RejectionCategory::Geometry, "walls skewed"));
    h.judge.push(FakeJudge::rejected(RejectionCategory::BedSizing, "bed oversized"));

    let outcome = run(&h, p.id, Step::Style).await;
    assert_eq!(outcome.verdict, StepVerdict::Rejected);
    assert_eq!(outcome.pipeline.phase, Phase::new(Step::Style, Stage::QaFailed));
    assert_eq!(outcome.pipeline.total_retry_count, 1);

    let ticket = outcome.scheduled_retry.expect("retry scheduled");
    assert_eq!(ticket.observed_reset_counter, 1);
    assert_eq!(ticket.delta.categories.len(), 2);
    assert_eq!(ticket.delta.corrective_clauses.len(), 2);
    assert!(ticket.delta.temperature < 1.0);

    // Retry with the scheduled adjustments; judge approves this time.
    let retry = executor::run_step(
        &h.ctx,
        p.id,
        "owner-1",
        Step::Style,
        RunOptions {
            candidates: None,
            delta: Some(ticket.delta),
            observed_reset_counter: Some(ticket.observed_reset_counter),
        },
    )
    .await
    .unwrap();
    assert_eq!(retry.verdict, StepVerdict::Approved);
    assert_eq!(retry.pipeline.phase, Phase::review(Step::Style));

    let state = &retry.pipeline.step_retry_state[&Step::Style.number()];
    assert_eq!(state.attempt_count, 2);
    assert_eq!(state.status, RetryStatus::QaPass);
    assert_eq!(state.attempts.len(), 2);
}

#[tokio::test]
async fn test_partial_success_proceeds_to_review() {
    let h = harness(
        ExecutorConfig::default().with_default_candidates(2),
        vec![],
    )
    .await;
    let p = created(&h, PipelineMode::Linear).await;
    run(&h, p.id, Step::Structure).await;
    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();

    h.judge.push(JudgeVerdict::approved(88));
    h.judge.push(FakeJudge::rejected(RejectionCategory::Other, "washed out"));

    let outcome = run(&h, p.id, Step::Style).await;
    assert_eq!(outcome.verdict, StepVerdict::PartialSuccess);
    assert_eq!(outcome.pipeline.phase, Phase::review(Step::Style));
    assert!(outcome.scheduled_retry.is_none());

    // Only the approved candidate is selectable.
    let err = lifecycle::select_output(&h.ctx, p.id, "owner-1", Step::Style, 1)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STEP");
    lifecycle::select_output(&h.ctx, p.id, "owner-1", Step::Style, 0)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_exhausted_attempts_block_for_human_and_reset() {
    let h = harness(
        ExecutorConfig::default()
            .with_default_candidates(1)
            .with_max_attempts(1),
        vec![],
    )
    .await;
    let p = created(&h, PipelineMode::Linear).await;
    run(&h, p.id, Step::Structure).await;
    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();

    h.judge.push(FakeJudge::rejected(RejectionCategory::Geometry, "skewed"));
    let outcome = run(&h, p.id, Step::Style).await;
    assert_eq!(outcome.pipeline.phase, Phase::new(Step::Style, Stage::Blocked));
    assert!(outcome.scheduled_retry.is_none());
    assert_eq!(
        outcome.pipeline.step_retry_state[&Step::Style.number()].status,
        RetryStatus::BlockedForHuman
    );

    let reset = lifecycle::reset_blocked(&h.ctx, p.id, "owner-1").await.unwrap();
    assert_eq!(reset.phase, Phase::pending(Step::Style));
    // The attempt index keeps climbing across the reset.
    assert_eq!(reset.step_retry_state[&Step::Style.number()].attempt_count, 1);

    let rerun = run(&h, p.id, Step::Style).await;
    assert_eq!(rerun.verdict, StepVerdict::Approved);
    assert_eq!(rerun.attempt, 1);

    // Both runs are on the audit trail under distinct attempt indices.
    let attempts = h.ctx.attempts.list_for_step(p.id, Step::Style).await.unwrap();
    let indices: Vec<u32> = attempts.iter().map(|a| a.attempt_index).collect();
    assert_eq!(indices, vec![0, 1]);
}

#[tokio::test]
async fn test_auto_retry_disabled_blocks_immediately() {
    let h = harness(
        ExecutorConfig::default()
            .with_default_candidates(1)
            .with_auto_retry_enabled(false),
        vec![],
    )
    .await;
    let p = created(&h, PipelineMode::Linear).await;
    run(&h, p.id, Step::Structure).await;
    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();

    h.judge.push(FakeJudge::rejected(RejectionCategory::Geometry, "skewed"));
    let outcome = run(&h, p.id, Step::Style).await;
    assert_eq!(outcome.pipeline.phase, Phase::new(Step::Style, Stage::Blocked));
    assert!(outcome.scheduled_retry.is_none());
    assert_eq!(
        outcome.pipeline.step_retry_state[&Step::Style.number()].status,
        RetryStatus::BlockedForHuman
    );
    assert_eq!(outcome.pipeline.total_retry_count, 0);
}

#[tokio::test]
async fn test_judge_timeout_counts_as_rejection() {
    let h = harness(
        ExecutorConfig::default().with_default_candidates(1),
        vec![],
    )
    .await;
    let p = created(&h, PipelineMode::Linear).await;
    run(&h, p.id, Step::Structure).await;
    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();

    h.judge.push(JudgeVerdict::not_executed("judge timed out after 120s"));
    let outcome = run(&h, p.id, Step::Style).await;
    assert_eq!(outcome.verdict, StepVerdict::Rejected);
    assert_eq!(outcome.outputs[0].decision, JudgeDecision::Rejected);

    let results = h
        .ctx
        .judge_results
        .list_for_step(p.id, Step::Style)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(!results[0].verdict.qa_executed);
}

#[tokio::test]
async fn test_generation_failure_releases_lock_and_records_error() {
    let h = harness(ExecutorConfig::default(), vec![]).await;
    let p = created(&h, PipelineMode::Linear).await;

    h.generator.fail.store(true, Ordering::SeqCst);
    let err = executor::run_step(&h.ctx, p.id, "owner-1", Step::Structure, RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "AI_API_ERROR");

    let loaded = h.ctx.pipelines.get(p.id).await.unwrap();
    assert_eq!(loaded.phase, Phase::pending(Step::Structure));
    assert_eq!(loaded.last_error.as_deref(), Some("AI_API_ERROR"));

    h.generator.fail.store(false, Ordering::SeqCst);
    let outcome = run(&h, p.id, Step::Structure).await;
    assert_eq!(outcome.verdict, StepVerdict::Approved);
    assert!(outcome.pipeline.last_error.is_none());
}

#[tokio::test]
async fn test_panorama_loop_feeds_feedback_and_approves() {
    let h = harness(ExecutorConfig::default(), vec![]).await;
    let p = created(&h, PipelineMode::Linear).await;
    run(&h, p.id, Step::Structure).await;
    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();
    for step in [Step::Style, Step::Angles] {
        run(&h, p.id, step).await;
        lifecycle::select_output(&h.ctx, p.id, "owner-1", step, 0).await.unwrap();
    }

    h.judge.push(FakeJudge::rejected(RejectionCategory::Other, "seam on the left edge"));
    h.judge.push(FakeJudge::rejected(RejectionCategory::Other, "horizon bends"));

    let outcome = run(&h, p.id, Step::Panorama).await;
    assert_eq!(outcome.verdict, StepVerdict::Approved);
    assert_eq!(outcome.pipeline.phase, Phase::review(Step::Panorama));

    // Three synchronous rounds, all audited, no global budget spent.
    let attempts = h.ctx.attempts.list_for_step(p.id, Step::Panorama).await.unwrap();
    assert_eq!(attempts.len(), 3);
    assert!(attempts[1].prompt.contains("seam on the left edge"));
    assert!(attempts[2].prompt.contains("horizon bends"));
    assert_eq!(outcome.pipeline.total_retry_count, 0);
}

#[tokio::test]
async fn test_panorama_exhaustion_blocks() {
    let h = harness(
        ExecutorConfig::default().with_panorama_max_attempts(2),
        vec![],
    )
    .await;
    let p = created(&h, PipelineMode::Linear).await;
    run(&h, p.id, Step::Structure).await;
    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();
    for step in [Step::Style, Step::Angles] {
        run(&h, p.id, step).await;
        lifecycle::select_output(&h.ctx, p.id, "owner-1", step, 0).await.unwrap();
    }

    for _ in 0..2 {
        h.judge.push(FakeJudge::rejected(RejectionCategory::Other, "seam"));
    }
    let outcome = run(&h, p.id, Step::Panorama).await;
    assert_eq!(outcome.verdict, StepVerdict::Rejected);
    assert_eq!(
        outcome.pipeline.phase,
        Phase::new(Step::Panorama, Stage::Blocked)
    );
}

#[tokio::test]
async fn test_multi_space_batch_renders_per_space() {
    let spaces = vec![
        SpaceInfo {
            name: "kitchen".to_string(),
            kind: "kitchen".to_string(),
        },
        SpaceInfo {
            name: "master bedroom".to_string(),
            kind: "bedroom".to_string(),
        },
    ];
    let h = harness(ExecutorConfig::default(), spaces).await;
    let p = created(&h, PipelineMode::MultiSpace).await;
    assert_eq!(p.spaces.len(), 2);

    run(&h, p.id, Step::Structure).await;
    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();
    for step in [Step::Style, Step::Angles, Step::Panorama] {
        run(&h, p.id, step).await;
        lifecycle::select_output(&h.ctx, p.id, "owner-1", step, 0).await.unwrap();
    }

    h.judge.push(JudgeVerdict::approved(91));
    h.judge.push(FakeJudge::rejected(RejectionCategory::FurnitureHallucination, "extra plant"));

    let outcome = run(&h, p.id, Step::SpaceRenders).await;
    assert_eq!(outcome.verdict, StepVerdict::PartialSuccess);
    assert_eq!(outcome.outputs.len(), 2);
    assert_eq!(outcome.outputs[0].space.as_deref(), Some("kitchen"));
    assert_eq!(outcome.outputs[1].space.as_deref(), Some("master bedroom"));

    let records = h
        .ctx
        .space_records
        .list_for_step(p.id, Step::SpaceRenders)
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].decision, JudgeDecision::Rejected);
}

#[tokio::test]
async fn test_rollback_purges_and_fences() {
    let h = harness(
        ExecutorConfig::default().with_default_candidates(2),
        vec![],
    )
    .await;
    let p = created(&h, PipelineMode::Linear).await;
    run(&h, p.id, Step::Structure).await;
    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();
    run(&h, p.id, Step::Style).await;
    lifecycle::select_output(&h.ctx, p.id, "owner-1", Step::Style, 0).await.unwrap();
    run(&h, p.id, Step::Angles).await;

    let before = h.ctx.pipelines.get(p.id).await.unwrap();
    let angle_artifacts = before.step_outputs[&3].artifact_ids();
    let report = rollback::rollback_one_step(&h.ctx, p.id, "owner-1").await.unwrap();
    assert_eq!(report.from_step, 3);
    assert_eq!(report.to_step, 2);
    // Only the rewound step's two candidates go.
    assert_eq!(report.deleted_artifacts, 2);
    assert_eq!(report.reset_counter, before.total_retry_count + 1);

    let after = h.ctx.pipelines.get(p.id).await.unwrap();
    assert_eq!(after.phase, Phase::pending(Step::Style));
    assert!(after.step_outputs.get(&3).is_none());
    // Earlier steps keep their outputs and their stored artifacts.
    assert!(after.step_outputs.get(&1).is_some());
    let style_artifacts = after.step_outputs[&2].artifact_ids();
    for id in &style_artifacts {
        assert!(h.ctx.artifacts.get(*id).await.unwrap().is_some());
    }
    for id in &angle_artifacts {
        assert!(h.ctx.artifacts.get(*id).await.unwrap().is_none());
    }
    // Source artifact survives every rollback.
    assert!(h.ctx.artifacts.get(after.source_artifact_id).await.unwrap().is_some());

    // Step-scoped records of the purged step are gone; earlier ones stay.
    assert!(h.ctx.attempts.list_for_step(p.id, Step::Angles).await.unwrap().is_empty());
    assert_eq!(h.ctx.attempts.list_for_step(p.id, Step::Style).await.unwrap().len(), 2);
    let log = h.ctx.event_log.list_for_pipeline(p.id).await.unwrap();
    assert!(log.iter().all(|e| e.step != Some(3)));
    assert!(log.iter().any(|e| e.step == Some(2)));

    // A retry scheduled before the rollback is now stale.
    let err = executor::run_step(
        &h.ctx,
        p.id,
        "owner-1",
        Step::Style,
        RunOptions {
            candidates: None,
            delta: None,
            observed_reset_counter: Some(before.total_retry_count),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "STALE_RETRY");
}

#[tokio::test]
async fn test_rollback_then_rerun_records_fresh_attempts() {
    let h = harness(
        ExecutorConfig::default().with_default_candidates(1),
        vec![],
    )
    .await;
    let p = created(&h, PipelineMode::Linear).await;
    run(&h, p.id, Step::Structure).await;
    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();
    run(&h, p.id, Step::Style).await;
    lifecycle::select_output(&h.ctx, p.id, "owner-1", Step::Style, 0).await.unwrap();
    run(&h, p.id, Step::Angles).await;

    rollback::rollback_one_step(&h.ctx, p.id, "owner-1").await.unwrap();

    // Style reruns on top of its surviving history, angles starts over.
    let style = run(&h, p.id, Step::Style).await;
    assert_eq!(style.attempt, 1);
    lifecycle::select_output(&h.ctx, p.id, "owner-1", Step::Style, 0).await.unwrap();
    let angles = run(&h, p.id, Step::Angles).await;
    assert_eq!(angles.attempt, 0);
    assert_eq!(angles.verdict, StepVerdict::Approved);

    let indices: Vec<u32> = h
        .ctx
        .attempts
        .list_for_step(p.id, Step::Style)
        .await
        .unwrap()
        .iter()
        .map(|a| a.attempt_index)
        .collect();
    assert_eq!(indices, vec![0, 1]);
}

#[tokio::test]
async fn test_retry_queue_discards_stale_ticket() {
    let h = harness(ExecutorConfig::default(), vec![]).await;
    let p = created(&h, PipelineMode::Linear).await;

    let mut rx = h.bus.subscribe();
    let (queue, _worker) = RetryQueue::start(h.ctx.clone());

    let ticket = RetryTicket {
        pipeline_id: p.id,
        owner: "owner-1".to_string(),
        step: Step::Style,
        observed_reset_counter: 7,
        delta: orchestrator::RetryController::delta(vec![], 0),
    };
    assert!(queue.enqueue(ticket).await);

    let envelope = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let envelope = rx.recv().await.unwrap();
            if matches!(envelope.event, Event::RetryDiscarded { .. }) {
                break envelope;
            }
        }
    })
    .await
    .expect("discard event");

    match envelope.event {
        Event::RetryDiscarded {
            observed_counter,
            current_counter,
            ..
        } => {
            assert_eq!(observed_counter, 7);
            assert_eq!(current_counter, 0);
        }
        _ => unreachable!(),
    }

    // The discard is also on the durable audit log.
    let log = h.ctx.event_log.list_for_pipeline(p.id).await.unwrap();
    assert!(log.iter().any(|e| e.event_type == "retry.discarded"));
}

#[tokio::test]
async fn test_ownership_enforced() {
    let h = harness(ExecutorConfig::default(), vec![]).await;
    let p = created(&h, PipelineMode::Linear).await;

    let err = executor::run_step(&h.ctx, p.id, "intruder", Step::Structure, RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_OWNER");

    let err = lifecycle::run_analysis(&h.ctx, p.id, "intruder").await.unwrap_err();
    assert_eq!(err.code(), "NOT_OWNER");
}

#[tokio::test]
async fn test_analysis_cannot_run_twice() {
    let h = harness(ExecutorConfig::default(), vec![]).await;
    let p = created(&h, PipelineMode::Linear).await;

    let err = lifecycle::run_analysis(&h.ctx, p.id, "owner-1").await.unwrap_err();
    assert_eq!(err.code(), "PHASE_MISMATCH");

    let err = executor::run_step(&h.ctx, p.id, "owner-1", Step::Analysis, RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STEP");
}

#[tokio::test]
async fn test_single_flight_lock() {
    let h = harness(ExecutorConfig::default(), vec![]).await;
    let p = created(&h, PipelineMode::Linear).await;

    // Simulate a concurrent invocation that already took the lock.
    let mut locked = h.ctx.pipelines.get(p.id).await.unwrap();
    locked.set_phase(Phase::running(Step::Structure));
    h.ctx.pipelines.update(&locked).await.unwrap();

    let err = executor::run_step(&h.ctx, p.id, "owner-1", Step::Structure, RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PHASE_MISMATCH");
}

#[tokio::test]
async fn test_input_resolution_skips_gap_steps() {
    let h = harness(ExecutorConfig::default(), vec![]).await;
    let p = created(&h, PipelineMode::Linear).await;
    run(&h, p.id, Step::Structure).await;
    lifecycle::approve_structure(&h.ctx, p.id, "owner-1").await.unwrap();

    // Skip style entirely.
    let mut loaded = h.ctx.pipelines.get(p.id).await.unwrap();
    loaded.set_phase(Phase::pending(Step::Angles));
    h.ctx.pipelines.update(&loaded).await.unwrap();

    let outcome = run(&h, p.id, Step::Angles).await;
    assert_eq!(outcome.verdict, StepVerdict::Approved);
}

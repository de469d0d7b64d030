//! Rewinds a pipeline by exactly one step. Everything derived at or beyond
//! the rewound step is purged: stored objects, registry rows, attempt and
//! judge-result records, per-space records and the step-scoped audit
//! entries. Earlier steps are never touched. The reset counter is bumped so
//! queued retries for the old position die at the fence instead of
//! resurrecting purged state.

use events::Event;
use pipeline_core::{Phase, Step};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::ExecutorContext;
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub from_step: u8,
    pub to_step: u8,
    pub deleted_artifacts: usize,
    /// Reset counter after the rollback; queued work observing an older
    /// value is stale.
    pub reset_counter: u32,
}

pub async fn rollback_one_step(
    ctx: &ExecutorContext,
    pipeline_id: Uuid,
    owner: &str,
) -> Result<RollbackReport> {
    let mut pipeline = ctx.load_owned(pipeline_id, owner).await?;

    if pipeline.is_complete() {
        return Err(OrchestratorError::PhaseMismatch {
            expected: Phase::pending(pipeline.current_step).as_token(),
            actual: pipeline.phase.as_token(),
        });
    }

    let from = pipeline.current_step;
    // The analysis step is redone through its own operation, never by
    // rolling back into it.
    let to = from
        .previous()
        .filter(|s| *s != Step::Analysis)
        .ok_or(OrchestratorError::InvalidStep(from.number()))?;

    // Purge every derived artifact at or beyond the step being undone; the
    // step the pipeline rewinds to keeps its approved output. The aggregate
    // and the registry are both consulted so a crashed run's orphans go too.
    let mut ids = pipeline.artifact_ids_from_step(from);
    for record in ctx.artifacts.list_from_step(pipeline_id, from).await? {
        if !ids.contains(&record.id) {
            ids.push(record.id);
        }
    }
    let paths = ctx.artifacts.storage_paths(&ids).await?;
    for path in &paths {
        if let Err(e) = ctx.store.delete(path).await {
            // Registry rows still go; a dangling object is preferable to a
            // dangling reference.
            warn!(path, error = %e, "Failed to delete stored object during rollback");
        }
    }
    let deleted = ctx.artifacts.delete_many(&ids).await? as usize;

    // Attempt indices restart at zero after a rollback, so the records of
    // the purged steps must go with the artifacts.
    ctx.attempts.delete_from_step(pipeline_id, from).await?;
    ctx.judge_results.delete_from_step(pipeline_id, from).await?;
    ctx.event_log.delete_from_step(pipeline_id, from).await?;
    ctx.space_records.delete_from_step(pipeline_id, from).await?;

    pipeline.step_outputs.retain(|step, _| *step < from.number());
    pipeline.step_retry_state.retain(|step, _| *step < from.number());
    pipeline.last_error = None;
    pipeline.total_retry_count += 1;
    pipeline.set_phase(Phase::pending(to));
    ctx.pipelines.update(&pipeline).await?;

    let report = RollbackReport {
        from_step: from.number(),
        to_step: to.number(),
        deleted_artifacts: deleted,
        reset_counter: pipeline.total_retry_count,
    };

    info!(
        pipeline_id = %pipeline_id,
        from = report.from_step,
        to = report.to_step,
        deleted = report.deleted_artifacts,
        "Rolled pipeline back one step"
    );
    ctx.emit(Event::RolledBack {
        pipeline_id,
        from_step: report.from_step,
        to_step: report.to_step,
        deleted_artifacts: report.deleted_artifacts,
        reset_counter: report.reset_counter,
    })
    .await;

    Ok(report)
}

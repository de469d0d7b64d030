use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use db::StoredEvent;
use orchestrator::{lifecycle, rollback, RollbackReport};
use pipeline_core::{
    CreatePipelineRequest, Pipeline, PipelineMode, QualityPolicy, Step,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::{require_owner, AppState};

#[derive(Debug, Deserialize)]
pub struct CreatePipelineBody {
    #[serde(default)]
    pub mode: PipelineMode,
    #[serde(default)]
    pub quality: QualityPolicy,
    /// Source image, base64.
    pub source_image: String,
    #[serde(default = "default_source_mime")]
    pub source_mime: String,
}

fn default_source_mime() -> String {
    "image/jpeg".to_string()
}

pub async fn create_pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePipelineBody>,
) -> Result<(StatusCode, Json<Pipeline>), AppError> {
    let owner = require_owner(&headers)?;
    let request = CreatePipelineRequest {
        owner,
        mode: body.mode,
        quality: body.quality,
        source_image: body.source_image,
        source_mime: body.source_mime,
    };
    let pipeline = lifecycle::create_pipeline(&state.ctx, request).await?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}

pub async fn list_pipelines(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Pipeline>>, AppError> {
    let owner = require_owner(&headers)?;
    let pipelines = state.ctx.pipelines.list_for_owner(&owner).await?;
    Ok(Json(pipelines))
}

pub async fn get_pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Pipeline>, AppError> {
    let owner = require_owner(&headers)?;
    let pipeline = state.ctx.load_owned(id, &owner).await?;
    Ok(Json(pipeline))
}

pub async fn run_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Pipeline>, AppError> {
    let owner = require_owner(&headers)?;
    let pipeline = lifecycle::run_analysis(&state.ctx, id, &owner).await?;
    Ok(Json(pipeline))
}

pub async fn approve_structure(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Pipeline>, AppError> {
    let owner = require_owner(&headers)?;
    let pipeline = lifecycle::approve_structure(&state.ctx, id, &owner).await?;
    Ok(Json(pipeline))
}

#[derive(Debug, Deserialize)]
pub struct SelectOutputBody {
    pub step: u8,
    pub candidate_index: u32,
}

pub async fn select_output(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<SelectOutputBody>,
) -> Result<Json<Pipeline>, AppError> {
    let owner = require_owner(&headers)?;
    let step = Step::from_number(body.step)
        .ok_or_else(|| AppError::BadRequest(format!("unknown step: {}", body.step)))?;
    let pipeline =
        lifecycle::select_output(&state.ctx, id, &owner, step, body.candidate_index).await?;
    Ok(Json(pipeline))
}

pub async fn reset_blocked(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Pipeline>, AppError> {
    let owner = require_owner(&headers)?;
    let pipeline = lifecycle::reset_blocked(&state.ctx, id, &owner).await?;
    Ok(Json(pipeline))
}

pub async fn rollback_pipeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<RollbackReport>, AppError> {
    let owner = require_owner(&headers)?;
    let report = rollback::rollback_one_step(&state.ctx, id, &owner).await?;
    Ok(Json(report))
}

pub async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StoredEvent>>, AppError> {
    let owner = require_owner(&headers)?;
    // Ownership check; the audit log has no owner column of its own.
    state.ctx.load_owned(id, &owner).await?;
    let events = state.ctx.event_log.list_for_pipeline(id).await?;
    Ok(Json(events))
}

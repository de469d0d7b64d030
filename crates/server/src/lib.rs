pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route(
            "/api/pipelines",
            get(routes::list_pipelines).post(routes::create_pipeline),
        )
        .route("/api/pipelines/{id}", get(routes::get_pipeline))
        .route("/api/pipelines/{id}/analyze", post(routes::run_analysis))
        .route(
            "/api/pipelines/{id}/approve-structure",
            post(routes::approve_structure),
        )
        .route("/api/pipelines/{id}/select", post(routes::select_output))
        .route("/api/pipelines/{id}/reset", post(routes::reset_blocked))
        .route("/api/pipelines/{id}/rollback", post(routes::rollback_pipeline))
        .route("/api/pipelines/{id}/events", get(routes::list_events))
        .route(
            "/api/pipelines/{id}/steps/{step}/run",
            post(routes::run_step),
        )
        .route("/api/events", get(routes::sse::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

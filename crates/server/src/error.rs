use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway::GatewayError;
use orchestrator::OrchestratorError;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    MissingOwner,
    Orchestrator(OrchestratorError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::MissingOwner => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID",
                "Missing or empty x-owner-id header".to_string(),
            ),
            // An unreadable source image is caller input, not a gateway
            // failure.
            AppError::Orchestrator(OrchestratorError::Gateway(
                GatewayError::InvalidPayload(msg),
            )) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::Orchestrator(err) => {
                let status = match err.code() {
                    "PIPELINE_NOT_FOUND" => StatusCode::NOT_FOUND,
                    "NOT_OWNER" => StatusCode::FORBIDDEN,
                    "AUTH_INVALID" => StatusCode::UNAUTHORIZED,
                    "PHASE_MISMATCH" | "WRITE_CONFLICT" | "STALE_RETRY" => StatusCode::CONFLICT,
                    "INVALID_STEP" | "APPROVAL_REQUIRED" | "INPUT_IMAGE_MISSING" => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    "AI_API_ERROR" | "PARSE_FAILED" | "TRUNCATED_PARSE_FAILED" => {
                        StatusCode::BAD_GATEWAY
                    }
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!(code = err.code(), error = %err, "Request failed");
                }
                return (
                    status,
                    Json(ErrorResponse {
                        error: err.code().to_string(),
                        message: err.to_string(),
                    }),
                )
                    .into_response();
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: code.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError::Orchestrator(err)
    }
}

impl From<db::DbError> for AppError {
    fn from(err: db::DbError) -> Self {
        AppError::Orchestrator(err.into())
    }
}

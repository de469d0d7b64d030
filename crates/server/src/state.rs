use std::sync::Arc;

use axum::http::HeaderMap;
use events::EventBus;
use orchestrator::{ExecutorContext, RetryQueue};

use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<ExecutorContext>,
    pub retry_queue: RetryQueue,
}

impl AppState {
    /// Starts the retry-queue worker; the handle is detached and lives for
    /// the process.
    pub fn new(ctx: Arc<ExecutorContext>) -> Self {
        let (retry_queue, _worker) = RetryQueue::start(ctx.clone());
        Self { ctx, retry_queue }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.ctx.event_bus
    }
}

/// Caller identity, required on every pipeline endpoint. Authentication
/// itself is upstream; this server only scopes data by owner.
pub fn require_owner(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-owner-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(AppError::MissingOwner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_require_owner() {
        let mut headers = HeaderMap::new();
        assert!(require_owner(&headers).is_err());

        headers.insert("x-owner-id", HeaderValue::from_static("  "));
        assert!(require_owner(&headers).is_err());

        headers.insert("x-owner-id", HeaderValue::from_static("owner-1"));
        assert_eq!(require_owner(&headers).unwrap(), "owner-1");
    }
}

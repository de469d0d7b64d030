use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::types::{ApiErrorBody, GeneratedImage, GenerationRequest, GenerationResponse};

const DEFAULT_MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 60_000;
const GENERATION_TIMEOUT: Duration = Duration::from_secs(180);

/// Trait seam for the generative-image service, so the orchestrator can be
/// tested against a fake.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> GatewayResult<GeneratedImage>;
}

/// HTTP client for the generative-image service.
#[derive(Clone)]
pub struct GenerationClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GenerationClient {
    pub fn new(api_key: String, base_url: String) -> GatewayResult<Self> {
        if api_key.trim().is_empty() {
            return Err(GatewayError::MissingCredentials);
        }
        let client = Client::builder()
            .timeout(GENERATION_TIMEOUT)
            .build()
            .map_err(GatewayError::Http)?;
        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    async fn with_retry<T, F, Fut>(&self, operation: F, operation_name: &str) -> GatewayResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = GatewayResult<T>>,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(GatewayError::RateLimited { retry_after }) => {
                    if retries >= DEFAULT_MAX_RETRIES {
                        error!(
                            "{} failed after {} retries due to rate limiting",
                            operation_name, retries
                        );
                        return Err(GatewayError::RateLimited { retry_after });
                    }

                    let wait_ms = retry_after
                        .map(|s| s * 1000)
                        .unwrap_or(backoff_ms)
                        .min(MAX_BACKOFF_MS);

                    warn!(
                        "{} rate limited, retrying in {}ms (attempt {}/{})",
                        operation_name,
                        wait_ms,
                        retries + 1,
                        DEFAULT_MAX_RETRIES
                    );

                    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                    retries += 1;
                    backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                }
                Err(GatewayError::Api {
                    ref message,
                    status_code: Some(code),
                }) if code >= 500 => {
                    if retries >= DEFAULT_MAX_RETRIES {
                        error!(
                            "{} failed after {} retries due to server error: {}",
                            operation_name, retries, message
                        );
                        return Err(GatewayError::Api {
                            message: message.clone(),
                            status_code: Some(code),
                        });
                    }

                    warn!(
                        "{} server error ({}), retrying in {}ms (attempt {}/{})",
                        operation_name,
                        code,
                        backoff_ms,
                        retries + 1,
                        DEFAULT_MAX_RETRIES
                    );

                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    retries += 1;
                    backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn generate_inner(&self, request: &GenerationRequest) -> GatewayResult<GeneratedImage> {
        debug!(
            prompt_length = request.prompt.len(),
            references = request.reference_images.len(),
            temperature = request.temperature,
            "Calling generation endpoint"
        );

        let response = self
            .client
            .post(format!("{}/images/generate", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout {
                        seconds: GENERATION_TIMEOUT.as_secs(),
                    }
                } else {
                    GatewayError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(GatewayError::MissingCredentials);
            }

            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                warn!("Rate limited by generation service");
                return Err(GatewayError::RateLimited { retry_after: None });
            }

            if let Ok(body) = serde_json::from_str::<ApiErrorBody>(&error_text) {
                error!("Generation API error: {}", body.error.message);
                return Err(GatewayError::Api {
                    message: body.error.message,
                    status_code: Some(status.as_u16()),
                });
            }

            return Err(GatewayError::Api {
                message: error_text,
                status_code: Some(status.as_u16()),
            });
        }

        let raw = response.text().await.map_err(GatewayError::Http)?;
        let parsed: GenerationResponse =
            serde_json::from_str(&raw).map_err(|e| parse_error("generation", &raw, e))?;

        let bytes = parsed.image.decode()?;
        Ok(GeneratedImage {
            bytes,
            mime_type: parsed.image.mime_type,
            model: parsed.model,
        })
    }
}

/// Classifies a serde failure into truncated vs. malformed, keeping the raw
/// body and failure position for diagnostics.
pub(crate) fn parse_error(
    what: &'static str,
    raw: &str,
    err: serde_json::Error,
) -> GatewayError {
    let position = raw
        .lines()
        .take(err.line().saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum::<usize>()
        + err.column();
    GatewayError::Parse {
        what,
        message: err.to_string(),
        raw: raw.to_string(),
        position,
        truncated: err.is_eof(),
    }
}

#[async_trait]
impl ImageGenerator for GenerationClient {
    async fn generate(&self, request: &GenerationRequest) -> GatewayResult<GeneratedImage> {
        self.with_retry(|| self.generate_inner(request), "generate").await
    }
}

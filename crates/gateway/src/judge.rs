use std::time::Duration;

use async_trait::async_trait;
use pipeline_core::{JudgeDecision, JudgeReason, JudgeType, JudgeVerdict, SpaceInfo};
use reqwest::Client;
use tracing::{debug, error, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::generation::parse_error;
use crate::types::{AnalysisResponse, ApiErrorBody, ImageRef, JudgeRequest, JudgeResponse};

/// Hard ceiling on a single judge call. A judge that does not answer in
/// time yields a rejection with `qa_executed = false`, never an approval.
pub const JUDGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Trait seam for the visual QA judge service.
#[async_trait]
pub trait QualityJudge: Send + Sync {
    /// Inspect one candidate. Infrastructure failures inside the judge map
    /// to a fail-closed rejected verdict; only structural problems (bad
    /// credentials, malformed responses) surface as errors.
    async fn judge(
        &self,
        image: &ImageRef,
        judge_type: JudgeType,
        context: &str,
    ) -> GatewayResult<JudgeVerdict>;

    /// Step-0 structural analysis of the source image.
    async fn analyze_spaces(&self, image: &ImageRef) -> GatewayResult<Vec<SpaceInfo>>;
}

/// HTTP client for the QA judge service.
#[derive(Clone)]
pub struct JudgeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl JudgeClient {
    pub fn new(api_key: String, base_url: String) -> GatewayResult<Self> {
        if api_key.trim().is_empty() {
            return Err(GatewayError::MissingCredentials);
        }
        let client = Client::builder()
            .timeout(JUDGE_TIMEOUT)
            .build()
            .map_err(GatewayError::Http)?;
        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    async fn post_json(&self, path: &str, body: &impl serde::Serialize) -> GatewayResult<String> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout {
                        seconds: JUDGE_TIMEOUT.as_secs(),
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
                warn!("Rate limited by judge service");
                return Err(GatewayError::RateLimited { retry_after: None });
            }

            if let Ok(body) = serde_json::from_str::<ApiErrorBody>(&error_text) {
                error!("Judge API error: {}", body.error.message);
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

        response.text().await.map_err(GatewayError::Http)
    }
}

#[async_trait]
impl QualityJudge for JudgeClient {
    async fn judge(
        &self,
        image: &ImageRef,
        judge_type: JudgeType,
        context: &str,
    ) -> GatewayResult<JudgeVerdict> {
        debug!(judge_type = judge_type.as_str(), "Calling judge endpoint");

        let request = JudgeRequest {
            image,
            judge_type: judge_type.as_str(),
            context,
        };

        let raw = match self.post_json("/judge", &request).await {
            Ok(raw) => raw,
            // Fail closed: no answer is a rejection, never an approval.
            Err(GatewayError::Timeout { seconds }) => {
                warn!(timeout_secs = seconds, "Judge call timed out, rejecting");
                return Ok(JudgeVerdict::not_executed(format!(
                    "judge timed out after {seconds}s"
                )));
            }
            Err(e) => return Err(e),
        };

        let parsed: JudgeResponse =
            serde_json::from_str(&raw).map_err(|e| parse_error("judge", &raw, e))?;

        let decision = JudgeDecision::parse(&parsed.decision).ok_or_else(|| {
            GatewayError::InvalidPayload(format!("unknown judge decision: {}", parsed.decision))
        })?;

        let reasons = parsed
            .reasons
            .into_iter()
            .map(|r| JudgeReason {
                category: r.category,
                description: r.description,
            })
            .collect();

        Ok(JudgeVerdict {
            decision,
            score: parsed.score.min(100),
            reasons,
            qa_executed: true,
        })
    }

    async fn analyze_spaces(&self, image: &ImageRef) -> GatewayResult<Vec<SpaceInfo>> {
        #[derive(serde::Serialize)]
        struct AnalysisRequest<'a> {
            image: &'a ImageRef,
        }

        let raw = self
            .post_json("/analyze", &AnalysisRequest { image })
            .await?;

        let parsed: AnalysisResponse =
            serde_json::from_str(&raw).map_err(|e| parse_error("analysis", &raw, e))?;

        Ok(parsed
            .spaces
            .into_iter()
            .map(|s| SpaceInfo {
                name: s.name,
                kind: s.kind,
            })
            .collect())
    }
}

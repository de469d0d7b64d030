use base64::Engine;
use pipeline_core::{AspectRatio, ResolutionTier};
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// An image passed over the wire, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub data: String,
    pub mime_type: String,
}

impl ImageRef {
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    pub fn decode(&self) -> GatewayResult<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| GatewayError::InvalidPayload(format!("invalid base64 image: {e}")))
    }
}

/// Request to the generative-image service.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub reference_images: Vec<ImageRef>,
    pub size_tier: ResolutionTier,
    pub aspect_ratio: AspectRatio,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// One generated image as returned by the service.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Model identifier reported by the service, recorded on the attempt.
    pub model: Option<String>,
}

/// Wire response of the generation endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct GenerationResponse {
    pub image: ImageRef,
    #[serde(default)]
    pub model: Option<String>,
}

/// Wire request of the judge endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct JudgeRequest<'a> {
    pub image: &'a ImageRef,
    pub judge_type: &'a str,
    pub context: &'a str,
}

/// Wire response of the judge endpoint. Mirrors the domain verdict minus
/// `qa_executed`, which only the gateway can assert.
#[derive(Debug, Deserialize)]
pub(crate) struct JudgeResponse {
    pub decision: String,
    pub score: u8,
    #[serde(default)]
    pub reasons: Vec<JudgeReasonWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JudgeReasonWire {
    pub category: pipeline_core::RejectionCategory,
    pub description: String,
}

/// Wire response of the space-analysis endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct AnalysisResponse {
    pub spaces: Vec<SpaceWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SpaceWire {
    pub name: String,
    pub kind: String,
}

/// Error body some endpoints return alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub error_type: Option<String>,
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Missing or invalid gateway credentials")]
    MissingCredentials,

    #[error("Generative API error: {message} (status: {status_code:?})")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited by generative API (retry after: {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("Gateway call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Failed to parse {what} response at byte {position}: {message}")]
    Parse {
        what: &'static str,
        message: String,
        /// Raw response body, kept whole for diagnostics.
        raw: String,
        /// Approximate byte offset of the failure.
        position: usize,
        /// True when the body looks cut off rather than malformed.
        truncated: bool,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl GatewayError {
    /// Stable error code surfaced to callers and the audit log.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "AUTH_INVALID",
            Self::Api { .. } | Self::Http(_) | Self::RateLimited { .. } => "AI_API_ERROR",
            Self::Timeout { .. } => "AI_API_ERROR",
            Self::Parse {
                truncated: true, ..
            } => "TRUNCATED_PARSE_FAILED",
            Self::Parse { .. } => "PARSE_FAILED",
            Self::Storage(_) => "PERSISTENCE_WRITE_ERROR",
            Self::InvalidPayload(_) => "AI_API_ERROR",
        }
    }

    /// Malformed or truncated model output is recoverable; the caller may
    /// retry the call. Structural failures are not.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::RateLimited { .. } | Self::Timeout { .. }
        )
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

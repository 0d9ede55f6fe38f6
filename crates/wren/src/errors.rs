use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream rejected the configured credential: {0}")]
    UpstreamAuthError(String),

    #[error("Upstream quota exceeded: {message}")]
    UpstreamQuotaExceeded {
        message: String,
        /// Seconds to wait before retrying, when the provider says so
        retry_after: Option<u64>,
    },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream returned a malformed response: {0}")]
    UpstreamMalformedResponse(String),

    #[error("Upstream stream interrupted: {0}")]
    UpstreamStreamInterrupted(String),
}

pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Taxonomy tag carried in error payloads on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) => "InvalidRequest",
            RelayError::UpstreamAuthError(_) => "UpstreamAuthError",
            RelayError::UpstreamQuotaExceeded { .. } => "UpstreamQuotaExceeded",
            RelayError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            RelayError::UpstreamMalformedResponse(_) => "UpstreamMalformedResponse",
            RelayError::UpstreamStreamInterrupted(_) => "UpstreamStreamInterrupted",
        }
    }
}

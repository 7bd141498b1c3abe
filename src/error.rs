use http::StatusCode;
use std::fmt;

use crate::engine::Dimension;

/// The core's total error hierarchy. Every failure the admission path can
/// produce is one of these, and every variant maps to exactly one HTTP
/// status and JSON error body (`status` / `to_json` below).
#[derive(Debug)]
pub enum AdmitError {
    InvalidRequest(String),
    Unauthorized,
    RateLimited {
        dimension: Dimension,
        retry_after: u64,
    },
    CoordinationUnavailable(String),
    Overloaded,
    GeneratorFailed(String),
}

impl AdmitError {
    pub fn status(&self) -> StatusCode {
        match self {
            AdmitError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AdmitError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdmitError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AdmitError::CoordinationUnavailable(_) => StatusCode::BAD_GATEWAY,
            AdmitError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            AdmitError::GeneratorFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Expected traffic shaping rather than a system fault — never logged
    /// at warn/error, never counted as a system fault in metrics.
    pub fn is_expected(&self) -> bool {
        matches!(self, AdmitError::RateLimited { .. })
    }

    /// Render the JSON error body. `RateLimited` uses the wire shape the
    /// spec requires; everything else is a flat `{"error": "..."}` body.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AdmitError::RateLimited {
                dimension,
                retry_after,
            } => serde_json::json!({
                "error": {
                    "type": "rate_limit_exceeded",
                    "dimension": dimension.as_str(),
                    "retry_after": retry_after,
                }
            }),
            other => serde_json::json!({ "error": other.to_string() }),
        }
    }

    /// `Retry-After` header value, present only for `RateLimited`.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AdmitError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl fmt::Display for AdmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmitError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            AdmitError::Unauthorized => write!(f, "unauthorized"),
            AdmitError::RateLimited {
                dimension,
                retry_after,
            } => write!(
                f,
                "rate limited: dimension={:?}, retry_after={}s",
                dimension, retry_after
            ),
            AdmitError::CoordinationUnavailable(msg) => {
                write!(f, "coordination store unavailable: {}", msg)
            }
            AdmitError::Overloaded => write!(f, "node overloaded"),
            AdmitError::GeneratorFailed(msg) => write!(f, "generator failed: {}", msg),
        }
    }
}

impl std::error::Error for AdmitError {}

//! Error types for the caching layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for caches, invalidation and the connection pool.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid TTL, size or threshold supplied at construction
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The pool has no free handle and cannot create another
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// A rule could not be applied to an event payload
    #[error("Invalidation rule '{rule}' failed: {reason}")]
    InvalidationApply { rule: String, reason: String },

    /// A handle was released to a pool that does not track it
    #[error("Handle misuse: {0}")]
    HandleMisuse(String),

    /// The underlying resource failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Named cache or rule does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Shorthand for building an [`CacheError::InvalidationApply`].
    pub fn invalidation(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        CacheError::InvalidationApply {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::Configuration(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::InvalidationApply { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::CapacityExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::HandleMisuse(_)
            | CacheError::Connection(_)
            | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching layer.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = vec![
            (CacheError::NotFound("rule".into()), StatusCode::NOT_FOUND),
            (CacheError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (CacheError::Configuration("ttl".into()), StatusCode::BAD_REQUEST),
            (
                CacheError::CapacityExhausted("pool".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                CacheError::invalidation("r", "no key"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CacheError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_invalidation_error_message() {
        let err = CacheError::invalidation("entity-lookup", "missing entity key");
        assert_eq!(
            err.to_string(),
            "Invalidation rule 'entity-lookup' failed: missing entity key"
        );
    }
}

// Error types for Spectra
// One error enum for the whole console, rendered as JSON HTTP responses

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::sync::signature::SignatureRejection;

#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Console switched off or outside its permitted environment
    #[error("not found")]
    NotFound,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("too many requests, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("signature rejected: {0}")]
    Signature(#[from] SignatureRejection),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ConsoleError {
    pub fn status(&self) -> StatusCode {
        match self {
            ConsoleError::NotFound => StatusCode::NOT_FOUND,
            ConsoleError::Forbidden(_) => StatusCode::FORBIDDEN,
            ConsoleError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ConsoleError::InvalidRequest(_) | ConsoleError::Json(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ConsoleError::Signature(_) => StatusCode::UNAUTHORIZED,
            ConsoleError::Dispatch(_)
            | ConsoleError::Io(_)
            | ConsoleError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        match self {
            ConsoleError::RateLimited { retry_after } => (
                status,
                [(header::RETRY_AFTER, retry_after.to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_carries_retry_after() {
        let response = ConsoleError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn status_per_variant() {
        assert_eq!(ConsoleError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ConsoleError::Forbidden("gate".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ConsoleError::InvalidRequest("endpoint".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ConsoleError::Signature(SignatureRejection::ReplayedNonce).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ConsoleError::Dispatch("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

//! HTTP error responses
//!
//! Every error leaves the service as an RFC 6749 §5.2 style JSON body:
//! `{"error": "<code>", "error_description": "..."}`. The description is
//! omitted for grant failures so callers can't tell which check failed.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use oauth_broker::AuthorizationError;

/// An error rendered as an OAuth JSON error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub description: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str) -> Self {
        Self {
            status,
            code,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request").with_description(description)
    }

    pub fn not_found(code: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, code)
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(err: AuthorizationError) -> Self {
        match err {
            AuthorizationError::InvalidGrant => Self::new(StatusCode::BAD_REQUEST, "invalid_grant"),
            AuthorizationError::InvalidClient => {
                Self::new(StatusCode::UNAUTHORIZED, "invalid_client")
            }
            AuthorizationError::InvalidRequest(msg) => Self::invalid_request(msg),
            AuthorizationError::ServerError => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "server_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({ "error": self.code });
        if let Some(description) = self.description {
            body["error_description"] = serde_json::Value::String(description);
        }

        (
            self.status,
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            body.to_string(),
        )
            .into_response()
    }
}

//! Caller-facing authorization errors
//!
//! The exchange flow fails for several distinct reasons internally, but the
//! caller only ever learns one of the RFC 6749 §5.2 error codes below.
//! Revealing which check failed would help someone guessing at a leaked code.

use oauth_core::Error as CoreError;

/// Errors surfaced to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    /// Code unknown, expired, already used, or bound to different parameters
    #[error("invalid_grant")]
    InvalidGrant,

    /// Client unknown or failed authentication
    #[error("invalid_client")]
    InvalidClient,

    /// Issuance parameters don't fit the client, e.g. an unregistered redirect URI
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// The client snapshot could not be written
    #[error("server_error")]
    ServerError,
}

impl AuthorizationError {
    /// RFC 6749 error code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AuthorizationError::InvalidGrant => "invalid_grant",
            AuthorizationError::InvalidClient => "invalid_client",
            AuthorizationError::InvalidRequest(_) => "invalid_request",
            AuthorizationError::ServerError => "server_error",
        }
    }
}

impl From<CoreError> for AuthorizationError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::CodeNotFound
            | CoreError::ClientMismatch
            | CoreError::RedirectMismatch
            | CoreError::PkceVerificationFailed
            | CoreError::TokenNotFound => AuthorizationError::InvalidGrant,
            CoreError::ClientNotFound | CoreError::InvalidClientSecret => {
                AuthorizationError::InvalidClient
            }
            CoreError::Persistence(_) | CoreError::Io(_) => AuthorizationError::ServerError,
        }
    }
}

/// Result alias for broker operations.
pub type Result<T> = std::result::Result<T, AuthorizationError>;

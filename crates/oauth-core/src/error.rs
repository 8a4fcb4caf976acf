//! Error types for the credential-issuance core
//!
//! Variants are deliberately coarse. `CodeNotFound` and `TokenNotFound` cover
//! both absent and expired entries so callers can't tell which codes or
//! tokens once existed.

/// Errors from registry, store, and verification operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("client not found")]
    ClientNotFound,

    #[error("authorization code not found or expired")]
    CodeNotFound,

    #[error("client_id does not match the authorization code")]
    ClientMismatch,

    #[error("redirect_uri does not match")]
    RedirectMismatch,

    #[error("PKCE verification failed")]
    PkceVerificationFailed,

    #[error("access token not found or expired")]
    TokenNotFound,

    #[error("client secret missing or invalid")]
    InvalidClientSecret,

    #[error("client snapshot error: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

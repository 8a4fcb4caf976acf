//! Access token store
//!
//! Maps locally issued bearer tokens to the upstream credential they stand
//! in for. The upstream credential never leaves the store through `issue`;
//! only `validate` returns it.

use std::collections::HashMap;
use std::time::Duration;

use common::Secret;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::constants::TOKEN_TYPE_BEARER;
use crate::error::{Error, Result};
use crate::ids;

/// Token metadata returned to the party that redeemed a code.
///
/// Serializes to the RFC 6749 §5.1 success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Lifetime in seconds, fixed at issuance
    pub expires_in: u64,
}

/// A stored access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: u64,
    pub upstream_access_token: Secret<String>,
    pub created_at: Instant,
}

impl AccessToken {
    /// Tokens are valid while `now - created_at < expires_in`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= Duration::from_secs(self.expires_in)
    }
}

/// Thread-safe store of issued access tokens.
pub struct AccessTokenStore {
    ttl: Duration,
    state: Mutex<HashMap<String, AccessToken>>,
}

impl AccessTokenStore {
    /// Create an empty store issuing tokens that live for `ttl` (whole seconds).
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Token lifetime for newly issued tokens.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token bound to `upstream_access_token`.
    pub async fn issue(&self, upstream_access_token: String) -> TokenResponse {
        let mut state = self.state.lock().await;

        let access_token = loop {
            let candidate = ids::generate_access_token();
            if !state.contains_key(&candidate) {
                break candidate;
            }
        };
        let expires_in = self.ttl.as_secs();

        state.insert(
            access_token.clone(),
            AccessToken {
                access_token: access_token.clone(),
                expires_in,
                upstream_access_token: Secret::new(upstream_access_token),
                created_at: Instant::now(),
            },
        );
        debug!(
            token = ids::log_prefix(&access_token),
            expires_in, "access token issued"
        );

        TokenResponse {
            access_token,
            token_type: TOKEN_TYPE_BEARER,
            expires_in,
        }
    }

    /// Resolve a token to its upstream credential.
    ///
    /// Returns `None` for unknown, revoked, or expired tokens. Expired
    /// entries are deleted before returning.
    pub async fn validate(&self, access_token: &str) -> Option<Secret<String>> {
        match self.lookup(access_token).await {
            Ok(upstream) => Some(upstream),
            Err(e) => {
                debug!(token = ids::log_prefix(access_token), reason = %e, "access token rejected");
                None
            }
        }
    }

    async fn lookup(&self, access_token: &str) -> Result<Secret<String>> {
        let mut state = self.state.lock().await;
        let record = state.get(access_token).ok_or(Error::TokenNotFound)?;

        if record.is_expired(Instant::now()) {
            state.remove(access_token);
            return Err(Error::TokenNotFound);
        }
        Ok(record.upstream_access_token.clone())
    }

    /// Delete a token. Returns whether it existed.
    ///
    /// An expired-but-unswept token still counts as existing here; it is
    /// removed either way.
    pub async fn revoke(&self, access_token: &str) -> bool {
        let removed = self.state.lock().await.remove(access_token).is_some();
        if removed {
            debug!(token = ids::log_prefix(access_token), "access token revoked");
        }
        removed
    }

    /// Remove every expired token. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let before = state.len();
        state.retain(|_, record| !record.is_expired(now));
        before - state.len()
    }

    /// Number of tokens currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    /// Whether the store holds no tokens.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

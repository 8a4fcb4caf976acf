//! Authorization code store
//!
//! Codes are short-lived and single-use. `consume` removes the record under
//! the store lock before anything else looks at it, so of two concurrent
//! redemptions of the same code exactly one gets the record and the other
//! sees `None`.
//!
//! Expiry is checked lazily on every `consume`; `purge_expired` exists only
//! to bound memory and is driven by the broker's sweeper.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::ids;
use crate::pkce::CodeChallengeMethod;

/// Parameters for issuing a new authorization code.
#[derive(Debug, Clone)]
pub struct CodeRequest {
    pub client_id: String,
    pub code_challenge: String,
    pub code_challenge_method: CodeChallengeMethod,
    pub redirect_uri: String,
    /// Opaque credential from the upstream platform, forwarded unchanged
    pub upstream_code: String,
}

/// A stored authorization code.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub code_challenge: String,
    pub code_challenge_method: CodeChallengeMethod,
    pub redirect_uri: String,
    pub upstream_code: String,
    pub created_at: Instant,
}

impl AuthorizationCode {
    /// Whether the code is older than `ttl` as of `now`. A code is still
    /// honoured at exactly `ttl`.
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

/// Thread-safe store of outstanding authorization codes.
pub struct AuthorizationCodeStore {
    ttl: Duration,
    state: Mutex<HashMap<String, AuthorizationCode>>,
}

impl AuthorizationCodeStore {
    /// Create an empty store whose codes live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Code lifetime for this store.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh code for `request` and return it.
    pub async fn issue(&self, request: CodeRequest) -> String {
        let mut state = self.state.lock().await;

        let code = loop {
            let candidate = ids::generate_code();
            if !state.contains_key(&candidate) {
                break candidate;
            }
        };

        debug!(
            code = ids::log_prefix(&code),
            client_id = request.client_id,
            method = %request.code_challenge_method,
            "authorization code issued"
        );

        state.insert(
            code.clone(),
            AuthorizationCode {
                code: code.clone(),
                client_id: request.client_id,
                code_challenge: request.code_challenge,
                code_challenge_method: request.code_challenge_method,
                redirect_uri: request.redirect_uri,
                upstream_code: request.upstream_code,
                created_at: Instant::now(),
            },
        );
        code
    }

    /// Atomically take a code out of the store.
    ///
    /// Returns `None` if the code was never issued, was already consumed, or
    /// has expired. An expired record is deleted as a side effect.
    pub async fn consume(&self, code: &str) -> Option<AuthorizationCode> {
        let record = self.state.lock().await.remove(code)?;

        if record.is_expired(Instant::now(), self.ttl) {
            debug!(code = ids::log_prefix(code), "authorization code expired");
            return None;
        }
        Some(record)
    }

    /// Remove every expired code. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let before = state.len();
        state.retain(|_, record| !record.is_expired(now, self.ttl));
        before - state.len()
    }

    /// Number of codes currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    /// Whether the store holds no codes.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

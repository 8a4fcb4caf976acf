//! Authorization server: the operation set the transport layer calls
//!
//! Owns the client registry and both credential stores. One instance is
//! shared across request handlers and the sweeper via `Arc`; there is no
//! global state.
//!
//! Exchange order matters. The code is consumed first, unconditionally, and
//! only then checked against the request. A failed exchange therefore burns
//! the code, which limits anyone holding a leaked code to a single guess.

use std::time::Duration;

use common::Secret;
use oauth_core::{
    AccessTokenStore, AuthorizationCode, AuthorizationCodeStore, ClientRegistry, CodeRequest,
    Error as CoreError, RegisteredClient, TokenResponse, ids, pkce,
};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::error::{AuthorizationError, Result};

/// How clients authenticate at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAuthPolicy {
    /// PKCE alone proves possession; `client_secret` is ignored
    #[default]
    Public,
    /// The registered `client_secret` must accompany every exchange
    RequireSecret,
}

/// Parameters of an authorization-code exchange.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub code: String,
    pub code_verifier: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub client_secret: Option<Secret<String>>,
}

/// The credential-issuance state machine.
pub struct AuthorizationServer {
    clients: ClientRegistry,
    codes: AuthorizationCodeStore,
    tokens: AccessTokenStore,
    client_auth: ClientAuthPolicy,
}

impl AuthorizationServer {
    /// Create a server with the given registry and lifetimes. Clients are
    /// treated as public until `with_client_auth` says otherwise.
    pub fn new(clients: ClientRegistry, code_ttl: Duration, token_ttl: Duration) -> Self {
        info!(
            code_ttl_secs = code_ttl.as_secs(),
            token_ttl_secs = token_ttl.as_secs(),
            "authorization server initialized"
        );
        Self {
            clients,
            codes: AuthorizationCodeStore::new(code_ttl),
            tokens: AccessTokenStore::new(token_ttl),
            client_auth: ClientAuthPolicy::Public,
        }
    }

    /// Set the token-endpoint client authentication policy.
    pub fn with_client_auth(mut self, policy: ClientAuthPolicy) -> Self {
        self.client_auth = policy;
        self
    }

    pub fn client_auth(&self) -> ClientAuthPolicy {
        self.client_auth
    }

    /// Register a client for the given redirect URIs.
    ///
    /// Fails with `ServerError` only when the client snapshot can't be
    /// written; the registration is rolled back in that case.
    pub async fn register_client(&self, redirect_uris: Vec<String>) -> Result<RegisteredClient> {
        let client = self.clients.register(redirect_uris).await.map_err(|e| {
            warn!(error = %e, "client registration failed");
            AuthorizationError::from(e)
        })?;
        metrics::counter!("oauth_clients_registered_total").increment(1);
        Ok(client)
    }

    pub async fn get_client(&self, client_id: &str) -> Option<RegisteredClient> {
        self.clients.get(client_id).await
    }

    /// Issue an authorization code once the upstream login has completed.
    ///
    /// The client must exist (`InvalidClient`) and `redirect_uri` must be one
    /// it registered (`InvalidRequest`).
    pub async fn issue_authorization_code(&self, request: CodeRequest) -> Result<String> {
        let Some(client) = self.clients.get(&request.client_id).await else {
            warn!(client_id = request.client_id, "code requested for unknown client");
            return Err(AuthorizationError::InvalidClient);
        };

        if !client.allows_redirect(&request.redirect_uri) {
            warn!(
                client_id = request.client_id,
                redirect_uri = request.redirect_uri,
                "redirect_uri not registered for client"
            );
            return Err(AuthorizationError::InvalidRequest(
                "redirect_uri is not registered for this client".into(),
            ));
        }

        let code = self.codes.issue(request).await;
        metrics::counter!("oauth_codes_issued_total").increment(1);
        Ok(code)
    }

    /// Redeem an authorization code for an access token.
    ///
    /// Every grant failure is reported as `InvalidGrant`; the precise reason
    /// is only logged.
    pub async fn exchange_code(&self, request: ExchangeRequest) -> Result<TokenResponse> {
        let outcome = match self.redeem(&request).await {
            Ok(record) => self.authenticate_client(&request).await.map(|()| record),
            Err(e) => Err(e),
        };

        let record = match outcome {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    client_id = request.client_id,
                    code = ids::log_prefix(&request.code),
                    reason = %e,
                    "authorization code exchange rejected"
                );
                let error = AuthorizationError::from(e);
                metrics::counter!("oauth_exchanges_total", "outcome" => error.code())
                    .increment(1);
                return Err(error);
            }
        };

        let token = self.tokens.issue(record.upstream_code).await;
        metrics::counter!("oauth_exchanges_total", "outcome" => "success").increment(1);
        info!(
            client_id = request.client_id,
            token = ids::log_prefix(&token.access_token),
            "authorization code exchanged"
        );
        Ok(token)
    }

    /// Resolve a bearer token to the upstream credential it stands for.
    pub async fn validate_access_token(&self, access_token: &str) -> Option<Secret<String>> {
        let upstream = self.tokens.validate(access_token).await;
        let outcome = if upstream.is_some() { "valid" } else { "invalid" };
        metrics::counter!("oauth_token_validations_total", "outcome" => outcome).increment(1);
        upstream
    }

    /// Revoke a token. Returns whether a token was deleted.
    pub async fn revoke_access_token(&self, access_token: &str) -> bool {
        let revoked = self.tokens.revoke(access_token).await;
        if revoked {
            metrics::counter!("oauth_tokens_revoked_total").increment(1);
            info!(token = ids::log_prefix(access_token), "access token revoked");
        }
        revoked
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn codes(&self) -> &AuthorizationCodeStore {
        &self.codes
    }

    pub fn tokens(&self) -> &AccessTokenStore {
        &self.tokens
    }

    /// Take the code and check it against the request, in that order.
    async fn redeem(&self, request: &ExchangeRequest) -> oauth_core::Result<AuthorizationCode> {
        let record = self
            .codes
            .consume(&request.code)
            .await
            .ok_or(CoreError::CodeNotFound)?;

        if record.client_id != request.client_id {
            return Err(CoreError::ClientMismatch);
        }
        if record.redirect_uri != request.redirect_uri {
            return Err(CoreError::RedirectMismatch);
        }
        if !pkce::verify(
            &request.code_verifier,
            &record.code_challenge,
            &record.code_challenge_method,
        ) {
            return Err(CoreError::PkceVerificationFailed);
        }
        Ok(record)
    }

    async fn authenticate_client(&self, request: &ExchangeRequest) -> oauth_core::Result<()> {
        if self.client_auth == ClientAuthPolicy::Public {
            return Ok(());
        }

        let client = self
            .clients
            .get(&request.client_id)
            .await
            .ok_or(CoreError::ClientNotFound)?;
        let presented = request
            .client_secret
            .as_ref()
            .ok_or(CoreError::InvalidClientSecret)?;

        let matches: bool = presented
            .expose()
            .as_bytes()
            .ct_eq(client.client_secret.expose().as_bytes())
            .into();
        if matches {
            Ok(())
        } else {
            Err(CoreError::InvalidClientSecret)
        }
    }
}

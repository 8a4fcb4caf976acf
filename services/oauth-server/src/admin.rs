//! Admin API for trusted collaborators
//!
//! Runs on a separate listener (`admin_addr`) and is never exposed publicly.
//! The upstream login flow calls it to mint authorization codes; the resource
//! proxy calls it to resolve bearer tokens to upstream credentials.
//!
//! Endpoints:
//! - POST /admin/codes              - issue an authorization code
//! - POST /admin/tokens/validate    - resolve a token to its upstream credential
//! - GET  /admin/clients/{client_id} - client metadata, never the secret

use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use oauth_broker::{AuthorizationError, AuthorizationServer};
use oauth_core::{CodeChallengeMethod, CodeRequest};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ApiError;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    server: Arc<AuthorizationServer>,
}

impl AdminState {
    pub fn new(server: Arc<AuthorizationServer>) -> Self {
        Self { server }
    }
}

/// Build the admin router.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/codes", post(issue_code))
        .route("/admin/tokens/validate", post(validate_token))
        .route("/admin/clients/{client_id}", get(get_client))
        .layer(axum::middleware::from_fn(crate::metrics::track_requests))
        .with_state(state)
}

fn bad_json(e: JsonRejection) -> ApiError {
    ApiError::invalid_request(e.body_text())
}

/// Request body for code issuance.
#[derive(Deserialize)]
struct IssueCodeRequest {
    client_id: String,
    code_challenge: String,
    /// Defaults to S256 when omitted
    #[serde(default)]
    code_challenge_method: Option<String>,
    redirect_uri: String,
    upstream_code: String,
}

/// POST /admin/codes - issue an authorization code after upstream login.
async fn issue_code(
    State(state): State<AdminState>,
    body: Result<Json<IssueCodeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(bad_json)?;

    let method = body
        .code_challenge_method
        .as_deref()
        .map(CodeChallengeMethod::from)
        .unwrap_or(CodeChallengeMethod::S256);
    // Stored as-is; a code with an unknown method can never be redeemed
    if let CodeChallengeMethod::Unsupported(ref m) = method {
        warn!(client_id = body.client_id, method = m, "issuing code with unsupported PKCE method");
    }

    let client_id = body.client_id.clone();
    let code = state
        .server
        .issue_authorization_code(CodeRequest {
            client_id: body.client_id,
            code_challenge: body.code_challenge,
            code_challenge_method: method,
            redirect_uri: body.redirect_uri,
            upstream_code: body.upstream_code,
        })
        .await
        .map_err(|e| match e {
            // A lookup miss on the admin side, not a failed client authentication
            AuthorizationError::InvalidClient => ApiError::not_found("client_not_found"),
            other => ApiError::from(other),
        })?;

    info!(client_id, "authorization code issued via admin API");

    Ok((
        StatusCode::CREATED,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        serde_json::json!({ "code": code }).to_string(),
    ))
}

#[derive(Deserialize)]
struct ValidateTokenRequest {
    access_token: String,
}

/// POST /admin/tokens/validate - resolve a bearer token.
async fn validate_token(
    State(state): State<AdminState>,
    body: Result<Json<ValidateTokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(bad_json)?;

    let upstream = state
        .server
        .validate_access_token(&body.access_token)
        .await
        .ok_or_else(|| ApiError::not_found("invalid_token"))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        serde_json::json!({ "upstream_access_token": upstream.expose() }).to_string(),
    ))
}

/// GET /admin/clients/{client_id} - registered metadata without the secret.
async fn get_client(
    State(state): State<AdminState>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state
        .server
        .get_client(&client_id)
        .await
        .ok_or_else(|| ApiError::not_found("client_not_found"))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "client_id": client.client_id,
            "redirect_uris": client.redirect_uris,
            "created_at": client.created_at,
        })
        .to_string(),
    ))
}

//! Public OAuth endpoints
//!
//! Endpoints:
//! - POST /register  - dynamic client registration (RFC 7591 subset)
//! - POST /token     - authorization_code grant with PKCE
//! - POST /revoke    - token revocation (RFC 7009)
//! - GET  /health    - liveness plus store sizes
//! - GET  /metrics   - Prometheus text exposition

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use common::Secret;
use metrics_exporter_prometheus::PrometheusHandle;
use oauth_broker::{AuthorizationServer, ClientAuthPolicy, ExchangeRequest};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;

const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";

/// Shared state for public handlers
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<AuthorizationServer>,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(server: Arc<AuthorizationServer>, prometheus: PrometheusHandle) -> Self {
        Self {
            server,
            prometheus,
            started_at: Instant::now(),
        }
    }
}

/// Build the public router.
///
/// `max_connections` caps concurrently processed requests across all routes.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/token", post(token))
        .route("/revoke", post(revoke))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(crate::metrics::track_requests))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    redirect_uris: Vec<String>,
}

/// Reject empty lists, relative URIs and URIs carrying a fragment.
fn validate_redirect_uris(uris: &[String]) -> Result<(), ApiError> {
    let invalid = |msg: String| {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_redirect_uri").with_description(msg)
    };

    if uris.is_empty() {
        return Err(invalid("at least one redirect_uri is required".into()));
    }
    for uri in uris {
        if uri.contains('#') {
            return Err(invalid(format!("redirect_uri must not contain a fragment: {uri}")));
        }
        match uri.parse::<Uri>() {
            Ok(parsed) if parsed.scheme().is_some() => {}
            _ => return Err(invalid(format!("redirect_uri must be an absolute URI: {uri}"))),
        }
    }
    Ok(())
}

/// POST /register - create a client for the given redirect URIs.
async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_client_metadata")
            .with_description(e.body_text())
    })?;
    validate_redirect_uris(&body.redirect_uris)?;

    let client = state.server.register_client(body.redirect_uris).await?;

    let auth_method = match state.server.client_auth() {
        ClientAuthPolicy::Public => "none",
        ClientAuthPolicy::RequireSecret => "client_secret_post",
    };

    let body = serde_json::json!({
        "client_id": client.client_id,
        "client_secret": client.client_secret.expose(),
        "client_id_issued_at": client.created_at / 1000,
        "client_secret_expires_at": 0,
        "redirect_uris": client.redirect_uris,
        "grant_types": [GRANT_TYPE_AUTHORIZATION_CODE],
        "token_endpoint_auth_method": auth_method,
    });

    Ok((
        StatusCode::CREATED,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body.to_string(),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct TokenForm {
    grant_type: Option<String>,
    code: Option<String>,
    code_verifier: Option<String>,
    client_id: Option<String>,
    redirect_uri: Option<String>,
    client_secret: Option<String>,
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::invalid_request(format!("missing parameter: {name}")))
}

/// POST /token - redeem an authorization code.
async fn token(
    State(state): State<AppState>,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Result<Response, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::invalid_request(e.body_text()))?;

    let grant_type = required(form.grant_type, "grant_type")?;
    if grant_type != GRANT_TYPE_AUTHORIZATION_CODE {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "unsupported_grant_type")
            .with_description(format!("grant_type {grant_type} is not supported")));
    }

    let request = ExchangeRequest {
        code: required(form.code, "code")?,
        code_verifier: required(form.code_verifier, "code_verifier")?,
        client_id: required(form.client_id, "client_id")?,
        redirect_uri: required(form.redirect_uri, "redirect_uri")?,
        client_secret: form.client_secret.filter(|s| !s.is_empty()).map(Secret::new),
    };

    let token = state.server.exchange_code(request).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        serde_json::json!(token).to_string(),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct RevokeForm {
    token: Option<String>,
}

/// POST /revoke - delete a token.
///
/// Answers 200 whether or not the token existed, so revocation can't be
/// used to test whether a token is live.
async fn revoke(
    State(state): State<AppState>,
    form: Result<Form<RevokeForm>, FormRejection>,
) -> Result<StatusCode, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    let token = required(form.token, "token")?;

    let revoked = state.server.revoke_access_token(&token).await;
    if !revoked {
        info!("revocation requested for unknown token");
    }
    Ok(StatusCode::OK)
}

/// GET /health - liveness with store sizes.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "clients_registered": state.server.clients().len().await,
        "codes_outstanding": state.server.codes().len().await,
        "tokens_outstanding": state.server.tokens().len().await,
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// GET /metrics - Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use oauth_core::{
        ClientRegistry, CodeChallengeMethod, CodeRequest, compute_challenge, generate_verifier,
    };
    use std::time::Duration;
    use tower::ServiceExt;

    const CALLBACK: &str = "https://app.example/cb";

    /// Handle from an uninstalled recorder, so tests never touch the global one.
    fn test_prometheus_handle() -> PrometheusHandle {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle()
    }

    fn test_server(policy: ClientAuthPolicy) -> Arc<AuthorizationServer> {
        Arc::new(
            AuthorizationServer::new(
                ClientRegistry::in_memory(),
                Duration::from_secs(600),
                Duration::from_secs(3600),
            )
            .with_client_auth(policy),
        )
    }

    fn test_app(server: Arc<AuthorizationServer>) -> Router {
        build_router(AppState::new(server, test_prometheus_handle()), 1000)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn form_post(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    /// Register a client and issue an S256 code bound to `upstream`.
    async fn issue_code(server: &AuthorizationServer, upstream: &str) -> (String, String, String) {
        let client = server
            .register_client(vec![CALLBACK.to_string()])
            .await
            .unwrap();
        let verifier = generate_verifier();
        let code = server
            .issue_authorization_code(CodeRequest {
                client_id: client.client_id.clone(),
                code_challenge: compute_challenge(&verifier),
                code_challenge_method: CodeChallengeMethod::S256,
                redirect_uri: CALLBACK.to_string(),
                upstream_code: upstream.to_string(),
            })
            .await
            .unwrap();
        (client.client_id, code, verifier)
    }

    fn token_form<'a>(
        client_id: &'a str,
        code: &'a str,
        verifier: &'a str,
    ) -> Vec<(&'a str, &'a str)> {
        vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("client_id", client_id),
            ("redirect_uri", CALLBACK),
        ]
    }

    #[tokio::test]
    async fn register_returns_created_client() {
        let server = test_server(ClientAuthPolicy::Public);
        let (status, body) = send(
            test_app(server.clone()),
            json_post("/register", serde_json::json!({ "redirect_uris": [CALLBACK] })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let client_id = json["client_id"].as_str().unwrap();
        assert_eq!(client_id.len(), 32);
        assert_eq!(json["client_secret"].as_str().unwrap().len(), 64);
        assert_eq!(json["redirect_uris"], serde_json::json!([CALLBACK]));
        assert_eq!(json["token_endpoint_auth_method"], "none");
        assert!(json["client_id_issued_at"].as_u64().unwrap() > 0);
        assert!(server.get_client(client_id).await.is_some());
    }

    #[tokio::test]
    async fn register_advertises_secret_auth_when_required() {
        let (_, body) = send(
            test_app(test_server(ClientAuthPolicy::RequireSecret)),
            json_post("/register", serde_json::json!({ "redirect_uris": [CALLBACK] })),
        )
        .await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["token_endpoint_auth_method"], "client_secret_post");
    }

    #[tokio::test]
    async fn register_rejects_empty_redirect_uris() {
        let (status, body) = send(
            test_app(test_server(ClientAuthPolicy::Public)),
            json_post("/register", serde_json::json!({ "redirect_uris": [] })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid_redirect_uri");
    }

    #[tokio::test]
    async fn register_rejects_relative_or_fragment_uris() {
        for uri in ["/cb", "https://app.example/cb#frag"] {
            let (status, body) = send(
                test_app(test_server(ClientAuthPolicy::Public)),
                json_post("/register", serde_json::json!({ "redirect_uris": [uri] })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "uri {uri} must be rejected");
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["error"], "invalid_redirect_uri");
        }
    }

    #[tokio::test]
    async fn register_rejects_malformed_json() {
        let request = Request::builder()
            .method("POST")
            .uri("/register")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(test_app(test_server(ClientAuthPolicy::Public)), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid_client_metadata");
    }

    #[tokio::test]
    async fn register_snapshot_failure_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.json");
        let registry = ClientRegistry::load(path.clone()).await.unwrap();
        // A directory at the snapshot path makes the write fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        let server = Arc::new(AuthorizationServer::new(
            registry,
            Duration::from_secs(600),
            Duration::from_secs(3600),
        ));

        let (status, body) = send(
            test_app(server.clone()),
            json_post("/register", serde_json::json!({ "redirect_uris": [CALLBACK] })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "server_error");
        assert!(server.clients().is_empty().await);
    }

    #[tokio::test]
    async fn token_exchange_succeeds_and_token_resolves() {
        let server = test_server(ClientAuthPolicy::Public);
        let (client_id, code, verifier) = issue_code(&server, "upstream-123").await;

        let (status, body) = send(
            test_app(server.clone()),
            form_post("/token", &token_form(&client_id, &code, &verifier)),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 3600);
        assert!(
            !String::from_utf8_lossy(&body).contains("upstream-123"),
            "token response must not leak the upstream credential"
        );

        let access_token = json["access_token"].as_str().unwrap();
        let upstream = server.validate_access_token(access_token).await.unwrap();
        assert_eq!(upstream.expose(), "upstream-123");
    }

    #[tokio::test]
    async fn token_response_is_not_cacheable() {
        let server = test_server(ClientAuthPolicy::Public);
        let (client_id, code, verifier) = issue_code(&server, "up").await;

        let response = test_app(server)
            .oneshot(form_post("/token", &token_form(&client_id, &code, &verifier)))
            .await
            .unwrap();
        assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
        assert_eq!(response.headers().get(header::PRAGMA).unwrap(), "no-cache");
    }

    #[tokio::test]
    async fn replayed_code_is_invalid_grant() {
        let server = test_server(ClientAuthPolicy::Public);
        let (client_id, code, verifier) = issue_code(&server, "up").await;
        let form = token_form(&client_id, &code, &verifier);

        let (first, _) = send(test_app(server.clone()), form_post("/token", &form)).await;
        assert_eq!(first, StatusCode::OK);

        let (second, body) = send(test_app(server), form_post("/token", &form)).await;
        assert_eq!(second, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "invalid_grant" }));
    }

    #[tokio::test]
    async fn wrong_verifier_is_invalid_grant() {
        let server = test_server(ClientAuthPolicy::Public);
        let (client_id, code, _) = issue_code(&server, "up").await;
        let wrong = generate_verifier();

        let (status, body) = send(
            test_app(server),
            form_post("/token", &token_form(&client_id, &code, &wrong)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn missing_secret_is_invalid_client_when_required() {
        let server = test_server(ClientAuthPolicy::RequireSecret);
        let (client_id, code, verifier) = issue_code(&server, "up").await;

        let (status, body) = send(
            test_app(server),
            form_post("/token", &token_form(&client_id, &code, &verifier)),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid_client");
    }

    #[tokio::test]
    async fn correct_secret_is_accepted_when_required() {
        let server = test_server(ClientAuthPolicy::RequireSecret);
        let (client_id, code, verifier) = issue_code(&server, "up").await;
        let secret = server.get_client(&client_id).await.unwrap().client_secret;

        let mut form = token_form(&client_id, &code, &verifier);
        form.push(("client_secret", secret.expose().as_str()));
        let (status, _) = send(test_app(server), form_post("/token", &form)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unsupported_grant_type_is_rejected() {
        let (status, body) = send(
            test_app(test_server(ClientAuthPolicy::Public)),
            form_post(
                "/token",
                &[("grant_type", "refresh_token"), ("refresh_token", "x")],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "unsupported_grant_type");
    }

    #[tokio::test]
    async fn missing_parameter_is_invalid_request() {
        let (status, body) = send(
            test_app(test_server(ClientAuthPolicy::Public)),
            form_post(
                "/token",
                &[("grant_type", "authorization_code"), ("code", "abc")],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid_request");
        assert_eq!(json["error_description"], "missing parameter: code_verifier");
    }

    #[tokio::test]
    async fn revoke_removes_token_and_always_returns_ok() {
        let server = test_server(ClientAuthPolicy::Public);
        let token = server.tokens().issue("up".into()).await;

        let (status, _) = send(
            test_app(server.clone()),
            form_post("/revoke", &[("token", token.access_token.as_str())]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(server.validate_access_token(&token.access_token).await.is_none());

        // Unknown and already-revoked tokens answer the same way
        let (status, _) = send(
            test_app(server),
            form_post("/revoke", &[("token", token.access_token.as_str())]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn revoke_without_token_is_invalid_request() {
        let (status, _) = send(
            test_app(test_server(ClientAuthPolicy::Public)),
            form_post("/revoke", &[("token_type_hint", "access_token")]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_store_sizes() {
        let server = test_server(ClientAuthPolicy::Public);
        issue_code(&server, "up").await;
        server.tokens().issue("up".into()).await;

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(test_app(server), request).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["clients_registered"], 1);
        assert_eq!(json["codes_outstanding"], 1);
        assert_eq!(json["tokens_outstanding"], 1);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = test_app(test_server(ClientAuthPolicy::Public))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }

    #[tokio::test]
    async fn admin_paths_are_not_served_publicly() {
        let request = json_post(
            "/admin/tokens/validate",
            serde_json::json!({ "access_token": "x" }),
        );
        let (status, _) = send(test_app(test_server(ClientAuthPolicy::Public)), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

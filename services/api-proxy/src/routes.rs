//! Router and status endpoints
//!
//! The open CORS policy mirrors the service's intended use as a drop-in
//! OpenAI-compatible base URL for arbitrary clients; there is no browser
//! session to protect.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;
use warp_auth::{CLIENT_VERSION, CLIENT_VERSION_HEADER};
use warp_pool::Pool;

use crate::chat;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<Pool>,
    pub ai_url: String,
    pub prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections` and a
/// permissive CORS layer matching the original deployment.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/v1/models", get(models_handler))
        .route("/test", get(test_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .layer(cors_layer())
        .with_state(state)
}

/// Allow any origin/method/header.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// GET /: service summary with the endpoint map.
async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "service": "Warp Pool Proxy",
        "accounts": state.pool.len(),
        "status": state.pool.status_label(),
        "endpoints": {
            "health": "/health",
            "models": "/v1/models",
            "chat": "/v1/chat/completions",
            "test": "/test",
            "metrics": "/metrics",
        }
    }))
}

/// GET /health: liveness plus the account count.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "accounts": state.pool.len(),
    }))
}

/// GET /v1/models: static model listing.
async fn models_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "object": "list",
        "data": [
            {"id": "claude-3-5-sonnet", "object": "model", "owned_by": "warp"},
            {"id": "gpt-4o", "object": "model", "owned_by": "warp"},
            {"id": "o1", "object": "model", "owned_by": "warp"},
        ]
    }))
}

/// GET /metrics: Prometheus text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// GET /test: two-step diagnostic against the first account.
///
/// Step 1 exchanges the refresh token for an access token (reporting a
/// truncated preview). Step 2 probes the upstream AI endpoint with the
/// bearer token; a 403 means the account is blocked rather than the
/// endpoint being down, so it is reported distinctly.
async fn test_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut results = serde_json::json!({
        "accounts_loaded": state.pool.len(),
        "tests": [],
    });

    let Some(account) = state.pool.first_account() else {
        results["error"] = serde_json::json!("no accounts loaded");
        return axum::Json(results);
    };

    let token = match state.pool.access_token(account).await {
        Ok(token) => {
            results["tests"].as_array_mut().unwrap().push(serde_json::json!({
                "name": "token_refresh",
                "status": "ok",
                "account": account.email,
                "jwt_preview": token_preview(&token),
            }));
            token
        }
        Err(e) => {
            warn!(account = %account.email, error = %e, "diagnostic token refresh failed");
            results["tests"].as_array_mut().unwrap().push(serde_json::json!({
                "name": "token_refresh",
                "status": "failed",
                "account": account.email,
            }));
            return axum::Json(results);
        }
    };

    let probe = state
        .pool
        .http_client()
        .get(&state.ai_url)
        .bearer_auth(&token)
        .header(CLIENT_VERSION_HEADER, CLIENT_VERSION)
        .send()
        .await;

    let entry = match probe {
        Ok(response) => {
            let status = response.status();
            serde_json::json!({
                "name": "ai_endpoint",
                "status": if status.as_u16() == 403 { "blocked" } else { "ok" },
                "http_status": status.as_u16(),
            })
        }
        Err(e) => {
            warn!(error = %e, "diagnostic AI endpoint probe failed");
            serde_json::json!({
                "name": "ai_endpoint",
                "status": "error",
                "error": e.to_string(),
            })
        }
    };
    results["tests"].as_array_mut().unwrap().push(entry);

    axum::Json(results)
}

/// First 50 characters of a token, enough to eyeball without leaking it whole.
fn token_preview(token: &str) -> String {
    format!("{}...", token.chars().take(50).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;
    use warp_auth::Account;

    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    fn test_state(accounts: Vec<Account>, token_url: &str, ai_url: &str) -> AppState {
        AppState {
            pool: Arc::new(Pool::new(
                accounts,
                token_url.to_string(),
                reqwest::Client::new(),
            )),
            ai_url: ai_url.to_string(),
            prometheus: test_prometheus_handle(),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Spawn a mock token endpoint issuing long-lived tokens.
    async fn spawn_token_server(access_token: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/token",
            axum::routing::post(move || async move {
                Json(serde_json::json!({"access_token": access_token, "expires_in": 3600}))
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/token")
    }

    /// Spawn a mock AI endpoint answering GET with the given status.
    async fn spawn_ai_server(status: StatusCode) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/ai",
            get(move || async move { (status, "upstream") }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/ai")
    }

    #[tokio::test]
    async fn root_reports_ready_with_accounts() {
        let state = test_state(
            vec![Account::new("a@example.com", "rt_a")],
            "http://unused",
            "http://unused",
        );
        let (status, json) = get_json(build_router(state, 1000), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["service"], "Warp Pool Proxy");
        assert_eq!(json["accounts"], 1);
        assert_eq!(json["status"], "ready");
        assert_eq!(json["endpoints"]["chat"], "/v1/chat/completions");
    }

    #[tokio::test]
    async fn root_reports_no_accounts_on_empty_pool() {
        let state = test_state(vec![], "http://unused", "http://unused");
        let (_, json) = get_json(build_router(state, 1000), "/").await;

        assert_eq!(json["accounts"], 0);
        assert_eq!(json["status"], "no_accounts");
    }

    #[tokio::test]
    async fn health_reports_account_count() {
        let state = test_state(
            vec![
                Account::new("a@example.com", "rt_a"),
                Account::new("b@example.com", "rt_b"),
            ],
            "http://unused",
            "http://unused",
        );
        let (status, json) = get_json(build_router(state, 1000), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["accounts"], 2);
    }

    #[tokio::test]
    async fn models_returns_static_listing() {
        let state = test_state(vec![], "http://unused", "http://unused");
        let (status, json) = get_json(build_router(state, 1000), "/v1/models").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["object"], "list");
        let data = json["data"].as_array().unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data[0]["id"], "claude-3-5-sonnet");
        assert!(data.iter().all(|m| m["owned_by"] == "warp"));
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let state = test_state(vec![], "http://unused", "http://unused");
        let app = build_router(state, 1000);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(
            content_type.contains("text/plain"),
            "metrics endpoint must return text/plain Prometheus format"
        );
    }

    #[tokio::test]
    async fn test_endpoint_reports_error_on_empty_pool() {
        let state = test_state(vec![], "http://unused", "http://unused");
        let (status, json) = get_json(build_router(state, 1000), "/test").await;

        assert_eq!(status, StatusCode::OK, "diagnostics degrade, never fail");
        assert_eq!(json["accounts_loaded"], 0);
        assert_eq!(json["error"], "no accounts loaded");
        assert_eq!(json["tests"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_endpoint_runs_both_steps_on_healthy_upstream() {
        let token_url = spawn_token_server("at_diagnostic_token_value_long_enough_for_preview_cut").await;
        let ai_url = spawn_ai_server(StatusCode::OK).await;
        let state = test_state(
            vec![Account::new("a@example.com", "rt_a")],
            &token_url,
            &ai_url,
        );
        let (_, json) = get_json(build_router(state, 1000), "/test").await;

        let tests = json["tests"].as_array().unwrap();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0]["name"], "token_refresh");
        assert_eq!(tests[0]["status"], "ok");
        assert_eq!(tests[0]["account"], "a@example.com");
        let preview = tests[0]["jwt_preview"].as_str().unwrap();
        assert!(preview.ends_with("..."));
        assert!(
            preview.len() <= 53,
            "preview must truncate the token, got {} chars",
            preview.len()
        );
        assert_eq!(tests[1]["name"], "ai_endpoint");
        assert_eq!(tests[1]["status"], "ok");
        assert_eq!(tests[1]["http_status"], 200);
    }

    #[tokio::test]
    async fn test_endpoint_reports_blocked_on_403() {
        let token_url = spawn_token_server("at_blocked").await;
        let ai_url = spawn_ai_server(StatusCode::FORBIDDEN).await;
        let state = test_state(
            vec![Account::new("a@example.com", "rt_a")],
            &token_url,
            &ai_url,
        );
        let (_, json) = get_json(build_router(state, 1000), "/test").await;

        let tests = json["tests"].as_array().unwrap();
        assert_eq!(tests[1]["status"], "blocked");
        assert_eq!(tests[1]["http_status"], 403);
    }

    #[tokio::test]
    async fn test_endpoint_stops_after_failed_refresh() {
        let state = test_state(
            vec![Account::new("a@example.com", "rt_a")],
            "http://127.0.0.1:1/token",
            "http://unused",
        );
        let (_, json) = get_json(build_router(state, 1000), "/test").await;

        let tests = json["tests"].as_array().unwrap();
        assert_eq!(tests.len(), 1, "AI probe must be skipped without a token");
        assert_eq!(tests[0]["name"], "token_refresh");
        assert_eq!(tests[0]["status"], "failed");
    }

    #[tokio::test]
    async fn cors_preflight_allows_any_origin() {
        let state = test_state(vec![], "http://unused", "http://unused");
        let app = build_router(state, 1000);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/chat/completions")
                    .method(Method::OPTIONS)
                    .header("origin", "https://example.com")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "*",
            "preflight must allow any origin"
        );
    }

    #[test]
    fn token_preview_truncates_long_tokens() {
        let long = "x".repeat(200);
        let preview = token_preview(&long);
        assert_eq!(preview.len(), 53);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn token_preview_handles_short_tokens() {
        assert_eq!(token_preview("abc"), "abc...");
    }
}

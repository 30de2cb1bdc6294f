//! OpenAI-compatible chat completions endpoint
//!
//! Accepts `{messages, model, stream}`, picks an account round-robin,
//! obtains an access token through the pool, and answers with a canned
//! completion naming the serving account. Translation of the request
//! into Warp's native multi-agent protocol is not implemented; that
//! upstream wire format is undocumented, so the handler stops at proving
//! the credential path works end to end.
//!
//! The body is parsed manually from bytes so a malformed payload yields
//! a clean 400 with an OpenAI-style error object instead of the default
//! extractor rejection.

use std::convert::Infallible;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics;
use crate::routes::AppState;

/// Chat completion request (the subset this proxy inspects).
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub stream: bool,
}

fn default_model() -> String {
    "claude-3-5-sonnet".to_string()
}

/// JSON error body: `{"error":{"type":...,"message":...,"request_id":"req_..."}}`
fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response {
    let error_type = if status.is_client_error() {
        "invalid_request_error"
    } else {
        "server_error"
    };
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// POST /v1/chat/completions
pub async fn chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    let started = Instant::now();
    let request_id = format!("req_{}", Uuid::new_v4().as_simple());

    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            warn!(request_id, error = %e, "rejecting malformed chat request body");
            metrics::record_request(400, "POST", started.elapsed().as_secs_f64());
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid JSON body: {e}"),
                &request_id,
            );
        }
    };

    debug!(
        request_id,
        model = %request.model,
        messages = request.messages.len(),
        stream = request.stream,
        "chat completion request"
    );

    let Some(account) = state.pool.next_account() else {
        warn!(request_id, "no accounts available for chat request");
        metrics::record_request(500, "POST", started.elapsed().as_secs_f64());
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "no accounts available",
            &request_id,
        );
    };

    let token = match state.pool.access_token(account).await {
        Ok(t) => t,
        Err(e) => {
            metrics::record_request(500, "POST", started.elapsed().as_secs_f64());
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("failed to obtain access token: {e}"),
                &request_id,
            );
        }
    };
    debug!(request_id, account = %account.email, token_len = token.len(), "access token ready");

    let response = if request.stream {
        streaming_completion(&request.model, &account.email)
    } else {
        completion(&request.model, &account.email)
    };
    metrics::record_request(200, "POST", started.elapsed().as_secs_f64());
    response
}

/// Canned non-streaming completion naming the serving account.
fn completion(model: &str, email: &str) -> Response {
    let body = serde_json::json!({
        "id": format!("chatcmpl-{}", Uuid::new_v4().as_simple()),
        "object": "chat.completion",
        "created": now_unix(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": placeholder_content(email),
            },
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}
    });
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Canned streaming completion: one content chunk, then the `[DONE]` sentinel.
fn streaming_completion(model: &str, email: &str) -> Response {
    let chunk = serde_json::json!({
        "id": format!("chatcmpl-{}", Uuid::new_v4().as_simple()),
        "object": "chat.completion.chunk",
        "created": now_unix(),
        "model": model,
        "choices": [{
            "index": 0,
            "delta": {
                "role": "assistant",
                "content": placeholder_content(email),
            },
            "finish_reason": null
        }]
    });

    let events = stream::iter([
        Ok::<_, Infallible>(Event::default().data(chunk.to_string())),
        Ok(Event::default().data("[DONE]")),
    ]);
    Sse::new(events).into_response()
}

fn placeholder_content(email: &str) -> String {
    format!("Warp pool proxy is working. Account: {email}")
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

use std::net::SocketAddr;

use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::{Deserialize, Serialize};

use crate::accounting::{count_input, Message};
use crate::engine::AdmitRequest;
use crate::error::AdmitError;
use crate::generator;
use crate::server::AppState;

use super::context::{BoxBody, RequestContext};

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: Option<u64>,
    #[serde(default)]
    temperature: f64,
    #[serde(default)]
    #[allow(dead_code)]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[derive(Debug, Serialize)]
struct ResponseMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct Choice {
    index: u32,
    message: ResponseMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionResponse {
    id: String,
    object: &'static str,
    created: u64,
    model: String,
    choices: Vec<Choice>,
    usage: Usage,
}

/// Dispatch on method + path, matching the fixed three-endpoint surface
/// (§4.3). Anything else is a plain 404.
pub async fn handle_request(
    req: Request<Incoming>,
    state: AppState,
    _peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::POST, "/v1/chat/completions") => handle_chat_completions(req, state).await,
        (&Method::GET, "/v1/models") => handle_models(),
        (&Method::GET, path) if path.starts_with("/v1/usage/") => {
            let path_key = path["/v1/usage/".len()..].to_string();
            handle_usage(&req, state, &path_key).await
        }
        _ => {
            let ctx = RequestContext::new("not_found");
            ctx.json_response(
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": "not found" }),
            )
        }
    };

    Ok(response)
}

fn extract_api_key(req: &Request<Incoming>) -> Result<String, AdmitError> {
    let header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AdmitError::Unauthorized)?;

    header
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(AdmitError::Unauthorized)
}

async fn handle_chat_completions(
    req: Request<Incoming>,
    state: AppState,
) -> Response<BoxBody> {
    let ctx = RequestContext::new("chat_completions");

    let api_key = match extract_api_key(&req) {
        Ok(k) => k,
        Err(e) => return ctx.error_response(&e),
    };

    let _permit = match state.try_acquire_inflight() {
        Some(p) => p,
        None => return ctx.error_response(&AdmitError::Overloaded),
    };

    let body_bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            return ctx.error_response(&AdmitError::InvalidRequest(
                "failed to read request body".to_string(),
            ))
        }
    };

    let payload: ChatCompletionRequest = match serde_json::from_slice(&body_bytes) {
        Ok(p) => p,
        Err(e) => {
            return ctx.error_response(&AdmitError::InvalidRequest(format!(
                "invalid request body: {}",
                e
            )))
        }
    };

    if payload.messages.is_empty() {
        return ctx.error_response(&AdmitError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }

    let config = state.resolver.resolve(&api_key);
    let messages: Vec<Message> = payload
        .messages
        .iter()
        .map(|m| Message {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect();

    let est_in = count_input(&messages);
    let default_max_out = state.config.load().admission.default_max_out;
    let est_out = payload
        .max_tokens
        .map(|m| m.min(default_max_out))
        .unwrap_or(default_max_out)
        .max(1);

    let now = crate::engine::now_seconds();
    let decision = state
        .engine
        .admit(AdmitRequest {
            key: &api_key,
            config,
            est_in,
            est_out,
            now,
        })
        .await;

    let (event_id, committed_input, committed_output_estimate) = match decision {
        Ok(crate::engine::AdmissionDecision::Admitted {
            event_id,
            committed_input,
            committed_output_estimate,
        }) => (event_id, committed_input, committed_output_estimate),
        Ok(crate::engine::AdmissionDecision::Denied {
            reason,
            retry_after_seconds,
        }) => {
            return ctx.error_response(&AdmitError::RateLimited {
                dimension: reason,
                retry_after: retry_after_seconds,
            })
        }
        Err(e) => return ctx.error_response(&e),
    };

    let generated = generator::generate(&payload.model, &messages, est_out, payload.temperature);

    if generated.actual_completion_tokens != committed_output_estimate {
        state
            .engine
            .reconcile(
                &api_key,
                &event_id,
                committed_output_estimate,
                generated.actual_completion_tokens,
            )
            .await;
    }

    let response = ChatCompletionResponse {
        id: format!("mock_{}", event_id),
        object: "chat.completion",
        created: now.trunc() as u64,
        model: payload.model,
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant",
                content: generated.content,
            },
            finish_reason: "stop",
        }],
        usage: Usage {
            prompt_tokens: committed_input,
            completion_tokens: generated.actual_completion_tokens,
            total_tokens: committed_input + generated.actual_completion_tokens,
        },
    };

    ctx.json_response(
        StatusCode::OK,
        serde_json::to_value(response).unwrap_or_default(),
    )
}

/// Fixed catalog; never consults AE (§4.3).
fn handle_models() -> Response<BoxBody> {
    let ctx = RequestContext::new("models");
    ctx.json_response(
        StatusCode::OK,
        serde_json::json!({
            "object": "list",
            "data": [
                { "id": "mock-gpt-fast", "object": "model" },
                { "id": "mock-gpt-large", "object": "model" },
            ],
        }),
    )
}

/// Read-only sums for the path's api_key (§4.3). Bearer auth is required
/// per §6's endpoint table, but the spec does not require the bearer
/// identity to match the path segment — an operator token reading another
/// key's usage is an authorization policy outside this core's scope.
async fn handle_usage(
    req: &Request<Incoming>,
    state: AppState,
    api_key: &str,
) -> Response<BoxBody> {
    let ctx = RequestContext::new("usage");

    if let Err(e) = extract_api_key(req) {
        return ctx.error_response(&e);
    }

    if api_key.is_empty() {
        return ctx.error_response(&AdmitError::InvalidRequest(
            "api key must not be empty".to_string(),
        ));
    }

    match state.engine.usage(api_key).await {
        Ok(snapshot) => ctx.json_response(
            StatusCode::OK,
            serde_json::json!({
                "api_key": api_key,
                "input_tokens_used": snapshot.input_tokens_used,
                "output_tokens_used": snapshot.output_tokens_used,
                "requests_used": snapshot.requests_used,
                "window_seconds": state.engine.window_seconds(),
            }),
        ),
        Err(e) => ctx.error_response(&e),
    }
}

#![forbid(unsafe_code)]

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use deepcheck_os::workflow::MAX_UPLOAD_BYTES;
use serde::Serialize;

use crate::{
    AdapterFailure, AdapterHealthResponse, AdapterRuntime, AuthAdapterRequest,
    VerifyAdapterRequest, SESSION_TOKEN_HEADER,
};

/// Largest accepted request body: a base64-encoded `MAX_UPLOAD_BYTES` image
/// plus room for the filename and JSON framing.
pub const MAX_REQUEST_BODY_BYTES: usize = MAX_UPLOAD_BYTES.div_ceil(3) * 4 + 64 * 1024;

pub type SharedRuntime = Arc<AdapterRuntime>;

pub fn router(runtime: SharedRuntime) -> Router {
    router_with_body_limit(runtime, MAX_REQUEST_BODY_BYTES)
}

pub fn router_with_body_limit(runtime: SharedRuntime, body_limit: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/auth/signup", post(sign_up))
        .route("/v1/auth/login", post(log_in))
        .route("/v1/auth/logout", post(log_out))
        .route("/v1/session", get(session))
        .route("/v1/session/ready", post(complete_loading))
        .route("/v1/verify", post(verify))
        .route("/v1/history", get(history).delete(clear_history))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(runtime)
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn respond<T: Serialize>(result: Result<T, AdapterFailure>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(failure) => failure_response(&failure),
    }
}

fn failure_response(failure: &AdapterFailure) -> Response {
    let status =
        StatusCode::from_u16(failure.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(failure.to_response())).into_response()
}

/// Body extraction failures keep the JSON error shape of every other failure.
fn rejection_failure(rejection: JsonRejection) -> AdapterFailure {
    let status = rejection.status();
    let outcome = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "PAYLOAD_TOO_LARGE"
    } else {
        "INVALID_REQUEST"
    };
    log::warn!("request body rejected: {status} {}", rejection.body_text());
    AdapterFailure {
        http_status: status.as_u16(),
        outcome,
        reason: rejection.body_text(),
    }
}

fn join_failure(err: tokio::task::JoinError) -> AdapterFailure {
    AdapterFailure {
        http_status: 500,
        outcome: "STORAGE_IO",
        reason: format!("worker task failed: {err}"),
    }
}

async fn healthz(State(runtime): State<SharedRuntime>) -> Response {
    match runtime.health_report() {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(reason) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AdapterHealthResponse {
                status: "error".to_string(),
                outcome: "UNHEALTHY".to_string(),
                reason: Some(reason),
                backbone: None,
                account_count: None,
                active_sessions: None,
            }),
        )
            .into_response(),
    }
}

async fn sign_up(
    State(runtime): State<SharedRuntime>,
    payload: Result<Json<AuthAdapterRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return failure_response(&rejection_failure(rejection)),
    };
    let result = tokio::task::spawn_blocking(move || runtime.sign_up(request)).await;
    respond(result.map_err(join_failure).and_then(|r| r))
}

async fn log_in(
    State(runtime): State<SharedRuntime>,
    payload: Result<Json<AuthAdapterRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return failure_response(&rejection_failure(rejection)),
    };
    let result = tokio::task::spawn_blocking(move || runtime.log_in(request)).await;
    respond(result.map_err(join_failure).and_then(|r| r))
}

async fn log_out(State(runtime): State<SharedRuntime>, headers: HeaderMap) -> Response {
    respond(runtime.log_out(session_token(&headers).as_deref()))
}

async fn session(State(runtime): State<SharedRuntime>, headers: HeaderMap) -> Response {
    respond(runtime.session_report(session_token(&headers).as_deref()))
}

async fn complete_loading(State(runtime): State<SharedRuntime>, headers: HeaderMap) -> Response {
    let token = session_token(&headers);
    let result =
        tokio::task::spawn_blocking(move || runtime.complete_loading(token.as_deref())).await;
    respond(result.map_err(join_failure).and_then(|r| r))
}

async fn verify(
    State(runtime): State<SharedRuntime>,
    headers: HeaderMap,
    payload: Result<Json<VerifyAdapterRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => return failure_response(&rejection_failure(rejection)),
    };
    let token = session_token(&headers);
    let result =
        tokio::task::spawn_blocking(move || runtime.verify(token.as_deref(), request)).await;
    respond(result.map_err(join_failure).and_then(|r| r))
}

async fn history(State(runtime): State<SharedRuntime>, headers: HeaderMap) -> Response {
    respond(runtime.recent_history(session_token(&headers).as_deref()))
}

async fn clear_history(State(runtime): State<SharedRuntime>, headers: HeaderMap) -> Response {
    let token = session_token(&headers);
    let result =
        tokio::task::spawn_blocking(move || runtime.clear_history(token.as_deref())).await;
    respond(result.map_err(join_failure).and_then(|r| r))
}

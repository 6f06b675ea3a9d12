// src/auth.rs

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

pub const API_KEY_ENV: &str = "GRADER_API_KEY";

/// Bearer key guarding the grading routes. Read once at startup.
#[derive(Debug, Clone, Default)]
pub struct ApiKey(pub Option<Arc<str>>);

impl ApiKey {
    pub fn from_env() -> Self {
        Self(
            std::env::var(API_KEY_ENV)
                .ok()
                .filter(|k| !k.is_empty())
                .map(Arc::from),
        )
    }
}

pub async fn api_key_auth(
    State(key): State<ApiKey>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = key.0 else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "ok": false,
                "error": "API key not configured"
            })),
        )
            .into_response();
    };

    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match auth_header.and_then(|v| v.strip_prefix("Bearer ")) {
        Some(token) if token == &*expected => next.run(req).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok": false,
                "error": "Unauthorized"
            })),
        )
            .into_response(),
    }
}

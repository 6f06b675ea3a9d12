// src/server.rs

use crate::auth::{api_key_auth, ApiKey};
use crate::challenge::{Catalog, Challenge};
use crate::config::Config;
use crate::engine::events::GradingEvent;
use crate::engine::{GradeReport, Grader};
use crate::preview::{content_security_policy, render_preview};
use crate::runner::build_grader;
use crate::sinks::collecting::CollectingEventSink;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Span;

/// Shared by every handler.
#[derive(Clone)]
pub struct ServerCtx {
    pub catalog: Arc<Catalog>,
    pub grader: Grader,
}

/* ---------------- server ---------------- */

pub async fn serve(addr: &str, cfg: Config) -> anyhow::Result<()> {
    let ctx = ServerCtx {
        catalog: Arc::new(Catalog::resolve(cfg.catalog.dir.as_deref())?),
        grader: build_grader(&cfg),
    };
    let key = ApiKey::from_env();
    if key.0.is_none() {
        tracing::warn!("GRADER_API_KEY not set; grading routes will answer 500");
    }

    let app = build_router(ctx, key);

    let socket: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(socket).await?;

    tracing::info!("grader listening on http://{}", socket);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(ctx: ServerCtx, key: ApiKey) -> Router {
    let protected = Router::new()
        .route("/grade", post(grade))
        .route("/preview", post(preview))
        .layer(middleware::from_fn_with_state(key, api_key_auth));

    Router::new()
        .route("/health", get(health))
        .route("/challenges", get(list_challenges))
        .route("/challenges/:id", get(get_challenge))
        .merge(protected)
        .with_state(ctx)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<Body>| {
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        path = %req.uri().path(),
                    )
                })
                .on_response(|res: &Response, latency: Duration, _span: &Span| {
                    tracing::info!(
                        status = res.status().as_u16(),
                        latency_ms = latency.as_millis(),
                        "request completed"
                    );
                }),
        )
}

/* ---------------- request models ---------------- */

/// Either a catalog id or an inline challenge definition.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeRequest {
    #[serde(default, alias = "challenge_id")]
    challenge_id: Option<String>,
    #[serde(default)]
    challenge: Option<Challenge>,
    source: String,
}

#[derive(Debug, Serialize)]
struct GradeResponse {
    report: GradeReport,
    events: Vec<GradingEvent>,
}

#[derive(Debug, Deserialize)]
struct PreviewRequest {
    source: String,
    #[serde(default)]
    title: Option<String>,
}

/* ---------------- endpoints ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn list_challenges(State(ctx): State<ServerCtx>) -> Json<Vec<Challenge>> {
    Json(ctx.catalog.all().to_vec())
}

async fn get_challenge(State(ctx): State<ServerCtx>, Path(id): Path<String>) -> Response {
    match ctx.catalog.get(&id) {
        Some(c) => Json(c.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("Challenge '{}' not found", id)),
    }
}

async fn grade(State(ctx): State<ServerCtx>, Json(req): Json<GradeRequest>) -> Response {
    let challenge = match (req.challenge, req.challenge_id) {
        (Some(inline), _) => inline,
        (None, Some(id)) => match ctx.catalog.get(&id) {
            Some(c) => c.clone(),
            None => {
                return error(StatusCode::NOT_FOUND, format!("Challenge '{}' not found", id))
            }
        },
        (None, None) => {
            return error(
                StatusCode::BAD_REQUEST,
                "Either challengeId or challenge is required",
            )
        }
    };

    let mut sink = CollectingEventSink::new();
    let report = ctx.grader.run(&req.source, &challenge, &mut sink).await;

    (
        StatusCode::OK,
        Json(GradeResponse {
            report,
            events: sink.into_events(),
        }),
    )
        .into_response()
}

async fn preview(Json(req): Json<PreviewRequest>) -> Response {
    let title = req.title.as_deref().unwrap_or("Submission");
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CONTENT_SECURITY_POLICY, content_security_policy()),
        ],
        render_preview(&req.source, title),
    )
        .into_response()
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "ok": false,
            "error": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GradingConfig;
    use crate::engine::rules::JsValue;
    use crate::sandbox::testing::ScriptedEngine;
    use axum::http::HeaderValue;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(engine: ScriptedEngine, key: Option<&str>) -> Router {
        let ctx = ServerCtx {
            catalog: Arc::new(Catalog::builtin()),
            grader: Grader::new(Arc::new(engine), &GradingConfig::default()),
        };
        build_router(ctx, ApiKey(key.map(Arc::from)))
    }

    fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(res: Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_and_catalog_are_public() {
        let app = app(ScriptedEngine::unused(), None);

        let res = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(Request::get("/challenges").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let list = body_json(res).await;
        assert!(list.as_array().unwrap().iter().any(|c| c["id"] == "array-sum"));

        let res = app
            .oneshot(Request::get("/challenges/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn grading_requires_a_configured_key() {
        let body = json!({ "challenge_id": "array-sum", "source": "" });

        let res = app(ScriptedEngine::unused(), None)
            .oneshot(post_json("/grade", body.clone(), Some("k")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let res = app(ScriptedEngine::unused(), Some("k"))
            .oneshot(post_json("/grade", body, Some("wrong")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn grades_a_catalog_challenge() {
        let engine = ScriptedEngine::returning(&[("solution([1,2,3])", JsValue::Number(6.0))]);
        let res = app(engine, Some("k"))
            .oneshot(post_json(
                "/grade",
                json!({
                    "challengeId": "array-sum",
                    "source": "function solution(a) { return a.reduce((x, y) => x + y, 0); }"
                }),
                Some("k"),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        assert_eq!(v["report"]["score"], 100);
        assert_eq!(v["report"]["challengeId"], "array-sum");
        assert!(v["report"]["runId"].as_str().unwrap().starts_with("run_"));
        assert!(v["events"][0]["runId"].is_string());
        assert_eq!(v["report"]["results"][0]["passed"], true);
        let kinds: Vec<&str> = v["events"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["kind"].as_str().unwrap())
            .collect();
        assert_eq!(kinds.first(), Some(&"RunCreated"));
        assert_eq!(kinds.last(), Some(&"RunFinished"));
    }

    #[tokio::test]
    async fn grades_an_inline_challenge() {
        let res = app(ScriptedEngine::unused(), Some("k"))
            .oneshot(post_json(
                "/grade",
                json!({
                    "challenge": {
                        "id": "inline",
                        "title": "Inline",
                        "category": "HTML & CSS",
                        "points": 10,
                        "testCases": [{ "name": "Footer exists" }]
                    },
                    "source": "<p>no footer</p>"
                }),
                Some("k"),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let v = body_json(res).await;
        assert_eq!(v["report"]["results"][0]["message"], "No <footer> element found");
        assert_eq!(v["report"]["score"], 0);
    }

    #[tokio::test]
    async fn grade_rejects_missing_or_unknown_challenge() {
        let res = app(ScriptedEngine::unused(), Some("k"))
            .oneshot(post_json("/grade", json!({ "source": "" }), Some("k")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app(ScriptedEngine::unused(), Some("k"))
            .oneshot(post_json(
                "/grade",
                json!({ "challenge_id": "nope", "source": "" }),
                Some("k"),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preview_is_served_with_a_sandbox_policy() {
        let res = app(ScriptedEngine::unused(), Some("k"))
            .oneshot(post_json(
                "/preview",
                json!({ "source": "<script>alert(1)</script>" }),
                Some("k"),
            ))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get(header::CONTENT_SECURITY_POLICY),
            Some(&HeaderValue::from_static("sandbox allow-scripts allow-modals"))
        );
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(page.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!page.contains("<script>alert(1)"));
    }
}

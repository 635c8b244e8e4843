//! HTTP chat endpoint.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Answer one question → `{ answer, sources }` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Request
//!
//! ```json
//! { "message": "tell me about lv bags", "top_k": 5,
//!   "enabled": "all", "disabled": ["none"], "resource_types": "shopping,news",
//!   "keyword_id": null, "keyword_name": null }
//! ```
//!
//! `enabled`, `disabled` and `resource_types` accept either a
//! comma-separated string or an array of strings.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unavailable", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `generation_failed` (502),
//! `unavailable` (503), `internal` (500). A refusal is not an error: it is
//! a 200 with the refusal text and no sources.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! chat widgets.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use campaign_rag_core::engine::{Engine, EngineError};
use campaign_rag_core::generate::GenerationError;

use crate::chat::{build_engine, QueryInput};
use crate::config::Config;

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    config: Arc<Config>,
}

/// Build the engine and serve on `[server].bind` until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(build_engine(config).await?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "chat server listening");
    eprintln!("Chat server listening on http://{}", config.server.bind);
    axum::serve(listener, router(engine, Arc::new(config.clone()))).await?;
    Ok(())
}

/// The application router, without a listener.
pub fn router(engine: Arc<Engine>, config: Arc<Config>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { engine, config })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        error!(error = %err, "chat request failed");
        match err {
            EngineError::Generation(GenerationError::Fatal(msg)) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "generation_failed",
                message: format!("The answer service rejected the request: {}", msg),
            },
            EngineError::Generation(_) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "unavailable",
                message: "The answer service is temporarily unavailable. Please try again shortly."
                    .to_string(),
            },
            EngineError::Store(_) | EngineError::Embedding(_) => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal",
                message: "Internal error while retrieving campaign content.".to_string(),
            },
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/chat ============

/// A list given as `"a, b"` or `["a", "b"]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListParam {
    One(String),
    Many(Vec<String>),
}

impl ListParam {
    fn into_vec(self) -> Vec<String> {
        match self {
            ListParam::One(s) => vec![s],
            ListParam::Many(v) => v,
        }
    }
}

fn list(param: Option<ListParam>) -> Vec<String> {
    param.map(ListParam::into_vec).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    enabled: Option<ListParam>,
    #[serde(default)]
    disabled: Option<ListParam>,
    #[serde(default)]
    resource_types: Option<ListParam>,
    #[serde(default)]
    keyword_id: Option<String>,
    #[serde(default)]
    keyword_name: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    sources: Vec<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let query = QueryInput {
        message: req.message,
        top_k: req.top_k,
        enabled: list(req.enabled),
        disabled: list(req.disabled),
        resource_types: list(req.resource_types),
        keyword_id: req.keyword_id,
        keyword_name: req.keyword_name,
    }
    .into_query(&state.config);

    let answer = state.engine.answer_query(&query).await?;
    Ok(Json(ChatResponse {
        answer: answer.text,
        sources: answer.sources,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_param_accepts_string_or_array() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"message": "hi", "enabled": "lv, kusama", "disabled": ["none"]}"#,
        )
        .unwrap();
        assert_eq!(list(req.enabled), vec!["lv, kusama"]);
        assert_eq!(list(req.disabled), vec!["none"]);
        assert!(list(req.resource_types).is_empty());
    }

    #[test]
    fn test_error_status_mapping() {
        let e: AppError = EngineError::Generation(GenerationError::Unavailable("x".into())).into();
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
        let e: AppError = EngineError::Generation(GenerationError::RateLimited("x".into())).into();
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
        let e: AppError = EngineError::Generation(GenerationError::Fatal("x".into())).into();
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
        let e: AppError = EngineError::Store(anyhow::anyhow!("db")).into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

// HTTP server module
// Thin JSON shim over the chat service: POST /chat, GET /health, GET /


use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::agent::ChatService;
use crate::config::ServerConfig;

const PROCESSING_ERROR: &str = "I encountered an error processing your request.";
const EXECUTOR_MISSING: &str = "Agent executor is not initialized. Please check backend logs.";

/// Shared state of the HTTP handlers
#[derive(Debug)]
pub struct AppState {
    /// Locked for the whole of `ask`, so conversation memory sees one question at a time
    service: Arc<Mutex<ChatService>>,
    /// Fixed at construction; read without the lock so health checks never wait on a chat
    chatbot_ready: bool,
    agent_executor_ready: bool,
}

impl AppState {
    #[inline]
    pub fn new(service: ChatService) -> Self {
        Self {
            chatbot_ready: service.is_ready(),
            agent_executor_ready: service.agent_executor_ready(),
            service: Arc::new(Mutex::new(service)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub chatbot_ready: bool,
    pub agent_executor_ready: bool,
    pub timestamp: String,
}

/// Build the application router with CORS and request tracing
#[inline]
pub fn router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .layer(build_cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to the configured address and serve until the process is stopped
#[inline]
pub async fn run(state: Arc<AppState>, config: &ServerConfig) -> Result<()> {
    let app = router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("HTTP server terminated unexpectedly")
}

fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {}: {}", origin, e);
                None
            }
        })
        .collect::<Vec<_>>();

    // Wildcards are not allowed together with credentials, so methods and headers are mirrored
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "LAMA Retail AI Backend API",
        "endpoints": {
            "chat": "POST /chat",
            "health": "GET /health"
        },
        "status": "running"
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    let ready = state.chatbot_ready;

    Json(HealthReport {
        status: if ready { "healthy" } else { "degraded" }.to_string(),
        chatbot_ready: ready,
        agent_executor_ready: state.agent_executor_ready,
        timestamp: chrono::Local::now().to_rfc3339(),
    })
}

async fn chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            error!("Error in /chat endpoint: {}", rejection.body_text());
            return Json(json!({
                "error": rejection.body_text(),
                "response": PROCESSING_ERROR,
            }))
            .into_response();
        }
    };

    let message = body.message.unwrap_or_default();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Empty message" })),
        )
            .into_response();
    }

    info!("Received: {}", preview(&message));

    if state.chatbot_ready && !state.agent_executor_ready {
        error!("Agent executor is missing");
        return Json(ChatReply {
            response: EXECUTOR_MISSING.to_string(),
        })
        .into_response();
    }

    // Provider calls block, so the answer is produced off the async workers
    let mut service = Arc::clone(&state.service).lock_owned().await;
    let runtime = Handle::current();
    let answer =
        tokio::task::spawn_blocking(move || runtime.block_on(service.ask(&message))).await;

    let response = match answer {
        Ok(response) => response,
        Err(e) => {
            error!("Chat task failed: {}", e);
            return Json(json!({
                "error": e.to_string(),
                "response": PROCESSING_ERROR,
            }))
            .into_response();
        }
    };
    info!("Response: {}", preview(&response));

    Json(ChatReply { response }).into_response()
}

/// First 50 characters, for logs
fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(50).collect();
    if text.chars().count() > 50 {
        preview.push_str("...");
    }
    preview
}

//! HTTP gateway for SupportDesk.
//!
//! A JSON surface over the session manager:
//!
//! - `GET    /health`             liveness plus index and session counts
//! - `POST   /v1/chat`            one user message in, one agent reply out
//! - `DELETE /v1/sessions/{id}`   end a session early
//! - `GET    /v1/tickets`         the ticket log
//!
//! Built on Axum; every route is traced through `tower-http`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::{
    Router,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use supportdesk_agent::{AgentReply, SessionManager};
use supportdesk_config::{AppConfig, GatewayConfig};
use supportdesk_core::ticket::Ticket;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

/// Largest accepted request body.
const BODY_LIMIT: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub sessions: Arc<SessionManager>,
}

pub type SharedState = Arc<GatewayState>;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Omit to start a new session
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub reply: AgentReply,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TicketList {
    pub count: usize,
    pub tickets: Vec<Ticket>,
}

/// An error rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Build the router with all gateway routes.
pub fn build_router(state: SharedState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/chat", post(chat_handler))
        .route("/v1/sessions/{id}", delete(end_session_handler))
        .route("/v1/tickets", get(tickets_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors_layer(config))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Same-origin CORS for the configured listen address.
fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let origin = format!("http://{}:{}", config.host, config.port);
    match HeaderValue::from_str(&origin) {
        Ok(origin) => cors.allow_origin(AllowOrigin::exact(origin)),
        Err(e) => {
            warn!(origin = %origin, error = %e, "Invalid CORS origin; cross-origin requests disabled");
            cors
        }
    }
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let agent = supportdesk_agent::build_agent(&config)?;
    let sessions = supportdesk_agent::start_sessions(agent, &config);
    serve(&config.gateway, sessions).await
}

/// Serve an already-built session manager until the process is stopped.
pub async fn serve(
    config: &GatewayConfig,
    sessions: Arc<SessionManager>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(Arc::new(GatewayState { sessions }), config);

    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// --- Handlers ---

async fn health_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let agent = state.sessions.agent();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "knowledge_chunks": agent.tools().retriever().store().len(),
        "active_sessions": state.sessions.len().await,
    }))
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "message must not be empty"));
    }
    let session_id = request.session_id.as_deref().filter(|id| !id.trim().is_empty());

    match state.sessions.chat(session_id, message).await {
        Ok((session_id, reply)) => Ok(Json(ChatResponse { session_id, reply })),
        Err(e) => {
            error!(error = %e, "Chat turn failed");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "The support desk hit an internal error; this session has been closed.",
            ))
        }
    }
}

async fn end_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.end(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(StatusCode::NOT_FOUND, format!("no session {id}")))
    }
}

async fn tickets_handler(State(state): State<SharedState>) -> Result<Json<TicketList>, ApiError> {
    let tickets = state
        .sessions
        .agent()
        .tools()
        .ticket_log()
        .list()
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(TicketList {
        count: tickets.len(),
        tickets,
    }))
}

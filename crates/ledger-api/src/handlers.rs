//! Route handler functions for all API endpoints.

use std::collections::BTreeMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::page::CHAT_HTML;
use crate::render::markdown_to_html;
use crate::session;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

/// Request body for POST /chat.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

/// Response for POST /chat.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The answer rendered from Markdown to HTML.
    pub html: String,
}

/// Response for POST /clear.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub status: String,
}

/// Response for GET /health.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Row count per loaded table.
    pub tables: BTreeMap<String, usize>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET / - start a fresh conversation and serve the chat page.
pub async fn index(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Html<&'static str>, ApiError> {
    if let Some(previous) = session::current_session(&cookies) {
        state.orchestrator.clear_session(previous)?;
    }
    let session_id = session::issue_session(&cookies);
    debug!(%session_id, "New chat session");
    Ok(Html(CHAT_HTML))
}

/// POST /chat - answer one message within the caller's session.
pub async fn chat(
    State(state): State<AppState>,
    cookies: Cookies,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(body) = payload?;
    let session_id = session::ensure_session(&cookies);

    let reply = state
        .orchestrator
        .handle_message(&body.message, session_id)
        .await?;

    Ok(Json(ChatResponse {
        html: markdown_to_html(&reply.answer),
    }))
}

/// POST /clear - forget the caller's conversation memory.
pub async fn clear(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<ClearResponse>, ApiError> {
    if let Some(session_id) = session::current_session(&cookies) {
        state.orchestrator.clear_session(session_id)?;
        info!(%session_id, "Chat cleared");
    }
    Ok(Json(ClearResponse {
        status: "cleared".to_string(),
    }))
}

/// GET /health - liveness plus loaded table sizes.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let tables = state
        .orchestrator
        .store()
        .row_counts()
        .into_iter()
        .map(|(name, rows)| (name.to_string(), rows))
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        tables,
    })
}

//! Router setup with all routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use ledger_core::config::ServerConfig;
use ledger_core::error::LedgerError;

use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;

    // Same-origin page plus the localhost alias of the bound port.
    let origins: Vec<HeaderValue> = [
        format!("http://{}:{}", server.host, server.port),
        format!("http://localhost:{}", server.port),
    ]
    .iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    let body_limit = server.max_body_bytes;

    Router::new()
        .route("/", get(handlers::index))
        .route("/chat", post(handlers::chat))
        .route("/clear", post(handlers::clear))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind the configured address and serve until shutdown.
pub async fn start_server(server: &ServerConfig, state: AppState) -> Result<(), LedgerError> {
    let addr = format!("{}:{}", server.host, server.port);
    let router = create_router(state);

    tracing::info!("Starting chat server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LedgerError::Config(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .await
        .map_err(LedgerError::Io)?;

    Ok(())
}

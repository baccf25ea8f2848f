//! Ledger API crate - axum HTTP server for the CRM chat assistant.
//!
//! Serves the embedded chat page, the chat and clear endpoints (session
//! tracked by cookie), and a health check.

pub mod error;
pub mod handlers;
pub mod page;
pub mod render;
pub mod routes;
pub mod session;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;

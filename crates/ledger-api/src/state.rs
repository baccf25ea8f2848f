//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use ledger_chat::ChatOrchestrator;
use ledger_core::config::LedgerConfig;

/// Shared application state.
///
/// Cloned per request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Chat engine, including the table store and session memory.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Application configuration (read-only after startup).
    pub config: Arc<LedgerConfig>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(orchestrator: ChatOrchestrator, config: LedgerConfig) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

//! Ledger application binary - composition root.
//!
//! `ledger serve` (the default):
//! 1. Load configuration from TOML
//! 2. Open the SQLite database read-only and load the five CRM tables
//! 3. Build the completion client and chat orchestrator
//! 4. Start the axum HTTP server
//!
//! `ledger import` replaces the CRM tables from CSV exports.

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::Subscriber;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

use ledger_api::routes;
use ledger_api::state::AppState;
use ledger_chat::{ChatOrchestrator, OpenAiClient};
use ledger_core::config::LedgerConfig;
use ledger_storage::{import_csv_dir, preview, Database, TableStore};

use cli::{CliArgs, Command, ImportArgs};

/// Rows of `accounts` logged after an import.
const PREVIEW_ROWS: usize = 5;

async fn serve(
    args: &CliArgs,
    mut config: LedgerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    config.server.port = args.resolve_port(config.server.port);
    let db_path = args.resolve_db(&config.general.database_path);

    // The table store is required; refuse to start without it.
    let db = Database::open_existing(&db_path).map_err(|e| {
        tracing::error!(path = %db_path.display(), error = %e, "Cannot open CRM database");
        e
    })?;
    let store = TableStore::load(&db).map_err(|e| {
        tracing::error!(error = %e, "Cannot load CRM tables");
        e
    })?;
    drop(db);

    let llm = OpenAiClient::from_env(&config.llm)?;
    tracing::info!(
        endpoint = llm.endpoint(),
        model = %config.llm.model,
        "Completion client ready"
    );

    let orchestrator =
        ChatOrchestrator::new(Arc::new(store), Arc::new(llm), &config.llm, &config.chat);
    let server = config.server.clone();
    let state = AppState::new(orchestrator, config);

    routes::start_server(&server, state).await?;
    Ok(())
}

fn import(
    args: &CliArgs,
    import: &ImportArgs,
    config: &LedgerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let csv_dir = import
        .csv_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.import.csv_dir));
    let db_path = args.resolve_db(&config.general.database_path);

    let db = Database::open(&db_path)?;
    let report = import_csv_dir(&db, &csv_dir)?;
    tracing::info!(
        tables = report.tables.len(),
        rows = report.total_rows(),
        db = %db_path.display(),
        "Import complete"
    );

    let accounts = preview(&db, "accounts", PREVIEW_ROWS)?;
    tracing::info!("Preview of accounts:\n{}", accounts.render_text());
    Ok(())
}

/// Reload handle for the active log filter.
type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Build the fmt subscriber with a filter that can be swapped once the
/// config file has been read.
fn build_subscriber<W>(
    filter: EnvFilter,
    writer: W,
) -> (impl Subscriber + Send + Sync + 'static, FilterHandle)
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer));
    (subscriber, handle)
}

/// Load the config file with tracing already running, then apply its log
/// level unless `RUST_LOG` set the filter.
fn load_config(
    args: &CliArgs,
    path: &Path,
    env_filter: bool,
    filter: &FilterHandle,
) -> Result<LedgerConfig, reload::Error> {
    let config = LedgerConfig::load_or_default(path);
    if !env_filter {
        let level = args.resolve_log_level(&config.general.log_level);
        filter.reload(EnvFilter::new(level))?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Tracing starts before the config is read so load failures are reported.
    let from_env = EnvFilter::try_from_default_env().ok();
    let env_filter = from_env.is_some();
    let initial = from_env.unwrap_or_else(|| EnvFilter::new(args.bootstrap_log_level()));
    let (subscriber, filter) = build_subscriber(initial, std::io::stdout);
    subscriber.init();

    tracing::info!("Starting Ledger v{}", env!("CARGO_PKG_VERSION"));

    let config_file = args.resolve_config_path();
    let config = load_config(&args, &config_file, env_filter, &filter)?;

    match args.command {
        Some(Command::Import(ref import_args)) => import(&args, import_args, &config),
        Some(Command::Serve(_)) | None => serve(&args, config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use ledger_core::config::ServerConfig;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture() -> (Captured, impl Fn() -> Captured + Send + Sync + 'static) {
        let captured = Captured::default();
        let writer = captured.clone();
        (captured, move || writer.clone())
    }

    #[test]
    fn test_malformed_config_warning_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        let (captured, writer) = capture();
        let (subscriber, handle) = build_subscriber(EnvFilter::new("info"), writer);
        let args = CliArgs::parse_from(["ledger"]);

        let config = tracing::subscriber::with_default(subscriber, || {
            load_config(&args, &path, false, &handle)
        })
        .unwrap();

        assert_eq!(config.server.port, ServerConfig::default().port);
        let logs = captured.text();
        assert!(logs.contains("Failed to load config"), "logs: {logs}");
        assert!(logs.contains("Using defaults"));
    }

    #[test]
    fn test_config_log_level_applied_after_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(&path, "[general]\nlog_level = \"warn\"\n").unwrap();

        let (captured, writer) = capture();
        let (subscriber, handle) = build_subscriber(EnvFilter::new("info"), writer);
        let args = CliArgs::parse_from(["ledger"]);

        tracing::subscriber::with_default(subscriber, || {
            load_config(&args, &path, false, &handle).unwrap();
            tracing::info!("suppressed after reload");
            tracing::warn!("visible after reload");
        });

        let logs = captured.text();
        assert!(!logs.contains("suppressed after reload"));
        assert!(logs.contains("visible after reload"));
    }

    #[test]
    fn test_env_filter_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(&path, "[general]\nlog_level = \"error\"\n").unwrap();

        let (captured, writer) = capture();
        let (subscriber, handle) = build_subscriber(EnvFilter::new("info"), writer);
        let args = CliArgs::parse_from(["ledger"]);

        tracing::subscriber::with_default(subscriber, || {
            load_config(&args, &path, true, &handle).unwrap();
            tracing::info!("kept at info");
        });

        assert!(captured.text().contains("kept at info"));
    }
}

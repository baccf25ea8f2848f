//! CLI argument definitions for the Ledger application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Ledger - a chat assistant that answers questions from a CRM dataset.
#[derive(Parser, Debug)]
#[command(name = "ledger", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database holding the CRM tables.
    #[arg(short = 'd', long = "db", global = true)]
    pub db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the chat UI and API (default).
    Serve(ServeArgs),
    /// Load the CRM CSV files into the database, replacing existing tables.
    Import(ImportArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// HTTP server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub struct ImportArgs {
    /// Directory containing accounts.csv, products.csv, sales_teams.csv,
    /// sales_pipeline.csv and interactions.csv.
    #[arg(long = "csv-dir")]
    pub csv_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > LEDGER_CONFIG env var > ./ledger.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("LEDGER_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("ledger.toml")
    }

    /// Resolve the database path.
    ///
    /// Priority: --db flag > LEDGER_DB env var > config file value.
    pub fn resolve_db(&self, config_path: &str) -> PathBuf {
        if let Some(ref p) = self.db {
            return p.clone();
        }
        if let Ok(p) = std::env::var("LEDGER_DB") {
            return PathBuf::from(p);
        }
        PathBuf::from(config_path)
    }

    /// Resolve the HTTP server port.
    ///
    /// Priority: --port flag > LEDGER_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(Command::Serve(ServeArgs { port: Some(p) })) = &self.command {
            return *p;
        }
        if let Ok(val) = std::env::var("LEDGER_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        config_port
    }

    /// Log level used before the config file has been read.
    pub fn bootstrap_log_level(&self) -> String {
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

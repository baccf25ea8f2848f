use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LedgerError, Result};

/// Top-level configuration for the Ledger application.
///
/// Loaded from `ledger.toml` by default. Each section corresponds to one
/// crate or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

impl LedgerConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LedgerConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| LedgerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// SQLite database holding the five CRM tables.
    pub database_path: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "ledger.db".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Remote language-model settings shared by the classifier and synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    /// Model name sent with every completion request.
    pub model: String,
    /// Environment variable holding the API credential.
    pub api_key_env: String,
    /// Token budget for intent classification.
    pub classify_max_tokens: u32,
    /// Token budget for answer synthesis.
    pub synthesis_max_tokens: u32,
    /// Sampling temperature for synthesis. `None` uses the service default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis_temperature: Option<f32>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            classify_max_tokens: 10,
            synthesis_max_tokens: 300,
            synthesis_temperature: None,
            timeout_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

/// Chat flow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum accepted message length in characters.
    pub max_message_length: usize,
    /// Number of turns kept in per-session memory.
    pub memory_turns: usize,
    /// Idle minutes after which a session's memory is dropped.
    pub session_timeout_minutes: u32,
    /// Answer returned when synthesis fails.
    pub apology_message: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: 2000,
            memory_turns: 10,
            session_timeout_minutes: 60,
            apology_message:
                "Sorry, I couldn't generate an answer right now. Please try again in a moment."
                    .to_string(),
        }
    }
}

/// CSV import settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Directory containing the five source CSV files.
    pub csv_dir: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            csv_dir: ".".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.general.database_path, "ledger.db");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.llm.classify_max_tokens, 10);
        assert_eq!(config.llm.synthesis_max_tokens, 300);
        assert!(config.llm.synthesis_temperature.is_none());
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.chat.memory_turns, 10);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
database_path = "/srv/crm/AmericanEquity.db"
log_level = "debug"

[server]
port = 8080

[llm]
model = "gpt-4o-mini"
max_retries = 5
synthesis_temperature = 0.3

[chat]
memory_turns = 4
"#;
        let file = create_temp_config(content);
        let config = LedgerConfig::load(file.path()).unwrap();
        assert_eq!(config.general.database_path, "/srv/crm/AmericanEquity.db");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_retries, 5);
        assert_eq!(config.llm.synthesis_temperature, Some(0.3));
        assert_eq!(config.llm.classify_max_tokens, 10);
        assert_eq!(config.chat.memory_turns, 4);
        assert_eq!(config.chat.max_message_length, 2000);
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        let file = create_temp_config("");
        let config = LedgerConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.import.csv_dir, ".");
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let file = create_temp_config("[server\nport = ");
        let err = LedgerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = LedgerConfig::load_or_default(Path::new("/nonexistent/ledger.toml"));
        assert_eq!(config.general.database_path, "ledger.db");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.toml");

        let mut config = LedgerConfig::default();
        config.server.port = 9191;
        config.chat.apology_message = "Try later.".to_string();
        config.save(&path).unwrap();

        let reloaded = LedgerConfig::load(&path).unwrap();
        assert_eq!(reloaded.server.port, 9191);
        assert_eq!(reloaded.chat.apology_message, "Try later.");
    }
}

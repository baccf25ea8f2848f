use thiserror::Error;

/// Top-level error type for the Ledger system.
///
/// Subsystem crates define their own error types and implement
/// `From<LedgerError>` where they wrap storage or configuration failures, so
/// that the `?` operator works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Table store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LedgerError {
    fn from(err: toml::ser::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

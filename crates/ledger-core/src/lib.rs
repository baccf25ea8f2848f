pub mod config;
pub mod error;
pub mod table;

pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use table::{Table, Value};

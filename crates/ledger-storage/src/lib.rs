//! Ledger Storage crate - SQLite access, the in-memory table store, CSV import.
//!
//! The chat service reads the five CRM tables once at startup through
//! [`TableStore::load`]. The import utility replaces those tables wholesale
//! from CSV exports.

pub mod db;
pub mod import;
pub mod store;

pub use db::Database;
pub use import::{import_csv_dir, import_csv_file, preview, ImportReport, ImportedTable};
pub use store::{read_table, read_table_head, TableKind, TableStore};

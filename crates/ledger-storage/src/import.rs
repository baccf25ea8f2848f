//! One-shot CSV → SQLite import.
//!
//! Each table is dropped and recreated from its CSV file, so running the
//! import twice leaves exactly one copy of the data.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rusqlite::types::Value as SqlValue;
use tracing::info;

use ledger_core::error::LedgerError;
use ledger_core::table::Table;

use crate::db::Database;
use crate::store::{quote_ident, read_table_head, TableKind};

/// Summary of one imported file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedTable {
    pub file: String,
    pub table: String,
    pub rows: usize,
    pub columns: usize,
}

/// Summary of a full import run.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub tables: Vec<ImportedTable>,
}

impl ImportReport {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// SQLite column affinity inferred from the CSV cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    Integer,
    Real,
    Text,
}

impl Affinity {
    fn sql(self) -> &'static str {
        match self {
            Affinity::Integer => "INTEGER",
            Affinity::Real => "REAL",
            Affinity::Text => "TEXT",
        }
    }
}

/// Import all five CRM CSV files from `csv_dir`.
pub fn import_csv_dir(db: &Database, csv_dir: &Path) -> Result<ImportReport, LedgerError> {
    let mut report = ImportReport::default();
    for kind in TableKind::ALL {
        let path = csv_dir.join(kind.csv_file());
        let imported = import_csv_file(db, &path, kind.table_name())?;
        info!(
            file = %imported.file,
            table = %imported.table,
            rows = imported.rows,
            "Imported {} into table {}",
            imported.file,
            imported.table
        );
        report.tables.push(imported);
    }
    Ok(report)
}

/// Replace `table` with the contents of the CSV file at `path`.
pub fn import_csv_file(
    db: &Database,
    path: &Path,
    table: &str,
) -> Result<ImportedTable, LedgerError> {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    if !path.is_file() {
        return Err(LedgerError::Import(format!("{} not found", path.display())));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| LedgerError::Import(format!("{}: {}", file, e)))?;

    let headers = reader
        .headers()
        .map_err(|e| LedgerError::Import(format!("{}: {}", file, e)))?;
    let columns = normalize_headers(headers.iter());
    if columns.is_empty() {
        return Err(LedgerError::Import(format!("{}: no header row", file)));
    }

    let mut records: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| LedgerError::Import(format!("{}: {}", file, e)))?;
        let mut cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        cells.resize(columns.len(), String::new());
        records.push(cells);
    }

    let affinities: Vec<Affinity> = (0..columns.len())
        .map(|i| infer_affinity(records.iter().map(|r| r[i].as_str())))
        .collect();

    let column_defs = columns
        .iter()
        .zip(&affinities)
        .map(|(c, a)| format!("{} {}", quote_ident(c), a.sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    let quoted = quote_ident(table);

    db.with_conn(|conn| {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {quoted};
             CREATE TABLE {quoted} ({column_defs});"
        ))
        .map_err(|e| LedgerError::Storage(format!("Failed to recreate {}: {}", table, e)))?;

        {
            let mut stmt = tx
                .prepare(&format!("INSERT INTO {quoted} VALUES ({placeholders})"))
                .map_err(|e| LedgerError::Storage(e.to_string()))?;
            for record in &records {
                let values = record
                    .iter()
                    .zip(&affinities)
                    .map(|(cell, affinity)| to_sql_value(cell, *affinity));
                stmt.execute(rusqlite::params_from_iter(values))
                    .map_err(|e| LedgerError::Storage(format!("Failed to insert row: {}", e)))?;
            }
        }

        tx.commit()
            .map_err(|e| LedgerError::Storage(e.to_string()))
    })?;

    Ok(ImportedTable {
        file,
        table: table.to_string(),
        rows: records.len(),
        columns: columns.len(),
    })
}

/// First `limit` rows of a table, for the post-import sanity check.
pub fn preview(db: &Database, table: &str, limit: usize) -> Result<Table, LedgerError> {
    db.with_conn(|conn| read_table_head(conn, table, limit))
}

/// Blank headers become `Unnamed: <i>`; duplicates get the first free
/// `.<n>` suffix. SQLite column names are case-insensitive, so uniqueness
/// is checked ignoring ASCII case.
fn normalize_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut next_suffix: HashMap<String, usize> = HashMap::new();
    headers
        .enumerate()
        .map(|(i, raw)| {
            let name = raw.trim_start_matches('\u{feff}').trim();
            let base = if name.is_empty() {
                format!("Unnamed: {}", i)
            } else {
                name.to_string()
            };
            let mut unique = base.clone();
            if used.contains(&unique.to_ascii_lowercase()) {
                let n = next_suffix.entry(base.to_ascii_lowercase()).or_insert(1);
                loop {
                    unique = format!("{}.{}", base, n);
                    *n += 1;
                    if !used.contains(&unique.to_ascii_lowercase()) {
                        break;
                    }
                }
            }
            used.insert(unique.to_ascii_lowercase());
            unique
        })
        .collect()
}

fn infer_affinity<'a>(cells: impl Iterator<Item = &'a str>) -> Affinity {
    let mut affinity: Option<Affinity> = None;
    for cell in cells.map(str::trim).filter(|c| !c.is_empty()) {
        let this = if cell.parse::<i64>().is_ok() {
            Affinity::Integer
        } else if cell.parse::<f64>().is_ok() {
            Affinity::Real
        } else {
            return Affinity::Text;
        };
        affinity = Some(match (affinity, this) {
            (Some(Affinity::Real), _) | (_, Affinity::Real) => Affinity::Real,
            _ => Affinity::Integer,
        });
    }
    affinity.unwrap_or(Affinity::Text)
}

fn to_sql_value(cell: &str, affinity: Affinity) -> SqlValue {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return SqlValue::Null;
    }
    match affinity {
        Affinity::Integer => trimmed
            .parse::<i64>()
            .map(SqlValue::Integer)
            .unwrap_or_else(|_| SqlValue::Text(cell.to_string())),
        Affinity::Real => trimmed
            .parse::<f64>()
            .map(SqlValue::Real)
            .unwrap_or_else(|_| SqlValue::Text(cell.to_string())),
        Affinity::Text => SqlValue::Text(cell.to_string()),
    }
}

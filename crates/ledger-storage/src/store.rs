//! Load-once, read-only store of the five CRM tables.

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::{debug, info};

use ledger_core::error::LedgerError;
use ledger_core::table::{Table, Value};

use crate::db::Database;

/// The five CRM tables, with their SQLite and CSV names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Accounts,
    Products,
    SalesTeams,
    Pipeline,
    Interactions,
}

impl TableKind {
    pub const ALL: [TableKind; 5] = [
        TableKind::Accounts,
        TableKind::Products,
        TableKind::SalesTeams,
        TableKind::Pipeline,
        TableKind::Interactions,
    ];

    /// SQLite table name.
    pub fn table_name(self) -> &'static str {
        match self {
            TableKind::Accounts => "accounts",
            TableKind::Products => "products",
            TableKind::SalesTeams => "sales_teams",
            TableKind::Pipeline => "sales_pipeline",
            TableKind::Interactions => "interactions",
        }
    }

    /// Source CSV file name used by the importer.
    pub fn csv_file(self) -> &'static str {
        match self {
            TableKind::Accounts => "accounts.csv",
            TableKind::Products => "products.csv",
            TableKind::SalesTeams => "sales_teams.csv",
            TableKind::Pipeline => "sales_pipeline.csv",
            TableKind::Interactions => "interactions.csv",
        }
    }

    /// Columns parsed as timestamps after load.
    fn datetime_columns(self) -> &'static [&'static str] {
        match self {
            TableKind::Pipeline => &["close_date", "engage_date"],
            TableKind::Interactions => &["timestamp"],
            _ => &[],
        }
    }
}

/// Immutable in-memory copy of the CRM dataset.
///
/// Built once at startup and shared behind an `Arc`; there is no refresh.
#[derive(Debug, Clone)]
pub struct TableStore {
    accounts: Table,
    products: Table,
    sales_teams: Table,
    pipeline: Table,
    interactions: Table,
}

impl TableStore {
    /// Read all five tables from the database.
    ///
    /// Any failure (missing table, unreadable file) is `StoreUnavailable`.
    pub fn load(db: &Database) -> Result<Self, LedgerError> {
        let tables = db.with_conn(|conn| {
            let mut tables = Vec::with_capacity(TableKind::ALL.len());
            for kind in TableKind::ALL {
                let table = read_table(conn, kind.table_name()).map_err(|e| {
                    LedgerError::StoreUnavailable(format!(
                        "failed to load table {}: {}",
                        kind.table_name(),
                        e
                    ))
                })?;
                debug!(table = kind.table_name(), rows = table.len(), "Table loaded");
                tables.push(table);
            }
            Ok(tables)
        })?;

        let [accounts, products, sales_teams, pipeline, interactions]: [Table; 5] =
            tables.try_into().map_err(|_| {
                LedgerError::StoreUnavailable("incomplete table set".to_string())
            })?;
        let store = Self::from_tables(accounts, products, sales_teams, pipeline, interactions);

        info!(
            accounts = store.accounts.len(),
            products = store.products.len(),
            sales_teams = store.sales_teams.len(),
            pipeline = store.pipeline.len(),
            interactions = store.interactions.len(),
            "Table store loaded"
        );

        Ok(store)
    }

    /// Build a store from already-materialised tables.
    ///
    /// Temporal columns are coerced the same way as on load.
    pub fn from_tables(
        accounts: Table,
        products: Table,
        sales_teams: Table,
        pipeline: Table,
        interactions: Table,
    ) -> Self {
        let mut store = Self {
            accounts,
            products,
            sales_teams,
            pipeline,
            interactions,
        };
        for kind in TableKind::ALL {
            let table = store.table_mut(kind);
            for column in kind.datetime_columns() {
                table.coerce_datetime_column(column);
            }
        }
        store
    }

    pub fn table(&self, kind: TableKind) -> &Table {
        match kind {
            TableKind::Accounts => &self.accounts,
            TableKind::Products => &self.products,
            TableKind::SalesTeams => &self.sales_teams,
            TableKind::Pipeline => &self.pipeline,
            TableKind::Interactions => &self.interactions,
        }
    }

    fn table_mut(&mut self, kind: TableKind) -> &mut Table {
        match kind {
            TableKind::Accounts => &mut self.accounts,
            TableKind::Products => &mut self.products,
            TableKind::SalesTeams => &mut self.sales_teams,
            TableKind::Pipeline => &mut self.pipeline,
            TableKind::Interactions => &mut self.interactions,
        }
    }

    pub fn accounts(&self) -> &Table {
        &self.accounts
    }

    pub fn products(&self) -> &Table {
        &self.products
    }

    pub fn sales_teams(&self) -> &Table {
        &self.sales_teams
    }

    pub fn pipeline(&self) -> &Table {
        &self.pipeline
    }

    pub fn interactions(&self) -> &Table {
        &self.interactions
    }

    /// Row count per table, keyed by SQLite table name.
    pub fn row_counts(&self) -> Vec<(&'static str, usize)> {
        TableKind::ALL
            .iter()
            .map(|kind| (kind.table_name(), self.table(*kind).len()))
            .collect()
    }
}

/// Read a whole table (`SELECT *`) into memory.
pub fn read_table(conn: &Connection, name: &str) -> Result<Table, LedgerError> {
    query_table(conn, name, None)
}

/// The first `limit` rows of a table, in rowid order.
pub fn read_table_head(conn: &Connection, name: &str, limit: usize) -> Result<Table, LedgerError> {
    query_table(conn, name, Some(limit))
}

fn query_table(conn: &Connection, name: &str, limit: Option<usize>) -> Result<Table, LedgerError> {
    // SQLite treats a negative LIMIT as no limit.
    let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
    let sql = format!("SELECT * FROM {} LIMIT ?1", quote_ident(name));
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let rows = stmt
        .query_map([limit], |row| {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(value_from_sql(row.get_ref(i)?));
            }
            Ok(cells)
        })
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

    let mut table = Table::new(name, columns);
    for row in rows {
        table.push_row(row.map_err(|e| LedgerError::Storage(e.to_string()))?);
    }
    Ok(table)
}

fn value_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Text(format!("<blob {} bytes>", bytes.len())),
    }
}

/// Quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

//! In-memory tabular data model.
//!
//! Tables are loaded once from SQLite and never mutated by the chat flow.
//! Lookups produce new tables holding cloned row subsets.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

// =============================================================================
// Value
// =============================================================================

/// A single loosely-typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    /// The cell's text, if it is a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The cell's timestamp, if it is a temporal cell.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert a text cell to a temporal cell.
    ///
    /// Unparseable text becomes `Null`. Cells that are already temporal or
    /// null are returned unchanged; numbers become `Null`.
    pub fn coerce_datetime(self) -> Value {
        match self {
            Value::Text(s) => parse_datetime(&s).map_or(Value::Null, Value::DateTime),
            Value::DateTime(_) | Value::Null => self,
            Value::Integer(_) | Value::Real(_) => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NaN"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => {
                if r.is_finite() && r.fract() == 0.0 && r.abs() < 1e15 {
                    write!(f, "{:.1}", r)
                } else {
                    write!(f, "{}", r)
                }
            }
            Value::Text(s) => f.write_str(&s.replace('\n', "\\n")),
            Value::DateTime(dt) => {
                if dt.time() == NaiveTime::MIN {
                    write!(f, "{}", dt.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S"))
                }
            }
        }
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse a timestamp in any of the formats the CRM exports use.
///
/// Offsets in RFC 3339 input are normalised to UTC.
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    None
}

// =============================================================================
// Table
// =============================================================================

/// A named table with ordered columns and rows.
///
/// Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Create a table from rows, padding short rows with `Null` and
    /// truncating long ones.
    pub fn with_rows(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut table = Self::new(name, columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, ignoring ASCII case as SQLite does. An exact
    /// match wins over a case-folded one.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))
    }

    /// A table with the same name and columns but no rows.
    pub fn empty_like(&self) -> Table {
        Table::new(self.name.clone(), self.columns.clone())
    }

    /// Rows for which `predicate` holds, in input order.
    pub fn filter<F>(&self, mut predicate: F) -> Table
    where
        F: FnMut(&[Value]) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|row| predicate(row.as_slice()))
            .cloned()
            .collect();
        Table {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Rows whose text in `column` equals `value` exactly.
    ///
    /// Returns an empty table if the column does not exist.
    pub fn filter_eq(&self, column: &str, value: &str) -> Table {
        match self.column_index(column) {
            Some(idx) => self.filter(|row| row[idx].as_text() == Some(value)),
            None => self.empty_like(),
        }
    }

    /// Stable sort by a temporal column, most recent first. Null and
    /// non-temporal cells sort last.
    pub fn sorted_by_datetime_desc(&self, column: &str) -> Table {
        let mut sorted = self.clone();
        if let Some(idx) = self.column_index(column) {
            sorted
                .rows
                .sort_by(|a, b| match (a[idx].as_datetime(), b[idx].as_datetime()) {
                    (Some(x), Some(y)) => y.cmp(&x),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                });
        }
        sorted
    }

    /// Parse every cell of `column` as a timestamp, coercing failures to
    /// `Null`. Returns false if the column does not exist.
    pub fn coerce_datetime_column(&mut self, column: &str) -> bool {
        let Some(idx) = self.column_index(column) else {
            return false;
        };
        for row in &mut self.rows {
            let cell = std::mem::replace(&mut row[idx], Value::Null);
            row[idx] = cell.coerce_datetime();
        }
        true
    }

    /// Plain-text rendering without a row index.
    ///
    /// One header line, then one line per row. Each column is right-aligned
    /// to its widest cell and columns are separated by two spaces.
    pub fn render_text(&self) -> String {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(col.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::with_capacity(cells.len() + 1);
        lines.push(format_line(self.columns.iter(), &widths));
        for row in &cells {
            lines.push(format_line(row.iter(), &widths));
        }
        lines.join("\n")
    }
}

fn format_line<'a>(values: impl Iterator<Item = &'a String>, widths: &[usize]) -> String {
    values
        .zip(widths)
        .map(|(v, w)| format!("{:>width$}", v, width = *w))
        .collect::<Vec<_>>()
        .join("  ")
}

//! Minimal tabular data model for catalog tables.
//!
//! VizieR serves every catalog as a set of named tables: ordered rows with
//! named columns. [`Table`] holds one of those tables in row-major order and
//! [`TableList`] holds the full set returned for one catalog identifier,
//! keyed by fully-qualified table name (e.g. `J/A+A/640/A1/table1`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while assembling a table
#[derive(Error, Debug, PartialEq)]
pub enum TableError {
    #[error("Row has {got} cells but the table has {expected} columns")]
    RowWidth { expected: usize, got: usize },

    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),
}

/// A single table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Parse a raw text cell, picking the narrowest representation.
    ///
    /// Empty cells become [`Value::Null`]. Non-finite float spellings such as
    /// `nan` or `inf` are kept as strings.
    pub fn parse_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => Value::Float(f),
            _ => Value::Str(trimmed.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell, if it holds a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Grouping key for this cell.
    ///
    /// Strings are compared with surrounding whitespace removed so that
    /// fixed-width catalog exports group the same way as trimmed ones.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Str(s) => Some(s.trim().to_string()),
        }
    }

    /// JSON rendering used when handing tables to the dashboard
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "--"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// Row-major table with named columns
///
/// Every row is exactly as wide as the header. Deserialization goes through
/// the same checks as [`Table::with_rows`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(try_from = "UncheckedTable")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Wire shape of [`Table`] before column and row checks
#[derive(Deserialize)]
struct UncheckedTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TryFrom<UncheckedTable> for Table {
    type Error = TableError;

    fn try_from(raw: UncheckedTable) -> Result<Self, Self::Error> {
        Table::with_rows(raw.columns, raw.rows)
    }
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Result<Self, TableError> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Create a table and fill it with rows in one go.
    pub fn with_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<Self, TableError> {
        let mut table = Self::new(columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Append a row; its width must match the column count.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// All cells of one column, in row order
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Copy the rows matching `predicate` into a new table with the same
    /// columns. Row order is preserved.
    pub fn select_rows<F>(&self, predicate: F) -> Table
    where
        F: Fn(&[Value]) -> bool,
    {
        Table {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| predicate(row))
                .cloned()
                .collect(),
        }
    }

    /// Copy the rows at `indices`, in the order given, into a new table with
    /// the same columns. Out-of-range indices are skipped.
    pub fn select_indices(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// JSON rendering: one object per row, keyed by column name
    pub fn to_json_records(&self) -> serde_json::Value {
        let records = self
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(records)
    }
}

/// The named tables returned for one catalog identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TableList {
    tables: BTreeMap<String, Table>,
}

impl TableList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, table: Table) -> Option<Table> {
        self.tables.insert(name.into(), table)
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Remove and return a table, leaving the rest of the collection intact
    pub fn take(&mut self, name: &str) -> Option<Table> {
        self.tables.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<(String, Table)> for TableList {
    fn from_iter<I: IntoIterator<Item = (String, Table)>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().collect(),
        }
    }
}

use chrono::{NaiveDate, NaiveDateTime};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

//==============================================================================
// Cells
//==============================================================================

/// A single spreadsheet cell, typed
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Blank cell
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Blank cells and whitespace-only text count as blank
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Text form used for grouping keys and joined output
    pub fn render(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "Empty",
            CellValue::Text(_) => "Text",
            CellValue::Number(_) => "Number",
            CellValue::Bool(_) => "Bool",
            CellValue::Date(_) => "Date",
            CellValue::DateTime(_) => "DateTime",
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

/// Integral floats print without a fractional part (1.0 -> "1")
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Declared type of a scalar attribute, drives coercion in both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    /// Whatever the record holds, no conversion
    #[default]
    Auto,
    Text,
    Integer,
    Float,
    Bool,
    Date,
    DateTime,
}

impl CellKind {
    pub fn name(&self) -> &'static str {
        match self {
            CellKind::Auto => "auto",
            CellKind::Text => "text",
            CellKind::Integer => "integer",
            CellKind::Float => "float",
            CellKind::Bool => "bool",
            CellKind::Date => "date",
            CellKind::DateTime => "datetime",
        }
    }
}

//==============================================================================
// Rows and merge regions
//==============================================================================

/// Ordered column name -> cell mapping
///
/// `insert` replaces an existing column in place (last write wins), `push`
/// appends even when the name repeats, and `get` returns the first match.
/// Readers with duplicate headers use `push`; lookups then see the leftmost
/// column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlatRow {
    cells: Vec<(String, CellValue)>,
}

impl FlatRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// A row with every column present and blank
    pub fn with_columns<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            cells: columns
                .iter()
                .map(|c| (c.as_ref().to_string(), CellValue::Empty))
                .collect(),
        }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) {
        let column = column.into();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: CellValue) {
        self.cells.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Like `get`, but missing columns read as blank
    pub fn cell(&self, column: &str) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.get(column).unwrap_or(&EMPTY)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// True when every cell is blank
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.is_blank())
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for FlatRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = FlatRow::new();
        for (column, value) in iter {
            row.push(column, value.into());
        }
        row
    }
}

impl Serialize for FlatRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Vertical merge of one column over the half-open row range `[start_row, end_row)`
///
/// Rows are 0-based against the data block, header excluded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MergeRegion {
    pub column: String,
    pub start_row: usize,
    pub end_row: usize,
}

impl MergeRegion {
    pub fn new(column: impl Into<String>, start_row: usize, end_row: usize) -> Self {
        Self {
            column: column.into(),
            start_row,
            end_row,
        }
    }

    pub fn len(&self) -> usize {
        self.end_row.saturating_sub(self.start_row)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How several nested-many attributes on one object share rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MultiListStrategy {
    /// Longest list sets the row count, shorter lists pad with blanks
    #[default]
    MaxLength,
    /// Shortest list sets the row count, the rest is dropped
    MinLength,
    /// One row per combination of elements
    Cartesian,
}

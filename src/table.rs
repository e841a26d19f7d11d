//! In-memory tables: raw reader output and the cleaned form.

use crate::error::IngestError;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;

/// A single value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Missing,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Cell {
    /// `Missing`, or a `Float` holding NaN.
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Missing => true,
            Cell::Float(f) => f.is_nan(),
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => Ok(()),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(x) if x.is_nan() => Ok(()),
            // Integral floats keep a decimal so they still read as floats.
            Cell::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Cell::Float(x) => write!(f, "{x}"),
            Cell::Bool(b) => write!(f, "{b}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// True when every value is missing (vacuously true for zero rows).
    pub fn is_all_missing(&self) -> bool {
        self.values.iter().all(Cell::is_missing)
    }

    /// Summary type of the non-missing values: `int`, `float`, `bool`,
    /// `text`, `mixed`, or `empty` when there are none.
    pub fn dtype(&self) -> &'static str {
        let mut kind: Option<&'static str> = None;
        for cell in self.values.iter().filter(|c| !c.is_missing()) {
            let k = match cell {
                Cell::Int(_) => "int",
                Cell::Float(_) => "float",
                Cell::Bool(_) => "bool",
                Cell::Text(_) => "text",
                Cell::Missing => continue,
            };
            match kind {
                None => kind = Some(k),
                Some(prev) if prev == k => {}
                Some(_) => return "mixed",
            }
        }
        kind.unwrap_or("empty")
    }
}

/// Reader output: ordered columns sharing one row count.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RawTable {
    columns: Vec<Column>,
}

impl RawTable {
    /// Build a table, rejecting columns of differing lengths.
    pub fn new(columns: Vec<Column>) -> Result<Self, IngestError> {
        if let Some(first) = columns.first() {
            let rows = first.values.len();
            if let Some(bad) = columns.iter().find(|c| c.values.len() != rows) {
                return Err(IngestError::MalformedTable(format!(
                    "column '{}' has {} values, expected {}",
                    bad.name,
                    bad.values.len(),
                    rows
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Build a table from a header and row-major cells. Every row must have
    /// exactly `header.len()` cells.
    pub fn from_rows(header: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, IngestError> {
        let mut columns: Vec<Column> = header
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(IngestError::MalformedTable(format!(
                    "row {} has {} cells, expected {}",
                    i + 1,
                    row.len(),
                    columns.len()
                )));
            }
            for (col, cell) in columns.iter_mut().zip(row) {
                col.values.push(cell);
            }
        }
        Ok(Self { columns })
    }

    /// For callers that only transform cells of an existing table.
    pub(crate) fn from_columns_unchecked(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// Cells of row `index`, left to right.
    pub fn row(&self, index: usize) -> Option<Vec<&Cell>> {
        if index >= self.num_rows() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[index]).collect())
    }
}

/// A table that has been through [`crate::pipeline::clean`].
///
/// Only the cleaner constructs it, so holding one means: no all-missing
/// columns, no missing cells, normalised column names and text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CleanedTable(RawTable);

impl CleanedTable {
    pub(crate) fn from_cleaned(table: RawTable) -> Self {
        Self(table)
    }

    pub fn as_raw(&self) -> &RawTable {
        &self.0
    }
}

impl Deref for CleanedTable {
    type Target = RawTable;

    fn deref(&self) -> &RawTable {
        &self.0
    }
}

/// Fix up a header row: empty names become `Unnamed: {index}` and repeated
/// names get `.1`, `.2`, … suffixes, skipping suffixes already taken.
pub fn dedupe_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    raw.into_iter()
        .enumerate()
        .map(|(i, name)| {
            let base = if name.trim().is_empty() {
                format!("Unnamed: {i}")
            } else {
                name
            };
            let mut candidate = base.clone();
            let mut n = 1;
            while seen.contains(&candidate) {
                candidate = format!("{base}.{n}");
                n += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_columns_are_rejected() {
        let err = RawTable::new(vec![
            Column::new("a", vec![Cell::Int(1), Cell::Int(2)]),
            Column::new("b", vec![Cell::Int(1)]),
        ])
        .unwrap_err();
        assert!(matches!(err, IngestError::MalformedTable(_)));
    }

    #[test]
    fn rows_are_transposed() {
        let t = RawTable::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![Cell::Int(1), "x".into()],
                vec![Cell::Int(2), "y".into()],
            ],
        )
        .unwrap();
        assert_eq!(t.num_rows(), 2);
        assert_eq!(t.column("b").unwrap().values[1], Cell::from("y"));
        assert_eq!(t.row(0).unwrap(), vec![&Cell::Int(1), &Cell::from("x")]);
        assert!(t.row(2).is_none());
    }

    #[test]
    fn nan_is_missing() {
        assert!(Cell::Float(f64::NAN).is_missing());
        assert!(!Cell::Float(0.0).is_missing());
        assert!(!Cell::Text(String::new()).is_missing());
    }

    #[test]
    fn display_keeps_floats_recognisable() {
        assert_eq!(Cell::Float(2.0).to_string(), "2.0");
        assert_eq!(Cell::Float(-40.0).to_string(), "-40.0");
        assert_eq!(Cell::Float(72.25).to_string(), "72.25");
        assert_eq!(Cell::Float(f64::INFINITY).to_string(), "inf");
        assert_eq!(Cell::Float(f64::NAN).to_string(), "");
        assert_eq!(Cell::Int(2).to_string(), "2");
        assert_eq!(Cell::Missing.to_string(), "");
    }

    #[test]
    fn header_fixups() {
        let names = dedupe_headers(vec![
            "id".into(),
            "".into(),
            "id".into(),
            "id.1".into(),
            "id".into(),
        ]);
        assert_eq!(names, vec!["id", "Unnamed: 1", "id.1", "id.1.1", "id.2"]);
    }

    #[test]
    fn dtype_summary() {
        let c = Column::new("x", vec![Cell::Int(1), Cell::Missing, Cell::Int(3)]);
        assert_eq!(c.dtype(), "int");
        let c = Column::new("x", vec![Cell::Int(1), Cell::from("a")]);
        assert_eq!(c.dtype(), "mixed");
        assert_eq!(Column::new("x", vec![Cell::Missing]).dtype(), "empty");
    }
}

//! Format readers: one per [`FileKind`], each turning an upload into a
//! [`RawTable`].
//!
//! ```text
//! csv          decode text → sniff delimiter → parse            (in memory)
//! spreadsheet  calamine over a cursor                           (in memory)
//! sas7bdat     stage → PathDecoder → remove                     (on disk)
//! xport        stage → PathDecoder ─┬─ ok ───────────→ remove    (on disk)
//!                                   └─ CPORT → convert → decode
//! ```
//!
//! The SAS readers take a [`PathDecoder`] so the decoding library can be
//! swapped (or stubbed in tests) without touching staging and cleanup.

pub mod csv;
pub mod sas7bdat;
pub mod spreadsheet;
pub mod xport;

use crate::error::IngestError;
use crate::table::{Cell, Column, RawTable};
use crate::upload::{FileKind, UploadedFile};
use sasfile::{Dataset, Value};
use std::fmt;
use std::path::Path;

/// Turns an upload of one kind into a raw table.
pub trait FormatReader: Send + Sync {
    fn kind(&self) -> FileKind;

    fn read(&self, upload: &UploadedFile) -> Result<RawTable, IngestError>;
}

/// Decodes a dataset file on disk.
pub trait PathDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<RawTable, DecodeError>;
}

/// Failure reported by a [`PathDecoder`], carried as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError(pub String);

impl DecodeError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DecodeError {}

impl From<sasfile::SasError> for DecodeError {
    fn from(e: sasfile::SasError) -> Self {
        Self(e.to_string())
    }
}

/// What a transport decode failure means for the retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeClass {
    /// The file could not be read; give up.
    Failure,
    /// The file is a CPORT library; convert it and try again.
    LegacySubformat,
}

/// Classify a decode failure. Anything whose message mentions `CPORT` is
/// treated as the legacy sub-format.
pub fn classify(err: &DecodeError) -> DecodeClass {
    if err.0.contains("CPORT") {
        DecodeClass::LegacySubformat
    } else {
        DecodeClass::Failure
    }
}

/// Native transport decoder backed by `sasfile`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeXport;

impl PathDecoder for NativeXport {
    fn decode(&self, path: &Path) -> Result<RawTable, DecodeError> {
        let dataset = sasfile::read_xport(path)?;
        dataset_to_table(dataset)
    }
}

/// Native SAS7BDAT decoder backed by `sasfile`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSas7bdat;

impl PathDecoder for NativeSas7bdat {
    fn decode(&self, path: &Path) -> Result<RawTable, DecodeError> {
        let dataset = sasfile::read_sas7bdat(path)?;
        dataset_to_table(dataset)
    }
}

/// SAS numbers become floats, SAS missing codes become missing cells.
fn dataset_to_table(dataset: Dataset) -> Result<RawTable, DecodeError> {
    let Dataset {
        variables, rows, ..
    } = dataset;
    let mut columns: Vec<Column> = variables
        .into_iter()
        .map(|v| Column::new(v.name, Vec::with_capacity(rows.len())))
        .collect();
    for row in rows {
        for (column, value) in columns.iter_mut().zip(row) {
            column.values.push(match value {
                Value::Number(n) => Cell::Float(n),
                Value::Text(s) => Cell::Text(s),
                Value::Missing(_) => Cell::Missing,
            });
        }
    }
    RawTable::new(columns).map_err(|e| DecodeError(e.to_string()))
}

//! Spreadsheet reader (`.xlsx`, `.xls`) over the first worksheet.

use super::FormatReader;
use crate::error::IngestError;
use crate::table::{dedupe_headers, Cell, RawTable};
use crate::upload::{FileKind, UploadedFile};
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::io::Cursor;
use tracing::debug;

/// Reads workbook uploads entirely in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetReader;

impl FormatReader for SpreadsheetReader {
    fn kind(&self) -> FileKind {
        FileKind::Excel
    }

    fn read(&self, upload: &UploadedFile) -> Result<RawTable, IngestError> {
        let mut workbook =
            open_workbook_auto_from_rs(Cursor::new(upload.bytes())).map_err(decode_error)?;
        let sheet = workbook.sheet_names().first().cloned();
        debug!("Reading worksheet {:?}", sheet);
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| decode_error("workbook has no worksheets"))?
            .map_err(decode_error)?;
        table_from_range(&range)
    }
}

/// First row is the header; every further row is data.
pub fn table_from_range(range: &Range<Data>) -> Result<RawTable, IngestError> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Err(decode_error("worksheet is empty"));
    };
    let names = dedupe_headers(header.iter().map(header_name).collect());
    let body = rows
        .map(|row| row.iter().map(to_cell).collect::<Vec<_>>())
        .collect();
    RawTable::from_rows(names, body)
}

fn header_name(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => match to_cell(other) {
            Cell::Missing => String::new(),
            c => c.to_string(),
        },
    }
}

fn to_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Missing,
        Data::String(s) if s.is_empty() => Cell::Missing,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Cell::Int(*f as i64),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map_or(Cell::Missing, |dt| Cell::Text(iso_datetime(dt))),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(e.to_string()),
    }
}

/// `YYYY-MM-DDTHH:MM:SS`, shortened to the date at midnight.
fn iso_datetime(dt: NaiveDateTime) -> String {
    let date = format!("{:04}-{:02}-{:02}", dt.year(), dt.month(), dt.day());
    match (dt.hour(), dt.minute(), dt.second()) {
        (0, 0, 0) => date,
        (h, m, s) => format!("{date}T{h:02}:{m:02}:{s:02}"),
    }
}

fn decode_error(e: impl ToString) -> IngestError {
    IngestError::Decode {
        kind: FileKind::Excel,
        detail: e.to_string(),
    }
}

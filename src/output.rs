//! Output types and renderers.
//!
//! [`IngestOutput`] carries the cleaned table plus what happened to it.
//! Three renderings are provided:
//!
//! | Format | Function | Notes |
//! |--------|----------|-------|
//! | HTML   | [`to_html`] | `<table class="data">`, cells escaped |
//! | CSV    | [`write_csv`] | comma-separated, header row first |
//! | JSON   | [`to_json`] | `{"columns": [...], "rows": [[...], ...]}` |

use crate::table::{Cell, CleanedTable, Column};
use crate::upload::FileKind;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io;
use std::str::FromStr;

/// Result of ingesting one upload.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutput {
    /// The cleaned table.
    pub table: CleanedTable,
    /// The kind of reader that produced it.
    pub kind: FileKind,
    /// Upload name, when there was one.
    pub file_name: Option<String>,
    pub stats: IngestStats,
}

/// Numbers describing one ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    /// Size of the upload in bytes.
    pub input_bytes: usize,
    /// Rows in the cleaned table.
    pub rows: usize,
    /// Columns in the cleaned table.
    pub columns: usize,
    /// Names (as read) of columns dropped because every value was missing.
    pub dropped_columns: Vec<String>,
    /// Wall-clock time from dispatch to cleaned table.
    pub duration_ms: u64,
}

/// Summary of one column, as printed by `--inspect-only`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub dtype: &'static str,
    pub missing: usize,
}

impl ColumnSummary {
    pub fn of(column: &Column) -> Self {
        Self {
            name: column.name.clone(),
            dtype: column.dtype(),
            missing: column.values.iter().filter(|c| c.is_missing()).count(),
        }
    }
}

/// What `inspect` reports: the raw table before cleaning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub kind: FileKind,
    pub rows: usize,
    pub columns: Vec<ColumnSummary>,
}

/// Rendering formats understood by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown format '{other}' (expected html, csv or json)")),
        }
    }
}

/// Render `table` in `format` as a string.
pub fn render(table: &CleanedTable, format: OutputFormat) -> io::Result<String> {
    match format {
        OutputFormat::Html => Ok(to_html(table)),
        OutputFormat::Csv => {
            let mut buf = Vec::new();
            write_csv(table, &mut buf)?;
            String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
        }
        OutputFormat::Json => to_json(table).map_err(io::Error::from),
    }
}

// ── HTML ─────────────────────────────────────────────────────────────────

/// HTML preview table. Column names and cell text are escaped.
pub fn to_html(table: &CleanedTable) -> String {
    let mut out = String::with_capacity(64 + table.num_rows() * table.num_columns() * 16);
    out.push_str("<table class=\"data\">\n  <thead>\n    <tr>");
    for name in table.column_names() {
        let _ = write!(out, "<th>{}</th>", escape_html(name));
    }
    out.push_str("</tr>\n  </thead>\n  <tbody>\n");
    for i in 0..table.num_rows() {
        out.push_str("    <tr>");
        for col in table.columns() {
            let _ = write!(out, "<td>{}</td>", escape_html(&col.values[i].to_string()));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("  </tbody>\n</table>\n");
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

// ── CSV ──────────────────────────────────────────────────────────────────

/// Write `table` as comma-separated text.
pub fn write_csv<W: io::Write>(table: &CleanedTable, writer: W) -> io::Result<()> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(table.column_names())?;
    for i in 0..table.num_rows() {
        w.write_record(table.columns().iter().map(|c| c.values[i].to_string()))?;
    }
    w.flush()
}

// ── JSON ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonTable<'a> {
    columns: Vec<&'a str>,
    rows: Vec<Vec<&'a Cell>>,
}

/// Row-major JSON: column names, then one array per row.
pub fn to_json(table: &CleanedTable) -> serde_json::Result<String> {
    let doc = JsonTable {
        columns: table.column_names(),
        rows: (0..table.num_rows()).filter_map(|i| table.row(i)).collect(),
    };
    serde_json::to_string_pretty(&doc)
}

//! # tablesift
//!
//! Load uploaded tabular files (CSV, Excel, SAS7BDAT, SAS transport) into
//! clean in-memory tables.
//!
//! ## Why this crate?
//!
//! People upload whatever their tools export: a semicolon-separated CSV in
//! Windows-1252, an `.XLS` from a colleague, a SAS dataset, or an "XPT"
//! that is really a CPORT library. Each needs a different decoder, the SAS
//! ones want a file on disk, and the results all need the same clean-up
//! before anyone can look at them. This crate does the routing, decoding,
//! staging-file housekeeping and cleaning in one call.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (bytes + file name)
//!  │
//!  ├─ 1. Dispatch  extension (or declared kind) → reader
//!  ├─ 2. Read      csv: encoding + delimiter sniffing
//!  │               excel: calamine, in memory
//!  │               sas7bdat / xpt: staged on disk, decoded by `sasfile`
//!  │               xpt that is really CPORT: external converter, decode again
//!  ├─ 3. Clean     drop empty columns, fill "N/A", rename, normalise text
//!  └─ 4. Output    cleaned table + stats; HTML / CSV / JSON renderers
//! ```
//!
//! Staged files are removed on every exit path, successful or not.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tablesift::{ingest, IngestConfig, UploadedFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let upload = UploadedFile::from_path("vitals.csv")?;
//!     let output = ingest(upload, &IngestConfig::default()).await?;
//!     println!("{}", tablesift::output::to_html(&output.table));
//!     eprintln!("{} rows, dropped {:?}", output.stats.rows, output.stats.dropped_columns);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tablesift` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! tablesift = { version = "0.3", default-features = false }
//! ```
//!
//! ## Supported Files
//!
//! | Extension | Reader | Staged on disk |
//! |-----------|--------|----------------|
//! | `.csv` | [`readers::csv::CsvReader`] | no |
//! | `.xlsx`, `.xls` | [`readers::spreadsheet::SpreadsheetReader`] | no |
//! | `.sas7bdat` | [`readers::sas7bdat::Sas7bdatReader`] | yes |
//! | `.xpt` | [`readers::xport::XportReader`] | yes, twice for CPORT |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod readers;
pub mod table;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder, StagingNaming};
pub use dispatch::Dispatcher;
pub use error::{ErrorCategory, IngestError};
pub use ingest::{ingest, ingest_as, ingest_blocking, ingest_path, ingest_sync, ingest_to_file, inspect};
pub use output::{IngestOutput, IngestStats, OutputFormat, TableSummary};
pub use pipeline::clean::{clean, clean_with_report};
pub use table::{Cell, CleanedTable, Column, RawTable};
pub use upload::{FileKind, UploadedFile};

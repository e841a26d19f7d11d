//! # sasfile
//!
//! Pure-Rust readers for the two SAS dataset formats people actually upload:
//!
//! * **SAS transport (XPT v5)**: the fixed 80-byte-record interchange format
//!   required for regulatory submissions. Numbers are IBM/370 hexadecimal
//!   floats, character data is blank-padded.
//! * **SAS7BDAT**: the native binary dataset format written by SAS itself.
//!   Paged, with metadata "subheaders" describing the columns and optional
//!   RLE (`SASYZCRL`) or RDC (`SASYZCR2`) row compression.
//!
//! Both readers load the entire file into memory and return a [`Dataset`]:
//! named, typed variables plus rows of [`Value`]s.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sasfile::{read_sas7bdat, read_xport};
//!
//! let dm = read_xport("dm.xpt").expect("valid transport file");
//! println!("{}: {} rows × {} variables", dm.name, dm.rows.len(), dm.variables.len());
//!
//! let ae = read_sas7bdat("ae.sas7bdat").expect("valid sas7bdat file");
//! for var in &ae.variables {
//!     println!("{:<8} {:?}", var.name, var.var_type);
//! }
//! ```
//!
//! ## CPORT
//!
//! A CPORT library (`PROC CPORT` output) is *not* a transport file even
//! though it usually carries the `.xpt` extension. [`read_xport`] recognises
//! its `**COMPRESSED**` banner and fails with [`SasError::Cport`], whose
//! message contains the word `CPORT`, so callers can route the file to an
//! external converter.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod dataset;
pub mod error;
pub mod ibm;
pub mod sas7bdat;
mod text;
pub mod xport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use dataset::{Dataset, MissingValue, Value, VarType, Variable};
pub use error::SasError;
pub use sas7bdat::read_path as read_sas7bdat;
pub use xport::read_path as read_xport;

//! Pipeline stages shared by the format readers.
//!
//! ## Data Flow
//!
//! ```text
//! csv:      encoding ──▶ sniff ──▶ (parse) ──────────────────▶ clean
//! sas/xpt:  staging ──▶ (decode) ──[CPORT]──▶ cport ──▶ (decode) ──▶ clean
//! ```
//!
//! 1. [`encoding`]: guess the text encoding of a CSV upload
//! 2. [`sniff`]:    pick the field delimiter from a ranked candidate list
//! 3. [`staging`]:  write uploads to disk as delete-on-drop `TempPath`s
//! 4. [`cport`]:    run the external CPORT → transport converter, with a
//!    timeout
//! 5. [`clean`]:    deterministic table normalisation rules

pub mod clean;
pub mod cport;
pub mod encoding;
pub mod sniff;
pub mod staging;

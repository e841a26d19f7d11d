//! Error types for the tablesift library.
//!
//! One fatal error type, [`IngestError`], is returned by every public entry
//! point. Its variants fall into five families, exposed through
//! [`IngestError::category`]:
//!
//! * **Unsupported type**: the upload's extension (or declared kind) has
//!   no reader. Raised before any decoding, so nothing is staged.
//! * **Decode failure**: a reader could not turn the bytes into a table.
//! * **Conversion failure**: the CPORT fallback converter failed, timed
//!   out, or produced a file that still could not be read.
//! * **Staging I/O**: the staging file could not be written or removed.
//! * **Other**: missing input, bad configuration, output write failures.
//!
//! Callers that render errors to end users (the CLI, a web form) typically
//! treat the first two families as "your file" problems and the rest as
//! "our side" problems; the category makes that split without matching on
//! every variant.

use crate::upload::FileKind;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the tablesift library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The input file exists but could not be read.
    #[error("Failed to read '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No reader is registered for the upload's extension or declared kind.
    #[error("Unsupported file type {extension:?} for '{file_name}'\nSupported: .csv, .xlsx, .xls, .sas7bdat, .xpt")]
    UnsupportedType {
        file_name: String,
        extension: String,
    },

    // ── Decode errors ─────────────────────────────────────────────────────
    /// A format reader rejected the content.
    #[error("Failed to read {kind} file: {detail}")]
    Decode { kind: FileKind, detail: String },

    /// The decoded columns do not form a rectangular table.
    #[error("Malformed table: {0}")]
    MalformedTable(String),

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The CPORT converter could not be launched or exited unsuccessfully.
    #[error("CPORT conversion with '{program}' failed: {detail}")]
    ConversionFailed { program: String, detail: String },

    /// The CPORT converter did not finish in time and was killed.
    #[error("CPORT conversion with '{program}' timed out after {secs}s")]
    ConversionTimeout { program: String, secs: u64 },

    /// Conversion succeeded but its output could not be decoded either.
    #[error("Converted transport file '{path}' is unreadable: {detail}")]
    ConvertedUnreadable { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Creating, writing or removing a staging file failed.
    #[error("Staging file '{path}' failed: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse grouping of [`IngestError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    UnsupportedType,
    DecodeFailure,
    ConversionFailure,
    StagingIo,
    Other,
}

impl IngestError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            IngestError::UnsupportedType { .. } => ErrorCategory::UnsupportedType,
            IngestError::Decode { .. } | IngestError::MalformedTable(_) => {
                ErrorCategory::DecodeFailure
            }
            IngestError::ConversionFailed { .. }
            | IngestError::ConversionTimeout { .. }
            | IngestError::ConvertedUnreadable { .. } => ErrorCategory::ConversionFailure,
            IngestError::Staging { .. } => ErrorCategory::StagingIo,
            IngestError::FileNotFound { .. }
            | IngestError::InputRead { .. }
            | IngestError::OutputWriteFailed { .. }
            | IngestError::InvalidConfig(_)
            | IngestError::Internal(_) => ErrorCategory::Other,
        }
    }

    /// True for errors caused by the uploaded file itself rather than the
    /// environment it is processed in.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::UnsupportedType | ErrorCategory::DecodeFailure
        )
    }

    pub(crate) fn staging(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Staging {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_display() {
        let e = IngestError::UnsupportedType {
            file_name: "data.unknownext".into(),
            extension: "unknownext".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("data.unknownext"), "got: {msg}");
        assert!(msg.contains(".sas7bdat"), "got: {msg}");
        assert_eq!(e.category(), ErrorCategory::UnsupportedType);
        assert!(e.is_user_facing());
    }

    #[test]
    fn transport_decode_display() {
        let e = IngestError::Decode {
            kind: FileKind::Xpt,
            detail: "bad header".into(),
        };
        assert_eq!(e.to_string(), "Failed to read XPT file: bad header");
        assert_eq!(e.category(), ErrorCategory::DecodeFailure);
    }

    #[test]
    fn conversion_timeout_display() {
        let e = IngestError::ConversionTimeout {
            program: "stattransfer".into(),
            secs: 300,
        };
        assert!(e.to_string().contains("300s"));
        assert_eq!(e.category(), ErrorCategory::ConversionFailure);
        assert!(!e.is_user_facing());
    }

    #[test]
    fn staging_keeps_source() {
        let e = IngestError::staging(
            "/tmp/x.xpt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(std::error::Error::source(&e).is_some());
        assert_eq!(e.category(), ErrorCategory::StagingIo);
    }
}

//! Error type shared by the transport and SAS7BDAT readers.

use thiserror::Error;

/// Everything that can go wrong while decoding a SAS dataset.
#[derive(Debug, Error)]
pub enum SasError {
    /// The file is a CPORT library rather than a transport file.
    ///
    /// The message deliberately names the format: callers that only see the
    /// rendered error text still need to recognise it.
    #[error("file is a SAS CPORT library (PROC CPORT output), not a SAS transport file")]
    Cport,

    /// The first record is not a transport library header.
    #[error("not a SAS transport file: first record starts with {found:?}")]
    NotTransport { found: String },

    /// A transport version this reader does not decode (e.g. V8/V9 extended).
    #[error("unsupported SAS transport version: {0}")]
    UnsupportedVersion(String),

    /// The SAS7BDAT magic number is missing.
    #[error("magic number mismatch (not a SAS7BDAT file)")]
    NotSas7bdat,

    /// The file ended before a structure could be read completely.
    #[error("file truncated while reading {context} at byte {offset}")]
    Truncated { context: &'static str, offset: usize },

    /// Structurally invalid content.
    #[error("malformed SAS file: {0}")]
    Malformed(String),

    /// RLE/RDC decompression of a row failed.
    #[error("row decompression failed: {0}")]
    Decompress(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cport_message_names_the_format() {
        assert!(SasError::Cport.to_string().contains("CPORT"));
    }

    #[test]
    fn truncated_display() {
        let e = SasError::Truncated {
            context: "namestr records",
            offset: 640,
        };
        let msg = e.to_string();
        assert!(msg.contains("namestr records"), "got: {msg}");
        assert!(msg.contains("640"), "got: {msg}");
    }
}

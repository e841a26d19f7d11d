//! The uploaded file and the kinds of file tablesift can read.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Tabular formats with a registered reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Delimited text (`.csv`).
    Csv,
    /// Spreadsheet workbook (`.xlsx`, `.xls`).
    Excel,
    /// SAS native binary dataset (`.sas7bdat`).
    Sas7bdat,
    /// SAS transport file, possibly a CPORT library (`.xpt`).
    Xpt,
}

impl FileKind {
    pub const ALL: [FileKind; 4] = [
        FileKind::Csv,
        FileKind::Excel,
        FileKind::Sas7bdat,
        FileKind::Xpt,
    ];

    /// Map a file extension (without the dot, any case) to a kind.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(FileKind::Csv),
            "xlsx" | "xls" => Some(FileKind::Excel),
            "sas7bdat" => Some(FileKind::Sas7bdat),
            "xpt" => Some(FileKind::Xpt),
            _ => None,
        }
    }

    /// Stable lowercase identifier, also accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Excel => "excel",
            FileKind::Sas7bdat => "sas7bdat",
            FileKind::Xpt => "xpt",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileKind::Csv => "CSV",
            FileKind::Excel => "Excel",
            FileKind::Sas7bdat => "SAS7BDAT",
            FileKind::Xpt => "XPT",
        })
    }
}

impl FromStr for FileKind {
    type Err = String;

    /// Parse a declared kind: `csv`, `excel`, `sas7bdat` or `xpt`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        FileKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown file kind '{s}' (expected csv, excel, sas7bdat or xpt)"))
    }
}

/// An uploaded file: its bytes and, usually, the name it was uploaded as.
///
/// The bytes are held in memory, so every reader sees the content from the
/// start regardless of what ran before it.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    bytes: Vec<u8>,
    file_name: Option<String>,
}

impl UploadedFile {
    pub fn from_bytes(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: Some(file_name.into()),
        }
    }

    /// An upload whose original name is unknown.
    pub fn unnamed(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: None,
        }
    }

    /// Read a file from disk; the file name is the path's final component.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IngestError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                IngestError::InputRead {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        Ok(Self {
            bytes,
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The name as uploaded, possibly including client-side directories.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Final path component of the file name, with `/` and `\` both treated
    /// as separators. `None` when there is no usable name.
    pub fn base_name(&self) -> Option<&str> {
        let name = self.file_name.as_deref()?;
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
        if base.is_empty() || base == "." || base == ".." {
            None
        } else {
            Some(base)
        }
    }

    /// Lowercased extension of the base name, without the dot.
    pub fn extension(&self) -> Option<String> {
        let base = self.base_name()?;
        let (stem, ext) = base.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Kind inferred from the extension.
    pub fn kind(&self) -> Option<FileKind> {
        self.extension().as_deref().and_then(FileKind::from_extension)
    }

    /// Name used in messages: the base name, or `<unnamed>`.
    pub(crate) fn display_name(&self) -> &str {
        self.base_name().unwrap_or("<unnamed>")
    }
}

//! SAS transport reader with the CPORT fallback.
//!
//! ```text
//! stage ─▶ decode ─┬─ ok ───────────────────────────────▶ table
//!                  ├─ "CPORT" ─▶ convert to <staged>.xpt ─▶ decode ─┬─ ok ─▶ table
//!                  │                                                └─ ConvertedUnreadable
//!                  └─ other ─▶ Decode error
//! ```
//!
//! Both staged files are held as `tempfile::TempPath`s, so they are gone on
//! every exit, including converter failures.

use super::{classify, DecodeClass, FormatReader, NativeXport, PathDecoder};
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::cport::{LegacyConverter, StatTransfer};
use crate::pipeline::staging::{self, Stager};
use crate::table::RawTable;
use crate::upload::{FileKind, UploadedFile};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct XportReader {
    stager: Stager,
    decoder: Arc<dyn PathDecoder>,
    converter: Arc<dyn LegacyConverter>,
}

impl XportReader {
    pub fn new(
        stager: Stager,
        decoder: Arc<dyn PathDecoder>,
        converter: Arc<dyn LegacyConverter>,
    ) -> Self {
        Self {
            stager,
            decoder,
            converter,
        }
    }

    /// Native decoder and the configured external converter.
    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            Stager::from_config(config),
            Arc::new(NativeXport),
            Arc::new(StatTransfer::from_config(config)),
        )
    }

    fn read_converted(&self, staged: &Path) -> Result<RawTable, IngestError> {
        let converted = staging::claim(converted_path(staged));
        self.converter.convert(staged, &converted)?;

        let table = self.decoder.decode(&converted).map_err(|e| {
            IngestError::ConvertedUnreadable {
                path: converted.to_path_buf(),
                detail: e.to_string(),
            }
        })?;
        staging::release(converted)?;
        Ok(table)
    }
}

/// `<staged path>.xpt`
fn converted_path(staged: &Path) -> PathBuf {
    let mut s: OsString = staged.as_os_str().to_owned();
    s.push(".xpt");
    PathBuf::from(s)
}

impl FormatReader for XportReader {
    fn kind(&self) -> FileKind {
        FileKind::Xpt
    }

    fn read(&self, upload: &UploadedFile) -> Result<RawTable, IngestError> {
        let staged = self.stager.stage(upload)?;

        let table = match self.decoder.decode(&staged) {
            Ok(table) => table,
            Err(e) => match classify(&e) {
                DecodeClass::LegacySubformat => {
                    warn!(
                        "{} is a CPORT library, converting: {}",
                        upload.display_name(),
                        e
                    );
                    self.read_converted(&staged)?
                }
                DecodeClass::Failure => {
                    return Err(IngestError::Decode {
                        kind: FileKind::Xpt,
                        detail: e.to_string(),
                    })
                }
            },
        };

        staging::release(staged)?;
        debug!(
            "Decoded XPT: {} rows x {} columns",
            table.num_rows(),
            table.num_columns()
        );
        Ok(table)
    }
}

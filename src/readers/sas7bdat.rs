//! SAS7BDAT reader: stage, decode from disk, remove.

use super::{FormatReader, NativeSas7bdat, PathDecoder};
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::staging::{self, Stager};
use crate::table::RawTable;
use crate::upload::{FileKind, UploadedFile};
use std::sync::Arc;
use tracing::debug;

pub struct Sas7bdatReader {
    stager: Stager,
    decoder: Arc<dyn PathDecoder>,
}

impl Sas7bdatReader {
    pub fn new(stager: Stager, decoder: Arc<dyn PathDecoder>) -> Self {
        Self { stager, decoder }
    }

    /// Native decoder, staging as configured.
    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(Stager::from_config(config), Arc::new(NativeSas7bdat))
    }
}

impl FormatReader for Sas7bdatReader {
    fn kind(&self) -> FileKind {
        FileKind::Sas7bdat
    }

    fn read(&self, upload: &UploadedFile) -> Result<RawTable, IngestError> {
        let staged = self.stager.stage(upload)?;
        let table = self
            .decoder
            .decode(&staged)
            .map_err(|e| IngestError::Decode {
                kind: FileKind::Sas7bdat,
                detail: e.to_string(),
            })?;
        staging::release(staged)?;
        debug!(
            "Decoded SAS7BDAT: {} rows x {} columns",
            table.num_rows(),
            table.num_columns()
        );
        Ok(table)
    }
}

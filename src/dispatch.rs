//! Extension dispatch: pick a reader, run it, clean the result.
//!
//! The dispatcher owns one [`FormatReader`] per [`FileKind`]. Hosts and
//! tests can swap any of them with [`Dispatcher::with_reader`]; an upload
//! whose kind has no reader is rejected before anything is read or staged.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::clean;
use crate::readers::csv::CsvReader;
use crate::readers::sas7bdat::Sas7bdatReader;
use crate::readers::spreadsheet::SpreadsheetReader;
use crate::readers::xport::XportReader;
use crate::readers::FormatReader;
use crate::table::{CleanedTable, RawTable};
use crate::upload::{FileKind, UploadedFile};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Routes uploads to format readers.
#[derive(Clone)]
pub struct Dispatcher {
    readers: HashMap<FileKind, Arc<dyn FormatReader>>,
}

impl Dispatcher {
    /// The four built-in readers, configured from `config`.
    pub fn new(config: &IngestConfig) -> Self {
        Self::empty()
            .with_reader(Arc::new(CsvReader::from_config(config)))
            .with_reader(Arc::new(SpreadsheetReader))
            .with_reader(Arc::new(Sas7bdatReader::from_config(config)))
            .with_reader(Arc::new(XportReader::from_config(config)))
    }

    /// A dispatcher with no readers; every upload is unsupported.
    pub fn empty() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    /// Register `reader` for its kind, replacing any previous one.
    pub fn with_reader(mut self, reader: Arc<dyn FormatReader>) -> Self {
        self.readers.insert(reader.kind(), reader);
        self
    }

    pub fn supports(&self, kind: FileKind) -> bool {
        self.readers.contains_key(&kind)
    }

    /// Kind of `upload` by extension, if a reader is registered for it.
    pub fn resolve(&self, upload: &UploadedFile) -> Result<FileKind, IngestError> {
        match upload.kind() {
            Some(kind) if self.supports(kind) => Ok(kind),
            _ => Err(IngestError::UnsupportedType {
                file_name: upload.display_name().to_string(),
                extension: upload.extension().unwrap_or_default(),
            }),
        }
    }

    /// Read and clean `upload`, choosing the reader by extension.
    pub fn dispatch(&self, upload: &UploadedFile) -> Result<CleanedTable, IngestError> {
        let kind = self.resolve(upload)?;
        self.dispatch_as(upload, kind)
    }

    /// Read and clean `upload` with the reader for a declared `kind`,
    /// ignoring the extension.
    pub fn dispatch_as(
        &self,
        upload: &UploadedFile,
        kind: FileKind,
    ) -> Result<CleanedTable, IngestError> {
        let raw = self.read_as(upload, kind)?;
        Ok(clean::clean(&raw))
    }

    /// Run only the reader for `kind`, without cleaning.
    pub fn read_as(&self, upload: &UploadedFile, kind: FileKind) -> Result<RawTable, IngestError> {
        let reader = self
            .readers
            .get(&kind)
            .ok_or_else(|| IngestError::UnsupportedType {
                file_name: upload.display_name().to_string(),
                extension: kind.as_str().to_string(),
            })?;
        debug!("Reading {} as {}", upload.display_name(), kind);
        reader.read(upload)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.readers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("Dispatcher").field("readers", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Cell, Column};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stub {
        kind: FileKind,
        calls: AtomicUsize,
    }

    impl Stub {
        fn new(kind: FileKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl FormatReader for Stub {
        fn kind(&self) -> FileKind {
            self.kind
        }

        fn read(&self, _upload: &UploadedFile) -> Result<RawTable, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            RawTable::new(vec![Column::new(" Kind ", vec![Cell::from(self.kind.as_str())])])
        }
    }

    fn stubbed() -> (Dispatcher, Vec<Arc<Stub>>) {
        let stubs: Vec<Arc<Stub>> = FileKind::ALL.iter().map(|&k| Stub::new(k)).collect();
        let d = stubs
            .iter()
            .fold(Dispatcher::empty(), |d, s| d.with_reader(s.clone()));
        (d, stubs)
    }

    fn total_calls(stubs: &[Arc<Stub>]) -> usize {
        stubs.iter().map(|s| s.calls.load(Ordering::SeqCst)).sum()
    }

    #[test]
    fn uppercase_xls_goes_to_spreadsheet_reader() {
        let (d, stubs) = stubbed();
        let t = d
            .dispatch(&UploadedFile::from_bytes("report.XLS", vec![0u8; 8]))
            .unwrap();
        assert_eq!(t.column_names(), vec!["kind"]);
        assert_eq!(t.columns()[0].values, vec![Cell::from("excel")]);
        assert_eq!(stubs[1].calls.load(Ordering::SeqCst), 1);
        assert_eq!(total_calls(&stubs), 1);
    }

    #[test]
    fn unknown_extension_runs_no_reader() {
        let (d, stubs) = stubbed();
        let err = d
            .dispatch(&UploadedFile::from_bytes("data.unknownext", b"a,b".to_vec()))
            .unwrap_err();
        match err {
            IngestError::UnsupportedType {
                file_name,
                extension,
            } => {
                assert_eq!(file_name, "data.unknownext");
                assert_eq!(extension, "unknownext");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(total_calls(&stubs), 0);
    }

    #[test]
    fn declared_kind_overrides_extension() {
        let (d, stubs) = stubbed();
        d.dispatch_as(&UploadedFile::from_bytes("upload.bin", vec![]), FileKind::Xpt)
            .unwrap();
        assert_eq!(stubs[3].calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_kind_is_unsupported() {
        let d = Dispatcher::empty().with_reader(Stub::new(FileKind::Csv));
        let err = d
            .dispatch(&UploadedFile::from_bytes("dm.sas7bdat", vec![]))
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedType { .. }));
        assert!(format!("{d:?}").contains("csv"));
    }

    #[test]
    fn reader_errors_pass_through_unchanged() {
        struct Broken;
        impl FormatReader for Broken {
            fn kind(&self) -> FileKind {
                FileKind::Sas7bdat
            }
            fn read(&self, _: &UploadedFile) -> Result<RawTable, IngestError> {
                Err(IngestError::Decode {
                    kind: FileKind::Sas7bdat,
                    detail: "magic".into(),
                })
            }
        }
        let d = Dispatcher::empty().with_reader(Arc::new(Broken));
        let err = d
            .dispatch(&UploadedFile::from_bytes("x.sas7bdat", vec![]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to read SAS7BDAT file: magic");
    }

    #[test]
    fn csv_scenario_end_to_end() {
        let d = Dispatcher::new(&IngestConfig::default());
        let t = d
            .dispatch(&UploadedFile::from_bytes("t.csv", b"col1,col2\n1,2\n3,4".to_vec()))
            .unwrap();
        assert_eq!(t.column_names(), vec!["col1", "col2"]);
        assert_eq!(t.row(1).unwrap(), vec![&Cell::Int(3), &Cell::Int(4)]);
    }
}

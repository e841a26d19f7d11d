//! Staging: put upload bytes on disk for readers that need a path.
//!
//! ## Why `TempPath`?
//!
//! The SAS decoders and the CPORT converter work on files, so those uploads
//! are written to the staging directory first. Every staged file is held as
//! a [`tempfile::TempPath`]. On the success path the reader calls
//! [`release`], which reports I/O failures; on every other path (an early
//! `?`, a panic unwinding through the reader) dropping the `TempPath`
//! deletes the file and the original error is never masked.

use crate::config::{IngestConfig, StagingNaming};
use crate::error::IngestError;
use crate::upload::UploadedFile;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempPath};
use tracing::debug;
use uuid::Uuid;

/// Writes uploads into a staging directory.
#[derive(Debug, Clone)]
pub struct Stager {
    dir: PathBuf,
    naming: StagingNaming,
}

impl Stager {
    pub fn new(dir: impl Into<PathBuf>, naming: StagingNaming) -> Self {
        Self {
            dir: dir.into(),
            naming,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(&config.staging_dir, config.staging_naming)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the upload's bytes to a fresh staging file.
    ///
    /// The directory is created on demand. The file is created exclusively,
    /// so with [`StagingNaming::FromFilename`] a second in-flight upload of
    /// the same name fails instead of overwriting the first. If writing
    /// fails, the partial file is removed before the error is returned.
    pub fn stage(&self, upload: &UploadedFile) -> Result<TempPath, IngestError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| IngestError::staging(&self.dir, e))?;

        let name = self.file_name_for(upload);
        let mut file = Builder::new()
            .prefix(&name)
            .rand_bytes(0)
            .tempfile_in(&self.dir)
            .map_err(|e| IngestError::staging(self.dir.join(&name), e))?;
        file.write_all(upload.bytes())
            .map_err(|e| IngestError::staging(file.path(), e))?;

        let staged = file.into_temp_path();
        debug!("Staged {} bytes at {}", upload.len(), staged.display());
        Ok(staged)
    }

    fn file_name_for(&self, upload: &UploadedFile) -> String {
        let base = upload.base_name().map(sanitize);
        match (self.naming, base) {
            (StagingNaming::Unique, Some(base)) => format!("{}_{}", Uuid::new_v4().simple(), base),
            (StagingNaming::FromFilename, Some(base)) => base,
            (_, None) => Uuid::new_v4().simple().to_string(),
        }
    }
}

/// Take ownership of a path another process is about to create, such as the
/// converter's output. It is deleted on drop if it exists by then.
pub fn claim(path: impl Into<PathBuf>) -> TempPath {
    TempPath::from_path(path)
}

/// Delete a staging file now, reporting failure. A file that was never
/// created counts as removed.
pub fn release(artifact: TempPath) -> Result<(), IngestError> {
    let path = artifact.to_path_buf();
    match artifact.close() {
        Ok(()) => {
            debug!("Removed staging file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IngestError::staging(path, e)),
    }
}

/// Keep letters, digits, `.`, `-` and `_`; anything else becomes `_`.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    // No hidden files.
    match cleaned.strip_prefix('.') {
        Some(rest) => format!("_{rest}"),
        None => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn stage_then_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path().join("staging"), StagingNaming::Unique);
        let up = UploadedFile::from_bytes("dm.xpt", b"abc".to_vec());

        let artifact = stager.stage(&up).unwrap();
        assert_eq!(std::fs::read(&artifact).unwrap(), b"abc");
        assert!(artifact
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_dm.xpt"));

        release(artifact).unwrap();
        assert_eq!(entries(stager.dir()), 0);
    }

    #[test]
    fn drop_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path(), StagingNaming::Unique);
        {
            let _artifact = stager.stage(&UploadedFile::unnamed(vec![1, 2, 3])).unwrap();
            assert_eq!(entries(tmp.path()), 1);
        }
        assert_eq!(entries(tmp.path()), 0);
    }

    #[test]
    fn unique_names_never_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path(), StagingNaming::Unique);
        let up = UploadedFile::from_bytes("same.sas7bdat", vec![0u8; 4]);
        let a = stager.stage(&up).unwrap();
        let b = stager.stage(&up).unwrap();
        assert_ne!(a.to_path_buf(), b.to_path_buf());
        assert_eq!(entries(tmp.path()), 2);
    }

    #[test]
    fn filename_naming_uses_the_upload_name() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path(), StagingNaming::FromFilename);
        let a = stager
            .stage(&UploadedFile::from_bytes("sub/dir/my data.xpt", vec![1]))
            .unwrap();
        assert_eq!(a.to_path_buf(), tmp.path().join("my_data.xpt"));
    }

    #[test]
    fn same_filename_in_flight_is_not_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let stager = Stager::new(tmp.path(), StagingNaming::FromFilename);
        let first = stager
            .stage(&UploadedFile::from_bytes("ae.xpt", b"first".to_vec()))
            .unwrap();

        let err = stager
            .stage(&UploadedFile::from_bytes("ae.xpt", b"second".to_vec()))
            .unwrap_err();
        assert!(matches!(err, IngestError::Staging { .. }), "got {err:?}");
        assert_eq!(std::fs::read(&first).unwrap(), b"first");

        release(first).unwrap();
        assert_eq!(entries(tmp.path()), 0);
    }

    #[test]
    fn claimed_path_that_never_existed() {
        let tmp = tempfile::tempdir().unwrap();
        release(claim(tmp.path().join("never.xpt"))).unwrap();
        drop(claim(tmp.path().join("never2.xpt")));
    }

    #[test]
    fn claimed_path_is_removed_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("converted.xpt");
        let guard = claim(&path);
        std::fs::write(&path, b"HEADER").unwrap();
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn sanitizing() {
        assert_eq!(sanitize("ae (v2).xpt"), "ae__v2_.xpt");
        assert_eq!(sanitize(".hidden.csv"), "_hidden.csv");
        assert_eq!(sanitize("données.csv"), "donn_es.csv");
    }
}

//! Ingestion entry points.
//!
//! ## Why is the core synchronous?
//!
//! Every reader is CPU-bound or blocks on the filesystem and, for CPORT
//! libraries, on an external process. [`ingest_blocking`] does the work; the
//! async functions run it on tokio's blocking pool so callers inside a
//! runtime never stall a worker thread, and [`ingest_sync`] builds a
//! throwaway runtime for callers outside one.
//!
//! Each call returns its own [`IngestOutput`]. Nothing is kept between
//! calls, so concurrent ingestions only share the staging directory, where
//! unique names keep them apart.

use crate::config::IngestConfig;
use crate::dispatch::Dispatcher;
use crate::error::IngestError;
use crate::output::{self, ColumnSummary, IngestOutput, IngestStats, OutputFormat, TableSummary};
use crate::pipeline::clean;
use crate::upload::{FileKind, UploadedFile};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Read and clean `upload` on the current thread.
///
/// `kind` overrides extension dispatch when set. Call it from a plain
/// thread or `spawn_blocking`, not from inside an async task: the CPORT
/// fallback blocks on the converter.
pub fn ingest_blocking(
    upload: &UploadedFile,
    kind: Option<FileKind>,
    dispatcher: &Dispatcher,
) -> Result<IngestOutput, IngestError> {
    let start = Instant::now();
    let kind = match kind {
        Some(kind) => kind,
        None => dispatcher.resolve(upload)?,
    };
    info!(
        "Ingesting {} ({} bytes) as {}",
        upload.display_name(),
        upload.len(),
        kind
    );

    let raw = dispatcher.read_as(upload, kind)?;
    let (table, dropped_columns) = clean::clean_with_report(&raw);

    let stats = IngestStats {
        input_bytes: upload.len(),
        rows: table.num_rows(),
        columns: table.num_columns(),
        dropped_columns,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Ingested {}: {} rows x {} columns in {}ms",
        upload.display_name(),
        stats.rows,
        stats.columns,
        stats.duration_ms
    );

    Ok(IngestOutput {
        table,
        kind,
        file_name: upload.file_name().map(str::to_string),
        stats,
    })
}

/// Read and clean an upload, choosing the reader by extension.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// * [`IngestError::UnsupportedType`] before anything is read when the
///   extension has no reader
/// * [`IngestError::Decode`] when the reader rejects the content
/// * conversion and staging errors for SAS transport uploads
pub async fn ingest(
    upload: UploadedFile,
    config: &IngestConfig,
) -> Result<IngestOutput, IngestError> {
    run_blocking(upload, None, config).await
}

/// Like [`ingest`], but with a declared kind instead of the extension.
pub async fn ingest_as(
    upload: UploadedFile,
    kind: FileKind,
    config: &IngestConfig,
) -> Result<IngestOutput, IngestError> {
    run_blocking(upload, Some(kind), config).await
}

/// Read a file from disk and ingest it.
pub async fn ingest_path(
    path: impl AsRef<Path>,
    kind: Option<FileKind>,
    config: &IngestConfig,
) -> Result<IngestOutput, IngestError> {
    let upload = read_upload(path.as_ref()).await?;
    run_blocking(upload, kind, config).await
}

/// Synchronous wrapper around [`ingest`].
///
/// Creates a temporary tokio runtime internally.
pub fn ingest_sync(
    upload: UploadedFile,
    config: &IngestConfig,
) -> Result<IngestOutput, IngestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| IngestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(ingest(upload, config))
}

/// Ingest `input` and write the rendered table to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn ingest_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    format: OutputFormat,
    kind: Option<FileKind>,
    config: &IngestConfig,
) -> Result<IngestStats, IngestError> {
    let out = ingest_path(input, kind, config).await?;
    let path = output_path.as_ref();
    let rendered = output::render(&out.table, format).map_err(|e| write_failed(path, e))?;
    write_atomic(path, rendered.as_bytes()).await?;
    Ok(out.stats)
}

/// Read a file with its format reader and summarise the columns, without
/// cleaning.
pub async fn inspect(
    path: impl AsRef<Path>,
    kind: Option<FileKind>,
    config: &IngestConfig,
) -> Result<TableSummary, IngestError> {
    let upload = read_upload(path.as_ref()).await?;
    let dispatcher = Dispatcher::new(config);
    tokio::task::spawn_blocking(move || -> Result<TableSummary, IngestError> {
        let kind = match kind {
            Some(kind) => kind,
            None => dispatcher.resolve(&upload)?,
        };
        let raw = dispatcher.read_as(&upload, kind)?;
        Ok(TableSummary {
            kind,
            rows: raw.num_rows(),
            columns: raw.columns().iter().map(ColumnSummary::of).collect(),
        })
    })
    .await
    .map_err(|e| IngestError::Internal(format!("Inspect task panicked: {}", e)))?
}

/// Write `bytes` to `path` via a sibling temp file and a rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| write_failed(path, e))?;
    }

    let tmp_path = tmp_sibling(path);
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| write_failed(path, e))?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(path, e));
    }
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run_blocking(
    upload: UploadedFile,
    kind: Option<FileKind>,
    config: &IngestConfig,
) -> Result<IngestOutput, IngestError> {
    let dispatcher = Dispatcher::new(config);
    tokio::task::spawn_blocking(move || ingest_blocking(&upload, kind, &dispatcher))
        .await
        .map_err(|e| IngestError::Internal(format!("Ingest task panicked: {}", e)))?
}

async fn read_upload(path: &Path) -> Result<UploadedFile, IngestError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || UploadedFile::from_path(owned))
        .await
        .map_err(|e| IngestError::Internal(format!("Read task panicked: {}", e)))?
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_failed(path: &Path, source: std::io::Error) -> IngestError {
    IngestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    }
}

//! Integration tests for tablesift.
//!
//! Everything runs against the public API with synthetic inputs: CSV text
//! written inline, SAS files produced by `sasfile`'s writers, and (on Unix)
//! shell scripts standing in for the CPORT converter.
//!
//! Run with:
//!   cargo test --test ingest -- --nocapture

use sasfile::{Dataset, MissingValue, Value, VarType, Variable};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tablesift::pipeline::sniff::sniff;
use tablesift::readers::FormatReader;
use tablesift::{
    clean, ingest, ingest_blocking, Cell, Column, Dispatcher, ErrorCategory, FileKind,
    IngestConfig, IngestError, RawTable, UploadedFile,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

// Tests that spawn a converter hold this lock. A fork in one test while
// another is still writing its script makes exec fail with ETXTBSY.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

fn config(staging: &Path) -> IngestConfig {
    IngestConfig::builder()
        .staging_dir(staging)
        .converter_timeout_secs(Some(20))
        .build()
        .unwrap()
}

/// Files left in the staging directory (a missing directory counts as empty).
fn staged_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

fn var(name: &str, var_type: VarType, length: usize) -> Variable {
    Variable {
        name: name.into(),
        label: None,
        format: None,
        var_type,
        length,
    }
}

fn adverse_events(tag: &str) -> Dataset {
    Dataset {
        name: "AE".into(),
        label: Some("Adverse Events".into()),
        variables: vec![
            var("USUBJID", VarType::Character, 12),
            var("AETERM", VarType::Character, 24),
            var("AESEV", VarType::Numeric, 8),
            var("AEOUT", VarType::Character, 8),
        ],
        rows: vec![
            vec![
                Value::Text(format!("{tag}-001")),
                Value::Text("Headache  and \n nausea".into()),
                Value::Number(2.0),
                Value::Text(String::new()),
            ],
            vec![
                Value::Text(format!("{tag}-002")),
                Value::Text("Rash".into()),
                Value::Missing(MissingValue::Standard),
                Value::Text(String::new()),
            ],
        ],
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn simple_csv_upload() {
    let tmp = tempfile::tempdir().unwrap();
    let out = ingest(
        UploadedFile::from_bytes("t.csv", b"col1,col2\n1,2\n3,4".to_vec()),
        &config(tmp.path()),
    )
    .await
    .unwrap();
    assert_eq!(out.kind, FileKind::Csv);
    assert_eq!(out.table.column_names(), vec!["col1", "col2"]);
    assert_eq!(out.table.row(0).unwrap(), vec![&Cell::Int(1), &Cell::Int(2)]);
    assert_eq!(out.table.row(1).unwrap(), vec![&Cell::Int(3), &Cell::Int(4)]);
    assert!(staged_files(tmp.path()).is_empty());
}

#[test]
fn cleaner_scenario() {
    let raw = RawTable::new(vec![
        Column::new("  Col 1 ", vec![Cell::Missing, Cell::from(" foo ")]),
        Column::new("Col_2", vec![Cell::Missing, Cell::from(" \n Bar \n")]),
        Column::new("Empty", vec![Cell::Missing, Cell::Missing]),
    ])
    .unwrap();
    let t = clean(&raw);
    assert_eq!(t.column_names(), vec!["col_1", "col_2"]);
    assert_eq!(t.row(0).unwrap(), vec![&Cell::from("N/A"), &Cell::from("N/A")]);
    assert_eq!(t.row(1).unwrap(), vec![&Cell::from("foo"), &Cell::from("Bar")]);
}

#[test]
fn cleaning_is_idempotent_and_complete() {
    let tables = vec![
        RawTable::new(vec![
            Column::new(" A b ", vec![Cell::Float(f64::NAN), Cell::from("x\r\ny")]),
            Column::new("B", vec![Cell::Int(1), Cell::Missing]),
        ])
        .unwrap(),
        RawTable::new(vec![Column::new("Only Missing", vec![Cell::Missing; 3])]).unwrap(),
        RawTable::default(),
    ];
    for raw in tables {
        let once = clean(&raw);
        assert_eq!(clean(once.as_raw()), once);
        for col in once.columns() {
            assert!(!col.values.iter().any(Cell::is_missing), "{}", col.name);
            assert_eq!(col.name, col.name.trim().replace(' ', "_").to_lowercase());
        }
    }
}

#[test]
fn sniffer_prefers_dollar_and_falls_back_to_it() {
    let ranked = b"$;,\t|:";
    assert_eq!(sniff("a$b;c\n1$2;3\n4$5;6\n", ranked), b'$');
    assert_eq!(sniff("just one column\nof words\n", ranked), b'$');
    assert_eq!(sniff("", ranked), b'$');
}

#[tokio::test]
async fn undetectable_delimiter_gives_one_column() {
    let tmp = tempfile::tempdir().unwrap();
    let out = ingest(
        UploadedFile::from_bytes("notes.csv", b"Note\nfirst line\nsecond line\n".to_vec()),
        &config(tmp.path()),
    )
    .await
    .unwrap();
    assert_eq!(out.table.column_names(), vec!["note"]);
    assert_eq!(out.stats.rows, 2);
}

#[tokio::test]
async fn legacy_encoded_semicolon_csv() {
    let tmp = tempfile::tempdir().unwrap();
    // "Ville;Température\nMontréal;-3,5\nQuébec;-7\n" in Windows-1252
    let mut bytes = b"Ville;Temp\xe9rature\n".to_vec();
    bytes.extend_from_slice(b"Montr\xe9al;-3,5\nQu\xe9bec;-7\n");
    let out = ingest(UploadedFile::from_bytes("meteo.csv", bytes), &config(tmp.path()))
        .await
        .unwrap();
    assert_eq!(out.table.column_names(), vec!["ville", "température"]);
    assert_eq!(out.table.columns()[0].values[1], Cell::from("Québec"));
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

struct CountingReader {
    kind: FileKind,
    calls: AtomicUsize,
}

impl FormatReader for CountingReader {
    fn kind(&self) -> FileKind {
        self.kind
    }

    fn read(&self, _upload: &UploadedFile) -> Result<RawTable, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RawTable::new(vec![Column::new("Sheet Col", vec![Cell::Int(1)])])
    }
}

#[test]
fn uppercase_xls_uses_spreadsheet_reader() {
    let tmp = tempfile::tempdir().unwrap();
    let stub = Arc::new(CountingReader {
        kind: FileKind::Excel,
        calls: AtomicUsize::new(0),
    });
    let d = Dispatcher::new(&config(tmp.path())).with_reader(stub.clone());
    let t = d
        .dispatch(&UploadedFile::from_bytes("report.XLS", vec![0xd0, 0xcf]))
        .unwrap();
    assert_eq!(t.column_names(), vec!["sheet_col"]);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unknown_extension_is_rejected_before_reading() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = tmp.path().join("staging");
    let d = Dispatcher::new(&config(&staging));
    let err = d
        .dispatch(&UploadedFile::from_bytes("data.unknownext", b"a,b\n".to_vec()))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UnsupportedType);
    assert!(!staging.exists(), "nothing should have been staged");
}

// ── SAS formats and staging cleanup ──────────────────────────────────────────

#[tokio::test]
async fn sas7bdat_upload_is_cleaned_and_unstaged() {
    let tmp = tempfile::tempdir().unwrap();
    let bytes = sasfile::sas7bdat::to_bytes(&adverse_events("S"));
    let out = ingest(UploadedFile::from_bytes("ae.sas7bdat", bytes), &config(tmp.path()))
        .await
        .unwrap();
    assert_eq!(out.table.column_names(), vec!["usubjid", "aeterm", "aesev", "aeout"]);
    assert_eq!(out.table.columns()[1].values[0], Cell::from("Headache and nausea"));
    assert_eq!(out.table.columns()[2].values[1], Cell::from("N/A"));
    assert!(out.stats.dropped_columns.is_empty());
    assert!(staged_files(tmp.path()).is_empty());
}

#[tokio::test]
async fn xpt_upload_is_cleaned_and_unstaged() {
    let tmp = tempfile::tempdir().unwrap();
    let bytes = sasfile::xport::to_bytes(&adverse_events("X"));
    let out = ingest(UploadedFile::from_bytes("ae.xpt", bytes), &config(tmp.path()))
        .await
        .unwrap();
    assert_eq!(out.stats.rows, 2);
    assert_eq!(out.table.columns()[0].values[1], Cell::from("X-002"));
    assert_eq!(out.table.columns()[2].values[0], Cell::Float(2.0));
    assert!(staged_files(tmp.path()).is_empty());
}

#[tokio::test]
async fn decode_failures_leave_nothing_behind() {
    let tmp = tempfile::tempdir().unwrap();
    for name in ["broken.sas7bdat", "broken.xpt"] {
        let err = ingest(
            UploadedFile::from_bytes(name, vec![b'x'; 4096]),
            &config(tmp.path()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::DecodeFailure, "{name}: {err}");
        assert!(err.is_user_facing());
    }
    assert!(staged_files(tmp.path()).is_empty());
}

#[tokio::test]
async fn concurrent_uploads_with_the_same_name() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let cfg = cfg.clone();
            let bytes = sasfile::sas7bdat::to_bytes(&adverse_events(&format!("T{i}")));
            tokio::spawn(async move {
                let out = ingest(UploadedFile::from_bytes("ae.sas7bdat", bytes), &cfg)
                    .await
                    .unwrap();
                (i, out)
            })
        })
        .collect();

    for task in tasks {
        let (i, out) = task.await.unwrap();
        assert_eq!(
            out.table.columns()[0].values[0],
            Cell::Text(format!("T{i}-001"))
        );
    }
    assert!(staged_files(tmp.path()).is_empty());
}

// ── CPORT fallback ───────────────────────────────────────────────────────────

#[cfg(unix)]
mod cport {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tablesift::IngestOutput;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-stattransfer");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn cport_upload() -> UploadedFile {
        let mut bytes = b"**COMPRESSED** **COMPRESSED** **COMPRESSED** **COMPRESSED**".to_vec();
        bytes.resize(800, b' ');
        UploadedFile::from_bytes("lb.xpt", bytes)
    }

    fn run(
        script_body: &str,
        timeout: Option<u64>,
    ) -> (tempfile::TempDir, Result<IngestOutput, IngestError>) {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let tmp = tempfile::tempdir().unwrap();
        let tools = tmp.path().join("tools");
        std::fs::create_dir_all(&tools).unwrap();
        let fixture = tools.join("converted.xpt");
        std::fs::write(&fixture, sasfile::xport::to_bytes(&adverse_events("C"))).unwrap();
        let body = script_body.replace("{fixture}", &fixture.to_string_lossy());
        let program = write_script(&tools, &body);

        let cfg = IngestConfig::builder()
            .staging_dir(tmp.path().join("staging"))
            .converter_program(program.to_string_lossy())
            .converter_timeout_secs(timeout)
            .build()
            .unwrap();
        let result = ingest_blocking(&cport_upload(), None, &Dispatcher::new(&cfg));
        (tmp, result)
    }

    #[test]
    fn converted_file_is_read() {
        let (tmp, result) = run(r#"cp "{fixture}" "${2#/out=}""#, Some(20));
        let out = result.unwrap();
        assert_eq!(out.kind, FileKind::Xpt);
        assert_eq!(out.table.columns()[0].values[0], Cell::from("C-001"));
        assert!(staged_files(&tmp.path().join("staging")).is_empty());
    }

    #[test]
    fn converter_failure_cleans_up() {
        let (tmp, result) = run("echo 'license expired' >&2; exit 4", Some(20));
        let err = result.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ConversionFailure);
        assert!(err.to_string().contains("license expired"), "{err}");
        assert!(!err.is_user_facing());
        assert!(staged_files(&tmp.path().join("staging")).is_empty());
    }

    #[test]
    fn converter_timeout_cleans_up() {
        let (tmp, result) = run("exec sleep 30", Some(1));
        assert!(matches!(
            result,
            Err(IngestError::ConversionTimeout { secs: 1, .. })
        ));
        assert!(staged_files(&tmp.path().join("staging")).is_empty());
    }

    #[test]
    fn unreadable_conversion_cleans_up() {
        let (tmp, result) = run(r#"echo garbage > "${2#/out=}""#, Some(20));
        assert!(matches!(result, Err(IngestError::ConvertedUnreadable { .. })));
        assert!(staged_files(&tmp.path().join("staging")).is_empty());
    }
}

#[test]
fn missing_converter_is_a_conversion_failure() {
    let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let tmp = tempfile::tempdir().unwrap();
    let cfg = IngestConfig::builder()
        .staging_dir(tmp.path())
        .converter_program("/nonexistent/stattransfer")
        .build()
        .unwrap();
    let mut bytes = b"**COMPRESSED**".to_vec();
    bytes.resize(160, b' ');
    let err = ingest_blocking(
        &UploadedFile::from_bytes("lb.xpt", bytes),
        None,
        &Dispatcher::new(&cfg),
    )
    .unwrap_err();
    assert!(matches!(err, IngestError::ConversionFailed { .. }), "{err}");
    assert!(staged_files(tmp.path()).is_empty());
}

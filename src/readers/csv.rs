//! Delimited-text reader.
//!
//! Encoding and delimiter are both detected; the first record is the header.
//! Values are typed per column the way pandas does it: the usual NA tokens
//! are missing, and a column whose remaining values all parse as integers
//! (or floats, or booleans) gets that type, otherwise text.

use super::FormatReader;
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::{encoding, sniff};
use crate::table::{dedupe_headers, Cell, Column, RawTable};
use crate::upload::{FileKind, UploadedFile};
use tracing::debug;

/// Tokens read as missing values.
const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Reads `.csv` uploads.
#[derive(Debug, Clone)]
pub struct CsvReader {
    candidates: Vec<u8>,
    sample_chars: usize,
}

impl CsvReader {
    pub fn new(candidates: impl Into<Vec<u8>>, sample_chars: usize) -> Self {
        Self {
            candidates: candidates.into(),
            sample_chars,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.delimiter_candidates.clone(), config.sniff_sample_chars)
    }

    /// Parse already-decoded text.
    pub fn parse_text(&self, text: &str) -> Result<RawTable, IngestError> {
        let sample = sniff::sample_prefix(text, self.sample_chars);
        let delimiter = sniff::sniff(sample, &self.candidates);
        debug!("Sniffed delimiter {:?}", delimiter as char);

        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let header = reader.headers().map_err(decode_error)?.clone();
        if header.is_empty() || (header.len() == 1 && header[0].trim().is_empty()) {
            return Err(decode_error("no columns to parse from file"));
        }
        let names = dedupe_headers(header.iter().map(str::to_string).collect());
        let width = names.len();

        let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(decode_error)?;
            if record.len() > width {
                return Err(decode_error(format!(
                    "expected {} fields in line {}, saw {}",
                    width,
                    line + 2,
                    record.len()
                )));
            }
            for (i, column) in raw.iter_mut().enumerate() {
                column.push(record.get(i).filter(|v| !is_na(v)).map(str::to_string));
            }
        }

        let columns = names
            .into_iter()
            .zip(raw)
            .map(|(name, values)| Column::new(name, infer(values)))
            .collect();
        RawTable::new(columns)
    }
}

impl FormatReader for CsvReader {
    fn kind(&self) -> FileKind {
        FileKind::Csv
    }

    fn read(&self, upload: &UploadedFile) -> Result<RawTable, IngestError> {
        let (text, _encoding) = encoding::decode_auto(upload.bytes());
        self.parse_text(&text)
    }
}

fn decode_error(e: impl ToString) -> IngestError {
    IngestError::Decode {
        kind: FileKind::Csv,
        detail: e.to_string(),
    }
}

fn is_na(value: &str) -> bool {
    NA_TOKENS.contains(&value)
}

/// Type one column: all-int, else all-float, else all-bool, else text.
fn infer(values: Vec<Option<String>>) -> Vec<Cell> {
    let present = || values.iter().flatten().map(|s| s.trim());

    if present().all(|s| s.parse::<i64>().is_ok()) {
        return values
            .iter()
            .map(|v| match v.as_deref().map(str::trim).map(str::parse::<i64>) {
                Some(Ok(i)) => Cell::Int(i),
                _ => Cell::Missing,
            })
            .collect();
    }
    if present().all(|s| s.parse::<f64>().is_ok()) {
        return values
            .iter()
            .map(|v| match v.as_deref().map(str::trim).map(str::parse::<f64>) {
                Some(Ok(f)) => Cell::Float(f),
                _ => Cell::Missing,
            })
            .collect();
    }
    if present().all(|s| parse_bool(s).is_some()) {
        return values
            .iter()
            .map(|v| v.as_deref().and_then(parse_bool).map_or(Cell::Missing, Cell::Bool))
            .collect();
    }
    values
        .into_iter()
        .map(|v| v.map_or(Cell::Missing, Cell::Text))
        .collect()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DELIMITERS;

    fn reader() -> CsvReader {
        CsvReader::new(DEFAULT_DELIMITERS, 2048)
    }

    fn read(text: &str) -> RawTable {
        reader()
            .read(&UploadedFile::from_bytes("t.csv", text.as_bytes().to_vec()))
            .expect("read")
    }

    #[test]
    fn simple_comma_file() {
        let t = read("col1,col2\n1,2\n3,4");
        assert_eq!(t.column_names(), vec!["col1", "col2"]);
        assert_eq!(t.columns()[0].values, vec![Cell::Int(1), Cell::Int(3)]);
        assert_eq!(t.columns()[1].values, vec![Cell::Int(2), Cell::Int(4)]);
    }

    #[test]
    fn dollar_file_with_types() {
        let t = read("id$score$ok$name\n1$1.5$true$Ann\n2$$False$\n");
        assert_eq!(t.columns()[0].values, vec![Cell::Int(1), Cell::Int(2)]);
        assert_eq!(t.columns()[1].values, vec![Cell::Float(1.5), Cell::Missing]);
        assert_eq!(t.columns()[2].values, vec![Cell::Bool(true), Cell::Bool(false)]);
        assert_eq!(t.columns()[3].values, vec![Cell::from("Ann"), Cell::Missing]);
    }

    #[test]
    fn na_tokens_are_missing() {
        let t = read("a,b\nNA,x\nnull,N/A\n5,y\n");
        assert_eq!(t.columns()[0].values, vec![Cell::Missing, Cell::Missing, Cell::Int(5)]);
        assert_eq!(
            t.columns()[1].values,
            vec![Cell::from("x"), Cell::Missing, Cell::from("y")]
        );
    }

    #[test]
    fn short_rows_are_padded() {
        let mut text = String::from("a;b;c\n");
        for i in 0..8 {
            text.push_str(&format!("{i};{i};{i}\n"));
        }
        text.push_str("8;9\n");
        let t = read(&text);
        assert_eq!(t.num_rows(), 9);
        assert_eq!(t.columns()[1].values[8], Cell::Int(9));
        assert_eq!(t.columns()[2].values[8], Cell::Missing);
    }

    #[test]
    fn long_rows_are_rejected() {
        let mut text = String::from("a,b\n1,2\n1,2,3\n");
        for _ in 0..8 {
            text.push_str("1,2\n");
        }
        let err = reader()
            .read(&UploadedFile::from_bytes("t.csv", text.into_bytes()))
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode { kind: FileKind::Csv, .. }));
        assert!(err.to_string().contains("line 3"), "got: {err}");
    }

    #[test]
    fn empty_file_is_a_decode_error() {
        let err = reader()
            .read(&UploadedFile::from_bytes("t.csv", Vec::new()))
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }));
    }

    #[test]
    fn header_only() {
        let t = read("a,b\n");
        assert_eq!(t.num_columns(), 2);
        assert_eq!(t.num_rows(), 0);
    }

    #[test]
    fn duplicate_and_blank_headers() {
        let t = read("x,,x\n1,2,3\n");
        assert_eq!(t.column_names(), vec!["x", "Unnamed: 1", "x.1"]);
    }

    #[test]
    fn latin1_upload() {
        let (bytes, _, _) =
            encoding_rs::WINDOWS_1252.encode("ville,pays\nBesançon,France\nZürich,Suisse\nMálaga,España\n");
        let t = reader()
            .read(&UploadedFile::from_bytes("t.csv", bytes.into_owned()))
            .unwrap();
        assert_eq!(t.columns()[0].values[0], Cell::from("Besançon"));
    }

    #[test]
    fn quoted_fields_keep_newlines() {
        let t = read("id,note\n1,\"two\nlines\"\n");
        assert_eq!(t.columns()[1].values[0], Cell::from("two\nlines"));
    }
}

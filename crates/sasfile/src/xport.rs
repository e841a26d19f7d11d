//! SAS transport (XPORT, version 5) reader and writer.
//!
//! ## Layout
//!
//! Everything is a sequence of 80-byte card images:
//!
//! ```text
//! LIBRARY header │ real header │ modified date
//! MEMBER header  │ DSCRPTR header │ member data │ member label
//! NAMESTR header (nvars) │ nvars × 140-byte namestr, blank-padded to 80
//! OBS header     │ rows packed back to back, blank-padded to 80
//! [next MEMBER header …]
//! ```
//!
//! Only the first member is decoded; libraries with several datasets are
//! rare in uploads and every consumer downstream expects one table.
//!
//! ## Row count
//!
//! The format does not record the number of observations. It is derived
//! from the byte length of the OBS section, minus trailing blank padding
//! rows that fit inside the last card image.

use crate::dataset::{non_empty, Dataset, Value, VarType, Variable};
use crate::error::SasError;
use crate::{ibm, text};
use std::path::Path;
use tracing::debug;

const RECORD_LEN: usize = 80;
const DEFAULT_NAMESTR_LEN: usize = 140;

const LIBRARY_HEADER: &[u8] = b"HEADER RECORD*******LIBRARY HEADER RECORD!!!!!!!";
const LIBRARY_HEADER_V8: &[u8] = b"HEADER RECORD*******LIBV8   HEADER RECORD!!!!!!!";
const MEMBER_HEADER: &[u8] = b"HEADER RECORD*******MEMBER  HEADER RECORD!!!!!!!";
const MEMBER_HEADER_V8: &[u8] = b"HEADER RECORD*******MEMBV8  HEADER RECORD!!!!!!!";
const DSCRPTR_HEADER: &[u8] = b"HEADER RECORD*******DSCRPTR HEADER RECORD!!!!!!!";
const NAMESTR_HEADER: &[u8] = b"HEADER RECORD*******NAMESTR HEADER RECORD!!!!!!!";
const OBS_HEADER: &[u8] = b"HEADER RECORD*******OBS     HEADER RECORD!!!!!!!";

/// Banner written at the top of every `PROC CPORT` library.
const CPORT_BANNER: &[u8] = b"**COMPRESSED**";

/// Read and decode a transport file from disk.
pub fn read_path(path: impl AsRef<Path>) -> Result<Dataset, SasError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    debug!("Decoding transport file {} ({} bytes)", path.display(), bytes.len());
    parse(&bytes)
}

/// True when the bytes start with the CPORT banner.
pub fn is_cport(bytes: &[u8]) -> bool {
    bytes.starts_with(CPORT_BANNER)
}

/// Decode the first member of an in-memory transport file.
pub fn parse(bytes: &[u8]) -> Result<Dataset, SasError> {
    if is_cport(bytes) {
        return Err(SasError::Cport);
    }
    let library = record(bytes, 0, "library header")?;
    if library.starts_with(LIBRARY_HEADER_V8) {
        return Err(SasError::UnsupportedVersion("8 (LIBV8)".into()));
    }
    if !library.starts_with(LIBRARY_HEADER) {
        return Err(SasError::NotTransport {
            found: String::from_utf8_lossy(&library[..LIBRARY_HEADER.len()]).into_owned(),
        });
    }

    // Records 1 and 2 hold the library creation/modification stamps.
    let member = record(bytes, 3 * RECORD_LEN, "member header")?;
    if member.starts_with(MEMBER_HEADER_V8) {
        return Err(SasError::UnsupportedVersion("8 (MEMBV8)".into()));
    }
    if !member.starts_with(MEMBER_HEADER) {
        return Err(SasError::Malformed("member header not found".into()));
    }
    let namestr_len = ascii_number(&member[75..78]).unwrap_or(DEFAULT_NAMESTR_LEN);
    if namestr_len < 88 {
        return Err(SasError::Malformed(format!(
            "namestr length {namestr_len} is too short"
        )));
    }

    let descriptor = record(bytes, 4 * RECORD_LEN, "descriptor header")?;
    if !descriptor.starts_with(DSCRPTR_HEADER) {
        return Err(SasError::Malformed("descriptor header not found".into()));
    }

    let member_data = record(bytes, 5 * RECORD_LEN, "member data")?;
    let name = text::decode_header(&member_data[8..16]);
    let member_label = record(bytes, 6 * RECORD_LEN, "member label")?;
    let label = non_empty(text::decode_header(&member_label[32..72]));

    let namestr_header = record(bytes, 7 * RECORD_LEN, "namestr header")?;
    if !namestr_header.starts_with(NAMESTR_HEADER) {
        return Err(SasError::Malformed("namestr header not found".into()));
    }
    let nvars = ascii_number(&namestr_header[54..58])
        .ok_or_else(|| SasError::Malformed("unreadable variable count".into()))?;

    let namestr_start = 8 * RECORD_LEN;
    let mut fields = Vec::with_capacity(nvars);
    for i in 0..nvars {
        let offset = namestr_start + i * namestr_len;
        let raw = bytes
            .get(offset..offset + namestr_len)
            .ok_or(SasError::Truncated {
                context: "namestr records",
                offset,
            })?;
        fields.push(parse_namestr(raw)?);
    }

    let obs_header_offset = namestr_start + round_up(nvars * namestr_len);
    let obs_header = record(bytes, obs_header_offset, "observation header")?;
    if !obs_header.starts_with(OBS_HEADER) {
        return Err(SasError::Malformed("observation header not found".into()));
    }

    let data_start = obs_header_offset + RECORD_LEN;
    let data_end = next_member(bytes, data_start).unwrap_or(bytes.len());
    let data = &bytes[data_start..data_end];

    let row_len = fields
        .iter()
        .map(|f| f.position + f.variable.length)
        .max()
        .unwrap_or(0);
    let rows = if row_len == 0 {
        Vec::new()
    } else {
        decode_rows(data, row_len, &fields)
    };

    debug!(
        "Transport member '{}': {} variables, {} rows",
        name,
        fields.len(),
        rows.len()
    );

    Ok(Dataset {
        name,
        label,
        variables: fields.into_iter().map(|f| f.variable).collect(),
        rows,
    })
}

// ── Internal ─────────────────────────────────────────────────────────────

struct Field {
    variable: Variable,
    position: usize,
}

fn record<'a>(bytes: &'a [u8], offset: usize, context: &'static str) -> Result<&'a [u8], SasError> {
    bytes
        .get(offset..offset + RECORD_LEN)
        .ok_or(SasError::Truncated { context, offset })
}

fn round_up(n: usize) -> usize {
    n.div_ceil(RECORD_LEN) * RECORD_LEN
}

fn ascii_number(bytes: &[u8]) -> Option<usize> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

fn be_i16(bytes: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn be_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Namestr layout (big-endian): ntype, nhfun, nlng, nvar0 (i16 each), nname[8],
/// nlabel[40], nform[8], nfl, nfd, nfj (i16), nfill[2], niform[8], nifl, nifd
/// (i16), npos (i32), rest unused.
fn parse_namestr(raw: &[u8]) -> Result<Field, SasError> {
    let var_type = match be_i16(raw, 0) {
        1 => VarType::Numeric,
        2 => VarType::Character,
        other => {
            return Err(SasError::Malformed(format!("unknown variable type {other}")));
        }
    };
    let length = be_i16(raw, 4);
    let position = be_i32(raw, 84);
    if length <= 0 || position < 0 {
        return Err(SasError::Malformed(format!(
            "invalid variable length {length} at position {position}"
        )));
    }
    let length = length as usize;
    if var_type == VarType::Numeric && !(2..=8).contains(&length) {
        return Err(SasError::Malformed(format!(
            "numeric variable stored in {length} bytes"
        )));
    }

    let format = text::decode_header(&raw[56..64]);
    Ok(Field {
        variable: Variable {
            name: text::decode_header(&raw[8..16]),
            label: non_empty(text::decode_header(&raw[16..56])),
            format: non_empty(format),
            var_type,
            length,
        },
        position: position as usize,
    })
}

/// Offset of the next MEMBER header, searched on card boundaries.
fn next_member(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len())
        .step_by(RECORD_LEN)
        .find(|&offset| bytes[offset..].starts_with(MEMBER_HEADER))
}

fn decode_rows(data: &[u8], row_len: usize, fields: &[Field]) -> Vec<Vec<Value>> {
    let mut nobs = data.len() / row_len;
    // Rows made only of blanks inside the final card are padding.
    while nobs > 0 {
        let start = (nobs - 1) * row_len;
        let in_last_card = start + RECORD_LEN >= data.len();
        if in_last_card && data[start..start + row_len].iter().all(|&b| b == b' ') {
            nobs -= 1;
        } else {
            break;
        }
    }

    data.chunks_exact(row_len)
        .take(nobs)
        .map(|row| {
            fields
                .iter()
                .map(|f| {
                    let cell = &row[f.position..f.position + f.variable.length];
                    match f.variable.var_type {
                        VarType::Numeric => match ibm::missing_code(cell) {
                            Some(code) => Value::Missing(code),
                            None => Value::Number(ibm::to_f64(cell)),
                        },
                        VarType::Character => Value::Text(text::decode(cell, None)),
                    }
                })
                .collect()
        })
        .collect()
}

// ── Writer ───────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "writer"))]
pub use writer::to_bytes;

#[cfg(any(test, feature = "writer"))]
mod writer {
    use super::*;

    /// Encode a dataset as a single-member transport file.
    ///
    /// Names are truncated to 8 bytes and labels to 40, as the v5 format
    /// requires. Missing numbers are written as `.`.
    pub fn to_bytes(dataset: &Dataset) -> Vec<u8> {
        let stamp = "01JAN70:00:00:00";
        let mut out = Vec::new();

        out.extend(header_record(LIBRARY_HEADER, "000000000000000000000000000000  "));
        out.extend(card(&format!(
            "{:<8}{:<8}{:<8}{:<8}{:<8}{:24}{}",
            "SAS", "SAS", "SASLIB", "9.4", "LINUX", "", stamp
        )));
        out.extend(card(&format!("{stamp}{:64}", "")));

        out.extend(header_record(MEMBER_HEADER, "000000000000000001600000000140  "));
        out.extend(header_record(DSCRPTR_HEADER, "000000000000000000000000000000  "));
        out.extend(card(&format!(
            "{:<8}{:<8}{:<8}{:<8}{:<8}{:24}{}",
            "SAS",
            truncate(&dataset.name, 8),
            "SASDATA",
            "9.4",
            "LINUX",
            "",
            stamp
        )));
        out.extend(card(&format!(
            "{stamp}{:16}{:<40}{:<8}",
            "",
            truncate(dataset.label.as_deref().unwrap_or(""), 40),
            ""
        )));

        out.extend(header_record(
            NAMESTR_HEADER,
            &format!("000000{:04}00000000000000000000  ", dataset.variables.len()),
        ));

        let mut namestrs = Vec::new();
        let mut position = 0usize;
        for (i, var) in dataset.variables.iter().enumerate() {
            let mut raw = vec![0u8; DEFAULT_NAMESTR_LEN];
            let ntype: i16 = match var.var_type {
                VarType::Numeric => 1,
                VarType::Character => 2,
            };
            raw[0..2].copy_from_slice(&ntype.to_be_bytes());
            raw[4..6].copy_from_slice(&(var.length as i16).to_be_bytes());
            raw[6..8].copy_from_slice(&((i + 1) as i16).to_be_bytes());
            raw[8..16].copy_from_slice(&padded(&var.name, 8));
            raw[16..56].copy_from_slice(&padded(var.label.as_deref().unwrap_or(""), 40));
            raw[56..64].copy_from_slice(&padded(var.format.as_deref().unwrap_or(""), 8));
            raw[72..80].copy_from_slice(&padded("", 8));
            raw[84..88].copy_from_slice(&(position as i32).to_be_bytes());
            position += var.length;
            namestrs.extend(raw);
        }
        pad_to_card(&mut namestrs);
        out.extend(namestrs);

        out.extend(header_record(OBS_HEADER, "000000000000000000000000000000  "));
        let mut data = Vec::new();
        for row in &dataset.rows {
            for (var, value) in dataset.variables.iter().zip(row) {
                match (var.var_type, value) {
                    (VarType::Numeric, Value::Number(n)) => {
                        data.extend_from_slice(&ibm::from_f64(*n)[..var.length])
                    }
                    (VarType::Numeric, _) => {
                        let mut cell = vec![0u8; var.length];
                        cell[0] = b'.';
                        data.extend(cell);
                    }
                    (VarType::Character, Value::Text(s)) => data.extend(padded(s, var.length)),
                    (VarType::Character, _) => data.extend(padded("", var.length)),
                }
            }
        }
        pad_to_card(&mut data);
        out.extend(data);
        out
    }

    fn header_record(prefix: &[u8], tail: &str) -> Vec<u8> {
        let mut rec = prefix.to_vec();
        rec.extend_from_slice(tail.as_bytes());
        rec.resize(RECORD_LEN, b' ');
        rec
    }

    fn card(s: &str) -> Vec<u8> {
        padded(s, RECORD_LEN)
    }

    fn padded(s: &str, len: usize) -> Vec<u8> {
        let mut v: Vec<u8> = s.bytes().take(len).collect();
        v.resize(len, b' ');
        v
    }

    fn truncate(s: &str, len: usize) -> String {
        s.chars().take(len).collect()
    }

    fn pad_to_card(buf: &mut Vec<u8>) {
        let target = round_up(buf.len());
        buf.resize(target, b' ');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MissingValue;

    fn sample() -> Dataset {
        Dataset {
            name: "DM".into(),
            label: Some("Demographics".into()),
            variables: vec![
                Variable {
                    name: "USUBJID".into(),
                    label: Some("Unique Subject ID".into()),
                    format: None,
                    var_type: VarType::Character,
                    length: 10,
                },
                Variable {
                    name: "AGE".into(),
                    label: None,
                    format: None,
                    var_type: VarType::Numeric,
                    length: 8,
                },
            ],
            rows: vec![
                vec![Value::Text("S-001".into()), Value::Number(35.0)],
                vec![Value::Text("S-002".into()), Value::Missing(MissingValue::Standard)],
                vec![Value::Text("S-003".into()), Value::Number(41.5)],
            ],
        }
    }

    #[test]
    fn decodes_written_file() {
        let bytes = to_bytes(&sample());
        assert_eq!(bytes.len() % RECORD_LEN, 0);

        let ds = parse(&bytes).expect("parse");
        assert_eq!(ds.name, "DM");
        assert_eq!(ds.label.as_deref(), Some("Demographics"));
        assert_eq!(ds.variables.len(), 2);
        assert_eq!(ds.variables[0].name, "USUBJID");
        assert_eq!(ds.variables[0].label.as_deref(), Some("Unique Subject ID"));
        assert_eq!(ds.variables[1].var_type, VarType::Numeric);
        assert_eq!(ds.rows, sample().rows);
    }

    #[test]
    fn blank_padding_is_not_a_row() {
        // 18-byte rows: 54 bytes of data plus 26 blanks, which hold one
        // all-blank pseudo-row.
        let ds = parse(&to_bytes(&sample())).unwrap();
        assert_eq!(ds.num_rows(), 3);
    }

    #[test]
    fn short_numeric_storage() {
        let mut ds = sample();
        ds.variables[1].length = 4;
        let back = parse(&to_bytes(&ds)).unwrap();
        assert_eq!(back.rows[0][1], Value::Number(35.0));
    }

    #[test]
    fn cport_banner_is_reported() {
        let mut bytes = b"**COMPRESSED** **COMPRESSED** **COMPRESSED** **COMPRESSED** **COMPRESSED********".to_vec();
        bytes.resize(400, 0);
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, SasError::Cport));
        assert!(err.to_string().contains("CPORT"));
    }

    #[test]
    fn garbage_is_not_transport() {
        let err = parse(&[b'x'; 160]).unwrap_err();
        assert!(matches!(err, SasError::NotTransport { .. }), "got {err:?}");
    }

    #[test]
    fn truncated_file() {
        let bytes = to_bytes(&sample());
        let err = parse(&bytes[..700]).unwrap_err();
        assert!(matches!(err, SasError::Truncated { .. }), "got {err:?}");
    }

    #[test]
    fn second_member_is_ignored() {
        let mut bytes = to_bytes(&sample());
        let second = to_bytes(&sample());
        // Append the second member's records (skip its three library records).
        bytes.extend_from_slice(&second[3 * RECORD_LEN..]);
        let ds = parse(&bytes).unwrap();
        assert_eq!(ds.num_rows(), 3);
    }

    #[test]
    fn read_path_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dm.xpt");
        std::fs::write(&path, to_bytes(&sample())).unwrap();
        assert_eq!(read_path(&path).unwrap().rows, sample().rows);
        assert!(matches!(
            read_path(dir.path().join("missing.xpt")),
            Err(SasError::Io(_))
        ));
    }
}

//! Character-field decoding.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

/// Strip the blank/NUL padding SAS appends to character values.
pub(crate) fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Decode a padded character field.
///
/// With no declared encoding the bytes are taken as UTF-8 when valid and as
/// Windows-1252 (a Latin-1 superset) otherwise, which covers what SAS
/// sessions write in practice.
pub(crate) fn decode(bytes: &[u8], encoding: Option<&'static Encoding>) -> String {
    let bytes = trim_padding(bytes);
    match encoding {
        Some(enc) => enc.decode_without_bom_handling(bytes).0.into_owned(),
        None => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
        },
    }
}

/// Header strings (names, labels) are ASCII in practice; decode leniently.
pub(crate) fn decode_header(bytes: &[u8]) -> String {
    decode(bytes, None).trim().to_string()
}

/// Encoding for a SAS7BDAT session-encoding code (header byte 70).
///
/// `None` means "unspecified" and falls back to trying UTF-8, then Windows-1252.
pub(crate) fn sas_encoding(code: u8) -> Option<&'static Encoding> {
    let label: &[u8] = match code {
        20 => return Some(UTF_8),
        28 | 29 => b"windows-1252",
        30 => b"iso-8859-2",
        31 => b"iso-8859-3",
        32 => b"iso-8859-4",
        33 => b"iso-8859-5",
        34 => b"iso-8859-6",
        35 => b"iso-8859-7",
        36 => b"iso-8859-8",
        37 => b"windows-1254",
        38 => b"iso-8859-10",
        39 | 51 => b"windows-874",
        40 => b"iso-8859-15",
        49 => b"ibm866",
        60 => b"windows-1250",
        61 => b"windows-1251",
        62 => b"windows-1252",
        63 => b"windows-1253",
        64 => b"windows-1254",
        65 => b"windows-1255",
        66 => b"windows-1256",
        67 => b"windows-1257",
        68 => b"windows-1258",
        123 => b"big5",
        125 | 126 => b"gbk",
        134 => b"euc-jp",
        136 | 140 => b"euc-kr",
        138 => b"shift_jis",
        _ => return None,
    };
    Encoding::for_label(label)
}

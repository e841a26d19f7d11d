//! Character-encoding detection for delimited text.
//!
//! Order of evidence: a byte-order mark wins outright; otherwise content
//! that is valid UTF-8 is UTF-8; otherwise `chardetng` guesses from byte
//! statistics. Detection never fails. UTF-8 is the answer whenever the
//! guess would be unusable for text parsing.

use encoding_rs::{Encoding, REPLACEMENT, UTF_16BE, UTF_16LE, UTF_8};
use tracing::{debug, warn};

/// Detect the encoding of `bytes`.
pub fn detect(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _bom_len)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, true);
    // UTF-16 without a BOM and the replacement encoding are never right for
    // a text file that reached this point.
    if guess == UTF_16LE || guess == UTF_16BE || guess == REPLACEMENT {
        return UTF_8;
    }
    guess
}

/// Decode `bytes` with `encoding`, removing a matching BOM.
///
/// When the bytes are not valid in `encoding` the result is lossy UTF-8
/// instead, so malformed sequences become U+FFFD rather than an error.
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
    if !had_errors {
        return text.into_owned();
    }
    warn!(
        "Content is not valid {}; decoding as lossy UTF-8",
        encoding.name()
    );
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Detect, then decode. Returns the text and the encoding it was read as.
pub fn decode_auto(bytes: &[u8]) -> (String, &'static Encoding) {
    let encoding = detect(bytes);
    debug!("Detected encoding {}", encoding.name());
    (decode(bytes, encoding), encoding)
}

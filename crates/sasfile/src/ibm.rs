//! IBM System/370 hexadecimal floating point ↔ IEEE 754.
//!
//! Transport files store numbers as IBM doubles: one sign bit, a 7-bit
//! base-16 exponent biased by 64, and a 56-bit fraction. Variables may be
//! stored in 2–8 bytes; shorter values are the leading bytes of the full
//! 8-byte representation.

use crate::dataset::MissingValue;

const FRACTION_MASK: u64 = 0x00ff_ffff_ffff_ffff;

/// Classify a stored numeric value as one of the SAS missing codes.
///
/// Missing values are a marker byte (`.`, `_`, or `A`–`Z`) followed by
/// zero bytes.
pub fn missing_code(bytes: &[u8]) -> Option<MissingValue> {
    let (first, rest) = bytes.split_first()?;
    if rest.iter().any(|&b| b != 0) {
        return None;
    }
    match *first {
        b'.' => Some(MissingValue::Standard),
        b'_' => Some(MissingValue::Underscore),
        b @ b'A'..=b'Z' => Some(MissingValue::Special(b as char)),
        _ => None,
    }
}

/// Convert a (possibly truncated) big-endian IBM double to `f64`.
///
/// Inputs longer than 8 bytes are cut to 8.
pub fn to_f64(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    let raw = u64::from_be_bytes(buf);

    let fraction = raw & FRACTION_MASK;
    if fraction == 0 {
        return 0.0;
    }
    let exponent = ((raw >> 56) & 0x7f) as i32 - 64;
    // value = 0.fraction(hex) × 16^exponent = fraction × 2^(4·exponent − 56)
    let magnitude = fraction as f64 * 2f64.powi(4 * exponent - 56);
    if raw >> 63 == 1 {
        -magnitude
    } else {
        magnitude
    }
}

/// Convert an `f64` to an 8-byte big-endian IBM double.
///
/// Values too large for the IBM range saturate; values too small flush to
/// zero. NaN is encoded as the standard missing value.
#[cfg(any(test, feature = "writer"))]
pub fn from_f64(value: f64) -> [u8; 8] {
    if value.is_nan() {
        let mut out = [0u8; 8];
        out[0] = b'.';
        return out;
    }
    if value == 0.0 {
        return [0u8; 8];
    }

    let sign: u64 = if value.is_sign_negative() { 1 } else { 0 };
    let mut v = value.abs();
    let mut exponent: i32 = 0;
    // Normalise into [1/16, 1): division by 16 is exact in binary floating point.
    while v >= 1.0 {
        v /= 16.0;
        exponent += 1;
    }
    while v < 1.0 / 16.0 {
        v *= 16.0;
        exponent -= 1;
    }

    let mut fraction = (v * 2f64.powi(56)).round() as u64;
    if fraction > FRACTION_MASK {
        fraction >>= 4;
        exponent += 1;
    }

    let biased = exponent + 64;
    if biased > 127 {
        return ((sign << 63) | (127u64 << 56) | FRACTION_MASK).to_be_bytes();
    }
    if biased < 0 {
        return [0u8; 8];
    }

    ((sign << 63) | ((biased as u64) << 56) | fraction).to_be_bytes()
}

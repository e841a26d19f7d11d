//! File header and endian-aware integer access.

use crate::error::SasError;
use crate::text;
use encoding_rs::Encoding;

pub(super) const MAGIC: [u8; 32] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc2, 0xea, 0x81,
    0x60, 0xb3, 0x14, 0x11, 0xcf, 0xbd, 0x92, 0x08, 0x00, 0x09, 0xc7, 0x31, 0x8c, 0x18, 0x1f,
    0x10, 0x11,
];

const U64_FLAG_OFFSET: usize = 32;
const ALIGN_FLAG_OFFSET: usize = 35;
const ENDIANNESS_OFFSET: usize = 37;
const ENCODING_OFFSET: usize = 70;
const DATASET_NAME: std::ops::Range<usize> = 92..156;
const HEADER_SIZE_OFFSET: usize = 196;
const PAGE_SIZE_OFFSET: usize = 200;
const PAGE_COUNT_OFFSET: usize = 204;

/// Minimum bytes needed to read every header field.
const MIN_HEADER_LEN: usize = 288;

/// Byte order and word size of the writing platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Layout {
    pub little_endian: bool,
    /// 4 on 32-bit files, 8 on 64-bit files.
    pub int_len: usize,
}

impl Layout {
    pub fn page_bit_offset(&self) -> usize {
        if self.int_len == 8 {
            32
        } else {
            16
        }
    }

    pub fn pointer_len(&self) -> usize {
        if self.int_len == 8 {
            24
        } else {
            12
        }
    }

    /// Unsigned integer of `len` bytes (1, 2, 4 or 8) at `at`.
    pub fn uint(&self, bytes: &[u8], at: usize, len: usize) -> Result<u64, SasError> {
        let raw = bytes.get(at..at + len).ok_or(SasError::Truncated {
            context: "integer field",
            offset: at,
        })?;
        let mut buf = [0u8; 8];
        if self.little_endian {
            buf[..len].copy_from_slice(raw);
            Ok(u64::from_le_bytes(buf))
        } else {
            buf[8 - len..].copy_from_slice(raw);
            Ok(u64::from_be_bytes(buf))
        }
    }

    pub fn usize(&self, bytes: &[u8], at: usize, len: usize) -> Result<usize, SasError> {
        let v = self.uint(bytes, at, len)?;
        usize::try_from(v).map_err(|_| SasError::Malformed(format!("value {v} out of range")))
    }

    /// Numeric cell stored in `raw.len()` (≤ 8) bytes. Short values are the
    /// most significant bytes of the double.
    pub fn float(&self, raw: &[u8]) -> f64 {
        let n = raw.len().min(8);
        let mut buf = [0u8; 8];
        if self.little_endian {
            buf[8 - n..].copy_from_slice(&raw[raw.len() - n..]);
            f64::from_le_bytes(buf)
        } else {
            buf[..n].copy_from_slice(&raw[..n]);
            f64::from_be_bytes(buf)
        }
    }
}

#[derive(Debug)]
pub(super) struct Header {
    pub layout: Layout,
    pub encoding: Option<&'static Encoding>,
    pub name: String,
    pub header_size: usize,
    pub page_size: usize,
    pub page_count: usize,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Result<Self, SasError> {
        if bytes.get(..MAGIC.len()) != Some(&MAGIC[..]) {
            return Err(SasError::NotSas7bdat);
        }
        if bytes.len() < MIN_HEADER_LEN {
            return Err(SasError::Truncated {
                context: "file header",
                offset: bytes.len(),
            });
        }

        let int_len = if bytes[U64_FLAG_OFFSET] == b'3' { 8 } else { 4 };
        let align1 = if bytes[ALIGN_FLAG_OFFSET] == b'3' { 4 } else { 0 };
        let layout = Layout {
            little_endian: bytes[ENDIANNESS_OFFSET] == 0x01,
            int_len,
        };

        let header_size = layout.usize(bytes, HEADER_SIZE_OFFSET + align1, 4)?;
        let page_size = layout.usize(bytes, PAGE_SIZE_OFFSET + align1, 4)?;
        let page_count = layout.usize(bytes, PAGE_COUNT_OFFSET + align1, int_len)?;
        if page_size == 0 || header_size < MIN_HEADER_LEN {
            return Err(SasError::Malformed(format!(
                "header size {header_size}, page size {page_size}"
            )));
        }

        let encoding = text::sas_encoding(bytes[ENCODING_OFFSET]);
        Ok(Self {
            layout,
            encoding,
            name: text::decode(&bytes[DATASET_NAME], encoding).trim().to_string(),
            header_size,
            page_size,
            page_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_foreign_bytes() {
        assert!(matches!(Header::parse(b"col1,col2\n1,2\n"), Err(SasError::NotSas7bdat)));
        assert!(matches!(Header::parse(&[0xAB; 2048]), Err(SasError::NotSas7bdat)));
    }

    #[test]
    fn short_header_after_magic_is_truncated() {
        let mut bytes = MAGIC.to_vec();
        bytes.resize(100, 0);
        assert!(matches!(Header::parse(&bytes), Err(SasError::Truncated { .. })));
    }

    #[test]
    fn integer_byte_order() {
        let le = Layout { little_endian: true, int_len: 4 };
        let be = Layout { little_endian: false, int_len: 4 };
        let bytes = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(le.uint(&bytes, 0, 2).unwrap(), 0x0201);
        assert_eq!(be.uint(&bytes, 0, 2).unwrap(), 0x0102);
        assert_eq!(be.uint(&bytes, 0, 4).unwrap(), 0x01020304);
        assert!(le.uint(&bytes, 2, 4).is_err());
    }

    #[test]
    fn short_doubles_keep_their_high_bytes() {
        let le = Layout { little_endian: true, int_len: 8 };
        let full = 35.0f64.to_le_bytes();
        // 35.0 is exactly representable in the top three bytes.
        assert_eq!(le.float(&full[5..]), 35.0);

        let be = Layout { little_endian: false, int_len: 8 };
        let full = 35.0f64.to_be_bytes();
        assert_eq!(be.float(&full[..3]), 35.0);
    }
}

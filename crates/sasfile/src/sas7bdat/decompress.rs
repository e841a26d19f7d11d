//! Row decompression: SAS RLE (`SASYZCRL`) and Ross Data Compression
//! (`SASYZCR2`). Both expand one compressed row into exactly `row_len` bytes.

use crate::error::SasError;

/// Compression scheme announced in the first column-text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Rle,
    Rdc,
}

/// Upper bound on the buffer reserved up front; `row_len` comes from the file.
const MAX_PREALLOC: usize = 64 * 1024;

struct Output {
    buf: Vec<u8>,
    cap: usize,
}

impl Output {
    fn new(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap.min(MAX_PREALLOC)),
            cap,
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), SasError> {
        if self.buf.len() >= self.cap {
            return Err(SasError::Decompress(format!(
                "output exceeds row length {}",
                self.cap
            )));
        }
        self.buf.push(byte);
        Ok(())
    }

    fn fill(&mut self, byte: u8, n: usize) -> Result<(), SasError> {
        (0..n).try_for_each(|_| self.push(byte))
    }

    fn extend(&mut self, bytes: &[u8]) -> Result<(), SasError> {
        bytes.iter().try_for_each(|&b| self.push(b))
    }

    fn finish(self) -> Result<Vec<u8>, SasError> {
        if self.buf.len() != self.cap {
            return Err(SasError::Decompress(format!(
                "expanded to {} bytes, expected {}",
                self.buf.len(),
                self.cap
            )));
        }
        Ok(self.buf)
    }
}

fn byte_at(input: &[u8], at: usize) -> Result<u8, SasError> {
    input
        .get(at)
        .copied()
        .ok_or_else(|| SasError::Decompress(format!("input ends at byte {at}")))
}

fn slice_at(input: &[u8], at: usize, n: usize) -> Result<&[u8], SasError> {
    input
        .get(at..at + n)
        .ok_or_else(|| SasError::Decompress(format!("input ends before byte {}", at + n)))
}

/// Expand an RLE-compressed row.
pub fn rle(input: &[u8], row_len: usize) -> Result<Vec<u8>, SasError> {
    let mut out = Output::new(row_len);
    let mut pos = 0;
    while pos < input.len() {
        let control = input[pos] & 0xF0;
        let low = (input[pos] & 0x0F) as usize;
        pos += 1;
        match control {
            0x00 => {
                let n = byte_at(input, pos)? as usize + 64 + low * 256;
                pos += 1;
                out.extend(slice_at(input, pos, n)?)?;
                pos += n;
            }
            0x40 => {
                let n = byte_at(input, pos)? as usize + 18 + low * 256;
                let b = byte_at(input, pos + 1)?;
                pos += 2;
                out.fill(b, n)?;
            }
            0x60 => {
                let n = low * 256 + byte_at(input, pos)? as usize + 17;
                pos += 1;
                out.fill(b' ', n)?;
            }
            0x70 => {
                let n = low * 256 + byte_at(input, pos)? as usize + 17;
                pos += 1;
                out.fill(0, n)?;
            }
            0x80 | 0x90 | 0xA0 | 0xB0 => {
                let n = low + 1 + ((control - 0x80) as usize >> 4) * 16;
                out.extend(slice_at(input, pos, n)?)?;
                pos += n;
            }
            0xC0 => {
                let b = byte_at(input, pos)?;
                pos += 1;
                out.fill(b, low + 3)?;
            }
            0xD0 => out.fill(b'@', low + 2)?,
            0xE0 => out.fill(b' ', low + 2)?,
            0xF0 => out.fill(0, low + 2)?,
            other => {
                return Err(SasError::Decompress(format!(
                    "unknown RLE control byte {other:#04x}"
                )))
            }
        }
    }
    out.finish()
}

/// Expand an RDC-compressed row.
pub fn rdc(input: &[u8], row_len: usize) -> Result<Vec<u8>, SasError> {
    let mut out = Output::new(row_len);
    let mut pos = 0;
    let mut ctrl_bits: u16 = 0;
    let mut ctrl_mask: u16 = 0;

    while pos < input.len() {
        ctrl_mask >>= 1;
        if ctrl_mask == 0 {
            ctrl_bits = u16::from_be_bytes([byte_at(input, pos)?, byte_at(input, pos + 1)?]);
            pos += 2;
            ctrl_mask = 0x8000;
        }
        if ctrl_bits & ctrl_mask == 0 {
            out.push(byte_at(input, pos)?)?;
            pos += 1;
            continue;
        }

        let cmd = (byte_at(input, pos)? >> 4) & 0x0F;
        let cnt = (byte_at(input, pos)? & 0x0F) as usize;
        pos += 1;
        match cmd {
            // short run
            0 => {
                let b = byte_at(input, pos)?;
                pos += 1;
                out.fill(b, cnt + 3)?;
            }
            // long run
            1 => {
                let n = cnt + ((byte_at(input, pos)? as usize) << 4) + 19;
                let b = byte_at(input, pos + 1)?;
                pos += 2;
                out.fill(b, n)?;
            }
            // long back-reference
            2 => {
                let offset = cnt + 3 + ((byte_at(input, pos)? as usize) << 4);
                let n = byte_at(input, pos + 1)? as usize + 16;
                pos += 2;
                copy_back(&mut out, offset, n)?;
            }
            // short back-reference; the command nibble is the length
            n => {
                let offset = cnt + 3 + ((byte_at(input, pos)? as usize) << 4);
                pos += 1;
                copy_back(&mut out, offset, n as usize)?;
            }
        }
    }
    out.finish()
}

fn copy_back(out: &mut Output, offset: usize, n: usize) -> Result<(), SasError> {
    let start = out.buf.len().checked_sub(offset).ok_or_else(|| {
        SasError::Decompress(format!(
            "back-reference {offset} before start of row ({} bytes written)",
            out.buf.len()
        ))
    })?;
    for i in 0..n {
        let b = out.buf[start + i];
        out.push(b)?;
    }
    Ok(())
}

//! Minimal SAS7BDAT writer.
//!
//! Produces a single meta page followed by data pages (or, with RLE, further
//! meta pages of compressed row subheaders). Enough for round-tripping and
//! fixtures; no indexes, no mix pages, no RDC.

use super::decompress::Compression;
use super::header::{Layout, MAGIC};
use crate::dataset::{Dataset, Value, VarType};

const HEADER_SIZE: usize = 1024;
const MIN_PAGE_SIZE: usize = 4096;
const ENCODING_UTF8: u8 = 20;

/// Encode as a 32-bit little-endian, uncompressed file.
pub fn to_bytes(dataset: &Dataset) -> Vec<u8> {
    to_bytes_with(dataset, Compression::None)
}

/// Encode as a 32-bit little-endian file. `Compression::Rdc` is written
/// uncompressed.
pub fn to_bytes_with(dataset: &Dataset, compression: Compression) -> Vec<u8> {
    let layout = Layout {
        little_endian: true,
        int_len: 4,
    };
    write(dataset, layout, compression)
}

pub(super) fn write(dataset: &Dataset, layout: Layout, compression: Compression) -> Vec<u8> {
    let w = Writer { layout };
    let rle = compression == Compression::Rle;

    let row_length: usize = dataset.variables.iter().map(|v| v.length).sum();
    let rows: Vec<Vec<u8>> = dataset.rows.iter().map(|r| w.row(dataset, r)).collect();

    let meta_subheaders = w.metadata(dataset, row_length, rle);
    let meta_size: usize = w.page_prefix()
        + meta_subheaders.len() * layout.pointer_len()
        + meta_subheaders.iter().map(Vec::len).sum::<usize>();
    let page_size = round_up(meta_size.max(w.page_prefix() + row_length), 1024).max(MIN_PAGE_SIZE);

    let mut pages = Vec::new();
    let mut first = PageBuilder::new(&w, page_size);
    for sh in &meta_subheaders {
        first.add(sh, 0, 0);
    }
    pages.push(first.finish(0x0000, 0));

    if rle {
        let mut page = PageBuilder::new(&w, page_size);
        for row in &rows {
            let packed = rle_encode(row);
            let (body, compressed) = if packed.len() < row.len() {
                (packed, 4)
            } else {
                (row.clone(), 0)
            };
            if !page.fits(body.len()) {
                let full = std::mem::replace(&mut page, PageBuilder::new(&w, page_size));
                pages.push(full.finish(0x0000, 0));
            }
            page.add(&body, compressed, 1);
        }
        if page.count > 0 {
            pages.push(page.finish(0x0000, 0));
        }
    } else if row_length > 0 {
        let per_page = (page_size - w.page_prefix()) / row_length;
        for chunk in rows.chunks(per_page.max(1)) {
            let mut page = vec![0u8; page_size];
            let mut at = w.page_prefix();
            for row in chunk {
                page[at..at + row_length].copy_from_slice(row);
                at += row_length;
            }
            w.page_header(&mut page, 0x0100, chunk.len(), 0);
            pages.push(page);
        }
    }

    let mut out = w.file_header(&dataset.name, page_size, pages.len());
    for page in pages {
        out.extend(page);
    }
    out
}

struct Writer {
    layout: Layout,
}

impl Writer {
    fn il(&self) -> usize {
        self.layout.int_len
    }

    /// Page header plus the 8 bytes before the pointer array.
    fn page_prefix(&self) -> usize {
        self.layout.page_bit_offset() + 8
    }

    fn put(&self, buf: &mut [u8], at: usize, value: usize, len: usize) {
        let v = value as u64;
        if self.layout.little_endian {
            buf[at..at + len].copy_from_slice(&v.to_le_bytes()[..len]);
        } else {
            buf[at..at + len].copy_from_slice(&v.to_be_bytes()[8 - len..]);
        }
    }

    fn signature(&self, sig: [u8; 4], pad: u8) -> Vec<u8> {
        let mut v = sig.to_vec();
        if self.il() == 8 {
            v.extend([pad; 4]);
        }
        v
    }

    fn file_header(&self, name: &str, page_size: usize, page_count: usize) -> Vec<u8> {
        let mut h = vec![0u8; HEADER_SIZE];
        h[..32].copy_from_slice(&MAGIC);
        h[32] = if self.il() == 8 { b'3' } else { b'2' };
        h[35] = b'2';
        h[37] = if self.layout.little_endian { 0x01 } else { 0x00 };
        h[39] = b'1';
        h[70] = ENCODING_UTF8;
        h[84..92].copy_from_slice(b"SAS FILE");
        h[92..156].copy_from_slice(&padded(name, 64));
        h[156..164].copy_from_slice(b"DATA    ");
        self.put(&mut h, 196, HEADER_SIZE, 4);
        self.put(&mut h, 200, page_size, 4);
        self.put(&mut h, 204, page_count, self.il());
        h[216..224].copy_from_slice(b"9.0401M0");
        h
    }

    fn page_header(&self, page: &mut [u8], page_type: usize, blocks: usize, subheaders: usize) {
        let bo = self.layout.page_bit_offset();
        self.put(page, bo, page_type, 2);
        self.put(page, bo + 2, blocks, 2);
        self.put(page, bo + 4, subheaders, 2);
    }

    fn row(&self, dataset: &Dataset, values: &[Value]) -> Vec<u8> {
        let mut out = Vec::new();
        for (var, value) in dataset.variables.iter().zip(values) {
            match (var.var_type, value) {
                (VarType::Numeric, v) => {
                    let n = match v {
                        Value::Number(n) => *n,
                        _ => f64::NAN,
                    };
                    if self.layout.little_endian {
                        out.extend_from_slice(&n.to_le_bytes()[8 - var.length..]);
                    } else {
                        out.extend_from_slice(&n.to_be_bytes()[..var.length]);
                    }
                }
                (VarType::Character, Value::Text(s)) => out.extend(padded(s, var.length)),
                (VarType::Character, _) => out.extend(padded("", var.length)),
            }
        }
        out
    }

    /// Row size, column size, column text, names, attributes, then one
    /// format/label subheader per column.
    fn metadata(&self, dataset: &Dataset, row_length: usize, rle: bool) -> Vec<Vec<u8>> {
        let il = self.il();
        let n = dataset.variables.len();

        // Column text block: size, padding, compression literal, strings.
        let mut block = vec![0u8; 8];
        block.extend(if rle { *b"SASYZCRL" } else { [b' '; 8] });
        let mut intern = |s: &str| -> (usize, usize) {
            let at = block.len();
            block.extend(s.as_bytes());
            while block.len() % 4 != 0 {
                block.push(b' ');
            }
            (at, s.len())
        };
        let names: Vec<_> = dataset.variables.iter().map(|v| intern(&v.name)).collect();
        let labels: Vec<_> = dataset
            .variables
            .iter()
            .map(|v| v.label.as_deref().map(&mut intern).unwrap_or((0, 0)))
            .collect();
        let formats: Vec<_> = dataset
            .variables
            .iter()
            .map(|v| v.format.as_deref().map(&mut intern).unwrap_or((0, 0)))
            .collect();
        let size = block.len();
        self.put(&mut block, 0, size, 2);

        let mut row_size = self.signature([0xF7; 4], 0x00);
        row_size.resize(if il == 8 { 808 } else { 480 }, 0);
        self.put(&mut row_size, 5 * il, row_length, il);
        self.put(&mut row_size, 6 * il, dataset.rows.len(), il);
        self.put(&mut row_size, 9 * il, n, il);

        let mut col_size = self.signature([0xF6; 4], 0x00);
        col_size.resize(3 * il, 0);
        self.put(&mut col_size, il, n, il);

        let mut text = self.signature([0xFD, 0xFF, 0xFF, 0xFF], 0xFF);
        text.extend(&block);

        let mut col_names = self.signature([0xFF; 4], 0xFF);
        col_names.resize(2 * il + 12 + 8 * n, 0);
        for (i, (off, len)) in names.iter().enumerate() {
            let base = il + 8 * (i + 1);
            self.put(&mut col_names, base, 0, 2);
            self.put(&mut col_names, base + 2, *off, 2);
            self.put(&mut col_names, base + 4, *len, 2);
        }

        let stride = il + 8;
        let mut attrs = self.signature([0xFC, 0xFF, 0xFF, 0xFF], 0xFF);
        attrs.resize(2 * il + 12 + n * stride, 0);
        let mut offset = 0;
        for (i, var) in dataset.variables.iter().enumerate() {
            self.put(&mut attrs, il + 8 + i * stride, offset, il);
            self.put(&mut attrs, 2 * il + 8 + i * stride, var.length, 4);
            attrs[2 * il + 14 + i * stride] = match var.var_type {
                VarType::Numeric => 1,
                VarType::Character => 2,
            };
            offset += var.length;
        }

        let mut out = vec![row_size, col_size, text, col_names, attrs];
        for i in 0..n {
            let mut fl = self.signature([0xFE, 0xFB, 0xFF, 0xFF], 0xFF);
            fl.resize(if il == 8 { 64 } else { 52 }, 0);
            let at = 3 * il;
            self.put(&mut fl, at + 24, formats[i].0, 2);
            self.put(&mut fl, at + 26, formats[i].1, 2);
            self.put(&mut fl, at + 30, labels[i].0, 2);
            self.put(&mut fl, at + 32, labels[i].1, 2);
            out.push(fl);
        }
        out
    }
}

/// Packs subheaders from the end of a page towards its pointer array.
struct PageBuilder<'a> {
    w: &'a Writer,
    buf: Vec<u8>,
    free_end: usize,
    count: usize,
}

impl<'a> PageBuilder<'a> {
    fn new(w: &'a Writer, page_size: usize) -> Self {
        Self {
            w,
            buf: vec![0u8; page_size],
            free_end: page_size,
            count: 0,
        }
    }

    fn fits(&self, len: usize) -> bool {
        let pointers_end = self.w.page_prefix() + (self.count + 1) * self.w.layout.pointer_len();
        self.free_end >= len && self.free_end - len >= pointers_end
    }

    fn add(&mut self, body: &[u8], compression: u8, sh_type: u8) {
        let il = self.w.il();
        let offset = self.free_end - body.len();
        self.buf[offset..self.free_end].copy_from_slice(body);
        self.free_end = offset;

        let ptr = self.w.page_prefix() + self.count * self.w.layout.pointer_len();
        self.w.put(&mut self.buf, ptr, offset, il);
        self.w.put(&mut self.buf, ptr + il, body.len(), il);
        self.buf[ptr + 2 * il] = compression;
        self.buf[ptr + 2 * il + 1] = sh_type;
        self.count += 1;
    }

    fn finish(mut self, page_type: usize, blocks: usize) -> Vec<u8> {
        let count = self.count;
        self.w.page_header(&mut self.buf, page_type, blocks, count);
        self.buf
    }
}

/// Greedy RLE: blank and NUL runs, repeated-byte runs, literal groups of
/// up to 16 bytes.
fn rle_encode(row: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut literal: Vec<u8> = Vec::new();
    let flush = |literal: &mut Vec<u8>, out: &mut Vec<u8>| {
        if !literal.is_empty() {
            out.push(0x80 | (literal.len() as u8 - 1));
            out.append(literal);
        }
    };

    let mut i = 0;
    while i < row.len() {
        let b = row[i];
        let run = row[i..].iter().take_while(|&&x| x == b).count();
        if (b == b' ' || b == 0) && run >= 2 {
            flush(&mut literal, &mut out);
            let n = run.min(17);
            let control: u8 = if b == b' ' { 0xE0 } else { 0xF0 };
            out.push(control | (n - 2) as u8);
            i += n;
        } else if run >= 3 {
            flush(&mut literal, &mut out);
            let n = run.min(18);
            out.push(0xC0 | (n - 3) as u8);
            out.push(b);
            i += n;
        } else {
            literal.push(b);
            if literal.len() == 16 {
                flush(&mut literal, &mut out);
            }
            i += 1;
        }
    }
    flush(&mut literal, &mut out);
    out
}

fn padded(s: &str, len: usize) -> Vec<u8> {
    let mut v: Vec<u8> = s.bytes().take(len).collect();
    v.resize(len, b' ');
    v
}

fn round_up(n: usize, to: usize) -> usize {
    n.div_ceil(to) * to
}

#[cfg(test)]
mod tests {
    use super::super::decompress;
    use super::*;

    #[test]
    fn rle_encoder_matches_decoder() {
        let row = b"S-0001      \0\0\0\0\0\0\0\0xxxxxxabcdefghijklmnopqrstuv   ";
        let packed = rle_encode(row);
        assert!(packed.len() < row.len());
        assert_eq!(decompress::rle(&packed, row.len()).unwrap(), row.to_vec());
    }
}

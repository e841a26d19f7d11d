//! SAS7BDAT reader.
//!
//! ## Layout
//!
//! A file is a header followed by fixed-size pages. Each page starts with a
//! small header (type, block count, subheader count) and an array of
//! subheader pointers:
//!
//! ```text
//! header │ page 0 (meta) │ page 1 (meta/mix/data) │ …
//!
//! page:  [bit offset][type u16][blocks u16][subheaders u16][pad]
//!        [pointer × subheaders] … rows or subheader bodies …
//! ```
//!
//! * **meta** pages hold metadata subheaders (row size, column names,
//!   attributes, labels) and, in compressed files, one "data subheader"
//!   per compressed row.
//! * **mix** pages hold subheaders followed by uncompressed rows, starting
//!   at the next 8-byte boundary after the pointer array.
//! * **data** pages hold only uncompressed rows.
//!
//! 32-bit files use 4-byte integers and a 16-byte page prefix, 64-bit files
//! 8-byte integers and a 32-byte prefix. Both byte orders occur.

mod decompress;
mod header;
mod subheader;
#[cfg(any(test, feature = "writer"))]
mod writer;

pub use decompress::Compression;
#[cfg(any(test, feature = "writer"))]
pub use writer::{to_bytes, to_bytes_with};

use crate::dataset::{Dataset, MissingValue, Value, VarType};
use crate::error::SasError;
use crate::text;
use header::{Header, Layout};
use std::path::Path;
use subheader::{Metadata, Slot};
use tracing::{debug, trace};

const PAGE_META: u64 = 0x0000;
const PAGE_DATA: u64 = 0x0100;
const PAGE_MIX: u64 = 0x0200;
const PAGE_AMD: u64 = 0x0400;
const PAGE_META2: u64 = 0x4000;
const PAGE_TYPE_MASK: u64 = 0xFF00;

const POINTER_COMPRESSION_TRUNCATED: u64 = 1;
const POINTER_COMPRESSION_RLE: u64 = 4;
const POINTER_TYPE_DATA: u64 = 1;

/// Read and decode a SAS7BDAT file from disk.
pub fn read_path(path: impl AsRef<Path>) -> Result<Dataset, SasError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    debug!("Decoding sas7bdat {} ({} bytes)", path.display(), bytes.len());
    parse(&bytes)
}

/// Where the bytes of one or more rows live.
enum RowSource {
    /// A single row stored as a data subheader on a meta page.
    Subheader {
        start: usize,
        len: usize,
        compressed: bool,
    },
    /// Uncompressed rows after the pointer array of a mix page.
    Mix { start: usize },
    /// Uncompressed rows filling a data page.
    Data { start: usize, count: usize },
}

/// Decode an in-memory SAS7BDAT file.
pub fn parse(bytes: &[u8]) -> Result<Dataset, SasError> {
    let header = Header::parse(bytes)?;
    let layout = header.layout;
    debug!(
        "sas7bdat header: {}-bit {}, page size {}, {} pages",
        layout.int_len * 8,
        if layout.little_endian { "little-endian" } else { "big-endian" },
        header.page_size,
        header.page_count
    );

    let mut meta = Metadata::default();
    let mut sources = Vec::new();

    for index in 0..header.page_count {
        let start = header.header_size + index * header.page_size;
        let page = bytes
            .get(start..start + header.page_size)
            .ok_or(SasError::Truncated {
                context: "page",
                offset: start,
            })?;
        read_page(&layout, page, start, &mut meta, &mut sources)?;
    }

    let (variables, slots) = meta.columns(header.encoding)?;
    if meta.row_count > 0 && meta.row_length == 0 {
        return Err(SasError::Malformed("row size subheader missing".into()));
    }
    check_row_budget(&meta, bytes.len())?;

    let rows = collect_rows(bytes, &meta, &sources)?
        .into_iter()
        .map(|raw| decode_row(&layout, &slots, raw, header.encoding))
        .collect::<Vec<_>>();

    if rows.len() < meta.row_count {
        return Err(SasError::Malformed(format!(
            "header declares {} rows but only {} were found",
            meta.row_count,
            rows.len()
        )));
    }

    debug!(
        "sas7bdat dataset '{}': {} columns, {} rows, compression {:?}",
        header.name,
        variables.len(),
        rows.len(),
        meta.compression
    );

    Ok(Dataset {
        name: header.name,
        label: None,
        variables,
        rows,
    })
}

fn read_page(
    layout: &Layout,
    page: &[u8],
    page_start: usize,
    meta: &mut Metadata,
    sources: &mut Vec<RowSource>,
) -> Result<(), SasError> {
    let bo = layout.page_bit_offset();
    let page_type = layout.uint(page, bo, 2)? & PAGE_TYPE_MASK;
    let block_count = layout.usize(page, bo + 2, 2)?;
    let subheader_count = layout.usize(page, bo + 4, 2)?;
    trace!("page at {page_start}: type {page_type:#06x}, {block_count} blocks, {subheader_count} subheaders");

    let has_subheaders = matches!(page_type, PAGE_META | PAGE_META2 | PAGE_MIX | PAGE_AMD);
    if has_subheaders {
        let il = layout.int_len;
        for i in 0..subheader_count {
            let ptr = bo + 8 + i * layout.pointer_len();
            let offset = layout.usize(page, ptr, il)?;
            let length = layout.usize(page, ptr + il, il)?;
            let compression = layout.uint(page, ptr + 2 * il, 1)?;
            let sh_type = layout.uint(page, ptr + 2 * il + 1, 1)?;
            if length == 0 || compression == POINTER_COMPRESSION_TRUNCATED {
                continue;
            }
            if offset + length > page.len() {
                return Err(SasError::Truncated {
                    context: "subheader",
                    offset: page_start + offset,
                });
            }

            let signature = &page[offset..offset + il.min(length)];
            match subheader::lookup(signature) {
                Some(kind) => meta.apply(kind, layout, page, offset, length)?,
                None if sh_type == POINTER_TYPE_DATA
                    && (compression == 0 || compression == POINTER_COMPRESSION_RLE) =>
                {
                    if page_type != PAGE_MIX {
                        sources.push(RowSource::Subheader {
                            start: page_start + offset,
                            len: length,
                            compressed: compression == POINTER_COMPRESSION_RLE,
                        });
                    }
                }
                None => {
                    return Err(SasError::Malformed(format!(
                        "unknown subheader signature {signature:02x?} at byte {}",
                        page_start + offset
                    )));
                }
            }
        }
    }

    match page_type {
        PAGE_MIX => {
            let base = bo + 8 + subheader_count * layout.pointer_len();
            sources.push(RowSource::Mix {
                start: page_start + base + base % 8,
            });
        }
        PAGE_DATA => sources.push(RowSource::Data {
            start: page_start + bo + 8,
            count: block_count,
        }),
        _ => {}
    }
    Ok(())
}

/// Reject a row size subheader whose declared rows cannot fit in the file.
///
/// Uncompressed rows are stored verbatim, so `row_count * row_length` is
/// bounded by the file size. A compressed row still needs its own subheader
/// pointer, so the row count alone is bounded by it.
fn check_row_budget(meta: &Metadata, file_len: usize) -> Result<(), SasError> {
    let declared = match meta.compression {
        Compression::None => meta.row_count.checked_mul(meta.row_length),
        Compression::Rle | Compression::Rdc => Some(meta.row_count),
    };
    match declared {
        Some(n) if n <= file_len => Ok(()),
        _ => Err(SasError::Malformed(format!(
            "header declares {} rows of {} bytes, more than a {file_len}-byte file holds",
            meta.row_count, meta.row_length
        ))),
    }
}

/// Raw (decompressed) row bytes in file order, capped at the declared count.
fn collect_rows(
    bytes: &[u8],
    meta: &Metadata,
    sources: &[RowSource],
) -> Result<Vec<Vec<u8>>, SasError> {
    let row_len = meta.row_length;
    let mut rows = Vec::with_capacity(meta.row_count.min(bytes.len() / row_len.max(1)));
    let slice = |start: usize, len: usize| {
        bytes.get(start..start + len).ok_or(SasError::Truncated {
            context: "row data",
            offset: start,
        })
    };

    for source in sources {
        let remaining = meta.row_count - rows.len();
        if remaining == 0 {
            break;
        }
        match *source {
            RowSource::Subheader {
                start,
                len,
                compressed,
            } => {
                let raw = slice(start, len)?;
                let row = if compressed && len < row_len {
                    match meta.compression {
                        Compression::Rle => decompress::rle(raw, row_len)?,
                        Compression::Rdc => decompress::rdc(raw, row_len)?,
                        Compression::None => {
                            return Err(SasError::Malformed(
                                "compressed row in a file without a compression literal".into(),
                            ))
                        }
                    }
                } else {
                    slice(start, row_len)?.to_vec()
                };
                rows.push(row);
            }
            RowSource::Mix { start } => {
                let n = meta.mix_page_row_count.min(remaining);
                for k in 0..n {
                    rows.push(slice(start + k * row_len, row_len)?.to_vec());
                }
            }
            RowSource::Data { start, count } => {
                for k in 0..count.min(remaining) {
                    rows.push(slice(start + k * row_len, row_len)?.to_vec());
                }
            }
        }
    }
    Ok(rows)
}

fn decode_row(
    layout: &Layout,
    slots: &[Slot],
    raw: Vec<u8>,
    encoding: Option<&'static encoding_rs::Encoding>,
) -> Vec<Value> {
    slots
        .iter()
        .map(|slot| {
            let cell = &raw[slot.offset..slot.offset + slot.length];
            match slot.var_type {
                VarType::Numeric => {
                    let v = layout.float(cell);
                    if v.is_nan() {
                        Value::Missing(MissingValue::Standard)
                    } else {
                        Value::Number(v)
                    }
                }
                VarType::Character => Value::Text(text::decode(cell, encoding)),
            }
        })
        .collect()
}

//! Metadata subheaders: signature lookup and column assembly.

use super::decompress::Compression;
use super::header::Layout;
use crate::dataset::{non_empty, VarType, Variable};
use crate::error::SasError;
use crate::text;
use encoding_rs::Encoding;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Kind {
    RowSize,
    ColumnSize,
    SubheaderCounts,
    ColumnText,
    ColumnName,
    ColumnAttributes,
    FormatAndLabel,
    ColumnList,
}

/// Identify a subheader by its leading signature (4 bytes on 32-bit files,
/// 8 on 64-bit files).
pub(super) fn lookup(signature: &[u8]) -> Option<Kind> {
    use Kind::*;
    let kind = match signature {
        [0xF7, 0xF7, 0xF7, 0xF7]
        | [0x00, 0x00, 0x00, 0x00, 0xF7, 0xF7, 0xF7, 0xF7]
        | [0xF7, 0xF7, 0xF7, 0xF7, 0x00, 0x00, 0x00, 0x00]
        | [0xF7, 0xF7, 0xF7, 0xF7, 0xFF, 0xFF, 0xFB, 0xFE] => RowSize,
        [0xF6, 0xF6, 0xF6, 0xF6]
        | [0x00, 0x00, 0x00, 0x00, 0xF6, 0xF6, 0xF6, 0xF6]
        | [0xF6, 0xF6, 0xF6, 0xF6, 0x00, 0x00, 0x00, 0x00]
        | [0xF6, 0xF6, 0xF6, 0xF6, 0xFF, 0xFF, 0xFB, 0xFE] => ColumnSize,
        [0x00, 0xFC, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFC, 0x00]
        | [0x00, 0xFC, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC, 0x00] => SubheaderCounts,
        [0xFD, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFD]
        | [0xFD, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFD] => ColumnText,
        [0xFF, 0xFF, 0xFF, 0xFF] | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF] => ColumnName,
        [0xFC, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFC]
        | [0xFC, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC] => ColumnAttributes,
        [0xFE, 0xFB, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFB, 0xFE]
        | [0xFE, 0xFB, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFB, 0xFE] => FormatAndLabel,
        [0xFE, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFE]
        | [0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE] => ColumnList,
        _ => return None,
    };
    Some(kind)
}

/// Storage location of one column inside a row.
#[derive(Debug, Clone, Copy)]
pub(super) struct Slot {
    pub offset: usize,
    pub length: usize,
    pub var_type: VarType,
}

#[derive(Debug, Clone, Copy, Default)]
struct TextRef {
    block: usize,
    offset: usize,
    length: usize,
}

/// Metadata accumulated while walking the subheaders of every page.
#[derive(Debug, Default)]
pub(super) struct Metadata {
    pub row_length: usize,
    pub row_count: usize,
    pub mix_page_row_count: usize,
    pub column_count: Option<usize>,
    pub compression: Compression,
    text_blocks: Vec<Vec<u8>>,
    names: Vec<TextRef>,
    slots: Vec<Slot>,
    formats: Vec<TextRef>,
    labels: Vec<TextRef>,
}

impl Metadata {
    /// Apply one subheader found at `page[offset..offset + length]`.
    pub fn apply(
        &mut self,
        kind: Kind,
        layout: &Layout,
        page: &[u8],
        offset: usize,
        length: usize,
    ) -> Result<(), SasError> {
        let il = layout.int_len;
        match kind {
            Kind::RowSize => {
                self.row_length = layout.usize(page, offset + 5 * il, il)?;
                self.row_count = layout.usize(page, offset + 6 * il, il)?;
                self.mix_page_row_count = layout.usize(page, offset + 15 * il, il)?;
            }
            Kind::ColumnSize => {
                self.column_count = Some(layout.usize(page, offset + il, il)?);
            }
            Kind::ColumnText => {
                let start = offset + il;
                let size = layout.usize(page, start, 2)?;
                let block = page.get(start..start + size).ok_or(SasError::Truncated {
                    context: "column text subheader",
                    offset: start,
                })?;
                if self.text_blocks.is_empty() {
                    self.compression = detect_compression(block);
                }
                self.text_blocks.push(block.to_vec());
            }
            Kind::ColumnName => {
                let count = length.saturating_sub(2 * il + 12) / 8;
                for i in 0..count {
                    let base = offset + il + 8 * (i + 1);
                    self.names.push(TextRef {
                        block: layout.usize(page, base, 2)?,
                        offset: layout.usize(page, base + 2, 2)?,
                        length: layout.usize(page, base + 4, 2)?,
                    });
                }
            }
            Kind::ColumnAttributes => {
                let stride = il + 8;
                let count = length.saturating_sub(2 * il + 12) / stride;
                for i in 0..count {
                    let data_offset = layout.usize(page, offset + il + 8 + i * stride, il)?;
                    let data_len = layout.usize(page, offset + 2 * il + 8 + i * stride, 4)?;
                    let type_code = layout.uint(page, offset + 2 * il + 14 + i * stride, 1)?;
                    self.slots.push(Slot {
                        offset: data_offset,
                        length: data_len,
                        var_type: if type_code == 1 {
                            VarType::Numeric
                        } else {
                            VarType::Character
                        },
                    });
                }
            }
            Kind::FormatAndLabel => {
                let at = offset + 3 * il;
                self.formats.push(TextRef {
                    block: layout.usize(page, at + 22, 2)?,
                    offset: layout.usize(page, at + 24, 2)?,
                    length: layout.usize(page, at + 26, 2)?,
                });
                self.labels.push(TextRef {
                    block: layout.usize(page, at + 28, 2)?,
                    offset: layout.usize(page, at + 30, 2)?,
                    length: layout.usize(page, at + 32, 2)?,
                });
            }
            Kind::SubheaderCounts | Kind::ColumnList => {}
        }
        Ok(())
    }

    /// Resolve names, labels and formats into variables.
    pub fn columns(
        &self,
        encoding: Option<&'static Encoding>,
    ) -> Result<(Vec<Variable>, Vec<Slot>), SasError> {
        let count = self.column_count.unwrap_or(self.slots.len());
        if self.slots.len() < count || self.names.len() < count {
            return Err(SasError::Malformed(format!(
                "{count} columns declared but {} names and {} attributes found",
                self.names.len(),
                self.slots.len()
            )));
        }

        let mut variables = Vec::with_capacity(count);
        for i in 0..count {
            let slot = self.slots[i];
            if slot.offset + slot.length > self.row_length {
                return Err(SasError::Malformed(format!(
                    "column {i} ends at byte {} beyond row length {}",
                    slot.offset + slot.length,
                    self.row_length
                )));
            }
            let resolve = |refs: &[TextRef]| -> String {
                refs.get(i)
                    .map(|r| self.text(*r, encoding))
                    .unwrap_or_default()
            };
            variables.push(Variable {
                name: self.text(self.names[i], encoding),
                label: non_empty(resolve(&self.labels)),
                format: non_empty(resolve(&self.formats)),
                var_type: slot.var_type,
                length: slot.length,
            });
        }
        Ok((variables, self.slots[..count].to_vec()))
    }

    fn text(&self, r: TextRef, encoding: Option<&'static Encoding>) -> String {
        if r.length == 0 || self.text_blocks.is_empty() {
            return String::new();
        }
        let block = &self.text_blocks[r.block.min(self.text_blocks.len() - 1)];
        match block.get(r.offset..r.offset + r.length) {
            Some(raw) => text::decode(raw, encoding).trim().to_string(),
            None => String::new(),
        }
    }
}

fn detect_compression(block: &[u8]) -> Compression {
    let contains = |needle: &[u8]| block.windows(needle.len()).any(|w| w == needle);
    if contains(b"SASYZCRL") {
        Compression::Rle
    } else if contains(b"SASYZCR2") {
        Compression::Rdc
    } else {
        Compression::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_of_both_widths() {
        assert_eq!(lookup(&[0xF7, 0xF7, 0xF7, 0xF7]), Some(Kind::RowSize));
        assert_eq!(
            lookup(&[0x00, 0x00, 0x00, 0x00, 0xF7, 0xF7, 0xF7, 0xF7]),
            Some(Kind::RowSize)
        );
        assert_eq!(lookup(&[0xFF; 4]), Some(Kind::ColumnName));
        assert_eq!(lookup(&[0xFD, 0xFF, 0xFF, 0xFF]), Some(Kind::ColumnText));
        assert_eq!(lookup(&[0x82, b'a', b'b', b'c']), None);
    }

    #[test]
    fn compression_literal() {
        assert_eq!(detect_compression(b"\x20\0\0\0SASYZCRL  "), Compression::Rle);
        assert_eq!(detect_compression(b"....SASYZCR2"), Compression::Rdc);
        assert_eq!(detect_compression(b"AGE NAME"), Compression::None);
    }
}

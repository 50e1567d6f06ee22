//! Composite data: a format-string tag-segment paired with a data bank.
//!
//! The format string is a mini-language. Tokens:
//!
//! - type letters — `I` u32, `i` i32, `S` i16, `C` i8, `L` i64, `F` f32,
//!   `D` f64, `A` character data;
//! - a decimal repeat count prefixing a type letter or group;
//! - parenthesized groups, repeated per their prefix;
//! - `N(...)` — the group's repeat count is read from the data stream as a
//!   u32 at iteration time; a bare `N` reads one u32.
//!
//! `A` consumes exactly its repeat count in bytes; alignment is the format
//! author's concern and character data is never byte-swapped.

use crate::buffer::{pad4, Endian};
use crate::error::{EvioError, Result};
use crate::event::structure::{decode_strings, encode_strings, StructureHeader, StructureKind};
use crate::event::types::DataType;

// ---------------------------------------------------------------------------
// Format language
// ---------------------------------------------------------------------------

/// One fixed-width datum kind of the format language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FmtKind {
    U32,
    I32,
    I16,
    I8,
    I64,
    F32,
    F64,
    Chars,
}

impl FmtKind {
    fn from_letter(c: char) -> Option<FmtKind> {
        Some(match c {
            'I' => FmtKind::U32,
            'i' => FmtKind::I32,
            'S' => FmtKind::I16,
            'C' => FmtKind::I8,
            'L' => FmtKind::I64,
            'F' => FmtKind::F32,
            'D' => FmtKind::F64,
            'A' => FmtKind::Chars,
            _ => return None,
        })
    }

    fn element_bytes(self) -> usize {
        match self {
            FmtKind::I8 | FmtKind::Chars => 1,
            FmtKind::I16 => 2,
            FmtKind::U32 | FmtKind::I32 | FmtKind::F32 => 4,
            FmtKind::I64 | FmtKind::F64 => 8,
        }
    }
}

/// Group repeat source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repeat {
    Fixed(u32),
    /// Read a u32 from the data stream at iteration time.
    FromData,
}

#[derive(Debug, Clone, PartialEq)]
enum FormatItem {
    Value { repeat: u32, kind: FmtKind },
    Group { repeat: Repeat, items: Vec<FormatItem> },
}

/// Parses a format string into its item tree.
fn parse_format(format: &str) -> Result<Vec<FormatItem>> {
    let mut chars = format.char_indices().peekable();
    let items = parse_group(format, &mut chars, false)?;
    Ok(items)
}

fn parse_group(
    format: &str,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    nested: bool,
) -> Result<Vec<FormatItem>> {
    let mut items = Vec::new();
    let mut repeat: Option<u32> = None;

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            ' ' | '\t' | ',' => {
                chars.next();
            }
            '0'..='9' => {
                chars.next();
                let d = c.to_digit(10).unwrap();
                repeat = Some(repeat.unwrap_or(0).saturating_mul(10).saturating_add(d));
            }
            'N' => {
                chars.next();
                // N( … ) — runtime-count group; bare N reads one u32.
                if matches!(chars.peek(), Some(&(_, '('))) {
                    chars.next();
                    let inner = parse_group(format, chars, true)?;
                    items.push(FormatItem::Group {
                        repeat: Repeat::FromData,
                        items: inner,
                    });
                } else {
                    items.push(FormatItem::Value {
                        repeat: repeat.take().unwrap_or(1),
                        kind: FmtKind::U32,
                    });
                }
                repeat = None;
            }
            '(' => {
                chars.next();
                let inner = parse_group(format, chars, true)?;
                items.push(FormatItem::Group {
                    repeat: Repeat::Fixed(repeat.take().unwrap_or(1)),
                    items: inner,
                });
            }
            ')' => {
                chars.next();
                if !nested {
                    return Err(EvioError::bad_format(
                        pos as u64,
                        format!("unmatched ')' in composite format {format:?}"),
                    ));
                }
                return Ok(items);
            }
            other => match FmtKind::from_letter(other) {
                Some(kind) => {
                    chars.next();
                    items.push(FormatItem::Value {
                        repeat: repeat.take().unwrap_or(1),
                        kind,
                    });
                }
                None => {
                    return Err(EvioError::bad_format(
                        pos as u64,
                        format!("unknown composite format token {other:?} in {format:?}"),
                    ))
                }
            },
        }
    }

    if nested {
        return Err(EvioError::bad_format(
            format.len() as u64,
            format!("unclosed '(' in composite format {format:?}"),
        ));
    }
    Ok(items)
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// One datum of a composite payload, in iteration order.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeValue {
    U32(u32),
    I32(i32),
    I16(i16),
    I8(i8),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Character data for an `A` token; its length must equal the repeat.
    Chars(String),
    /// Runtime repeat count for an `N(...)` group.
    N(u32),
}

// ---------------------------------------------------------------------------
// CompositeData
// ---------------------------------------------------------------------------

/// A composite leaf: format tag-segment plus data bank.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeData {
    /// Tag of the format tag-segment (12-bit).
    pub format_tag: u32,
    /// Tag of the data bank (16-bit).
    pub data_tag: u32,
    /// Num of the data bank.
    pub data_num: u8,
    pub format: String,
    pub values: Vec<CompositeValue>,
}

impl CompositeData {
    pub fn new(
        format_tag: u32,
        data_tag: u32,
        data_num: u8,
        format: impl Into<String>,
        values: Vec<CompositeValue>,
    ) -> CompositeData {
        CompositeData {
            format_tag,
            data_tag,
            data_num,
            format: format.into(),
            values,
        }
    }

    /// Packs the values per the format string.
    pub fn packed_data(&self, order: Endian) -> Result<Vec<u8>> {
        let items = parse_format(&self.format)?;
        let mut out = Vec::new();
        let mut values = self.values.iter();
        pack_items(&items, &mut values, &mut out, order)?;
        if values.next().is_some() {
            return Err(EvioError::InvalidState(format!(
                "composite data holds more values than format {:?} consumes",
                self.format
            )));
        }
        Ok(out)
    }

    /// Serializes `[format tag-segment | data bank]`.
    pub fn to_bytes(&self, order: Endian) -> Result<Vec<u8>> {
        let fmt_bytes = encode_strings(std::slice::from_ref(&self.format));
        let data = self.packed_data(order)?;
        let data_pad = pad4(data.len());

        let total =
            4 + fmt_bytes.len() + 8 + data.len() + data_pad;
        let mut out = vec![0u8; total];

        let fmt_header = StructureHeader {
            kind: StructureKind::TagSegment,
            tag: self.format_tag,
            num: 0,
            data_type: DataType::CharStar8,
            padding: 0,
            length_words: (fmt_bytes.len() / 4) as u32,
        };
        fmt_header.write(&mut out, 0, order)?;
        out[4..4 + fmt_bytes.len()].copy_from_slice(&fmt_bytes);

        let bank_offset = 4 + fmt_bytes.len();
        let bank_header = StructureHeader {
            kind: StructureKind::Bank,
            tag: self.data_tag,
            num: self.data_num,
            data_type: DataType::Uchar8,
            padding: data_pad as u32,
            length_words: (1 + (data.len() + data_pad) / 4) as u32,
        };
        bank_header.write(&mut out, bank_offset, order)?;
        out[bank_offset + 8..bank_offset + 8 + data.len()].copy_from_slice(&data);
        Ok(out)
    }

    /// Parses `[format tag-segment | data bank]` back into values.
    pub fn from_bytes(bytes: &[u8], order: Endian) -> Result<CompositeData> {
        let fmt_header = StructureHeader::read(StructureKind::TagSegment, bytes, 0, order)?;
        if fmt_header.data_type != DataType::CharStar8 {
            return Err(EvioError::bad_format(
                0,
                "composite format tag-segment does not hold a string",
            ));
        }
        let fmt_end = 4 + fmt_header.length_words as usize * 4;
        if fmt_end > bytes.len() {
            return Err(EvioError::truncated(0, "composite format overruns its leaf"));
        }
        let format = decode_strings(&bytes[4..fmt_end])
            .into_iter()
            .next()
            .ok_or_else(|| EvioError::bad_format(4, "empty composite format string"))?;

        let bank_header = StructureHeader::read(StructureKind::Bank, bytes, fmt_end, order)?;
        let data_start = fmt_end + 8;
        let data_end = fmt_end + bank_header.total_words() as usize * 4;
        if data_end > bytes.len() {
            return Err(EvioError::truncated(
                fmt_end as u64,
                "composite data bank overruns its leaf",
            ));
        }
        let data = &bytes[data_start..data_end - bank_header.padding as usize];

        let items = parse_format(&format)?;
        let mut values = Vec::new();
        let mut pos = 0usize;
        unpack_items(&items, data, &mut pos, &mut values, order)?;

        Ok(CompositeData {
            format_tag: fmt_header.tag,
            data_tag: bank_header.tag,
            data_num: bank_header.num,
            format,
            values,
        })
    }

    /// Byte-swaps a packed data region in place, walking `format`. Reads
    /// runtime counts in `src_order` before reversing them, so the walk and
    /// the swap agree; applying it twice restores the original bytes.
    pub fn swap_packed(format: &str, data: &mut [u8], src_order: Endian) -> Result<()> {
        let items = parse_format(format)?;
        let mut pos = 0usize;
        swap_items(&items, data, &mut pos, src_order)
    }
}

// ---------------------------------------------------------------------------
// Walkers
// ---------------------------------------------------------------------------

fn pack_items<'a>(
    items: &[FormatItem],
    values: &mut impl Iterator<Item = &'a CompositeValue>,
    out: &mut Vec<u8>,
    order: Endian,
) -> Result<()> {
    for item in items {
        match item {
            FormatItem::Value { repeat, kind } => match kind {
                FmtKind::Chars => {
                    let v = next_value(values)?;
                    let CompositeValue::Chars(s) = v else {
                        return Err(type_mismatch("A", v));
                    };
                    if s.len() != *repeat as usize {
                        return Err(EvioError::InvalidState(format!(
                            "character datum of {} bytes under an A token of repeat {repeat}",
                            s.len()
                        )));
                    }
                    out.extend_from_slice(s.as_bytes());
                }
                _ => {
                    for _ in 0..*repeat {
                        let v = next_value(values)?;
                        pack_one(*kind, v, out, order)?;
                    }
                }
            },
            FormatItem::Group { repeat, items } => {
                let count = match repeat {
                    Repeat::Fixed(n) => *n,
                    Repeat::FromData => {
                        let v = next_value(values)?;
                        let n = match v {
                            CompositeValue::N(n) | CompositeValue::U32(n) => *n,
                            other => return Err(type_mismatch("N", other)),
                        };
                        let mut word = [0u8; 4];
                        order.write_u32(&mut word, n);
                        out.extend_from_slice(&word);
                        n
                    }
                };
                for _ in 0..count {
                    pack_items(items, values, out, order)?;
                }
            }
        }
    }
    Ok(())
}

fn next_value<'a>(
    values: &mut impl Iterator<Item = &'a CompositeValue>,
) -> Result<&'a CompositeValue> {
    values.next().ok_or_else(|| {
        EvioError::InvalidState("composite format consumes more values than supplied".into())
    })
}

fn type_mismatch(token: &str, got: &CompositeValue) -> EvioError {
    EvioError::InvalidState(format!("composite token {token} cannot pack {got:?}"))
}

fn pack_one(kind: FmtKind, v: &CompositeValue, out: &mut Vec<u8>, order: Endian) -> Result<()> {
    let mut word8 = [0u8; 8];
    match (kind, v) {
        (FmtKind::U32, CompositeValue::U32(x)) => {
            order.write_u32(&mut word8[..4], *x);
            out.extend_from_slice(&word8[..4]);
        }
        (FmtKind::I32, CompositeValue::I32(x)) => {
            order.write_u32(&mut word8[..4], *x as u32);
            out.extend_from_slice(&word8[..4]);
        }
        (FmtKind::I16, CompositeValue::I16(x)) => {
            order.write_u16(&mut word8[..2], *x as u16);
            out.extend_from_slice(&word8[..2]);
        }
        (FmtKind::I8, CompositeValue::I8(x)) => out.push(*x as u8),
        (FmtKind::I64, CompositeValue::I64(x)) => {
            order.write_u64(&mut word8, *x as u64);
            out.extend_from_slice(&word8);
        }
        (FmtKind::F32, CompositeValue::F32(x)) => {
            order.write_f32(&mut word8[..4], *x);
            out.extend_from_slice(&word8[..4]);
        }
        (FmtKind::F64, CompositeValue::F64(x)) => {
            order.write_f64(&mut word8, *x);
            out.extend_from_slice(&word8);
        }
        (k, v) => return Err(type_mismatch(&format!("{k:?}"), v)),
    }
    Ok(())
}

fn unpack_items(
    items: &[FormatItem],
    data: &[u8],
    pos: &mut usize,
    out: &mut Vec<CompositeValue>,
    order: Endian,
) -> Result<()> {
    for item in items {
        match item {
            FormatItem::Value { repeat, kind } => match kind {
                FmtKind::Chars => {
                    let n = *repeat as usize;
                    check_remaining(data, *pos, n)?;
                    out.push(CompositeValue::Chars(
                        String::from_utf8_lossy(&data[*pos..*pos + n]).into_owned(),
                    ));
                    *pos += n;
                }
                _ => {
                    for _ in 0..*repeat {
                        let size = kind.element_bytes();
                        check_remaining(data, *pos, size)?;
                        let chunk = &data[*pos..*pos + size];
                        out.push(match kind {
                            FmtKind::U32 => CompositeValue::U32(order.read_u32(chunk)),
                            FmtKind::I32 => CompositeValue::I32(order.read_u32(chunk) as i32),
                            FmtKind::I16 => CompositeValue::I16(order.read_u16(chunk) as i16),
                            FmtKind::I8 => CompositeValue::I8(chunk[0] as i8),
                            FmtKind::I64 => CompositeValue::I64(order.read_u64(chunk) as i64),
                            FmtKind::F32 => CompositeValue::F32(order.read_f32(chunk)),
                            FmtKind::F64 => CompositeValue::F64(order.read_f64(chunk)),
                            FmtKind::Chars => unreachable!(),
                        });
                        *pos += size;
                    }
                }
            },
            FormatItem::Group { repeat, items } => {
                let count = match repeat {
                    Repeat::Fixed(n) => *n,
                    Repeat::FromData => {
                        check_remaining(data, *pos, 4)?;
                        let n = order.read_u32(&data[*pos..]);
                        *pos += 4;
                        out.push(CompositeValue::N(n));
                        n
                    }
                };
                for _ in 0..count {
                    unpack_items(items, data, pos, out, order)?;
                }
            }
        }
    }
    Ok(())
}

fn swap_items(
    items: &[FormatItem],
    data: &mut [u8],
    pos: &mut usize,
    src_order: Endian,
) -> Result<()> {
    for item in items {
        match item {
            FormatItem::Value { repeat, kind } => {
                let size = kind.element_bytes();
                let count = *repeat as usize;
                check_remaining(data, *pos, size * count)?;
                if size > 1 {
                    for _ in 0..count {
                        data[*pos..*pos + size].reverse();
                        *pos += size;
                    }
                } else {
                    *pos += count;
                }
            }
            FormatItem::Group { repeat, items } => {
                let count = match repeat {
                    Repeat::Fixed(n) => *n,
                    Repeat::FromData => {
                        check_remaining(data, *pos, 4)?;
                        let n = src_order.read_u32(&data[*pos..]);
                        data[*pos..*pos + 4].reverse();
                        *pos += 4;
                        n
                    }
                };
                for _ in 0..count {
                    swap_items(items, data, pos, src_order)?;
                }
            }
        }
    }
    Ok(())
}

fn check_remaining(data: &[u8], pos: usize, need: usize) -> Result<()> {
    if pos + need > data.len() {
        return Err(EvioError::truncated(
            pos as u64,
            "composite data ends inside a datum",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CompositeData {
        CompositeData::new(
            5,
            0x66,
            1,
            "2(N(FD),2S),4A",
            vec![
                // First outer iteration: N = 2.
                CompositeValue::N(2),
                CompositeValue::F32(1.5),
                CompositeValue::F64(-2.25),
                CompositeValue::F32(3.0),
                CompositeValue::F64(4.0),
                CompositeValue::I16(-7),
                CompositeValue::I16(8),
                // Second outer iteration: N = 1.
                CompositeValue::N(1),
                CompositeValue::F32(9.5),
                CompositeValue::F64(10.0),
                CompositeValue::I16(11),
                CompositeValue::I16(-12),
                CompositeValue::Chars("calo".into()),
            ],
        )
    }

    #[test]
    fn format_parses_groups_and_counts() {
        let items = parse_format("2(N(FD),2S),4A").unwrap();
        assert_eq!(items.len(), 2);
        match &items[0] {
            FormatItem::Group { repeat, items } => {
                assert_eq!(*repeat, Repeat::Fixed(2));
                assert!(matches!(
                    items[0],
                    FormatItem::Group {
                        repeat: Repeat::FromData,
                        ..
                    }
                ));
                assert_eq!(
                    items[1],
                    FormatItem::Value {
                        repeat: 2,
                        kind: FmtKind::I16
                    }
                );
            }
            other => panic!("expected group, got {other:?}"),
        }
        assert_eq!(
            items[1],
            FormatItem::Value {
                repeat: 4,
                kind: FmtKind::Chars
            }
        );
    }

    #[test]
    fn bad_formats_rejected() {
        assert!(parse_format("3Q").is_err());
        assert!(parse_format("2(FD").is_err());
        assert!(parse_format("FD)").is_err());
    }

    #[test]
    fn pack_unpack_round_trips_both_orders() {
        let c = sample();
        for order in [Endian::Big, Endian::Little] {
            let bytes = c.to_bytes(order).unwrap();
            assert_eq!(bytes.len() % 4, 0);
            let back = CompositeData::from_bytes(&bytes, order).unwrap();
            assert_eq!(back, c);
        }
    }

    #[test]
    fn runtime_count_drives_iteration() {
        let c = CompositeData::new(
            1,
            2,
            0,
            "N(I)",
            vec![
                CompositeValue::N(3),
                CompositeValue::U32(10),
                CompositeValue::U32(20),
                CompositeValue::U32(30),
            ],
        );
        let packed = c.packed_data(Endian::Big).unwrap();
        assert_eq!(packed.len(), 16);
        assert_eq!(Endian::Big.read_u32(&packed[0..]), 3);
        assert_eq!(Endian::Big.read_u32(&packed[12..]), 30);
    }

    #[test]
    fn value_count_mismatch_rejected() {
        let short = CompositeData::new(1, 2, 0, "2I", vec![CompositeValue::U32(1)]);
        assert!(short.packed_data(Endian::Big).is_err());
        let long = CompositeData::new(
            1,
            2,
            0,
            "I",
            vec![CompositeValue::U32(1), CompositeValue::U32(2)],
        );
        assert!(long.packed_data(Endian::Big).is_err());
    }

    #[test]
    fn swap_is_involution_and_matches_reorder() {
        let c = sample();
        let big = c.packed_data(Endian::Big).unwrap();
        let little = c.packed_data(Endian::Little).unwrap();

        let mut swapped = big.clone();
        CompositeData::swap_packed(&c.format, &mut swapped, Endian::Big).unwrap();
        assert_eq!(swapped, little);

        CompositeData::swap_packed(&c.format, &mut swapped, Endian::Little).unwrap();
        assert_eq!(swapped, big);
    }
}

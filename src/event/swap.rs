//! In-place byte-order swap over a serialized event.
//!
//! The walk reads each header in the *pre-swap* order to learn lengths and
//! types, then reverses the header words and the leaf data per element size.
//! Byte data (chars, strings) is untouched; composite data is swapped per its
//! format string. Every header word is reversed exactly once, so applying the
//! swap twice (with the orders exchanged) restores the original bytes.

use crate::buffer::Endian;
use crate::error::{EvioError, Result};
use crate::event::composite::CompositeData;
use crate::event::structure::{decode_strings, StructureHeader, StructureKind};
use crate::event::types::DataType;

/// Swaps a serialized event (a bank) between byte orders, in place.
///
/// `src_order` is the order the buffer currently holds; afterwards the buffer
/// holds the opposite order.
pub fn swap_event(buf: &mut [u8], src_order: Endian) -> Result<()> {
    let used = swap_structure(StructureKind::Bank, buf, 0, src_order)?;
    debug_assert!(used <= buf.len());
    Ok(())
}

/// Swaps one structure at `offset`, returning its total size in bytes.
fn swap_structure(
    kind: StructureKind,
    buf: &mut [u8],
    offset: usize,
    src_order: Endian,
) -> Result<usize> {
    // Decode before touching anything; the header is still in src order.
    let header = StructureHeader::read(kind, buf, offset, src_order)?;
    let total = header.total_words() as usize * 4;
    if offset + total > buf.len() {
        return Err(EvioError::bad_format(
            offset as u64,
            "structure overruns the event during swap",
        ));
    }

    for w in 0..kind.header_words() {
        buf[offset + w * 4..offset + w * 4 + 4].reverse();
    }

    let payload_start = offset + kind.header_words() * 4;
    let payload_end = offset + total;

    if header.data_type.is_container() {
        let child_kind = StructureKind::of_container_type(header.data_type)
            .expect("container type implies a child kind");
        let mut pos = payload_start;
        while pos < payload_end {
            pos += swap_structure(child_kind, buf, pos, src_order)?;
        }
        if pos != payload_end {
            return Err(EvioError::bad_format(
                offset as u64,
                "children do not exactly fill their container during swap",
            ));
        }
    } else {
        swap_leaf(
            header.data_type,
            &mut buf[payload_start..payload_end],
            src_order,
        )?;
    }
    Ok(total)
}

/// Swaps a leaf payload per its element size.
fn swap_leaf(data_type: DataType, payload: &mut [u8], src_order: Endian) -> Result<()> {
    match data_type {
        // Byte data and strings have no byte order.
        DataType::Char8 | DataType::Uchar8 | DataType::CharStar8 => Ok(()),
        DataType::Composite => swap_composite(payload, src_order),
        other => {
            // Unknown payloads swap as words, matching how they were written.
            let size = other.element_size().unwrap_or(4);
            if size > 1 {
                for chunk in payload.chunks_exact_mut(size) {
                    chunk.reverse();
                }
            }
            Ok(())
        }
    }
}

/// Swaps a composite leaf: both sub-headers, the data per the format string,
/// and nothing of the format string itself.
fn swap_composite(payload: &mut [u8], src_order: Endian) -> Result<()> {
    let fmt_header = StructureHeader::read(StructureKind::TagSegment, payload, 0, src_order)?;
    let fmt_end = 4 + fmt_header.length_words as usize * 4;
    if fmt_end > payload.len() {
        return Err(EvioError::truncated(0, "composite format overruns its leaf"));
    }
    let format = decode_strings(&payload[4..fmt_end])
        .into_iter()
        .next()
        .ok_or_else(|| EvioError::bad_format(4, "empty composite format string"))?;
    payload[0..4].reverse();

    let bank_header = StructureHeader::read(StructureKind::Bank, payload, fmt_end, src_order)?;
    let data_start = fmt_end + 8;
    let data_end = fmt_end + bank_header.total_words() as usize * 4;
    if data_end > payload.len() {
        return Err(EvioError::truncated(
            fmt_end as u64,
            "composite data bank overruns its leaf",
        ));
    }
    payload[fmt_end..fmt_end + 4].reverse();
    payload[fmt_end + 4..fmt_end + 8].reverse();

    let unpadded_end = data_end - bank_header.padding as usize;
    CompositeData::swap_packed(&format, &mut payload[data_start..unpadded_end], src_order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::composite::CompositeValue;
    use crate::event::structure::{EventTree, LeafData};

    fn nested_sample() -> EventTree {
        let mut t = EventTree::new_bank(1, 1, DataType::Bank);
        let seg_holder = t
            .add_container(t.root(), StructureKind::Bank, 2, 2, DataType::Segment)
            .unwrap();
        t.add_leaf(
            seg_holder,
            StructureKind::Segment,
            3,
            0,
            LeafData::Short16(vec![0x0102, -2, 7]),
        )
        .unwrap();
        t.add_leaf(
            seg_holder,
            StructureKind::Segment,
            4,
            0,
            LeafData::Strings(vec!["adc".into()]),
        )
        .unwrap();
        let sub = t
            .add_container(t.root(), StructureKind::Bank, 5, 5, DataType::TagSegment)
            .unwrap();
        t.add_leaf(
            sub,
            StructureKind::TagSegment,
            6,
            0,
            LeafData::Double64(vec![6.5, -0.25]),
        )
        .unwrap();
        t.add_leaf(
            sub,
            StructureKind::TagSegment,
            7,
            0,
            LeafData::Uchar8(vec![1, 2, 3]),
        )
        .unwrap();
        t
    }

    #[test]
    fn swap_equals_reserialization_in_other_order() {
        let t = nested_sample();
        let big = t.to_bytes(Endian::Big).unwrap();
        let little = t.to_bytes(Endian::Little).unwrap();

        let mut swapped = big.clone();
        swap_event(&mut swapped, Endian::Big).unwrap();
        assert_eq!(swapped, little);
    }

    #[test]
    fn swap_is_involution() {
        let t = nested_sample();
        let original = t.to_bytes(Endian::Big).unwrap();
        let mut buf = original.clone();
        swap_event(&mut buf, Endian::Big).unwrap();
        assert_ne!(buf, original);
        swap_event(&mut buf, Endian::Little).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn swapped_event_parses_in_other_order() {
        let t = nested_sample();
        let mut buf = t.to_bytes(Endian::Big).unwrap();
        swap_event(&mut buf, Endian::Big).unwrap();
        let back = EventTree::parse(&buf, Endian::Little).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn composite_leaf_swaps_per_format() {
        let c = CompositeData::new(
            1,
            9,
            0,
            "N(IS)",
            vec![
                CompositeValue::N(2),
                CompositeValue::U32(0x01020304),
                CompositeValue::I16(0x0506),
                CompositeValue::U32(0x0708090a),
                CompositeValue::I16(0x0b0c),
            ],
        );
        let t = EventTree::leaf_bank(8, 0, LeafData::Composite(c)).unwrap();
        let big = t.to_bytes(Endian::Big).unwrap();
        let little = t.to_bytes(Endian::Little).unwrap();

        let mut swapped = big.clone();
        swap_event(&mut swapped, Endian::Big).unwrap();
        assert_eq!(swapped, little);
        swap_event(&mut swapped, Endian::Little).unwrap();
        assert_eq!(swapped, big);
    }
}

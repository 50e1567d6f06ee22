//! The structure tree: banks, segments, tag-segments, and their codec.
//!
//! Nodes live in an arena owned by the tree; parents and children refer to
//! each other by index, so navigation needs no back-references and cloning a
//! tree is a deep copy. Serialization computes payload sizes bottom-up and
//! writes headers then payloads top-down; parsing is a length-driven
//! recursive descent.

use crate::buffer::{pad4, Endian};
use crate::error::{EvioError, Result};
use crate::event::composite::CompositeData;
use crate::event::types::DataType;

// ---------------------------------------------------------------------------
// Structure kinds and headers
// ---------------------------------------------------------------------------

/// The three container kinds, differing only in header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    /// 2-word header: `{len, (tag<<16)|(pad<<14)|(type<<8)|num}`.
    Bank,
    /// 1-word header: `(tag<<24)|(pad<<22)|(type<<16)|len16`.
    Segment,
    /// 1-word header: `(tag<<20)|(type<<16)|len16`; no pad field.
    TagSegment,
}

impl StructureKind {
    /// Header size in words.
    #[inline]
    pub fn header_words(self) -> usize {
        match self {
            StructureKind::Bank => 2,
            StructureKind::Segment | StructureKind::TagSegment => 1,
        }
    }

    /// The canonical content-type code announcing children of this kind.
    #[inline]
    pub fn container_type(self) -> DataType {
        match self {
            StructureKind::Bank => DataType::Bank,
            StructureKind::Segment => DataType::Segment,
            StructureKind::TagSegment => DataType::TagSegment,
        }
    }

    /// Kind of children a container of type `t` holds.
    pub fn of_container_type(t: DataType) -> Option<StructureKind> {
        if t.is_bank() {
            Some(StructureKind::Bank)
        } else if t.is_segment() {
            Some(StructureKind::Segment)
        } else if t.is_tagsegment() {
            Some(StructureKind::TagSegment)
        } else {
            None
        }
    }
}

/// Decoded structure header.
///
/// `length_words` counts everything after the first header word: for a bank
/// the second header word plus the payload, for segments and tag-segments
/// the payload alone. Either way `total_words == length_words + 1`, which
/// keeps `header_words + payload_words == total_words` for every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureHeader {
    pub kind: StructureKind,
    pub tag: u32,
    /// Bank number; 0 for segments and tag-segments.
    pub num: u8,
    pub data_type: DataType,
    /// Trailing pad byte count (0–3) of the leaf payload.
    pub padding: u32,
    pub length_words: u32,
}

impl StructureHeader {
    /// Total structure size in words, header included.
    #[inline]
    pub fn total_words(&self) -> u32 {
        self.length_words + 1
    }

    /// Payload size in bytes.
    #[inline]
    pub fn payload_bytes(&self) -> usize {
        (self.total_words() as usize - self.kind.header_words()) * 4
    }

    /// Writes the header at `buf[offset..]`.
    pub fn write(&self, buf: &mut [u8], offset: usize, order: Endian) -> Result<()> {
        let need = self.kind.header_words() * 4;
        if offset + need > buf.len() {
            return Err(EvioError::OutOfBounds {
                offset,
                length: need,
                limit: buf.len(),
            });
        }
        match self.kind {
            StructureKind::Bank => {
                order.write_u32(&mut buf[offset..], self.length_words);
                let word = ((self.tag & 0xffff) << 16)
                    | ((self.padding & 0x3) << 14)
                    | ((self.data_type.code() & 0x3f) << 8)
                    | self.num as u32;
                order.write_u32(&mut buf[offset + 4..], word);
            }
            StructureKind::Segment => {
                let word = ((self.tag & 0xff) << 24)
                    | ((self.padding & 0x3) << 22)
                    | ((self.data_type.code() & 0x3f) << 16)
                    | (self.length_words & 0xffff);
                order.write_u32(&mut buf[offset..], word);
            }
            StructureKind::TagSegment => {
                let word = ((self.tag & 0xfff) << 20)
                    | ((self.data_type.code() & 0xf) << 16)
                    | (self.length_words & 0xffff);
                order.write_u32(&mut buf[offset..], word);
            }
        }
        Ok(())
    }

    /// Reads a header of the given kind at `buf[offset..]`.
    pub fn read(
        kind: StructureKind,
        buf: &[u8],
        offset: usize,
        order: Endian,
    ) -> Result<StructureHeader> {
        let need = kind.header_words() * 4;
        if offset + need > buf.len() {
            return Err(EvioError::truncated(
                offset as u64,
                "structure header past end of payload",
            ));
        }
        match kind {
            StructureKind::Bank => {
                let length_words = order.read_u32(&buf[offset..]);
                let word = order.read_u32(&buf[offset + 4..]);
                Ok(StructureHeader {
                    kind,
                    tag: word >> 16,
                    num: (word & 0xff) as u8,
                    data_type: DataType::from_code((word >> 8) & 0x3f)?,
                    padding: (word >> 14) & 0x3,
                    length_words,
                })
            }
            StructureKind::Segment => {
                let word = order.read_u32(&buf[offset..]);
                Ok(StructureHeader {
                    kind,
                    tag: word >> 24,
                    num: 0,
                    data_type: DataType::from_code((word >> 16) & 0x3f)?,
                    padding: (word >> 22) & 0x3,
                    length_words: word & 0xffff,
                })
            }
            StructureKind::TagSegment => {
                let word = order.read_u32(&buf[offset..]);
                Ok(StructureHeader {
                    kind,
                    tag: word >> 20,
                    num: 0,
                    data_type: DataType::from_code((word >> 16) & 0xf)?,
                    padding: 0,
                    length_words: word & 0xffff,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// String block codec
// ---------------------------------------------------------------------------

/// Encodes strings as concatenated NUL-terminated UTF-8, padded with `\4`
/// bytes to a 4-byte multiple and a minimum of 4 bytes.
pub fn encode_strings(strings: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for s in strings {
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }
    let target = (out.len() + pad4(out.len())).max(4);
    out.resize(target, 4);
    out
}

/// Decodes a string block: splits on NUL, drops the trailing `\4` padding.
pub fn decode_strings(bytes: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b == 0 {
            out.push(String::from_utf8_lossy(&bytes[start..i]).into_owned());
            start = i + 1;
        } else if b == 4 && bytes[i..].iter().all(|&x| x == 4) {
            break;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Leaf data
// ---------------------------------------------------------------------------

/// Typed payload of a leaf structure.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafData {
    /// Container or empty leaf.
    None,
    Char8(Vec<i8>),
    Uchar8(Vec<u8>),
    Short16(Vec<i16>),
    Ushort16(Vec<u16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Long64(Vec<i64>),
    Ulong64(Vec<u64>),
    Float32(Vec<f32>),
    Double64(Vec<f64>),
    Strings(Vec<String>),
    Composite(CompositeData),
}

impl LeafData {
    /// The data type a leaf carrying this payload announces.
    pub fn data_type(&self) -> Option<DataType> {
        Some(match self {
            LeafData::None => return None,
            LeafData::Char8(_) => DataType::Char8,
            LeafData::Uchar8(_) => DataType::Uchar8,
            LeafData::Short16(_) => DataType::Short16,
            LeafData::Ushort16(_) => DataType::Ushort16,
            LeafData::Int32(_) => DataType::Int32,
            LeafData::Uint32(_) => DataType::Uint32,
            LeafData::Long64(_) => DataType::Long64,
            LeafData::Ulong64(_) => DataType::Ulong64,
            LeafData::Float32(_) => DataType::Float32,
            LeafData::Double64(_) => DataType::Double64,
            LeafData::Strings(_) => DataType::CharStar8,
            LeafData::Composite(_) => DataType::Composite,
        })
    }

    /// Unpadded payload size in bytes.
    pub fn raw_bytes(&self, order: Endian) -> Result<usize> {
        Ok(match self {
            LeafData::None => 0,
            LeafData::Char8(v) => v.len(),
            LeafData::Uchar8(v) => v.len(),
            LeafData::Short16(v) => v.len() * 2,
            LeafData::Ushort16(v) => v.len() * 2,
            LeafData::Int32(v) => v.len() * 4,
            LeafData::Uint32(v) => v.len() * 4,
            LeafData::Long64(v) => v.len() * 8,
            LeafData::Ulong64(v) => v.len() * 8,
            LeafData::Float32(v) => v.len() * 4,
            LeafData::Double64(v) => v.len() * 8,
            LeafData::Strings(v) => encode_strings(v).len(),
            LeafData::Composite(c) => c.to_bytes(order)?.len(),
        })
    }

    fn write(&self, buf: &mut [u8], offset: usize, order: Endian) -> Result<usize> {
        let mut pos = offset;
        match self {
            LeafData::None => {}
            LeafData::Char8(v) => {
                for &x in v {
                    buf[pos] = x as u8;
                    pos += 1;
                }
            }
            LeafData::Uchar8(v) => {
                buf[pos..pos + v.len()].copy_from_slice(v);
                pos += v.len();
            }
            LeafData::Short16(v) => {
                for &x in v {
                    order.write_u16(&mut buf[pos..], x as u16);
                    pos += 2;
                }
            }
            LeafData::Ushort16(v) => {
                for &x in v {
                    order.write_u16(&mut buf[pos..], x);
                    pos += 2;
                }
            }
            LeafData::Int32(v) => {
                for &x in v {
                    order.write_u32(&mut buf[pos..], x as u32);
                    pos += 4;
                }
            }
            LeafData::Uint32(v) => {
                for &x in v {
                    order.write_u32(&mut buf[pos..], x);
                    pos += 4;
                }
            }
            LeafData::Long64(v) => {
                for &x in v {
                    order.write_u64(&mut buf[pos..], x as u64);
                    pos += 8;
                }
            }
            LeafData::Ulong64(v) => {
                for &x in v {
                    order.write_u64(&mut buf[pos..], x);
                    pos += 8;
                }
            }
            LeafData::Float32(v) => {
                for &x in v {
                    order.write_f32(&mut buf[pos..], x);
                    pos += 4;
                }
            }
            LeafData::Double64(v) => {
                for &x in v {
                    order.write_f64(&mut buf[pos..], x);
                    pos += 8;
                }
            }
            LeafData::Strings(v) => {
                let bytes = encode_strings(v);
                buf[pos..pos + bytes.len()].copy_from_slice(&bytes);
                pos += bytes.len();
            }
            LeafData::Composite(c) => {
                let bytes = c.to_bytes(order)?;
                buf[pos..pos + bytes.len()].copy_from_slice(&bytes);
                pos += bytes.len();
            }
        }
        Ok(pos - offset)
    }

    fn read(data_type: DataType, bytes: &[u8], padding: usize, order: Endian) -> Result<LeafData> {
        let data = &bytes[..bytes.len().saturating_sub(padding)];
        Ok(match data_type {
            DataType::Char8 => LeafData::Char8(data.iter().map(|&b| b as i8).collect()),
            DataType::Uchar8 => LeafData::Uchar8(data.to_vec()),
            DataType::Short16 => {
                LeafData::Short16(data.chunks_exact(2).map(|c| order.read_u16(c) as i16).collect())
            }
            DataType::Ushort16 => {
                LeafData::Ushort16(data.chunks_exact(2).map(|c| order.read_u16(c)).collect())
            }
            DataType::Int32 => {
                LeafData::Int32(data.chunks_exact(4).map(|c| order.read_u32(c) as i32).collect())
            }
            DataType::Uint32 | DataType::Unknown32 => {
                LeafData::Uint32(data.chunks_exact(4).map(|c| order.read_u32(c)).collect())
            }
            DataType::Long64 => {
                LeafData::Long64(data.chunks_exact(8).map(|c| order.read_u64(c) as i64).collect())
            }
            DataType::Ulong64 => {
                LeafData::Ulong64(data.chunks_exact(8).map(|c| order.read_u64(c)).collect())
            }
            DataType::Float32 => {
                LeafData::Float32(data.chunks_exact(4).map(|c| order.read_f32(c)).collect())
            }
            DataType::Double64 => {
                LeafData::Double64(data.chunks_exact(8).map(|c| order.read_f64(c)).collect())
            }
            // Full-block decode: string padding is self-describing.
            DataType::CharStar8 => LeafData::Strings(decode_strings(bytes)),
            DataType::Composite => LeafData::Composite(CompositeData::from_bytes(bytes, order)?),
            other => {
                return Err(EvioError::InvalidState(format!(
                    "type {other:?} is not a leaf type"
                )))
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Event tree
// ---------------------------------------------------------------------------

/// Index of a node within its tree's arena.
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
struct Node {
    kind: StructureKind,
    tag: u32,
    num: u8,
    data_type: DataType,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: LeafData,
}

/// An event: a tree of structures rooted in a bank.
///
/// Children are exclusively owned by their parent; [`Clone`] is a deep copy
/// whose nodes no longer alias the original.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl EventTree {
    /// A new event whose root bank announces content of type `content`.
    pub fn new_bank(tag: u32, num: u8, content: DataType) -> EventTree {
        EventTree {
            nodes: vec![Node {
                kind: StructureKind::Bank,
                tag,
                num,
                data_type: content,
                parent: None,
                children: Vec::new(),
                data: LeafData::None,
            }],
            root: 0,
        }
    }

    /// Root bank with typed leaf payload, in one step.
    pub fn leaf_bank(tag: u32, num: u8, data: LeafData) -> Result<EventTree> {
        let dt = data
            .data_type()
            .ok_or_else(|| EvioError::InvalidState("leaf payload required".into()))?;
        let mut t = EventTree::new_bank(tag, num, dt);
        t.nodes[0].data = data;
        Ok(t)
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ── Node accessors ────────────────────────────────────────────────────

    pub fn kind(&self, id: NodeId) -> StructureKind {
        self.nodes[id].kind
    }

    pub fn tag(&self, id: NodeId) -> u32 {
        self.nodes[id].tag
    }

    pub fn num(&self, id: NodeId) -> u8 {
        self.nodes[id].num
    }

    pub fn data_type(&self, id: NodeId) -> DataType {
        self.nodes[id].data_type
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn leaf_data(&self, id: NodeId) -> &LeafData {
        &self.nodes[id].data
    }

    // ── Construction ──────────────────────────────────────────────────────

    /// Adds a container child of `kind` announcing `content`; the parent must
    /// be a container of matching child kind.
    pub fn add_container(
        &mut self,
        parent: NodeId,
        kind: StructureKind,
        tag: u32,
        num: u8,
        content: DataType,
    ) -> Result<NodeId> {
        self.check_child(parent, kind)?;
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            tag,
            num,
            data_type: content,
            parent: Some(parent),
            children: Vec::new(),
            data: LeafData::None,
        });
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    /// Adds a leaf child of `kind` carrying `data`.
    pub fn add_leaf(
        &mut self,
        parent: NodeId,
        kind: StructureKind,
        tag: u32,
        num: u8,
        data: LeafData,
    ) -> Result<NodeId> {
        self.check_child(parent, kind)?;
        let dt = data
            .data_type()
            .ok_or_else(|| EvioError::InvalidState("leaf payload required".into()))?;
        if kind == StructureKind::TagSegment && dt.code() > 0xf {
            return Err(EvioError::InvalidState(format!(
                "type {dt:?} does not fit a tag-segment's 4-bit type field"
            )));
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            tag,
            num,
            data_type: dt,
            parent: Some(parent),
            children: Vec::new(),
            data,
        });
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    fn check_child(&self, parent: NodeId, kind: StructureKind) -> Result<()> {
        let p = &self.nodes[parent];
        match StructureKind::of_container_type(p.data_type) {
            Some(expected) if expected == kind => Ok(()),
            Some(expected) => Err(EvioError::InvalidState(format!(
                "container holds {expected:?} children, not {kind:?}"
            ))),
            None => Err(EvioError::InvalidState(format!(
                "{:?} is a leaf, not a container",
                p.data_type
            ))),
        }
    }

    // ── Serialization ─────────────────────────────────────────────────────

    /// Unpadded payload bytes of a node (children included, header excluded).
    fn payload_raw_bytes(&self, id: NodeId, order: Endian) -> Result<usize> {
        let node = &self.nodes[id];
        if node.data_type.is_container() {
            let mut total = 0;
            for &c in &node.children {
                total += self.total_bytes(c, order)?;
            }
            Ok(total)
        } else {
            node.data.raw_bytes(order)
        }
    }

    /// Total serialized size of a node in bytes, header and padding included.
    pub fn total_bytes(&self, id: NodeId, order: Endian) -> Result<usize> {
        let raw = self.payload_raw_bytes(id, order)?;
        Ok(self.nodes[id].kind.header_words() * 4 + raw + pad4(raw))
    }

    /// Serializes the whole event in the given byte order.
    pub fn to_bytes(&self, order: Endian) -> Result<Vec<u8>> {
        let total = self.total_bytes(self.root, order)?;
        let mut buf = vec![0u8; total];
        self.write_node(self.root, &mut buf, 0, order)?;
        Ok(buf)
    }

    fn write_node(&self, id: NodeId, buf: &mut [u8], offset: usize, order: Endian) -> Result<usize> {
        let node = &self.nodes[id];
        let raw = self.payload_raw_bytes(id, order)?;
        let padding = pad4(raw);
        let header = StructureHeader {
            kind: node.kind,
            tag: node.tag,
            num: node.num,
            data_type: node.data_type,
            padding: padding as u32,
            length_words: ((node.kind.header_words() * 4 + raw + padding) / 4 - 1) as u32,
        };
        header.write(buf, offset, order)?;

        let mut pos = offset + node.kind.header_words() * 4;
        if node.data_type.is_container() {
            for &c in &node.children {
                pos += self.write_node(c, buf, pos, order)?;
            }
        } else {
            pos += node.data.write(buf, pos, order)?;
        }
        // Padding bytes are zero; the buffer is pre-zeroed.
        pos += padding;
        Ok(pos - offset)
    }

    // ── Parsing ───────────────────────────────────────────────────────────

    /// Parses an event (a serialized bank) from `bytes`.
    pub fn parse(bytes: &[u8], order: Endian) -> Result<EventTree> {
        let mut tree = EventTree {
            nodes: Vec::new(),
            root: 0,
        };
        tree.parse_node(StructureKind::Bank, None, bytes, 0, order)?;
        Ok(tree)
    }

    fn parse_node(
        &mut self,
        kind: StructureKind,
        parent: Option<NodeId>,
        buf: &[u8],
        offset: usize,
        order: Endian,
    ) -> Result<usize> {
        let header = StructureHeader::read(kind, buf, offset, order)?;
        let total = header.total_words() as usize * 4;
        if offset + total > buf.len() {
            return Err(EvioError::bad_format(
                offset as u64,
                format!(
                    "structure of {total} bytes overruns its container ({} available)",
                    buf.len() - offset
                ),
            ));
        }

        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            tag: header.tag,
            num: header.num,
            data_type: header.data_type,
            parent,
            children: Vec::new(),
            data: LeafData::None,
        });

        let payload_start = offset + kind.header_words() * 4;
        let payload_end = offset + total;
        if header.data_type.is_container() {
            let child_kind = StructureKind::of_container_type(header.data_type)
                .expect("container type checked above");
            let mut pos = payload_start;
            while pos < payload_end {
                let used = self.parse_node(child_kind, Some(id), &buf[..payload_end], pos, order)?;
                pos += used;
            }
            if pos != payload_end {
                return Err(EvioError::bad_format(
                    offset as u64,
                    "children do not exactly fill their container",
                ));
            }
        } else {
            self.nodes[id].data = LeafData::read(
                header.data_type,
                &buf[payload_start..payload_end],
                header.padding as usize,
                order,
            )?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_header_packs_per_layout() {
        let h = StructureHeader {
            kind: StructureKind::Bank,
            tag: 0x1234,
            num: 0x12,
            data_type: DataType::Int32,
            padding: 0,
            length_words: 2,
        };
        let mut buf = [0u8; 8];
        h.write(&mut buf, 0, Endian::Big).unwrap();
        assert_eq!(buf, [0, 0, 0, 2, 0x12, 0x34, 0x0B, 0x12]);
        let back = StructureHeader::read(StructureKind::Bank, &buf, 0, Endian::Big).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn segment_and_tagsegment_headers_round_trip() {
        let s = StructureHeader {
            kind: StructureKind::Segment,
            tag: 0xab,
            num: 0,
            data_type: DataType::Short16,
            padding: 2,
            length_words: 5,
        };
        let mut buf = [0u8; 4];
        s.write(&mut buf, 0, Endian::Little).unwrap();
        assert_eq!(
            StructureHeader::read(StructureKind::Segment, &buf, 0, Endian::Little).unwrap(),
            s
        );

        let t = StructureHeader {
            kind: StructureKind::TagSegment,
            tag: 0xfff,
            num: 0,
            data_type: DataType::CharStar8,
            padding: 0,
            length_words: 3,
        };
        t.write(&mut buf, 0, Endian::Big).unwrap();
        assert_eq!(
            StructureHeader::read(StructureKind::TagSegment, &buf, 0, Endian::Big).unwrap(),
            t
        );
    }

    #[test]
    fn string_block_rules() {
        let one = encode_strings(&["ab".into()]);
        assert_eq!(one, b"ab\0\x04");
        let aligned = encode_strings(&["abc".into()]);
        assert_eq!(aligned, b"abc\0");
        let empty = encode_strings(&[]);
        assert_eq!(empty, [4, 4, 4, 4]);
        assert_eq!(decode_strings(&one), vec!["ab".to_string()]);
        assert_eq!(
            decode_strings(&encode_strings(&["x".into(), "yz".into()])),
            vec!["x".to_string(), "yz".to_string()]
        );
    }

    #[test]
    fn single_int_bank_layout() {
        let t = EventTree::leaf_bank(0x1234, 0x12, LeafData::Int32(vec![1])).unwrap();
        let bytes = t.to_bytes(Endian::Big).unwrap();
        assert_eq!(
            bytes,
            [0, 0, 0, 2, 0x12, 0x34, 0x0B, 0x12, 0, 0, 0, 1]
        );
        let back = EventTree::parse(&bytes, Endian::Big).unwrap();
        assert_eq!(back.leaf_data(back.root()), &LeafData::Int32(vec![1]));
        assert_eq!(back.tag(back.root()), 0x1234);
        assert_eq!(back.num(back.root()), 0x12);
    }

    #[test]
    fn byte_leaf_padding_recovers_element_count() {
        let t = EventTree::leaf_bank(1, 1, LeafData::Uchar8(vec![1, 2, 3, 4, 5])).unwrap();
        let bytes = t.to_bytes(Endian::Big).unwrap();
        // 5 bytes pad to 8; pad count 3 recorded in the header.
        assert_eq!(bytes.len(), 8 + 8);
        let h = StructureHeader::read(StructureKind::Bank, &bytes, 0, Endian::Big).unwrap();
        assert_eq!(h.padding, 3);
        let back = EventTree::parse(&bytes, Endian::Big).unwrap();
        assert_eq!(
            back.leaf_data(back.root()),
            &LeafData::Uchar8(vec![1, 2, 3, 4, 5])
        );
    }

    #[test]
    fn odd_short_leaf_pads_one_short() {
        let t = EventTree::leaf_bank(1, 1, LeafData::Short16(vec![1, 2, 3])).unwrap();
        let bytes = t.to_bytes(Endian::Little).unwrap();
        assert_eq!(bytes.len(), 8 + 8);
        let h = StructureHeader::read(StructureKind::Bank, &bytes, 0, Endian::Little).unwrap();
        assert_eq!(h.padding, 2);
        let back = EventTree::parse(&bytes, Endian::Little).unwrap();
        assert_eq!(
            back.leaf_data(back.root()),
            &LeafData::Short16(vec![1, 2, 3])
        );
    }

    #[test]
    fn nested_containers_round_trip() {
        let mut t = EventTree::new_bank(1, 1, DataType::Bank);
        let sub = t
            .add_container(t.root(), StructureKind::Bank, 2, 2, DataType::Segment)
            .unwrap();
        t.add_leaf(
            sub,
            StructureKind::Segment,
            3,
            0,
            LeafData::Uint32(vec![10, 20]),
        )
        .unwrap();
        t.add_leaf(
            sub,
            StructureKind::Segment,
            4,
            0,
            LeafData::Strings(vec!["hits".into()]),
        )
        .unwrap();

        for order in [Endian::Big, Endian::Little] {
            let bytes = t.to_bytes(order).unwrap();
            let back = EventTree::parse(&bytes, order).unwrap();
            assert_eq!(back, t);
            // Serialize-parse-serialize is byte stable.
            assert_eq!(back.to_bytes(order).unwrap(), bytes);
        }
    }

    #[test]
    fn mixed_child_kind_rejected() {
        let mut t = EventTree::new_bank(1, 1, DataType::Bank);
        let err = t.add_leaf(
            t.root(),
            StructureKind::Segment,
            2,
            0,
            LeafData::Int32(vec![1]),
        );
        assert!(matches!(err, Err(EvioError::InvalidState(_))));
    }

    #[test]
    fn overrun_child_is_bad_format() {
        let t = EventTree::leaf_bank(1, 1, LeafData::Int32(vec![0x1000, 2])).unwrap();
        let mut bytes = t.to_bytes(Endian::Big).unwrap();
        // Claim the root holds banks; its payload then parses as a child bank
        // whose length word (0x1000) promises far more than remains.
        bytes[6] = DataType::Bank.code() as u8;
        assert!(matches!(
            EventTree::parse(&bytes, Endian::Big),
            Err(EvioError::BadFormat { .. })
        ));
    }

    #[test]
    fn clone_is_deep() {
        let mut a = EventTree::new_bank(1, 1, DataType::Bank);
        let b = a.clone();
        a.add_container(a.root(), StructureKind::Bank, 2, 2, DataType::Bank)
            .unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(a.len(), 2);
    }
}

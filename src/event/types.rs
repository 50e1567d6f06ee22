//! Payload type codes shared by all structure headers.

use crate::error::{EvioError, Result};

/// Content type carried in a structure header's type field.
///
/// Codes 0xC–0x40 describe child structures; the rest are leaf arrays. The
/// historical aliases (0x10, 0x20, 0x40) are accepted on read and normalized
/// by the container predicates below. Code 0xD, the old HOLLERIT/CHARSTAR8
/// value, is always read as a segment here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Unknown32,
    Uint32,
    Float32,
    /// NUL-terminated, `\4`-padded UTF-8 string block.
    CharStar8,
    Short16,
    Ushort16,
    Char8,
    Uchar8,
    Double64,
    Long64,
    Ulong64,
    Int32,
    TagSegment,
    Segment,
    Bank,
    Composite,
    AlsoBank,
    AlsoSegment,
    AlsoTagSegment,
}

impl DataType {
    /// Wire code.
    pub fn code(self) -> u32 {
        match self {
            DataType::Unknown32 => 0x0,
            DataType::Uint32 => 0x1,
            DataType::Float32 => 0x2,
            DataType::CharStar8 => 0x3,
            DataType::Short16 => 0x4,
            DataType::Ushort16 => 0x5,
            DataType::Char8 => 0x6,
            DataType::Uchar8 => 0x7,
            DataType::Double64 => 0x8,
            DataType::Long64 => 0x9,
            DataType::Ulong64 => 0xA,
            DataType::Int32 => 0xB,
            DataType::TagSegment => 0xC,
            DataType::Segment => 0xD,
            DataType::Bank => 0xE,
            DataType::Composite => 0xF,
            DataType::AlsoBank => 0x10,
            DataType::AlsoSegment => 0x20,
            DataType::AlsoTagSegment => 0x40,
        }
    }

    pub fn from_code(code: u32) -> Result<DataType> {
        Ok(match code {
            0x0 => DataType::Unknown32,
            0x1 => DataType::Uint32,
            0x2 => DataType::Float32,
            0x3 => DataType::CharStar8,
            0x4 => DataType::Short16,
            0x5 => DataType::Ushort16,
            0x6 => DataType::Char8,
            0x7 => DataType::Uchar8,
            0x8 => DataType::Double64,
            0x9 => DataType::Long64,
            0xA => DataType::Ulong64,
            0xB => DataType::Int32,
            0xC => DataType::TagSegment,
            0xD => DataType::Segment,
            0xE => DataType::Bank,
            0xF => DataType::Composite,
            0x10 => DataType::AlsoBank,
            0x20 => DataType::AlsoSegment,
            0x40 => DataType::AlsoTagSegment,
            other => {
                return Err(EvioError::InvalidState(format!(
                    "unknown data type code {other:#x}"
                )))
            }
        })
    }

    #[inline]
    pub fn is_bank(self) -> bool {
        matches!(self, DataType::Bank | DataType::AlsoBank)
    }

    #[inline]
    pub fn is_segment(self) -> bool {
        matches!(self, DataType::Segment | DataType::AlsoSegment)
    }

    #[inline]
    pub fn is_tagsegment(self) -> bool {
        matches!(self, DataType::TagSegment | DataType::AlsoTagSegment)
    }

    /// True when the payload is child structures rather than a leaf array.
    #[inline]
    pub fn is_container(self) -> bool {
        self.is_bank() || self.is_segment() || self.is_tagsegment()
    }

    /// Element size in bytes for fixed-width leaf types; `None` for
    /// containers, strings, and composite data.
    pub fn element_size(self) -> Option<usize> {
        match self {
            DataType::Char8 | DataType::Uchar8 => Some(1),
            DataType::Short16 | DataType::Ushort16 => Some(2),
            DataType::Unknown32
            | DataType::Uint32
            | DataType::Int32
            | DataType::Float32 => Some(4),
            DataType::Double64 | DataType::Long64 | DataType::Ulong64 => Some(8),
            _ => None,
        }
    }
}

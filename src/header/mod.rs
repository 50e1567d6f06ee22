//! Fixed-layout header codecs for the evio container format.
//!
//! Three headers exist on disk: the v6 file header, the v6 record header
//! (14 words each, magic in word 7), and the legacy v4 block header (8 words,
//! magic in word 7). All share the `0xc0da0100` magic word, which doubles as
//! the byte-order probe: a reader tries both orientations and adopts the one
//! that reproduces the magic.

pub mod block_header;
pub mod file_header;
pub mod record_header;

pub use block_header::BlockHeader;
pub use file_header::FileHeader;
pub use record_header::RecordHeader;

use crate::buffer::Endian;
use crate::error::{EvioError, Result};

// ---------------------------------------------------------------------------
// Magic words and fixed sizes
// ---------------------------------------------------------------------------

/// Byte-order probe word, word 7 of every file, record, and block header.
pub const MAGIC: u32 = 0xc0da_0100;

/// File-header word 0 for evio files ("EVIO").
pub const FILE_MAGIC_EVIO: u32 = 0x4556_494F;

/// File-header word 0 for HIPO files ("HIPO").
pub const FILE_MAGIC_HIPO: u32 = 0x4849_504F;

/// Word index of the magic within file, record, and block headers.
pub const MAGIC_WORD_INDEX: usize = 7;

/// v6 file-header length in 32-bit words.
pub const FILE_HEADER_WORDS: usize = 14;
/// v6 record-header length in 32-bit words.
pub const RECORD_HEADER_WORDS: usize = 14;
/// v4 block-header length in 32-bit words.
pub const BLOCK_HEADER_WORDS: usize = 8;

/// v6 file-header length in bytes.
pub const FILE_HEADER_BYTES: usize = FILE_HEADER_WORDS * 4;
/// v6 record-header length in bytes.
pub const RECORD_HEADER_BYTES: usize = RECORD_HEADER_WORDS * 4;
/// v4 block-header length in bytes.
pub const BLOCK_HEADER_BYTES: usize = BLOCK_HEADER_WORDS * 4;

/// Format version written by this crate.
pub const EVIO_VERSION: u32 = 6;

// ---------------------------------------------------------------------------
// Header type (bits 28–31 of the bit-info word)
// ---------------------------------------------------------------------------

/// Identifies what a 14-word header describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    EvioFile,
    EvioFileExtended,
    EvioRecord,
    HipoFile,
    EvioTrailer,
}

impl HeaderType {
    #[inline]
    pub fn code(self) -> u32 {
        match self {
            HeaderType::EvioFile => 1,
            HeaderType::EvioFileExtended => 2,
            HeaderType::EvioRecord => 3,
            HeaderType::HipoFile => 5,
            HeaderType::EvioTrailer => 9,
        }
    }

    pub fn from_code(code: u32) -> Option<HeaderType> {
        match code {
            1 => Some(HeaderType::EvioFile),
            2 => Some(HeaderType::EvioFileExtended),
            3 => Some(HeaderType::EvioRecord),
            5 => Some(HeaderType::HipoFile),
            9 => Some(HeaderType::EvioTrailer),
            _ => None,
        }
    }

    #[inline]
    pub fn is_file(self) -> bool {
        matches!(
            self,
            HeaderType::EvioFile | HeaderType::EvioFileExtended | HeaderType::HipoFile
        )
    }

    #[inline]
    pub fn is_trailer(self) -> bool {
        self == HeaderType::EvioTrailer
    }
}

// ---------------------------------------------------------------------------
// Byte-order detection
// ---------------------------------------------------------------------------

/// Detects the header's byte order from the magic at word 7.
///
/// `buf` starts at the header; `file_offset` is the header's position in the
/// enclosing file, used only for error reporting. A magic that matches
/// neither orientation is `BadFormat` at the magic word's offset.
pub fn detect_order(buf: &[u8], file_offset: u64) -> Result<Endian> {
    let magic_at = MAGIC_WORD_INDEX * 4;
    if buf.len() < magic_at + 4 {
        return Err(EvioError::truncated(
            file_offset,
            "header shorter than its magic word",
        ));
    }
    let word = &buf[magic_at..magic_at + 4];
    if Endian::Big.read_u32(word) == MAGIC {
        Ok(Endian::Big)
    } else if Endian::Little.read_u32(word) == MAGIC {
        Ok(Endian::Little)
    } else {
        Err(EvioError::bad_format(
            file_offset + magic_at as u64,
            format!(
                "magic word {:#010x} matches neither byte order",
                Endian::Big.read_u32(word)
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_type_codes() {
        for t in [
            HeaderType::EvioFile,
            HeaderType::EvioFileExtended,
            HeaderType::EvioRecord,
            HeaderType::HipoFile,
            HeaderType::EvioTrailer,
        ] {
            assert_eq!(HeaderType::from_code(t.code()), Some(t));
        }
        assert_eq!(HeaderType::from_code(7), None);
    }

    #[test]
    fn order_detection_both_ways() {
        let mut buf = vec![0u8; RECORD_HEADER_BYTES];
        Endian::Big.write_u32(&mut buf[28..32], MAGIC);
        assert_eq!(detect_order(&buf, 0).unwrap(), Endian::Big);
        Endian::Little.write_u32(&mut buf[28..32], MAGIC);
        assert_eq!(detect_order(&buf, 0).unwrap(), Endian::Little);
    }

    #[test]
    fn unmatched_magic_is_bad_format_at_word_offset() {
        let buf = vec![0xffu8; RECORD_HEADER_BYTES];
        match detect_order(&buf, 1000) {
            Err(EvioError::BadFormat { offset, .. }) => assert_eq!(offset, 1028),
            other => panic!("expected BadFormat, got {other:?}"),
        }
    }
}

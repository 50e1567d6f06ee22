//! Legacy v4 block-header codec.
//!
//! Eight 32-bit words, no compression, events never span blocks:
//!
//! ```text
//! 0  block length in words, header included   4  reserved
//! 1  block number, 1-based                    5  bit info | version (= 4)
//! 2  header length in words (>= 8)            6  reserved
//! 3  event count                              7  magic 0xc0da0100
//! ```
//!
//! Bit-info word 5: bits 0–7 version, 8 has-dictionary, 9 is-last-block.

use crate::buffer::Endian;
use crate::error::{EvioError, Result};
use crate::header::{detect_order, BLOCK_HEADER_BYTES, BLOCK_HEADER_WORDS, MAGIC};

/// Format version of the legacy block structure.
pub const BLOCK_VERSION: u32 = 4;

const DICTIONARY_BIT: u32 = 1 << 8;
const LAST_BLOCK_BIT: u32 = 1 << 9;

/// Decoded v4 block header.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// Total block length in words, header included.
    pub block_length_words: u32,
    pub block_number: u32,
    pub header_length_words: u32,
    pub event_count: u32,
    pub version: u32,
    pub has_dictionary: bool,
    pub is_last_block: bool,
    pub byte_order: Endian,
}

impl BlockHeader {
    pub fn new(byte_order: Endian) -> BlockHeader {
        BlockHeader {
            block_length_words: BLOCK_HEADER_WORDS as u32,
            block_number: 1,
            header_length_words: BLOCK_HEADER_WORDS as u32,
            event_count: 0,
            version: BLOCK_VERSION,
            has_dictionary: false,
            is_last_block: false,
            byte_order,
        }
    }

    /// Payload length in bytes (block minus header).
    #[inline]
    pub fn payload_bytes(&self) -> usize {
        (self.block_length_words - self.header_length_words) as usize * 4
    }

    pub fn bit_info(&self) -> u32 {
        let mut word = self.version & 0xff;
        if self.has_dictionary {
            word |= DICTIONARY_BIT;
        }
        if self.is_last_block {
            word |= LAST_BLOCK_BIT;
        }
        word
    }

    /// Packs the header into the first [`BLOCK_HEADER_BYTES`] of `buf`.
    pub fn write(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < BLOCK_HEADER_BYTES {
            return Err(EvioError::OutOfBounds {
                offset: 0,
                length: BLOCK_HEADER_BYTES,
                limit: buf.len(),
            });
        }
        let o = self.byte_order;
        o.write_u32(&mut buf[0..], self.block_length_words);
        o.write_u32(&mut buf[4..], self.block_number);
        o.write_u32(
            &mut buf[8..],
            self.header_length_words.max(BLOCK_HEADER_WORDS as u32),
        );
        o.write_u32(&mut buf[12..], self.event_count);
        o.write_u32(&mut buf[16..], 0);
        o.write_u32(&mut buf[20..], self.bit_info());
        o.write_u32(&mut buf[24..], 0);
        o.write_u32(&mut buf[28..], MAGIC);
        Ok(())
    }

    /// Unpacks a block header, detecting byte order from the magic and
    /// requiring version 4 exactly.
    pub fn read(buf: &[u8], file_offset: u64) -> Result<BlockHeader> {
        if buf.len() < BLOCK_HEADER_BYTES {
            return Err(EvioError::truncated(file_offset, "incomplete block header"));
        }
        let o = detect_order(buf, file_offset)?;
        let mut h = BlockHeader::new(o);
        h.block_length_words = o.read_u32(&buf[0..]);
        h.block_number = o.read_u32(&buf[4..]);
        h.header_length_words = o.read_u32(&buf[8..]);
        h.event_count = o.read_u32(&buf[12..]);
        let bits = o.read_u32(&buf[20..]);
        h.version = bits & 0xff;
        h.has_dictionary = bits & DICTIONARY_BIT != 0;
        h.is_last_block = bits & LAST_BLOCK_BIT != 0;

        if h.version < BLOCK_VERSION {
            return Err(EvioError::UnsupportedVersion { version: h.version });
        }
        if h.header_length_words < BLOCK_HEADER_WORDS as u32 {
            return Err(EvioError::bad_format(
                file_offset + 8,
                format!("impossible header length {} words", h.header_length_words),
            ));
        }
        if h.block_length_words < h.header_length_words {
            return Err(EvioError::bad_format(
                file_offset,
                "block length shorter than its header",
            ));
        }
        Ok(h)
    }
}

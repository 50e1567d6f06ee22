//! v6 record-header codec.
//!
//! Fourteen 32-bit words:
//!
//! ```text
//! 0  record length in words (compressed)      7  magic 0xc0da0100
//! 1  record number, 1-based                   8  uncompressed data length, bytes
//! 2  header length in words (>= 14)           9  compression type | compressed words
//! 3  event count                             10  user register 1, low word
//! 4  index array length, bytes               11  user register 1, high word
//! 5  bit info | version                      12  user register 2, low word
//! 6  user header length, bytes               13  user register 2, high word
//! ```
//!
//! Bit-info word 5: bits 0–7 version, 8 has-dictionary, 9 has-first-event,
//! 10 is-last-record, 20–21 user-header pad, 22–23 data pad, 24–25 codec
//! specific, 28–31 header type.

use crate::buffer::Endian;
use crate::compress::CompressionType;
use crate::error::{EvioError, Result};
use crate::header::{
    detect_order, HeaderType, EVIO_VERSION, MAGIC, RECORD_HEADER_BYTES, RECORD_HEADER_WORDS,
};

const DICTIONARY_BIT: u32 = 1 << 8;
const FIRST_EVENT_BIT: u32 = 1 << 9;
const LAST_RECORD_BIT: u32 = 1 << 10;

/// Decoded v6 record header.
#[derive(Debug, Clone)]
pub struct RecordHeader {
    /// Total record length in words, header plus (possibly compressed) tail.
    pub record_length_words: u32,
    /// Monotonic 1-based record number, assigned at write time.
    pub record_number: u32,
    /// Header length in words, at least [`RECORD_HEADER_WORDS`].
    pub header_length_words: u32,
    pub event_count: u32,
    pub index_length_bytes: u32,
    pub version: u32,
    pub has_dictionary: bool,
    pub has_first_event: bool,
    pub is_last_record: bool,
    pub user_header_pad: u32,
    pub data_pad: u32,
    pub header_type: HeaderType,
    pub user_header_length_bytes: u32,
    /// Uncompressed event-data length in bytes.
    pub uncompressed_data_length_bytes: u32,
    pub compression_type: CompressionType,
    /// Length of the compressed tail in words; 0 when uncompressed.
    pub compressed_data_length_words: u32,
    pub user_register1: u64,
    pub user_register2: u64,
    /// Byte order this header was read with, or will be written with.
    pub byte_order: Endian,
}

impl RecordHeader {
    /// A header with this crate's version, type `EvioRecord`, and all counts
    /// zeroed, ready for the record builder to fill.
    pub fn new(byte_order: Endian) -> RecordHeader {
        RecordHeader {
            record_length_words: RECORD_HEADER_WORDS as u32,
            record_number: 1,
            header_length_words: RECORD_HEADER_WORDS as u32,
            event_count: 0,
            index_length_bytes: 0,
            version: EVIO_VERSION,
            has_dictionary: false,
            has_first_event: false,
            is_last_record: false,
            user_header_pad: 0,
            data_pad: 0,
            header_type: HeaderType::EvioRecord,
            user_header_length_bytes: 0,
            uncompressed_data_length_bytes: 0,
            compression_type: CompressionType::None,
            compressed_data_length_words: 0,
            user_register1: 0,
            user_register2: 0,
            byte_order,
        }
    }

    // ── Derived quantities ────────────────────────────────────────────────

    /// Total record length in bytes.
    #[inline]
    pub fn record_length_bytes(&self) -> usize {
        self.record_length_words as usize * 4
    }

    /// Header length in bytes.
    #[inline]
    pub fn header_length_bytes(&self) -> usize {
        self.header_length_words as usize * 4
    }

    /// User-header length rounded up to the word boundary.
    #[inline]
    pub fn user_header_padded_bytes(&self) -> usize {
        let len = self.user_header_length_bytes as usize;
        len + crate::buffer::pad4(len)
    }

    /// Assembled bit-info word 5.
    pub fn bit_info(&self) -> u32 {
        let mut word = self.version & 0xff;
        if self.has_dictionary {
            word |= DICTIONARY_BIT;
        }
        if self.has_first_event {
            word |= FIRST_EVENT_BIT;
        }
        if self.is_last_record {
            word |= LAST_RECORD_BIT;
        }
        word |= (self.user_header_pad & 0x3) << 20;
        word |= (self.data_pad & 0x3) << 22;
        word |= self.header_type.code() << 28;
        word
    }

    fn apply_bit_info(&mut self, word: u32, file_offset: u64) -> Result<()> {
        self.version = word & 0xff;
        self.has_dictionary = word & DICTIONARY_BIT != 0;
        self.has_first_event = word & FIRST_EVENT_BIT != 0;
        self.is_last_record = word & LAST_RECORD_BIT != 0;
        self.user_header_pad = (word >> 20) & 0x3;
        self.data_pad = (word >> 22) & 0x3;
        self.header_type = HeaderType::from_code(word >> 28).ok_or_else(|| {
            EvioError::bad_format(
                file_offset + 20,
                format!("unknown header type {}", word >> 28),
            )
        })?;
        Ok(())
    }

    // ── Codec ─────────────────────────────────────────────────────────────

    /// Packs the header into the first [`RECORD_HEADER_BYTES`] of `buf` in
    /// this header's byte order. The header length is clamped up to 14 words.
    pub fn write(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < RECORD_HEADER_BYTES {
            return Err(EvioError::OutOfBounds {
                offset: 0,
                length: RECORD_HEADER_BYTES,
                limit: buf.len(),
            });
        }
        let o = self.byte_order;
        let header_words = self.header_length_words.max(RECORD_HEADER_WORDS as u32);
        o.write_u32(&mut buf[0..], self.record_length_words);
        o.write_u32(&mut buf[4..], self.record_number);
        o.write_u32(&mut buf[8..], header_words);
        o.write_u32(&mut buf[12..], self.event_count);
        o.write_u32(&mut buf[16..], self.index_length_bytes);
        o.write_u32(&mut buf[20..], self.bit_info());
        o.write_u32(&mut buf[24..], self.user_header_length_bytes);
        o.write_u32(&mut buf[28..], MAGIC);
        o.write_u32(&mut buf[32..], self.uncompressed_data_length_bytes);
        o.write_u32(
            &mut buf[36..],
            (self.compression_type.code() << 28) | (self.compressed_data_length_words & 0x0fff_ffff),
        );
        o.write_u64(&mut buf[40..], self.user_register1);
        o.write_u64(&mut buf[48..], self.user_register2);
        Ok(())
    }

    /// Unpacks a header from the start of `buf`, detecting byte order from
    /// the magic. `file_offset` locates `buf[0]` for error reporting.
    pub fn read(buf: &[u8], file_offset: u64) -> Result<RecordHeader> {
        if buf.len() < RECORD_HEADER_BYTES {
            return Err(EvioError::truncated(file_offset, "incomplete record header"));
        }
        let o = detect_order(buf, file_offset)?;
        let mut h = RecordHeader::new(o);
        h.record_length_words = o.read_u32(&buf[0..]);
        h.record_number = o.read_u32(&buf[4..]);
        h.header_length_words = o.read_u32(&buf[8..]);
        h.event_count = o.read_u32(&buf[12..]);
        h.index_length_bytes = o.read_u32(&buf[16..]);
        h.apply_bit_info(o.read_u32(&buf[20..]), file_offset)?;
        h.user_header_length_bytes = o.read_u32(&buf[24..]);
        h.uncompressed_data_length_bytes = o.read_u32(&buf[32..]);
        let word9 = o.read_u32(&buf[36..]);
        h.compression_type = CompressionType::from_code(word9 >> 28)
            .map_err(|_| EvioError::bad_format(file_offset + 36, "unknown compression type"))?;
        h.compressed_data_length_words = word9 & 0x0fff_ffff;
        h.user_register1 = o.read_u64(&buf[40..]);
        h.user_register2 = o.read_u64(&buf[48..]);

        if h.version < EVIO_VERSION {
            return Err(EvioError::UnsupportedVersion { version: h.version });
        }
        if h.header_length_words < RECORD_HEADER_WORDS as u32 {
            return Err(EvioError::bad_format(
                file_offset + 8,
                format!("impossible header length {} words", h.header_length_words),
            ));
        }
        if h.record_length_words < h.header_length_words {
            return Err(EvioError::bad_format(
                file_offset,
                "record length shorter than its header",
            ));
        }
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordHeader {
        let mut h = RecordHeader::new(Endian::Big);
        h.record_length_words = 100;
        h.record_number = 7;
        h.event_count = 12;
        h.index_length_bytes = 48;
        h.has_dictionary = true;
        h.is_last_record = true;
        h.user_header_pad = 2;
        h.data_pad = 1;
        h.user_header_length_bytes = 10;
        h.uncompressed_data_length_bytes = 320;
        h.compression_type = CompressionType::Lz4;
        h.compressed_data_length_words = 60;
        h.user_register1 = 0x0123_4567_89ab_cdef;
        h.user_register2 = u64::MAX;
        h
    }

    #[test]
    fn pack_unpack_round_trips_both_orders() {
        for order in [Endian::Big, Endian::Little] {
            let mut h = sample();
            h.byte_order = order;
            let mut buf = vec![0u8; RECORD_HEADER_BYTES];
            h.write(&mut buf).unwrap();

            let back = RecordHeader::read(&buf, 0).unwrap();
            assert_eq!(back.byte_order, order);
            assert_eq!(back.record_length_words, 100);
            assert_eq!(back.record_number, 7);
            assert_eq!(back.event_count, 12);
            assert_eq!(back.index_length_bytes, 48);
            assert!(back.has_dictionary);
            assert!(!back.has_first_event);
            assert!(back.is_last_record);
            assert_eq!(back.user_header_pad, 2);
            assert_eq!(back.data_pad, 1);
            assert_eq!(back.header_type, HeaderType::EvioRecord);
            assert_eq!(back.user_header_length_bytes, 10);
            assert_eq!(back.uncompressed_data_length_bytes, 320);
            assert_eq!(back.compression_type, CompressionType::Lz4);
            assert_eq!(back.compressed_data_length_words, 60);
            assert_eq!(back.user_register1, 0x0123_4567_89ab_cdef);
            assert_eq!(back.user_register2, u64::MAX);
        }
    }

    #[test]
    fn old_version_rejected() {
        let mut h = sample();
        h.version = 4;
        let mut buf = vec![0u8; RECORD_HEADER_BYTES];
        h.write(&mut buf).unwrap();
        assert!(matches!(
            RecordHeader::read(&buf, 0),
            Err(EvioError::UnsupportedVersion { version: 4 })
        ));
    }

    #[test]
    fn short_header_length_clamped_on_write() {
        let mut h = sample();
        h.header_length_words = 3;
        let mut buf = vec![0u8; RECORD_HEADER_BYTES];
        h.write(&mut buf).unwrap();
        assert_eq!(Endian::Big.read_u32(&buf[8..]), RECORD_HEADER_WORDS as u32);
    }

    #[test]
    fn garbage_magic_is_bad_format() {
        let buf = vec![0x55u8; RECORD_HEADER_BYTES];
        assert!(matches!(
            RecordHeader::read(&buf, 0),
            Err(EvioError::BadFormat { offset: 28, .. })
        ));
    }
}

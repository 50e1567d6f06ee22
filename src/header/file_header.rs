//! v6 file-header codec.
//!
//! Fourteen 32-bit words at offset 0 of every v6 file:
//!
//! ```text
//! 0  file magic "EVIO" or "HIPO"              7  magic 0xc0da0100
//! 1  file split number                        8  user register, low word
//! 2  header length in words (>= 14)           9  user register, high word
//! 3  record count                            10  trailer position, low word
//! 4  index array length, bytes               11  trailer position, high word
//! 5  bit info | version                      12  user integer 1
//! 6  user header length, bytes               13  user integer 2
//! ```
//!
//! Bit-info word 5: bits 0–7 version, 8 has-dictionary, 9 has-first-event,
//! 10 trailer-with-index, 28–31 header type (1 evio, 5 HIPO).

use crate::buffer::Endian;
use crate::error::{EvioError, Result};
use crate::header::{
    detect_order, HeaderType, EVIO_VERSION, FILE_HEADER_BYTES, FILE_HEADER_WORDS, FILE_MAGIC_EVIO,
    FILE_MAGIC_HIPO, MAGIC,
};

const DICTIONARY_BIT: u32 = 1 << 8;
const FIRST_EVENT_BIT: u32 = 1 << 9;
const TRAILER_WITH_INDEX_BIT: u32 = 1 << 10;

/// Decoded v6 file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Word 0: [`FILE_MAGIC_EVIO`] or [`FILE_MAGIC_HIPO`].
    pub file_magic: u32,
    /// Split number of this file, 0-based.
    pub split_number: u32,
    pub header_length_words: u32,
    pub record_count: u32,
    pub index_length_bytes: u32,
    pub version: u32,
    pub has_dictionary: bool,
    pub has_first_event: bool,
    pub has_trailer_with_index: bool,
    pub header_type: HeaderType,
    pub user_header_length_bytes: u32,
    pub user_register: u64,
    /// Byte offset of the trailer record; 0 until the file is finished.
    pub trailer_position: u64,
    pub user_int1: u32,
    pub user_int2: u32,
    pub byte_order: Endian,
}

impl FileHeader {
    pub fn new(byte_order: Endian) -> FileHeader {
        FileHeader {
            file_magic: FILE_MAGIC_EVIO,
            split_number: 0,
            header_length_words: FILE_HEADER_WORDS as u32,
            record_count: 0,
            index_length_bytes: 0,
            version: EVIO_VERSION,
            has_dictionary: false,
            has_first_event: false,
            has_trailer_with_index: false,
            header_type: HeaderType::EvioFile,
            user_header_length_bytes: 0,
            user_register: 0,
            trailer_position: 0,
            user_int1: 0,
            user_int2: 0,
            byte_order,
        }
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

    /// Byte offset of the first record: header + index + padded user header.
    #[inline]
    pub fn first_record_position(&self) -> u64 {
        self.header_length_bytes() as u64
            + self.index_length_bytes as u64
            + self.user_header_padded_bytes() as u64
    }

    pub fn bit_info(&self) -> u32 {
        let mut word = self.version & 0xff;
        if self.has_dictionary {
            word |= DICTIONARY_BIT;
        }
        if self.has_first_event {
            word |= FIRST_EVENT_BIT;
        }
        if self.has_trailer_with_index {
            word |= TRAILER_WITH_INDEX_BIT;
        }
        word |= self.header_type.code() << 28;
        word
    }

    /// Packs the header into the first [`FILE_HEADER_BYTES`] of `buf`.
    pub fn write(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < FILE_HEADER_BYTES {
            return Err(EvioError::OutOfBounds {
                offset: 0,
                length: FILE_HEADER_BYTES,
                limit: buf.len(),
            });
        }
        let o = self.byte_order;
        o.write_u32(&mut buf[0..], self.file_magic);
        o.write_u32(&mut buf[4..], self.split_number);
        o.write_u32(
            &mut buf[8..],
            self.header_length_words.max(FILE_HEADER_WORDS as u32),
        );
        o.write_u32(&mut buf[12..], self.record_count);
        o.write_u32(&mut buf[16..], self.index_length_bytes);
        o.write_u32(&mut buf[20..], self.bit_info());
        o.write_u32(&mut buf[24..], self.user_header_length_bytes);
        o.write_u32(&mut buf[28..], MAGIC);
        o.write_u64(&mut buf[32..], self.user_register);
        o.write_u64(&mut buf[40..], self.trailer_position);
        o.write_u32(&mut buf[48..], self.user_int1);
        o.write_u32(&mut buf[52..], self.user_int2);
        Ok(())
    }

    /// Unpacks a file header from the start of `buf`, detecting byte order
    /// from the magic and validating the file-magic word and version.
    pub fn read(buf: &[u8], file_offset: u64) -> Result<FileHeader> {
        if buf.len() < FILE_HEADER_BYTES {
            return Err(EvioError::truncated(file_offset, "incomplete file header"));
        }
        let o = detect_order(buf, file_offset)?;
        let mut h = FileHeader::new(o);
        h.file_magic = o.read_u32(&buf[0..]);
        if h.file_magic != FILE_MAGIC_EVIO && h.file_magic != FILE_MAGIC_HIPO {
            return Err(EvioError::bad_format(
                file_offset,
                format!("file magic {:#010x} is neither EVIO nor HIPO", h.file_magic),
            ));
        }
        h.split_number = o.read_u32(&buf[4..]);
        h.header_length_words = o.read_u32(&buf[8..]);
        h.record_count = o.read_u32(&buf[12..]);
        h.index_length_bytes = o.read_u32(&buf[16..]);

        let bits = o.read_u32(&buf[20..]);
        h.version = bits & 0xff;
        h.has_dictionary = bits & DICTIONARY_BIT != 0;
        h.has_first_event = bits & FIRST_EVENT_BIT != 0;
        h.has_trailer_with_index = bits & TRAILER_WITH_INDEX_BIT != 0;
        h.header_type = HeaderType::from_code(bits >> 28).ok_or_else(|| {
            EvioError::bad_format(file_offset + 20, format!("unknown header type {}", bits >> 28))
        })?;
        if !h.header_type.is_file() {
            return Err(EvioError::bad_format(
                file_offset + 20,
                "header type is not a file header",
            ));
        }

        h.user_header_length_bytes = o.read_u32(&buf[24..]);
        h.user_register = o.read_u64(&buf[32..]);
        h.trailer_position = o.read_u64(&buf[40..]);
        h.user_int1 = o.read_u32(&buf[48..]);
        h.user_int2 = o.read_u32(&buf[52..]);

        if h.version < EVIO_VERSION {
            return Err(EvioError::UnsupportedVersion { version: h.version });
        }
        if h.header_length_words < FILE_HEADER_WORDS as u32 {
            return Err(EvioError::bad_format(
                file_offset + 8,
                format!("impossible header length {} words", h.header_length_words),
            ));
        }
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_both_orders() {
        for order in [Endian::Big, Endian::Little] {
            let mut h = FileHeader::new(order);
            h.split_number = 3;
            h.record_count = 42;
            h.has_dictionary = true;
            h.has_trailer_with_index = true;
            h.user_register = 0xdead_beef_cafe_f00d;
            h.trailer_position = 1 << 33;
            h.user_int1 = 11;
            h.user_int2 = 22;

            let mut buf = vec![0u8; FILE_HEADER_BYTES];
            h.write(&mut buf).unwrap();
            let back = FileHeader::read(&buf, 0).unwrap();
            assert_eq!(back.byte_order, order);
            assert_eq!(back.split_number, 3);
            assert_eq!(back.record_count, 42);
            assert!(back.has_dictionary);
            assert!(!back.has_first_event);
            assert!(back.has_trailer_with_index);
            assert_eq!(back.user_register, 0xdead_beef_cafe_f00d);
            assert_eq!(back.trailer_position, 1 << 33);
            assert_eq!(back.user_int1, 11);
            assert_eq!(back.user_int2, 22);
            assert_eq!(back.header_type, HeaderType::EvioFile);
        }
    }

    #[test]
    fn hipo_magic_accepted() {
        let mut h = FileHeader::new(Endian::Little);
        h.file_magic = FILE_MAGIC_HIPO;
        h.header_type = HeaderType::HipoFile;
        let mut buf = vec![0u8; FILE_HEADER_BYTES];
        h.write(&mut buf).unwrap();
        let back = FileHeader::read(&buf, 0).unwrap();
        assert_eq!(back.file_magic, FILE_MAGIC_HIPO);
        assert_eq!(back.header_type, HeaderType::HipoFile);
    }

    #[test]
    fn wrong_file_magic_rejected() {
        let mut h = FileHeader::new(Endian::Big);
        h.file_magic = 0x12345678;
        let mut buf = vec![0u8; FILE_HEADER_BYTES];
        h.write(&mut buf).unwrap();
        assert!(matches!(
            FileHeader::read(&buf, 0),
            Err(EvioError::BadFormat { offset: 0, .. })
        ));
    }

    #[test]
    fn first_record_position_accounts_for_user_header_pad() {
        let mut h = FileHeader::new(Endian::Big);
        h.index_length_bytes = 16;
        h.user_header_length_bytes = 10;
        assert_eq!(h.first_record_position(), 56 + 16 + 12);
    }
}

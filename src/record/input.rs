//! Record parsing: header validation, tail decompression, event access.

use crate::buffer::Endian;
use crate::error::{EvioError, Result};
use crate::header::RecordHeader;
use crate::record::output::RecordOutput;
use crate::{compress, record};

/// A parsed record exposing its events, each as a byte slice.
///
/// The tail (index array, user header, event data) is owned uncompressed
/// storage, so event access never touches the codec again.
#[derive(Debug)]
pub struct RecordInput {
    header: RecordHeader,
    /// Uncompressed tail: `[index | user header (+pad) | event data]`.
    tail: Vec<u8>,
    /// Byte offset of the event-data region inside `tail`.
    data_start: usize,
    /// Per-event `(offset, length)` into `tail`, in record order.
    events: Vec<(usize, usize)>,
}

impl RecordInput {
    /// Parses a record starting at `buf[0]`. `file_offset` locates `buf[0]`
    /// in the enclosing file for error reporting.
    ///
    /// A magic word matching neither byte order is `BadMagic` here; callers
    /// scanning a larger container report it as `BadFormat` at the record's
    /// offset instead.
    pub fn parse(buf: &[u8], file_offset: u64) -> Result<RecordInput> {
        let magic_at = crate::header::MAGIC_WORD_INDEX * 4;
        if buf.len() >= magic_at + 4 {
            let word = &buf[magic_at..magic_at + 4];
            if Endian::Big.read_u32(word) != crate::header::MAGIC
                && Endian::Little.read_u32(word) != crate::header::MAGIC
            {
                return Err(EvioError::BadMagic {
                    offset: file_offset + magic_at as u64,
                    found: Endian::Big.read_u32(word),
                });
            }
        }
        let header = RecordHeader::read(buf, file_offset)?;
        let total = header.record_length_bytes();
        if buf.len() < total {
            return Err(EvioError::truncated(
                file_offset,
                format!("record wants {total} bytes, {} available", buf.len()),
            ));
        }

        let header_bytes = header.header_length_bytes();
        let tail_src = &buf[header_bytes..total];
        let uncompressed_tail_len = header.index_length_bytes as usize
            + header.user_header_padded_bytes()
            + header.uncompressed_data_length_bytes as usize;

        let tail = if header.compression_type.is_compressed() {
            let mut out = vec![0u8; uncompressed_tail_len];
            compress::decompress(
                header.compression_type,
                tail_src,
                uncompressed_tail_len,
                &mut out,
            )?;
            out
        } else {
            if tail_src.len() < uncompressed_tail_len {
                return Err(EvioError::truncated(
                    file_offset + header_bytes as u64,
                    "record tail shorter than its declared contents",
                ));
            }
            tail_src[..uncompressed_tail_len].to_vec()
        };

        // Split the index into event (offset, length) pairs. Trailers carry a
        // record index instead of an event index and declare zero events.
        let event_count = header.event_count as usize;
        let index_len = header.index_length_bytes as usize;
        if !header.header_type.is_trailer() && index_len < event_count * 4 {
            return Err(EvioError::bad_format(
                file_offset + 16,
                format!("index of {index_len} bytes cannot describe {event_count} events"),
            ));
        }

        let data_start = index_len + header.user_header_padded_bytes();
        let mut events = Vec::with_capacity(event_count);
        let mut cursor = data_start;
        for i in 0..event_count {
            let len = header.byte_order.read_u32(&tail[i * 4..]) as usize;
            if cursor + len > tail.len() {
                return Err(EvioError::bad_format(
                    file_offset,
                    format!("event {i} overruns the record payload"),
                ));
            }
            events.push((cursor, len));
            cursor += len;
        }

        Ok(RecordInput {
            header,
            tail,
            data_start,
            events,
        })
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    #[inline]
    pub fn byte_order(&self) -> Endian {
        self.header.byte_order
    }

    #[inline]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Uncompressed length in bytes of event `i`, padding included.
    pub fn event_bytes(&self, i: usize) -> Result<usize> {
        self.events
            .get(i)
            .map(|&(_, len)| len)
            .ok_or(EvioError::IndexOutOfRange {
                index: i,
                len: self.events.len(),
            })
    }

    /// Borrows event `i`.
    pub fn event_slice(&self, i: usize) -> Result<&[u8]> {
        let &(off, len) = self.events.get(i).ok_or(EvioError::IndexOutOfRange {
            index: i,
            len: self.events.len(),
        })?;
        Ok(&self.tail[off..off + len])
    }

    /// Copies event `i` into `dst`, returning the copied length.
    pub fn copy_event(&self, i: usize, dst: &mut [u8]) -> Result<usize> {
        let src = self.event_slice(i)?;
        if dst.len() < src.len() {
            return Err(EvioError::OutOfBounds {
                offset: 0,
                length: src.len(),
                limit: dst.len(),
            });
        }
        dst[..src.len()].copy_from_slice(src);
        Ok(src.len())
    }

    /// Borrows the user header, trimmed to its unpadded length.
    pub fn user_header_slice(&self) -> &[u8] {
        let start = self.header.index_length_bytes as usize;
        let len = self.header.user_header_length_bytes as usize;
        &self.tail[start..start + len]
    }

    /// Borrows the raw uncompressed tail (index, user header, events).
    pub fn tail_slice(&self) -> &[u8] {
        &self.tail
    }

    /// Borrows the event-data region.
    pub fn data_slice(&self) -> &[u8] {
        &self.tail[self.data_start..]
    }

    /// Reconstitutes an editable [`RecordOutput`] holding the same events in
    /// the same order, with this record's byte order and compression.
    pub fn to_record_output(&self) -> Result<RecordOutput> {
        let mut out = RecordOutput::with_limits(
            self.header.byte_order,
            self.header.compression_type,
            record::DEFAULT_MAX_EVENT_COUNT,
            record::DEFAULT_MAX_BUFFER_BYTES,
        );
        out.set_record_number(self.header.record_number);
        for i in 0..self.event_count() {
            // Reconstitution never splits: the soft budget grows if needed.
            let outcome = out.try_add_event(self.event_slice(i)?)?;
            if !outcome.is_accepted() {
                return Err(EvioError::InvalidState(format!(
                    "event {i} rejected while reconstituting a record"
                )));
            }
        }
        Ok(out)
    }
}

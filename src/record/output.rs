//! Record assembly: event aggregation, compression, and header generation.

use log::trace;

use crate::buffer::{pad4, Endian};
use crate::compress::{self, CompressionType};
use crate::error::{EvioError, Result};
use crate::header::{HeaderType, RecordHeader, RECORD_HEADER_BYTES};
use crate::record::{DEFAULT_MAX_BUFFER_BYTES, DEFAULT_MAX_EVENT_COUNT, MAX_EVENT_BYTES};

// ---------------------------------------------------------------------------
// Add outcome
// ---------------------------------------------------------------------------

/// Result of offering an event to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Accepted,
    Rejected(RejectReason),
}

/// Why an event was not accepted. The record should be built, written, and
/// reset; the retry is then guaranteed to succeed for any event within
/// [`MAX_EVENT_BYTES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Appending would exceed the byte budget.
    BufferFull,
    /// The record already holds the configured maximum number of events.
    EventCountFull,
}

impl AddOutcome {
    #[inline]
    pub fn is_accepted(self) -> bool {
        self == AddOutcome::Accepted
    }
}

// ---------------------------------------------------------------------------
// RecordOutput
// ---------------------------------------------------------------------------

/// Aggregates events into a record image.
///
/// Lifecycle: [`try_add_event`](RecordOutput::try_add_event) until rejected,
/// [`build`](RecordOutput::build) once, read the image via
/// [`as_bytes`](RecordOutput::as_bytes), then [`reset`](RecordOutput::reset)
/// to reuse the allocations for the next record.
#[derive(Debug, Clone)]
pub struct RecordOutput {
    byte_order: Endian,
    compression: CompressionType,
    max_event_count: usize,
    max_buffer_bytes: usize,

    /// Per-event uncompressed byte lengths, padding included, in add order.
    index: Vec<u32>,
    /// Event payloads concatenated, each padded to the word boundary.
    events: Vec<u8>,

    record_number: u32,
    has_dictionary: bool,
    has_first_event: bool,
    is_last_record: bool,

    /// Built record image; valid for `built_len` bytes once `is_built`.
    record_buf: Vec<u8>,
    built_len: usize,
    is_built: bool,
    built_header: Option<RecordHeader>,

    /// Compression scratch, reused across builds.
    scratch: Vec<u8>,
}

impl RecordOutput {
    pub fn new(byte_order: Endian, compression: CompressionType) -> RecordOutput {
        RecordOutput::with_limits(
            byte_order,
            compression,
            DEFAULT_MAX_EVENT_COUNT,
            DEFAULT_MAX_BUFFER_BYTES,
        )
    }

    /// A record with explicit soft limits. Limits are soft in exactly one
    /// case: the first event of an empty record is always accepted, growing
    /// the record, so that no event is ever split across records.
    pub fn with_limits(
        byte_order: Endian,
        compression: CompressionType,
        max_event_count: usize,
        max_buffer_bytes: usize,
    ) -> RecordOutput {
        RecordOutput {
            byte_order,
            compression,
            max_event_count: max_event_count.max(1),
            max_buffer_bytes,
            index: Vec::new(),
            events: Vec::new(),
            record_number: 1,
            has_dictionary: false,
            has_first_event: false,
            is_last_record: false,
            record_buf: Vec::new(),
            built_len: 0,
            is_built: false,
            built_header: None,
            scratch: Vec::new(),
        }
    }

    // ── Configuration and state queries ───────────────────────────────────

    #[inline]
    pub fn byte_order(&self) -> Endian {
        self.byte_order
    }

    #[inline]
    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    #[inline]
    pub fn event_count(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Uncompressed event bytes accumulated so far, padding included.
    #[inline]
    pub fn event_bytes(&self) -> usize {
        self.events.len()
    }

    /// Bytes the built record would occupy before compression.
    #[inline]
    pub fn uncompressed_record_bytes(&self) -> usize {
        RECORD_HEADER_BYTES + self.index.len() * 4 + self.events.len()
    }

    pub fn set_record_number(&mut self, n: u32) {
        self.record_number = n;
    }

    pub fn set_is_last_record(&mut self, last: bool) {
        self.is_last_record = last;
    }

    /// Marks the user header passed to [`build`](RecordOutput::build) as
    /// carrying a dictionary and/or a first event.
    pub fn set_user_header_bits(&mut self, dictionary: bool, first_event: bool) {
        self.has_dictionary = dictionary;
        self.has_first_event = first_event;
    }

    // ── Event intake ──────────────────────────────────────────────────────

    /// Offers one event. Accepts when, after the append, the event bytes plus
    /// index plus header stay within the byte budget and the event count stays
    /// under its cap. The first event of an empty record is always accepted.
    ///
    /// Fails only for events beyond [`MAX_EVENT_BYTES`] or after `build`.
    pub fn try_add_event(&mut self, event: &[u8]) -> Result<AddOutcome> {
        if self.is_built {
            return Err(EvioError::InvalidState(
                "record already built; reset before adding events".into(),
            ));
        }
        if event.len() > MAX_EVENT_BYTES {
            return Err(EvioError::InvalidState(format!(
                "event of {} bytes exceeds the {} byte hard limit",
                event.len(),
                MAX_EVENT_BYTES
            )));
        }

        let padded = event.len() + pad4(event.len());
        if !self.index.is_empty() {
            if self.index.len() >= self.max_event_count {
                return Ok(AddOutcome::Rejected(RejectReason::EventCountFull));
            }
            let after = self.events.len() + padded + (self.index.len() + 1) * 4
                + RECORD_HEADER_BYTES;
            if after > self.max_buffer_bytes {
                return Ok(AddOutcome::Rejected(RejectReason::BufferFull));
            }
        }

        self.events.extend_from_slice(event);
        self.events.resize(self.events.len() + pad4(event.len()), 0);
        self.index.push(padded as u32);
        Ok(AddOutcome::Accepted)
    }

    // ── Build ─────────────────────────────────────────────────────────────

    /// Assembles `[header | index | user header (+pad) | events]`, compressing
    /// everything after the header when a codec is configured, and writes the
    /// header with final lengths and pad bits. The record is immutable until
    /// [`reset`](RecordOutput::reset).
    pub fn build(&mut self, user_header: Option<&[u8]>) -> Result<()> {
        if self.is_built {
            return Err(EvioError::InvalidState("record already built".into()));
        }

        let user_header = user_header.unwrap_or(&[]);
        let index_len = self.index.len() * 4;
        let uh_pad = pad4(user_header.len());
        let tail_len = index_len + user_header.len() + uh_pad + self.events.len();

        // Lay the uncompressed tail into scratch.
        self.scratch.clear();
        self.scratch.reserve(tail_len);
        for len in &self.index {
            let mut word = [0u8; 4];
            self.byte_order.write_u32(&mut word, *len);
            self.scratch.extend_from_slice(&word);
        }
        self.scratch.extend_from_slice(user_header);
        self.scratch.resize(index_len + user_header.len() + uh_pad, 0);
        self.scratch.extend_from_slice(&self.events);

        let mut header = RecordHeader::new(self.byte_order);
        header.record_number = self.record_number;
        header.event_count = self.index.len() as u32;
        header.index_length_bytes = index_len as u32;
        header.user_header_length_bytes = user_header.len() as u32;
        header.user_header_pad = uh_pad as u32;
        header.uncompressed_data_length_bytes = self.events.len() as u32;
        header.has_dictionary = self.has_dictionary;
        header.has_first_event = self.has_first_event;
        header.is_last_record = self.is_last_record;
        header.compression_type = self.compression;
        header.header_type = HeaderType::EvioRecord;

        if self.compression.is_compressed() {
            let bound = compress::max_compressed_len(self.compression, tail_len);
            self.record_buf.clear();
            self.record_buf.resize(RECORD_HEADER_BYTES + bound + 4, 0);
            let compressed_len = compress::compress(
                self.compression,
                &self.scratch,
                &mut self.record_buf[RECORD_HEADER_BYTES..],
            )?;
            // Zero-pad the compressed blob to the word boundary; the pad is
            // part of the record length but not of the compressed length.
            let padded = compressed_len + pad4(compressed_len);
            for b in
                &mut self.record_buf[RECORD_HEADER_BYTES + compressed_len..RECORD_HEADER_BYTES + padded]
            {
                *b = 0;
            }
            header.compressed_data_length_words = (padded / 4) as u32;
            header.record_length_words = ((RECORD_HEADER_BYTES + padded) / 4) as u32;
            self.built_len = RECORD_HEADER_BYTES + padded;
            trace!(
                "record {}: {} events, {} -> {} bytes ({:?})",
                self.record_number,
                self.index.len(),
                tail_len,
                compressed_len,
                self.compression
            );
        } else {
            self.record_buf.clear();
            self.record_buf.resize(RECORD_HEADER_BYTES + tail_len, 0);
            self.record_buf[RECORD_HEADER_BYTES..].copy_from_slice(&self.scratch);
            header.compressed_data_length_words = 0;
            header.record_length_words = ((RECORD_HEADER_BYTES + tail_len) / 4) as u32;
            self.built_len = RECORD_HEADER_BYTES + tail_len;
        }

        header.write(&mut self.record_buf[..RECORD_HEADER_BYTES])?;
        self.built_header = Some(header);
        self.is_built = true;
        Ok(())
    }

    /// The built record image.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        if !self.is_built {
            return Err(EvioError::InvalidState("record not built".into()));
        }
        Ok(&self.record_buf[..self.built_len])
    }

    /// Header of the built record.
    pub fn header(&self) -> Result<&RecordHeader> {
        self.built_header
            .as_ref()
            .ok_or_else(|| EvioError::InvalidState("record not built".into()))
    }

    /// Rewrites the record number of a built record in place. Word 1 sits
    /// outside the compressed region, so this is a 4-byte patch.
    pub fn patch_record_number(&mut self, n: u32) -> Result<()> {
        if !self.is_built {
            return Err(EvioError::InvalidState("record not built".into()));
        }
        self.record_number = n;
        if let Some(h) = &mut self.built_header {
            h.record_number = n;
        }
        self.byte_order.write_u32(&mut self.record_buf[4..8], n);
        Ok(())
    }

    /// Clears events, index, flags, and build state; keeps allocations.
    pub fn reset(&mut self) {
        self.index.clear();
        self.events.clear();
        self.is_built = false;
        self.built_len = 0;
        self.built_header = None;
        self.has_dictionary = false;
        self.has_first_event = false;
        self.is_last_record = false;
    }
}

//! File reader for v6 record files and legacy v4 block files.
//!
//! Opening classifies the file by its first header words, then builds a
//! record index. For v6 the index comes from the trailer when the file header
//! announces one, else from the file header's own index, else from a linear
//! header scan; the fallbacks are tried in that order. v4 files are always
//! scanned, block by block. Records are loaded lazily and cached one at a
//! time, so random event access is O(1) once the index exists.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::buffer::Endian;
use crate::error::{EvioError, Result};
use crate::header::{
    BlockHeader, FileHeader, RecordHeader, BLOCK_HEADER_BYTES, FILE_HEADER_BYTES,
    RECORD_HEADER_BYTES,
};
use crate::record::RecordInput;

// ---------------------------------------------------------------------------
// Index entries
// ---------------------------------------------------------------------------

/// Position of one record (v6) or block (v4) within the file.
#[derive(Debug, Clone, Copy)]
struct RecordPos {
    offset: u64,
    length_bytes: u64,
    event_count: u32,
}

/// A record loaded into memory with its events split out.
#[derive(Debug)]
pub enum LoadedRecord {
    /// A parsed v6 record.
    Record(RecordInput),
    /// A v4 block payload with `(offset, length)` event extents.
    Block {
        data: Vec<u8>,
        events: Vec<(usize, usize)>,
    },
}

impl LoadedRecord {
    pub fn event_count(&self) -> usize {
        match self {
            LoadedRecord::Record(r) => r.event_count(),
            LoadedRecord::Block { events, .. } => events.len(),
        }
    }

    pub fn event_slice(&self, i: usize) -> Result<&[u8]> {
        match self {
            LoadedRecord::Record(r) => r.event_slice(i),
            LoadedRecord::Block { data, events } => {
                let &(off, len) = events.get(i).ok_or(EvioError::IndexOutOfRange {
                    index: i,
                    len: events.len(),
                })?;
                Ok(&data[off..off + len])
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Random- and sequential-access reader over one evio file.
///
/// Immutable after construction apart from the record cache and the
/// sequential cursor. Concurrent readers each open their own handle.
pub struct EvioReader {
    file: File,
    path: PathBuf,
    file_len: u64,
    version: u32,
    byte_order: Endian,
    file_header: Option<FileHeader>,
    records: Vec<RecordPos>,
    /// Running event totals; `cumulative[i]` = events before record `i`.
    cumulative: Vec<u64>,
    total_events: u64,
    dictionary: Option<String>,
    first_event: Option<Vec<u8>>,
    /// v4 only: the first block opens with a dictionary structure.
    v4_dictionary_in_first_block: bool,
    cache: Option<(usize, LoadedRecord)>,
    cursor: (usize, usize),
}

impl EvioReader {
    /// Opens `path`, classifies it as v4 or v6, and builds the record index.
    pub fn open(path: impl AsRef<Path>) -> Result<EvioReader> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let mut probe = vec![0u8; BLOCK_HEADER_BYTES];
        file.read_exact(&mut probe)
            .map_err(|_| EvioError::truncated(0, "file shorter than any evio header"))?;
        let order = crate::header::detect_order(&probe, 0)?;
        let version = order.read_u32(&probe[20..]) & 0xff;

        let mut reader = EvioReader {
            file,
            path,
            file_len,
            version,
            byte_order: order,
            file_header: None,
            records: Vec::new(),
            cumulative: Vec::new(),
            total_events: 0,
            dictionary: None,
            first_event: None,
            v4_dictionary_in_first_block: false,
            cache: None,
            cursor: (0, 0),
        };

        match version {
            4 => reader.scan_v4()?,
            v if v >= 6 => reader.open_v6()?,
            v => return Err(EvioError::UnsupportedVersion { version: v }),
        }

        reader.cumulative = Vec::with_capacity(reader.records.len());
        let mut running = 0u64;
        for r in &reader.records {
            reader.cumulative.push(running);
            running += r.event_count as u64;
        }
        reader.total_events = running;
        debug!(
            "opened {} (v{}, {:?}): {} records, {} events",
            reader.path.display(),
            reader.version,
            reader.byte_order,
            reader.records.len(),
            reader.total_events
        );
        Ok(reader)
    }

    // ── Queries ───────────────────────────────────────────────────────────

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    pub fn byte_order(&self) -> Endian {
        self.byte_order
    }

    #[inline]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn event_count(&self) -> u64 {
        self.total_events
    }

    pub fn file_header(&self) -> Option<&FileHeader> {
        self.file_header.as_ref()
    }

    pub fn dictionary_xml(&self) -> Option<&str> {
        self.dictionary.as_deref()
    }

    pub fn first_event(&self) -> Option<&[u8]> {
        self.first_event.as_deref()
    }

    // ── Event access ──────────────────────────────────────────────────────

    /// Loads record `i` into the cache and returns it.
    pub fn load_record(&mut self, i: usize) -> Result<&LoadedRecord> {
        if self.cache.as_ref().map(|(idx, _)| *idx) != Some(i) {
            let pos = *self.records.get(i).ok_or(EvioError::IndexOutOfRange {
                index: i,
                len: self.records.len(),
            })?;
            let loaded = if self.version >= 6 {
                let bytes = self.read_at(pos.offset, pos.length_bytes as usize)?;
                // A bad header mid-file is a format error at the record's
                // offset, whatever the codec-level failure was.
                let parsed = RecordInput::parse(&bytes, pos.offset).map_err(|e| match e {
                    EvioError::BadMagic { found, .. } => EvioError::bad_format(
                        pos.offset,
                        format!("record header magic {found:#010x} matches neither byte order"),
                    ),
                    other => other,
                })?;
                LoadedRecord::Record(parsed)
            } else {
                self.load_block(i, pos)?
            };
            self.cache = Some((i, loaded));
        }
        Ok(&self.cache.as_ref().unwrap().1)
    }

    /// Copies out event `global_index` across all records.
    pub fn event(&mut self, global_index: u64) -> Result<Vec<u8>> {
        if global_index >= self.total_events {
            return Err(EvioError::IndexOutOfRange {
                index: global_index as usize,
                len: self.total_events as usize,
            });
        }
        // Rightmost record whose running total is <= the target.
        let rec_idx = match self
            .cumulative
            .binary_search_by(|start| start.cmp(&global_index))
        {
            Ok(mut i) => {
                // Skip empty records sharing the same running total.
                while self.records[i].event_count == 0 {
                    i += 1;
                }
                i
            }
            Err(i) => i - 1,
        };
        let inner = (global_index - self.cumulative[rec_idx]) as usize;
        let record = self.load_record(rec_idx)?;
        Ok(record.event_slice(inner)?.to_vec())
    }

    /// Returns the next event in file order, or `None` at the end.
    pub fn next_event(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let (rec_idx, ev_idx) = self.cursor;
            if rec_idx >= self.records.len() {
                return Ok(None);
            }
            if ev_idx >= self.records[rec_idx].event_count as usize {
                self.cursor = (rec_idx + 1, 0);
                continue;
            }
            self.cursor = (rec_idx, ev_idx + 1);
            let record = self.load_record(rec_idx)?;
            return Ok(Some(record.event_slice(ev_idx)?.to_vec()));
        }
    }

    /// Resets the sequential cursor to the first event.
    pub fn rewind(&mut self) {
        self.cursor = (0, 0);
    }

    // ── v6 ────────────────────────────────────────────────────────────────

    fn open_v6(&mut self) -> Result<()> {
        let header_bytes = self.read_at(0, FILE_HEADER_BYTES)?;
        let fh = FileHeader::read(&header_bytes, 0)?;
        self.byte_order = fh.byte_order;
        let first_record = fh.first_record_position();

        // Trailer index, then file-header index, then linear scan.
        let mut indexed = false;
        if fh.has_trailer_with_index && fh.trailer_position > 0 {
            match self.read_trailer_index(&fh, first_record) {
                Ok(records) => {
                    self.records = records;
                    indexed = true;
                }
                Err(e) => warn!(
                    "{}: trailer index unusable ({e}); falling back",
                    self.path.display()
                ),
            }
        }
        if !indexed && fh.index_length_bytes > 0 {
            match self.read_header_index(&fh, first_record) {
                Ok(records) => {
                    self.records = records;
                    indexed = true;
                }
                Err(e) => warn!(
                    "{}: file-header index unusable ({e}); falling back",
                    self.path.display()
                ),
            }
        }
        if !indexed {
            self.records = self.scan_v6_records(first_record)?;
        }

        self.file_header = Some(fh.clone());
        if fh.has_dictionary || fh.has_first_event {
            self.read_common_data(&fh)?;
        }
        Ok(())
    }

    /// Parses `(record_length_words, event_count)` pairs into positions.
    fn pairs_to_positions(
        &self,
        pairs: &[u8],
        order: Endian,
        first_record: u64,
    ) -> Vec<RecordPos> {
        let mut records = Vec::with_capacity(pairs.len() / 8);
        let mut offset = first_record;
        for pair in pairs.chunks_exact(8) {
            let length_bytes = order.read_u32(&pair[0..]) as u64 * 4;
            let event_count = order.read_u32(&pair[4..]);
            records.push(RecordPos {
                offset,
                length_bytes,
                event_count,
            });
            offset += length_bytes;
        }
        records
    }

    fn read_trailer_index(&mut self, fh: &FileHeader, first_record: u64) -> Result<Vec<RecordPos>> {
        let header_bytes = self.read_at(fh.trailer_position, RECORD_HEADER_BYTES)?;
        let trailer = RecordHeader::read(&header_bytes, fh.trailer_position)?;
        if !trailer.header_type.is_trailer() {
            return Err(EvioError::bad_format(
                fh.trailer_position,
                "trailer position does not hold a trailer record",
            ));
        }
        let index = self.read_at(
            fh.trailer_position + trailer.header_length_bytes() as u64,
            trailer.index_length_bytes as usize,
        )?;
        Ok(self.pairs_to_positions(&index, trailer.byte_order, first_record))
    }

    fn read_header_index(&mut self, fh: &FileHeader, first_record: u64) -> Result<Vec<RecordPos>> {
        let index = self.read_at(
            fh.header_length_bytes() as u64,
            fh.index_length_bytes as usize,
        )?;
        Ok(self.pairs_to_positions(&index, fh.byte_order, first_record))
    }

    /// Forward scan reading one record header at a time.
    fn scan_v6_records(&mut self, first_record: u64) -> Result<Vec<RecordPos>> {
        let mut records = Vec::new();
        let mut offset = first_record;
        while offset + RECORD_HEADER_BYTES as u64 <= self.file_len {
            let header_bytes = self.read_at(offset, RECORD_HEADER_BYTES)?;
            let header = RecordHeader::read(&header_bytes, offset)?;
            if header.header_type.is_trailer() {
                break;
            }
            records.push(RecordPos {
                offset,
                length_bytes: header.record_length_bytes() as u64,
                event_count: header.event_count,
            });
            offset += header.record_length_bytes() as u64;
            if header.is_last_record {
                break;
            }
        }
        Ok(records)
    }

    /// Splits the first record's user header into dictionary and first event.
    fn read_common_data(&mut self, fh: &FileHeader) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        let order = self.byte_order;
        let user: Vec<u8> = match self.load_record(0)? {
            LoadedRecord::Record(r) => r.user_header_slice().to_vec(),
            LoadedRecord::Block { .. } => unreachable!("v6 path loads records"),
        };

        fn take(user: &[u8], pos: &mut usize, order: Endian, what: &str) -> Result<Vec<u8>> {
            if *pos + 4 > user.len() {
                return Err(EvioError::bad_format(
                    0,
                    format!("user header ends before its {what} length"),
                ));
            }
            let len = order.read_u32(&user[*pos..]) as usize;
            *pos += 4;
            if *pos + len > user.len() {
                return Err(EvioError::bad_format(
                    0,
                    format!("user header ends inside its {what}"),
                ));
            }
            let blob = user[*pos..*pos + len].to_vec();
            *pos += len;
            Ok(blob)
        }

        let mut pos = 0usize;
        if fh.has_dictionary {
            let blob = take(&user, &mut pos, order, "dictionary")?;
            self.dictionary = Some(String::from_utf8_lossy(&blob).into_owned());
        }
        if fh.has_first_event {
            self.first_event = Some(take(&user, &mut pos, order, "first event")?);
        }
        Ok(())
    }

    // ── v4 ────────────────────────────────────────────────────────────────

    fn scan_v4(&mut self) -> Result<()> {
        let mut offset = 0u64;
        let mut records = Vec::new();
        let mut first = true;
        loop {
            if offset + BLOCK_HEADER_BYTES as u64 > self.file_len {
                break;
            }
            let header_bytes = self.read_at(offset, BLOCK_HEADER_BYTES)?;
            let header = BlockHeader::read(&header_bytes, offset)?;
            let length_bytes = header.block_length_words as u64 * 4;
            if offset + length_bytes > self.file_len {
                return Err(EvioError::truncated(
                    offset,
                    "block extends past end of file",
                ));
            }
            if first {
                self.v4_dictionary_in_first_block = header.has_dictionary;
                first = false;
            }
            if header.event_count > 0 || header.has_dictionary {
                records.push(RecordPos {
                    offset,
                    length_bytes,
                    event_count: header.event_count,
                });
            }
            offset += length_bytes;
            if header.is_last_block {
                break;
            }
        }
        self.records = records;
        if self.v4_dictionary_in_first_block && !self.records.is_empty() {
            let pos = self.records[0];
            if let LoadedRecord::Block { data, events } = self.load_block(0, pos)? {
                // The dictionary structure sits before the first event.
                if let Some(&(off, _)) = events.first() {
                    let dict_bytes = &data[..off];
                    if let Ok(tree) = crate::event::EventTree::parse(dict_bytes, self.byte_order) {
                        if let crate::event::LeafData::Strings(s) = tree.leaf_data(tree.root()) {
                            self.dictionary = s.first().cloned();
                        }
                    }
                } else if let Ok(tree) = crate::event::EventTree::parse(&data, self.byte_order) {
                    if let crate::event::LeafData::Strings(s) = tree.leaf_data(tree.root()) {
                        self.dictionary = s.first().cloned();
                    }
                }
            }
        }
        Ok(())
    }

    /// Loads a v4 block and splits its payload into events by bank lengths.
    fn load_block(&mut self, index: usize, pos: RecordPos) -> Result<LoadedRecord> {
        let data = self.read_at(
            pos.offset + BLOCK_HEADER_BYTES as u64,
            pos.length_bytes as usize - BLOCK_HEADER_BYTES,
        )?;
        let mut events = Vec::with_capacity(pos.event_count as usize);
        let mut cursor = 0usize;

        // Block 0 may lead with a dictionary structure, excluded from the
        // event count.
        let lead_structures = if index == 0 && self.v4_dictionary_in_first_block {
            pos.event_count as usize + 1
        } else {
            pos.event_count as usize
        };
        for i in 0..lead_structures {
            if cursor + 4 > data.len() {
                return Err(EvioError::bad_format(
                    pos.offset + BLOCK_HEADER_BYTES as u64 + cursor as u64,
                    "block payload ends before its declared events",
                ));
            }
            let words = self.byte_order.read_u32(&data[cursor..]) as usize + 1;
            let len = words * 4;
            if cursor + len > data.len() {
                return Err(EvioError::bad_format(
                    pos.offset + BLOCK_HEADER_BYTES as u64 + cursor as u64,
                    format!("event of {len} bytes overruns its block"),
                ));
            }
            let is_dictionary =
                i == 0 && index == 0 && self.v4_dictionary_in_first_block;
            if !is_dictionary {
                events.push((cursor, len));
            }
            cursor += len;
        }
        Ok(LoadedRecord::Block { data, events })
    }

    // ── I/O ───────────────────────────────────────────────────────────────

    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        if offset + len as u64 > self.file_len {
            return Err(EvioError::truncated(
                offset,
                format!("{len} bytes requested past end of file"),
            ));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

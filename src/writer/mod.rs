//! Event writers: record composition, file splitting, trailers.
//!
//! [`EventWriter`] is the single-threaded v6 writer over a file or an owned
//! buffer. The file-management core ([`FileSink`]) — split rollover, trailer
//! and file-header patching, the dictionary/first-event prolog record — is
//! shared with the multi-threaded pipeline writer in [`crate::supply`].
//! [`v4::EventWriterV4`] emits legacy block files.

pub mod v4;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use log::{debug, info};

use crate::buffer::Endian;
use crate::compress::CompressionType;
use crate::error::{EvioError, Result};
use crate::event::EventTree;
use crate::filename::{generate_file_name, SplitContext};
use crate::header::{
    FileHeader, HeaderType, RecordHeader, FILE_HEADER_BYTES, RECORD_HEADER_BYTES,
    RECORD_HEADER_WORDS,
};
use crate::record::{RecordOutput, DEFAULT_MAX_BUFFER_BYTES, DEFAULT_MAX_EVENT_COUNT};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Writer configuration, shared by the single-threaded and pipeline writers.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub byte_order: Endian,
    pub compression: CompressionType,
    pub max_event_count: usize,
    pub max_buffer_bytes: usize,
    /// Split threshold in bytes; 0 disables splitting.
    pub split_bytes: u64,
    pub stream_id: u32,
    pub stream_count: u32,
    pub run_number: u32,
    pub run_type: String,
    /// File-name template; see [`crate::filename`].
    pub base_name: String,
    pub dictionary_xml: Option<String>,
    /// Event repeated as the first event of every split file.
    pub first_event: Option<Vec<u8>>,
    pub append: bool,
    /// Compression worker count for the pipeline writer (clamped to 1–64).
    pub workers: usize,
    /// Ring size for the pipeline writer; rounded up to a power of two.
    pub ring_size: usize,
}

impl Default for WriterOptions {
    fn default() -> WriterOptions {
        WriterOptions {
            byte_order: Endian::Big,
            compression: CompressionType::None,
            max_event_count: DEFAULT_MAX_EVENT_COUNT,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            split_bytes: 0,
            stream_id: 0,
            stream_count: 1,
            run_number: 1,
            run_type: String::new(),
            base_name: String::new(),
            dictionary_xml: None,
            first_event: None,
            append: false,
            workers: 1,
            ring_size: 32,
        }
    }
}

impl WriterOptions {
    pub fn new(base_name: impl Into<String>) -> WriterOptions {
        WriterOptions {
            base_name: base_name.into(),
            ..WriterOptions::default()
        }
    }

    pub fn byte_order(mut self, order: Endian) -> Self {
        self.byte_order = order;
        self
    }

    pub fn compression(mut self, kind: CompressionType) -> Self {
        self.compression = kind;
        self
    }

    pub fn record_limits(mut self, max_events: usize, max_bytes: usize) -> Self {
        self.max_event_count = max_events;
        self.max_buffer_bytes = max_bytes;
        self
    }

    pub fn split_bytes(mut self, bytes: u64) -> Self {
        self.split_bytes = bytes;
        self
    }

    pub fn stream(mut self, id: u32, count: u32) -> Self {
        self.stream_id = id;
        self.stream_count = count.max(1);
        self
    }

    pub fn run(mut self, number: u32, run_type: impl Into<String>) -> Self {
        self.run_number = number;
        self.run_type = run_type.into();
        self
    }

    pub fn dictionary(mut self, xml: impl Into<String>) -> Self {
        self.dictionary_xml = Some(xml.into());
        self
    }

    pub fn first_event(mut self, event: Vec<u8>) -> Self {
        self.first_event = Some(event);
        self
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n.clamp(1, 64);
        self
    }

    pub fn ring_size(mut self, n: usize) -> Self {
        self.ring_size = n.max(2).next_power_of_two();
        self
    }

    pub(crate) fn new_record(&self) -> RecordOutput {
        RecordOutput::with_limits(
            self.byte_order,
            self.compression,
            self.max_event_count,
            self.max_buffer_bytes,
        )
    }
}

/// `[dictionary | first event]`, each blob u32-length-prefixed.
pub(crate) fn encode_common_user_header(
    dictionary: Option<&str>,
    first_event: Option<&[u8]>,
    order: Endian,
) -> Vec<u8> {
    let mut out = Vec::new();
    let mut word = [0u8; 4];
    if let Some(d) = dictionary {
        order.write_u32(&mut word, d.len() as u32);
        out.extend_from_slice(&word);
        out.extend_from_slice(d.as_bytes());
    }
    if let Some(f) = first_event {
        order.write_u32(&mut word, f.len() as u32);
        out.extend_from_slice(&word);
        out.extend_from_slice(f);
    }
    out
}

// ---------------------------------------------------------------------------
// Output target
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Target {
    File(File),
    Buffer(Vec<u8>),
}

impl Target {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Target::File(f) => f.write_all(bytes)?,
            Target::Buffer(b) => b.extend_from_slice(bytes),
        }
        Ok(())
    }

    /// Overwrites `bytes` at `offset` without moving the append position.
    fn patch(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        match self {
            Target::File(f) => {
                let end = f.seek(SeekFrom::End(0))?;
                f.seek(SeekFrom::Start(offset))?;
                f.write_all(bytes)?;
                f.seek(SeekFrom::Start(end))?;
            }
            Target::Buffer(b) => {
                b[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
            }
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if let Target::File(f) = self {
            f.sync_data()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileSink — file management shared by both writers
// ---------------------------------------------------------------------------

/// Owns the output target and everything per-file: the file header, the
/// dictionary/first-event prolog record, record numbering, the trailer index,
/// and split rollover. Records arrive already built.
#[derive(Debug)]
pub(crate) struct FileSink {
    opts: WriterOptions,
    target: Target,
    is_file: bool,
    split_counter: u32,
    /// Bytes written to the current file.
    bytes_written: u64,
    /// `(record_length_words, event_count)` per record of the current file.
    record_index: Vec<(u32, u32)>,
    /// Records in the current file that are prolog, not data.
    prolog_records: usize,
    /// Next record number in the current file, 1-based.
    record_number: u32,
    /// Pre-built dictionary/first-event record, rewritten into every file.
    common: Option<RecordOutput>,
    current_path: Option<PathBuf>,
    paths: Vec<PathBuf>,
    total_events: u64,
    finished: bool,
}

impl FileSink {
    /// Creates a sink writing to files named from the options' template.
    pub(crate) fn create(opts: WriterOptions) -> Result<FileSink> {
        let common = FileSink::build_common(&opts)?;
        let mut sink = FileSink {
            opts,
            target: Target::Buffer(Vec::new()),
            is_file: true,
            split_counter: 0,
            bytes_written: 0,
            record_index: Vec::new(),
            prolog_records: 0,
            record_number: 1,
            common,
            current_path: None,
            paths: Vec::new(),
            total_events: 0,
            finished: false,
        };
        if sink.opts.append && sink.try_append()? {
            return Ok(sink);
        }
        sink.start_file()?;
        Ok(sink)
    }

    /// Creates a sink writing into an owned buffer. No splitting, no append.
    pub(crate) fn create_buffer(opts: WriterOptions) -> Result<FileSink> {
        let common = FileSink::build_common(&opts)?;
        let mut sink = FileSink {
            opts,
            target: Target::Buffer(Vec::new()),
            is_file: false,
            split_counter: 0,
            bytes_written: 0,
            record_index: Vec::new(),
            prolog_records: 0,
            record_number: 1,
            common,
            current_path: None,
            paths: Vec::new(),
            total_events: 0,
            finished: false,
        };
        sink.begin_output()?;
        Ok(sink)
    }

    fn build_common(opts: &WriterOptions) -> Result<Option<RecordOutput>> {
        if opts.dictionary_xml.is_none() && opts.first_event.is_none() {
            return Ok(None);
        }
        let mut record = opts.new_record();
        if let Some(fe) = &opts.first_event {
            let outcome = record.try_add_event(fe)?;
            if !outcome.is_accepted() {
                return Err(EvioError::InvalidState(
                    "first event rejected by an empty record".into(),
                ));
            }
        }
        record.set_user_header_bits(opts.dictionary_xml.is_some(), opts.first_event.is_some());
        let user = encode_common_user_header(
            opts.dictionary_xml.as_deref(),
            opts.first_event.as_deref(),
            opts.byte_order,
        );
        record.build(Some(&user))?;
        Ok(Some(record))
    }

    fn file_header_template(&self) -> FileHeader {
        let mut fh = FileHeader::new(self.opts.byte_order);
        fh.split_number = self.split_counter;
        fh.has_dictionary = self.opts.dictionary_xml.is_some();
        fh.has_first_event = self.opts.first_event.is_some();
        fh
    }

    /// Opens the next split file and writes its header and prolog record.
    fn start_file(&mut self) -> Result<()> {
        let ctx = SplitContext {
            run_number: self.opts.run_number,
            split_number: self.split_counter,
            stream_id: self.opts.stream_id,
            stream_count: self.opts.stream_count,
            run_type: self.opts.run_type.clone(),
        };
        let name = generate_file_name(&self.opts.base_name, &ctx, self.opts.split_bytes > 0)?;
        let path = PathBuf::from(name);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!("opened {} (split {})", path.display(), self.split_counter);
        self.target = Target::File(file);
        self.current_path = Some(path.clone());
        self.paths.push(path);
        self.begin_output()
    }

    /// Writes the file header and the prolog record to a fresh target.
    fn begin_output(&mut self) -> Result<()> {
        self.bytes_written = 0;
        self.record_index.clear();
        self.prolog_records = 0;
        self.record_number = 1;

        let fh = self.file_header_template();
        let mut header_bytes = vec![0u8; FILE_HEADER_BYTES];
        fh.write(&mut header_bytes)?;
        self.target.write_all(&header_bytes)?;
        self.bytes_written = FILE_HEADER_BYTES as u64;

        if let Some(common) = &mut self.common {
            common.patch_record_number(1)?;
            let bytes = common.as_bytes()?;
            let header = common.header()?;
            let entry = (header.record_length_words, header.event_count);
            let len = bytes.len() as u64;
            let bytes = bytes.to_vec();
            self.target.write_all(&bytes)?;
            self.bytes_written += len;
            self.record_index.push(entry);
            self.prolog_records = 1;
            self.record_number = 2;
        }
        Ok(())
    }

    /// Recovers state from an existing file; `false` when it does not exist.
    fn try_append(&mut self) -> Result<bool> {
        let ctx = SplitContext {
            run_number: self.opts.run_number,
            split_number: self.split_counter,
            stream_id: self.opts.stream_id,
            stream_count: self.opts.stream_count,
            run_type: self.opts.run_type.clone(),
        };
        let name = generate_file_name(&self.opts.base_name, &ctx, self.opts.split_bytes > 0)?;
        let path = PathBuf::from(&name);
        if !path.exists() {
            return Ok(false);
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();
        let mut header_bytes = vec![0u8; FILE_HEADER_BYTES];
        file.read_exact(&mut header_bytes)?;
        let fh = FileHeader::read(&header_bytes, 0)?;
        if fh.byte_order != self.opts.byte_order {
            return Err(EvioError::InvalidState(
                "append byte order differs from the existing file".into(),
            ));
        }

        // Scan records up to the trailer (or end of file).
        let mut offset = fh.first_record_position();
        let mut index = Vec::new();
        let mut events = 0u64;
        while offset + RECORD_HEADER_BYTES as u64 <= file_len {
            file.seek(SeekFrom::Start(offset))?;
            let mut rh_bytes = vec![0u8; RECORD_HEADER_BYTES];
            file.read_exact(&mut rh_bytes)?;
            let rh = RecordHeader::read(&rh_bytes, offset)?;
            if rh.header_type.is_trailer() {
                break;
            }
            index.push((rh.record_length_words, rh.event_count));
            events += rh.event_count as u64;
            offset += rh.record_length_bytes() as u64;
            if rh.is_last_record {
                break;
            }
        }

        file.set_len(offset)?;
        file.seek(SeekFrom::Start(offset))?;
        info!(
            "appending to {} after {} records ({} events)",
            path.display(),
            index.len(),
            events
        );

        self.split_counter = fh.split_number;
        self.prolog_records = usize::from(fh.has_dictionary || fh.has_first_event);
        self.record_number = index.len() as u32 + 1;
        self.record_index = index;
        self.bytes_written = offset;
        self.total_events = events;
        self.target = Target::File(file);
        self.current_path = Some(path.clone());
        self.paths.push(path);
        Ok(true)
    }

    /// Writes one built record, rolling to the next split file first when the
    /// threshold would be crossed. Splits never cut records.
    pub(crate) fn write_record(&mut self, record: &mut RecordOutput) -> Result<()> {
        if self.finished {
            return Err(EvioError::InvalidState("writer already closed".into()));
        }
        let size = record.as_bytes()?.len() as u64;
        let has_data_records = self.record_index.len() > self.prolog_records;
        if self.is_file
            && self.opts.split_bytes > 0
            && has_data_records
            && self.bytes_written + size >= self.opts.split_bytes
        {
            self.finish_file()?;
            self.split_counter += 1;
            self.start_file()?;
        }

        record.patch_record_number(self.record_number)?;
        self.record_number += 1;
        let header = record.header()?;
        let entry = (header.record_length_words, header.event_count);
        self.target.write_all(record.as_bytes()?)?;
        self.bytes_written += size;
        self.total_events += entry.1 as u64;
        self.record_index.push(entry);
        Ok(())
    }

    /// Writes the trailer and patches the file header of the current file.
    fn finish_file(&mut self) -> Result<()> {
        let order = self.opts.byte_order;
        let trailer_position = self.bytes_written;

        let mut trailer = RecordHeader::new(order);
        trailer.header_type = HeaderType::EvioTrailer;
        trailer.is_last_record = true;
        trailer.record_number = self.record_number;
        trailer.index_length_bytes = (self.record_index.len() * 8) as u32;
        trailer.record_length_words =
            (RECORD_HEADER_WORDS + self.record_index.len() * 2) as u32;

        let mut bytes = vec![0u8; trailer.record_length_bytes()];
        trailer.write(&mut bytes)?;
        let mut pos = RECORD_HEADER_BYTES;
        for &(len_words, event_count) in &self.record_index {
            order.write_u32(&mut bytes[pos..], len_words);
            order.write_u32(&mut bytes[pos + 4..], event_count);
            pos += 8;
        }
        self.target.write_all(&bytes)?;
        self.bytes_written += bytes.len() as u64;

        let mut fh = self.file_header_template();
        fh.record_count = self.record_index.len() as u32;
        fh.trailer_position = trailer_position;
        fh.has_trailer_with_index = true;
        let mut header_bytes = vec![0u8; FILE_HEADER_BYTES];
        fh.write(&mut header_bytes)?;
        self.target.patch(0, &header_bytes)?;
        self.target.sync()?;
        Ok(())
    }

    /// Finishes the current file; the sink accepts no further records.
    pub(crate) fn close(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finish_file()?;
        self.finished = true;
        info!(
            "closed {} file(s), {} events",
            self.paths.len().max(1),
            self.total_events
        );
        Ok(())
    }

    pub(crate) fn take_buffer(&mut self) -> Result<Vec<u8>> {
        if !self.finished {
            return Err(EvioError::InvalidState(
                "close the writer before taking its buffer".into(),
            ));
        }
        match &mut self.target {
            Target::Buffer(b) => Ok(std::mem::take(b)),
            Target::File(_) => Err(EvioError::InvalidState(
                "writer targets a file, not a buffer".into(),
            )),
        }
    }

    pub(crate) fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub(crate) fn sync(&mut self) -> Result<()> {
        self.target.sync()
    }
}

// ---------------------------------------------------------------------------
// EventWriter — single-threaded v6 writer
// ---------------------------------------------------------------------------

/// Single-threaded v6 writer: composes records in the calling thread and
/// writes them through a [`FileSink`].
pub struct EventWriter {
    sink: FileSink,
    record: RecordOutput,
    closed: bool,
}

impl EventWriter {
    /// Opens a file writer per the options.
    pub fn create(opts: WriterOptions) -> Result<EventWriter> {
        let record = opts.new_record();
        Ok(EventWriter {
            sink: FileSink::create(opts)?,
            record,
            closed: false,
        })
    }

    /// Opens a writer whose output accumulates in an owned buffer.
    pub fn to_buffer(opts: WriterOptions) -> Result<EventWriter> {
        let record = opts.new_record();
        Ok(EventWriter {
            sink: FileSink::create_buffer(opts)?,
            record,
            closed: false,
        })
    }

    /// Appends one pre-packed event. When the current record rejects it, the
    /// record is written out and the event retried on the fresh record, which
    /// cannot fail for events within the hard size limit.
    pub fn add_event(&mut self, event: &[u8]) -> Result<()> {
        if self.closed {
            return Err(EvioError::InvalidState("write after close".into()));
        }
        if self.record.try_add_event(event)?.is_accepted() {
            return Ok(());
        }
        self.flush()?;
        if !self.record.try_add_event(event)?.is_accepted() {
            return Err(EvioError::InvalidState(
                "event rejected by an empty record".into(),
            ));
        }
        Ok(())
    }

    /// Serializes and appends a structure tree.
    pub fn add_event_tree(&mut self, tree: &EventTree) -> Result<()> {
        let bytes = tree.to_bytes(self.record.byte_order())?;
        self.add_event(&bytes)
    }

    /// Builds and writes the current record, if it holds any events.
    pub fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(EvioError::InvalidState("flush after close".into()));
        }
        if self.record.is_empty() {
            return Ok(());
        }
        self.record.build(None)?;
        self.sink.write_record(&mut self.record)?;
        self.record.reset();
        Ok(())
    }

    /// Forces buffered records to disk and fsyncs.
    pub fn sync(&mut self) -> Result<()> {
        self.sink.sync()
    }

    /// Flushes the final record, writes the trailer, patches the file header.
    /// Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.sink.close()?;
        self.closed = true;
        Ok(())
    }

    /// Paths of all files written so far, in order.
    pub fn paths(&self) -> &[PathBuf] {
        self.sink.paths()
    }

    /// Takes the output of a buffer-target writer, closing it first.
    pub fn into_buffer(mut self) -> Result<Vec<u8>> {
        self.close()?;
        self.sink.take_buffer()
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::error!("close on drop failed: {e}");
            }
        }
    }
}

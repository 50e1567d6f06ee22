//! Legacy v4 block-file writer.
//!
//! Events accumulate into fixed-target blocks behind 8-word headers, with no
//! compression and no index. A dictionary, when configured, is written as the
//! leading structure of the first block (excluded from its event count) with
//! the dictionary bit set. Closing writes an empty block with the last-block
//! bit.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::buffer::Endian;
use crate::error::{EvioError, Result};
use crate::event::{EventTree, LeafData};
use crate::header::{BlockHeader, BLOCK_HEADER_BYTES};

/// Target block payload size; a block is flushed once it reaches this.
const TARGET_BLOCK_BYTES: usize = 256 * 1024;

/// Cap on events per block.
const MAX_EVENTS_PER_BLOCK: usize = 200;

/// Single-threaded legacy writer producing v4 block files.
pub struct EventWriterV4 {
    file: File,
    path: PathBuf,
    byte_order: Endian,
    /// Pending block payload (dictionary first, then events).
    payload: Vec<u8>,
    payload_events: usize,
    block_number: u32,
    dictionary_pending: bool,
    closed: bool,
}

impl EventWriterV4 {
    pub fn create(
        path: impl AsRef<Path>,
        byte_order: Endian,
        dictionary_xml: Option<&str>,
    ) -> Result<EventWriterV4> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let mut w = EventWriterV4 {
            file,
            path,
            byte_order,
            payload: Vec::new(),
            payload_events: 0,
            block_number: 1,
            dictionary_pending: false,
            closed: false,
        };
        if let Some(xml) = dictionary_xml {
            // The dictionary travels as a string bank ahead of the events.
            let bank = EventTree::leaf_bank(
                0xffff,
                0,
                LeafData::Strings(vec![xml.to_string()]),
            )?;
            w.payload.extend_from_slice(&bank.to_bytes(byte_order)?);
            w.dictionary_pending = true;
        }
        Ok(w)
    }

    /// Appends one pre-packed event; the event must be whole words.
    pub fn add_event(&mut self, event: &[u8]) -> Result<()> {
        if self.closed {
            return Err(EvioError::InvalidState("write after close".into()));
        }
        if event.len() % 4 != 0 {
            return Err(EvioError::InvalidState(
                "v4 events must be a whole number of words".into(),
            ));
        }
        self.payload.extend_from_slice(event);
        self.payload_events += 1;
        if self.payload.len() >= TARGET_BLOCK_BYTES || self.payload_events >= MAX_EVENTS_PER_BLOCK
        {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Serializes and appends a structure tree.
    pub fn add_event_tree(&mut self, tree: &EventTree) -> Result<()> {
        let bytes = tree.to_bytes(self.byte_order)?;
        self.add_event(&bytes)
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.payload.is_empty() {
            return Ok(());
        }
        let mut header = BlockHeader::new(self.byte_order);
        header.block_length_words = ((BLOCK_HEADER_BYTES + self.payload.len()) / 4) as u32;
        header.block_number = self.block_number;
        header.event_count = self.payload_events as u32;
        header.has_dictionary = self.dictionary_pending;

        let mut header_bytes = vec![0u8; BLOCK_HEADER_BYTES];
        header.write(&mut header_bytes)?;
        self.file.write_all(&header_bytes)?;
        self.file.write_all(&self.payload)?;
        debug!(
            "block {}: {} events, {} bytes",
            self.block_number,
            self.payload_events,
            self.payload.len()
        );

        self.block_number += 1;
        self.payload.clear();
        self.payload_events = 0;
        self.dictionary_pending = false;
        Ok(())
    }

    /// Flushes the pending block and writes the empty last block. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_block()?;

        let mut last = BlockHeader::new(self.byte_order);
        last.block_number = self.block_number;
        last.is_last_block = true;
        let mut header_bytes = vec![0u8; BLOCK_HEADER_BYTES];
        last.write(&mut header_bytes)?;
        self.file.write_all(&header_bytes)?;
        self.file.sync_data()?;
        self.closed = true;
        debug!("closed {}", self.path.display());
        Ok(())
    }
}

impl Drop for EventWriterV4 {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::error!("close on drop failed: {e}");
            }
        }
    }
}

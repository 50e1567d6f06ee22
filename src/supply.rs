//! Record supply ring and the multi-threaded writer pipeline.
//!
//! A bounded pool of reusable [`RecordOutput`] slots connects three roles:
//!
//! - the **producer** (caller thread) takes an empty slot with
//!   [`RecordSupply::next`], fills it, and hands it off with
//!   [`RecordSupply::publish`], which assigns the sequence number and routes
//!   the item to the worker owning `seq mod N`;
//! - **compression workers** (N lanes) build records in place and report each
//!   completion to the writer;
//! - the **writer** consumes completions strictly in sequence order, holding
//!   out-of-order arrivals in an ordered pending map, and returns each slot
//!   to the free pool after writing.
//!
//! Backpressure falls out of the channel shapes: the free channel is bounded
//! by the ring size (a full ring blocks the producer), worker lanes only ever
//! hold published items, and the writer blocks until the next in-order item
//! is built. [`RecordSupply::stop`] closes the lanes; everyone finishes what
//! they claimed and exits, and a producer call after stop returns
//! `Cancelled`. Slot buffers are reused across laps, so the steady state
//! allocates nothing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, trace};

use crate::error::{EvioError, Result};
use crate::record::RecordOutput;
use crate::writer::{EventWriter, FileSink, WriterOptions};

// ---------------------------------------------------------------------------
// Ring items
// ---------------------------------------------------------------------------

/// A claim on one ring slot. Whoever holds the item owns its record; handing
/// the item over (publish, complete, release) transfers that ownership.
pub struct RingItem {
    /// Sequence number; assigned at publish.
    seq: u64,
    slot: usize,
    slots: Arc<Vec<Mutex<RecordOutput>>>,
}

impl RingItem {
    /// Locks this item's record. Uncontended by protocol: each slot has one
    /// owner at any moment.
    pub fn record(&self) -> MutexGuard<'_, RecordOutput> {
        self.slots[self.slot].lock().expect("ring slot poisoned")
    }

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.seq
    }
}

/// Worker → writer completion report.
enum BuiltMsg {
    Done(RingItem),
    Failed(u64, EvioError),
}

// ---------------------------------------------------------------------------
// Supply construction
// ---------------------------------------------------------------------------

/// Producer-side handle of the ring.
pub struct RecordSupply {
    slots: Arc<Vec<Mutex<RecordOutput>>>,
    free_rx: Receiver<usize>,
    /// Slots taken with `next` but never published; reused first.
    spare: Vec<usize>,
    worker_txs: Option<Vec<Sender<RingItem>>>,
    built_tx: Option<Sender<BuiltMsg>>,
    next_seq: u64,
}

/// One compression lane; claim items, build them, mark them complete.
pub struct CompressorLane {
    rx: Receiver<RingItem>,
    built_tx: Sender<BuiltMsg>,
}

/// Writer-side handle; yields built items strictly in sequence order.
pub struct WriterLane {
    built_rx: Receiver<BuiltMsg>,
    free_tx: Sender<usize>,
    pending: BTreeMap<u64, RingItem>,
    failed: BTreeMap<u64, EvioError>,
    next_seq: u64,
}

impl RecordSupply {
    /// Builds a ring of `ring_size` slots (rounded up to a power of two) and
    /// `workers` compression lanes. Slot records take their byte order,
    /// compression, and limits from `opts`.
    pub fn new(
        ring_size: usize,
        workers: usize,
        opts: &WriterOptions,
    ) -> (RecordSupply, Vec<CompressorLane>, WriterLane) {
        let ring_size = ring_size.max(2).next_power_of_two();
        let workers = workers.clamp(1, 64);

        let slots: Arc<Vec<Mutex<RecordOutput>>> = Arc::new(
            (0..ring_size)
                .map(|_| Mutex::new(opts.new_record()))
                .collect(),
        );

        let (free_tx, free_rx) = bounded(ring_size);
        for slot in 0..ring_size {
            free_tx.send(slot).expect("fresh channel cannot be full");
        }

        let (built_tx, built_rx) = unbounded();
        let mut worker_txs = Vec::with_capacity(workers);
        let mut lanes = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (tx, rx) = unbounded();
            worker_txs.push(tx);
            lanes.push(CompressorLane {
                rx,
                built_tx: built_tx.clone(),
            });
        }

        let supply = RecordSupply {
            slots,
            free_rx,
            spare: Vec::new(),
            worker_txs: Some(worker_txs),
            built_tx: Some(built_tx),
            next_seq: 0,
        };
        let writer = WriterLane {
            built_rx,
            free_tx,
            pending: BTreeMap::new(),
            failed: BTreeMap::new(),
            next_seq: 0,
        };
        (supply, lanes, writer)
    }

    /// Claims the next empty slot, blocking while the ring is full. The
    /// returned record is reset and ready to fill.
    ///
    /// The free channel's only senders live in the writer lane, so a dead
    /// writer surfaces here as `Cancelled` instead of a silent hang.
    pub fn next(&mut self) -> Result<RingItem> {
        if self.worker_txs.is_none() {
            return Err(EvioError::Cancelled);
        }
        let slot = match self.spare.pop() {
            Some(slot) => slot,
            None => self.free_rx.recv().map_err(|_| EvioError::Cancelled)?,
        };
        let item = RingItem {
            seq: 0,
            slot,
            slots: Arc::clone(&self.slots),
        };
        item.record().reset();
        Ok(item)
    }

    /// Publishes a filled item: assigns its sequence number and routes it to
    /// the lane owning `seq mod N`.
    pub fn publish(&mut self, mut item: RingItem) -> Result<()> {
        let txs = self.worker_txs.as_ref().ok_or(EvioError::Cancelled)?;
        item.seq = self.next_seq;
        self.next_seq += 1;
        let lane = (item.seq % txs.len() as u64) as usize;
        trace!("published seq {} to lane {}", item.seq, lane);
        txs[lane].send(item).map_err(|_| EvioError::Cancelled)
    }

    /// Takes back an unpublished item for producer-side reuse.
    pub fn discard(&mut self, item: RingItem) {
        self.spare.push(item.slot);
    }

    /// Marks the supply drained. Lanes finish claimed items and exit; any
    /// later producer call returns `Cancelled`.
    pub fn stop(&mut self) {
        self.worker_txs = None;
        self.built_tx = None;
        debug!("record supply stopped after {} sequences", self.next_seq);
    }

    /// Sequences published so far.
    pub fn published(&self) -> u64 {
        self.next_seq
    }
}

impl CompressorLane {
    /// Claims the next item assigned to this lane; `None` once the supply is
    /// stopped and the lane drained.
    pub fn claim(&self) -> Option<RingItem> {
        self.rx.recv().ok()
    }

    /// Reports a claimed item built (or failed) to the writer.
    pub fn complete(&self, item: RingItem, result: Result<()>) {
        let msg = match result {
            Ok(()) => BuiltMsg::Done(item),
            Err(e) => BuiltMsg::Failed(item.seq, e),
        };
        let _ = self.built_tx.send(msg);
    }

    /// Runs the default build loop: claim, build in place, complete.
    pub fn run(self) {
        while let Some(item) = self.claim() {
            let result = item.record().build(None);
            let seq = item.seq;
            trace!("lane built seq {seq}");
            self.complete(item, result);
        }
    }
}

impl WriterLane {
    /// Yields the next item in strict sequence order, blocking until it has
    /// been built. Returns `None` once the supply is stopped and every
    /// published item has been yielded.
    pub fn next_in_order(&mut self) -> Option<Result<RingItem>> {
        loop {
            if let Some(e) = self.failed.remove(&self.next_seq) {
                self.next_seq += 1;
                return Some(Err(e));
            }
            if let Some(item) = self.pending.remove(&self.next_seq) {
                self.next_seq += 1;
                return Some(Ok(item));
            }
            match self.built_rx.recv() {
                Ok(BuiltMsg::Done(item)) => {
                    self.pending.insert(item.seq, item);
                }
                Ok(BuiltMsg::Failed(seq, e)) => {
                    self.failed.insert(seq, e);
                }
                // All lanes gone: nothing further can arrive.
                Err(_) => return None,
            }
        }
    }

    /// Returns a written item's slot to the free pool.
    pub fn release(&mut self, item: RingItem) {
        let _ = self.free_tx.send(item.slot);
    }
}

// ---------------------------------------------------------------------------
// EventWriterMt — pipeline writer
// ---------------------------------------------------------------------------

/// Multi-threaded v6 file writer: the caller packs events into ring records,
/// N workers compress them, and one writer thread appends them to the file in
/// published order, splitting files at the configured threshold.
///
/// On-disk record order always equals publish order, whatever the per-record
/// compression latency.
pub struct EventWriterMt {
    supply: RecordSupply,
    current: Option<RingItem>,
    workers: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<Result<FileSink>>>,
    closed: bool,
}

impl EventWriterMt {
    /// Opens the output file and starts the worker and writer threads.
    pub fn create(opts: WriterOptions) -> Result<EventWriterMt> {
        let sink = FileSink::create(opts.clone())?;
        let (supply, lanes, mut writer_lane) =
            RecordSupply::new(opts.ring_size, opts.workers, &opts);

        let workers = lanes
            .into_iter()
            .enumerate()
            .map(|(i, lane)| {
                std::thread::Builder::new()
                    .name(format!("evio-compress-{i}"))
                    .spawn(move || lane.run())
                    .expect("spawn compression worker")
            })
            .collect();

        let writer = std::thread::Builder::new()
            .name("evio-writer".into())
            .spawn(move || -> Result<FileSink> {
                let mut sink = sink;
                while let Some(next) = writer_lane.next_in_order() {
                    let item = next?;
                    {
                        let mut record = item.record();
                        sink.write_record(&mut record)?;
                    }
                    writer_lane.release(item);
                }
                Ok(sink)
            })
            .expect("spawn writer thread");

        Ok(EventWriterMt {
            supply,
            current: None,
            workers,
            writer: Some(writer),
            closed: false,
        })
    }

    /// Appends one pre-packed event, publishing the current record when full.
    pub fn add_event(&mut self, event: &[u8]) -> Result<()> {
        if self.closed {
            return Err(EvioError::InvalidState("write after close".into()));
        }
        if self.current.is_none() {
            self.current = Some(self.supply.next()?);
        }
        let accepted = {
            let item = self.current.as_ref().expect("claimed above");
            item.record().try_add_event(event)?.is_accepted()
        };
        if accepted {
            return Ok(());
        }

        let full = self.current.take().expect("claimed above");
        self.supply.publish(full)?;
        let item = self.supply.next()?;
        let accepted = item.record().try_add_event(event)?.is_accepted();
        if !accepted {
            return Err(EvioError::InvalidState(
                "event rejected by an empty record".into(),
            ));
        }
        self.current = Some(item);
        Ok(())
    }

    /// Publishes the current record even if below its soft limits.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(item) = self.current.take() {
            if item.record().is_empty() {
                self.supply.discard(item);
            } else {
                self.supply.publish(item)?;
            }
        }
        Ok(())
    }

    /// Graceful drain: publishes the partial record, waits for every claimed
    /// item, writes the trailer, and joins all threads. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.flush()?;
        self.supply.stop();

        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        let writer = self
            .writer
            .take()
            .expect("writer thread present until close");
        match writer.join() {
            Ok(Ok(mut sink)) => {
                sink.close()?;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EvioError::InvalidState(
                "writer thread panicked".into(),
            )),
        }
    }

    /// Discards pending items after a best-effort sync of written records.
    pub fn abort(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(item) = self.current.take() {
            self.supply.discard(item);
        }
        self.supply.stop();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        if let Some(writer) = self.writer.take() {
            if let Ok(Ok(mut sink)) = writer.join() {
                let _ = sink.sync();
            }
        }
    }
}

impl Drop for EventWriterMt {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::error!("close on drop failed: {e}");
            }
        }
    }
}

/// Picks the single- or multi-threaded writer from the options.
pub fn open_writer(opts: WriterOptions) -> Result<Writer> {
    if opts.workers > 1 {
        Ok(Writer::Pipelined(EventWriterMt::create(opts)?))
    } else {
        Ok(Writer::Single(EventWriter::create(opts)?))
    }
}

/// Either writer behind one add/close surface.
pub enum Writer {
    Single(EventWriter),
    Pipelined(EventWriterMt),
}

impl Writer {
    pub fn add_event(&mut self, event: &[u8]) -> Result<()> {
        match self {
            Writer::Single(w) => w.add_event(event),
            Writer::Pipelined(w) => w.add_event(event),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            Writer::Single(w) => w.close(),
            Writer::Pipelined(w) => w.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Endian;
    use crate::compress::CompressionType;
    use crate::reader::EvioReader;
    use tempfile::TempDir;

    fn opts(path: &std::path::Path) -> WriterOptions {
        WriterOptions::new(path.to_str().unwrap())
            .compression(CompressionType::Lz4)
            .workers(2)
            .ring_size(8)
    }

    #[test]
    fn supply_routes_by_residue_class() {
        let o = WriterOptions::new("");
        let (mut supply, lanes, _writer) = RecordSupply::new(4, 2, &o);
        for _ in 0..4 {
            let item = supply.next().unwrap();
            item.record().try_add_event(&[0, 0, 0, 1]).unwrap();
            supply.publish(item).unwrap();
        }
        // Lane r receives exactly the sequences with seq mod 2 == r.
        let seqs0: Vec<u64> = lanes[0].rx.try_iter().map(|i| i.seq).collect();
        let seqs1: Vec<u64> = lanes[1].rx.try_iter().map(|i| i.seq).collect();
        assert_eq!(seqs0, vec![0, 2]);
        assert_eq!(seqs1, vec![1, 3]);
    }

    #[test]
    fn producer_blocks_until_slots_return() {
        let o = WriterOptions::new("");
        let (mut supply, lanes, mut writer) = RecordSupply::new(2, 1, &o);
        let a = supply.next().unwrap();
        let b = supply.next().unwrap();
        supply.publish(a).unwrap();
        supply.publish(b).unwrap();
        assert!(supply.free_rx.is_empty());

        // Worker lane builds out of band; writer releases slots back.
        let item = lanes[0].claim().unwrap();
        lanes[0].complete(item, Ok(()));
        let item = writer.next_in_order().unwrap().unwrap();
        writer.release(item);
        assert!(supply.next().is_ok());
    }

    #[test]
    fn writer_sees_sequences_in_order_despite_latency_skew() {
        let o = WriterOptions::new("");
        let (mut supply, lanes, mut writer) = RecordSupply::new(32, 4, &o);

        let handles: Vec<_> = lanes
            .into_iter()
            .enumerate()
            .map(|(i, lane)| {
                std::thread::spawn(move || {
                    while let Some(item) = lane.claim() {
                        // Skew lanes heavily: lane 0 is slowest.
                        std::thread::sleep(std::time::Duration::from_micros(
                            ((4 - i) as u64) * 300,
                        ));
                        let r = item.record().build(None);
                        lane.complete(item, r);
                    }
                })
            })
            .collect();

        let collector = std::thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(next) = writer.next_in_order() {
                let item = next.unwrap();
                seen.push(item.sequence());
                writer.release(item);
            }
            seen
        });

        for i in 0..100u32 {
            let item = supply.next().unwrap();
            item.record()
                .try_add_event(&i.to_be_bytes())
                .unwrap();
            supply.publish(item).unwrap();
        }
        supply.stop();
        for h in handles {
            h.join().unwrap();
        }
        let seen = collector.join().unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<u64>>());
    }

    #[test]
    fn next_after_stop_is_cancelled() {
        let o = WriterOptions::new("");
        let (mut supply, lanes, writer) = RecordSupply::new(4, 1, &o);
        supply.stop();
        assert!(matches!(supply.next(), Err(EvioError::Cancelled)));
        drop(lanes);
        drop(writer);
    }

    #[test]
    fn pipeline_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mt.evio");
        let mut w = EventWriterMt::create(
            opts(&path).record_limits(50, 64 * 1024),
        )
        .unwrap();
        let mut events = Vec::new();
        for i in 0..1000u32 {
            let mut ev = vec![0u8; 40];
            Endian::Big.write_u32(&mut ev[..4], i);
            ev[4] = (i % 251) as u8;
            w.add_event(&ev).unwrap();
            events.push(ev);
        }
        w.close().unwrap();

        let mut r = EvioReader::open(&path).unwrap();
        assert_eq!(r.event_count(), 1000);
        // More than one record proves the ring cycled.
        assert!(r.record_count() > 1);
        for (i, ev) in events.iter().enumerate() {
            assert_eq!(&r.event(i as u64).unwrap(), ev);
        }
    }
}

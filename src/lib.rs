//! EVIO v6 — the CODA event container format.
//!
//! A stream of self-describing, hierarchically typed events packed into
//! optionally compressed records, written to files or buffers and consumed
//! offline. This crate provides:
//!
//! - the record codec ([`record`]): framing, per-event index, LZ4 / LZ4-HC /
//!   gzip compression, trailer generation;
//! - the writers ([`writer`], [`supply`]): single-threaded composition or a
//!   ring-buffered pipeline overlapping packing, parallel compression, and
//!   sequential disk I/O, with file splitting and generated names
//!   ([`filename`]);
//! - the readers ([`reader`]): random and sequential event access over v6
//!   record files and legacy v4 block files behind one interface;
//! - the structure model ([`event`]): bank/segment/tag-segment trees, the
//!   composite-data sub-format, and bit-exact byte-order swapping.

pub mod buffer;
pub mod compress;
pub mod error;
pub mod event;
pub mod filename;
pub mod header;
pub mod reader;
pub mod record;
pub mod supply;
pub mod writer;

pub use buffer::{pad4, ByteBuffer, Endian};
pub use compress::CompressionType;
pub use error::{EvioError, Result};
pub use event::{
    swap_event, CompositeData, CompositeValue, DataType, EventTree, LeafData, StructureHeader,
    StructureKind,
};
pub use header::{BlockHeader, FileHeader, HeaderType, RecordHeader};
pub use reader::{EvioReader, LoadedRecord};
pub use record::{AddOutcome, RecordInput, RecordOutput, RejectReason};
pub use supply::{EventWriterMt, RecordSupply};
pub use writer::v4::EventWriterV4;
pub use writer::{EventWriter, WriterOptions};

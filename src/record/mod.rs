//! Record assembly and parsing.
//!
//! A record is the container format's unit of I/O: a 14-word header, an index
//! of per-event byte lengths, an optional user header, and the event payloads,
//! with everything after the header optionally compressed as one blob.
//! [`RecordOutput`] aggregates events and builds the on-disk image;
//! [`RecordInput`] parses one back and exposes its events.

pub mod input;
pub mod output;

pub use input::RecordInput;
pub use output::{AddOutcome, RecordOutput, RejectReason};

/// Default cap on events per record.
pub const DEFAULT_MAX_EVENT_COUNT: usize = 1_000_000;

/// Default cap on uncompressed payload bytes per record (8 MB).
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 8 * 1024 * 1024;

/// Hard per-event size limit. Any event at or below this size is guaranteed
/// to be accepted by an empty record; larger events are rejected outright.
pub const MAX_EVENT_BYTES: usize = (u32::MAX / 2) as usize;

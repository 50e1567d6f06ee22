//! Error kinds shared across the crate.
//!
//! Every failure mode of the format surfaces as one [`EvioError`] variant.
//! Variants that correspond to a position in a file or buffer carry that
//! offset so callers can report exactly where a scan went wrong.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EvioError>;

/// All error kinds produced by the readers, writers, and codecs.
#[derive(Debug, Error)]
pub enum EvioError {
    /// Underlying disk or stream failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid data. Never retried.
    #[error("bad format at offset {offset}: {message}")]
    BadFormat { offset: u64, message: String },

    /// The magic word matched neither byte order during a direct record
    /// parse. Readers scanning a file report the same condition as
    /// [`BadFormat`](EvioError::BadFormat) at the record's offset.
    #[error("bad magic word {found:#010x} at offset {offset}")]
    BadMagic { offset: u64, found: u32 },

    /// Evio version outside what this crate reads or writes.
    #[error("unsupported evio version {version}")]
    UnsupportedVersion { version: u32 },

    /// Input ended before a complete header or payload.
    #[error("truncated input at offset {offset}: {message}")]
    Truncated { offset: u64, message: String },

    /// Codec failure or insufficient output capacity.
    #[error("compression error: {0}")]
    Compression(String),

    /// A buffer access would cross the limit.
    #[error("out of bounds: offset {offset} + {length} exceeds limit {limit}")]
    OutOfBounds {
        offset: usize,
        length: usize,
        limit: usize,
    },

    /// Event or record index past the end of the container.
    #[error("index {index} out of range ({len} present)")]
    IndexOutOfRange { index: usize, len: usize },

    /// File-name template with more specifiers than the generator accepts.
    #[error("bad file-name template: {0}")]
    BadTemplate(String),

    /// Supply or writer was stopped while the operation was pending.
    #[error("operation cancelled")]
    Cancelled,

    /// Operation on a handle in the wrong state, e.g. write after close.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl EvioError {
    /// Shorthand for a [`EvioError::BadFormat`] at a known offset.
    pub fn bad_format(offset: u64, message: impl Into<String>) -> Self {
        EvioError::BadFormat {
            offset,
            message: message.into(),
        }
    }

    /// Shorthand for a [`EvioError::Truncated`] at a known offset.
    pub fn truncated(offset: u64, message: impl Into<String>) -> Self {
        EvioError::Truncated {
            offset,
            message: message.into(),
        }
    }
}

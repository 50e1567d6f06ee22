//! The typed event structure model.
//!
//! An event is a tree of *structures*: banks, segments, and tag-segments,
//! differing only in header layout. Containers hold child structures of one
//! kind; leaves hold a typed array. [`structure`] defines the tree and its
//! serialize/parse codec, [`composite`] the embedded composite-data
//! sub-format, and [`swap`] the in-place byte-order swap over a serialized
//! event.

pub mod composite;
pub mod structure;
pub mod swap;
pub mod types;

pub use composite::{CompositeData, CompositeValue};
pub use structure::{EventTree, LeafData, NodeId, StructureHeader, StructureKind};
pub use swap::swap_event;
pub use types::DataType;

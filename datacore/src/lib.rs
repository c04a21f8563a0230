//! A typed reader for the DataCore game-data archive format: a binary
//! database packing schema tables, value pools, and flat per-struct instance
//! storage for tens of thousands of heterogeneous records.
//!
//! [`raw`] parses the archive bytes into the schema, pools, and instance
//! storage. [`structured`] drives on-demand deserialisation of typed values
//! over a parsed [`raw::Database`], with a shared instance cache, per-thread
//! cycle detection, and lazily resolved references. Concrete record types
//! and the struct-index dispatch table that ties the two together are not
//! part of this crate; they are emitted per archive schema version by the
//! `datacore-gen` code generator and compiled alongside it.

pub mod error;
pub mod raw;
pub mod structured;
pub mod utilities;

#[cfg(test)]
pub(crate) mod test_util;
#[cfg(test)]
mod scenarios;

pub use error::{ReadError, ReadResult, RuntimeError, RuntimeResult};
pub use raw::{DataType, Database};
pub use structured::{Dispatch, LazyRef, MainRecord, Record, Runtime};
pub use utilities::FromByteStream;

/// Re-exported so generated record code can name [`uuid::Uuid`] as
/// `datacore::uuid::Uuid` without declaring its own direct dependency on it.
pub use uuid;

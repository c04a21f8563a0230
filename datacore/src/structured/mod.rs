//! The typed materialisation runtime: turns raw instance bytes into the
//! strongly typed values generated code describes, with a shared instance
//! cache, per-thread cycle detection, enum parsing, and the lazy
//! reference/pointer wrapper consumers actually hold.

pub mod lazy_ref;
pub mod record;
pub mod runtime;

pub use lazy_ref::LazyRef;
pub use record::{Dispatch, MainRecord, Record};
pub use runtime::Runtime;

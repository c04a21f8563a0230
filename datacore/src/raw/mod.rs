//! Low-level byte parsing of a DataCore archive: the fixed-order header, the
//! schema tables (structs, properties, enums), the value pools, the flat
//! per-struct instance storage, and the main-record index. Nothing in this
//! module understands concrete record types; that is the job of `structured`
//! and of the code the generator produces from a parsed [`Database`].

pub mod database;
pub mod header;
pub mod pools;
pub mod schema;
pub mod strings;

pub use database::Database;
pub use header::Header;
pub use pools::Pool;
pub use schema::{
	ArrayHandle, DataMapping, DataType, EnumDefinition, EnumOptionDefinition, PointerHandle, PropertyDefinition, ReferenceHandle, RecordDefinition,
	StructDefinition,
};
pub use strings::StringPool;

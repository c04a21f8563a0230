use crate::error::RuntimeResult;
use crate::structured::runtime::Runtime;
use std::any::Any;
use std::io::Cursor;
use std::sync::Arc;
use uuid::Uuid;

/// Implemented by every generated record type. `read` performs exactly the
/// sequence described for a struct's properties: ancestor fields first, then
/// the type's own, pulling primitives straight off `cursor` and recursing
/// into `runtime` for anything that is itself cached, lazy, or enum-typed.
pub trait Record: Sized + Send + Sync + 'static {
	/// The struct index this type was generated from. Used by the dispatch
	/// table and by [`crate::structured::runtime::Runtime::get_or_read_instance`]
	/// to sanity-check a cache hit's concrete type.
	const STRUCT_INDEX: i32;

	fn read(runtime: &Arc<Runtime>, cursor: &mut Cursor<&[u8]>) -> RuntimeResult<Self>;

	/// Attempts to view a type-erased materialised instance as `Self`.
	///
	/// The default accepts only an exact match, which is all a leaf struct
	/// (one with no descendants) ever needs. A struct that has descendants
	/// overrides this to also accept any descendant's type-erased value,
	/// narrowing to the embedded `base` field composition gives every
	/// descendant (see the generator's inheritance strategy). This is what
	/// lets a `reference<Base>` property resolve to a `Derived` on disk.
	fn narrow(any: Arc<dyn Any + Send + Sync>) -> Option<Arc<Self>> {
		any.downcast::<Self>().ok()
	}
}

/// Implemented once by generated code: a flat match from struct index to a
/// cache-aware read of the matching concrete [`Record`] type, type-erased
/// behind `Arc<dyn Any + Send + Sync>` so the runtime itself never needs to
/// know any concrete type.
pub trait Dispatch: Send + Sync + 'static {
	fn dispatch(&self, runtime: &Arc<Runtime>, struct_index: i32, instance_index: i32) -> RuntimeResult<Option<Arc<dyn Any + Send + Sync>>>;
}

/// A top-level, GUID-addressable entry materialised from the database's
/// main-record index: the file name and record name the archive stores
/// alongside it, and the typed object graph rooted at it.
pub struct MainRecord<T> {
	pub file_name: String,
	pub name: String,
	pub id: Uuid,
	pub data: Arc<T>,
}

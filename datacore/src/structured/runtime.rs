use crate::error::{RuntimeError, RuntimeResult};
use crate::raw::database::Database;
use crate::raw::schema::{ArrayHandle, PointerHandle, ReferenceHandle, RecordDefinition};
use crate::structured::lazy_ref::LazyRef;
use crate::structured::record::{Dispatch, MainRecord, Record};
use dashmap::DashMap;
use fxhash::FxHashSet;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::io::Cursor;
use std::sync::Arc;
use uuid::Uuid;

thread_local! {
	/// Keys currently mid-`Read` on this thread. Thread-local rather than
	/// shared: a global set would force every reader to serialise on it,
	/// while two threads racing the same cycle only need to detect it on
	/// their own call stack (see concurrency model notes on the instance cache).
	static IN_FLIGHT: RefCell<FxHashSet<(i32, i32)>> = RefCell::new(FxHashSet::default());
}

/// RAII guard that removes a key from the thread-local in-flight set on every
/// exit path, success, error, or panic alike.
struct InFlightGuard {
	key: (i32, i32),
}

impl Drop for InFlightGuard {
	fn drop(&mut self) {
		IN_FLIGHT.with(|set| {
			set.borrow_mut().remove(&self.key);
		});
	}
}

fn enter_in_flight(key: (i32, i32)) -> Option<InFlightGuard> {
	IN_FLIGHT.with(|set| {
		let mut set = set.borrow_mut();
		if !set.insert(key) {
			return None;
		}
		Some(())
	})?;
	Some(InFlightGuard { key })
}

/// Drives deserialisation of single instances, owning the two caches that
/// give the reader its cycle-tolerant, deduplicated, concurrent-reader shape.
///
/// Constructed once per loaded database and then shared (typically behind an
/// `Arc`) across every thread that wants to materialise records from it.
pub struct Runtime {
	database: Arc<Database>,
	dispatch: Box<dyn Dispatch>,
	instance_cache: DashMap<(i32, i32), Arc<dyn Any + Send + Sync>>,
	enum_cache: DashMap<(TypeId, i32), Arc<dyn Any + Send + Sync>>,
}

impl Runtime {
	pub fn new(database: Arc<Database>, dispatch: Box<dyn Dispatch>) -> Arc<Self> {
		Arc::new(Self { database, dispatch, instance_cache: DashMap::new(), enum_cache: DashMap::new() })
	}

	pub fn database(&self) -> &Arc<Database> {
		&self.database
	}

	pub fn validate_schema(&self, expected_struct_count: usize, expected_enum_count: usize, expected_struct_hash: u64, expected_enum_hash: u64) -> RuntimeResult<()> {
		Ok(self.database.validate_schema(expected_struct_count, expected_enum_count, expected_struct_hash, expected_enum_hash)?)
	}

	/// Materialises the object graph rooted at a main record as a concrete,
	/// statically known type. Fails with [`RuntimeError::TypeMismatch`] if the
	/// record's actual struct index does not produce a `T`.
	pub fn get_from_main_record<T: Record>(self: &Arc<Self>, record: &RecordDefinition) -> RuntimeResult<MainRecord<T>> {
		let data = self
			.get_or_read_instance::<T>(record.struct_index, record.instance_index)?
			.ok_or(RuntimeError::NullDispatch { struct_index: record.struct_index, instance_index: record.instance_index })?;
		Ok(MainRecord {
			file_name: self.database.record_file_name(record).unwrap_or_default().to_owned(),
			name: self.database.record_name(record).unwrap_or_default().to_owned(),
			id: Uuid::from_bytes_le(record.id),
			data,
		})
	}

	/// The cache-aware reader for a statically known concrete type. Sentinel
	/// indices yield `None`. A cache hit whose concrete type does not match
	/// `T` is a generator/runtime drift bug, surfaced as `TypeMismatch`.
	pub fn get_or_read_instance<T: Record>(self: &Arc<Self>, struct_index: i32, instance_index: i32) -> RuntimeResult<Option<Arc<T>>> {
		let any = self.get_or_read_raw(struct_index, instance_index, |rt, cursor| {
			let value = T::read(rt, cursor)?;
			Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>)
		})?;
		match any {
			None => Ok(None),
			Some(any) => any.downcast::<T>().map(Some).map_err(|_| RuntimeError::TypeMismatch { struct_index, instance_index }),
		}
	}

	/// Resolves the target's *actual* concrete type through the dispatch
	/// table rather than a type parameter; used for reference and pointer
	/// resolution, where the declared type may only be an ancestor of the
	/// stored value. Callers narrow the returned `Any` themselves.
	///
	/// Unlike [`Self::get_or_read_instance`] this does not itself take the
	/// in-flight slot for `(struct_index, instance_index)`: dispatch calls
	/// straight back into `get_or_read_instance::<Concrete>` for the same
	/// key, which is where the cache lookup, cycle-break, and
	/// insert-after-construction actually happen. Taking the slot twice for
	/// one logical read would make every polymorphic reference look like a
	/// cycle against itself.
	pub fn get_or_read_instance_polymorphic(self: &Arc<Self>, struct_index: i32, instance_index: i32) -> RuntimeResult<Option<Arc<dyn Any + Send + Sync>>> {
		if struct_index < 0 || instance_index < 0 {
			return Ok(None);
		}
		if let Some(existing) = self.instance_cache.get(&(struct_index, instance_index)) {
			return Ok(Some(existing.clone()));
		}
		// `Ok(None)` here means a legitimate cycle break inside the concrete
		// type's own `get_or_read_instance`; a struct index the dispatch table
		// has no arm for at all is schema drift and is raised by the
		// generated dispatch implementation itself as `NullDispatch`.
		self.dispatch.dispatch(self, struct_index, instance_index)
	}

	/// Shared core of both instance readers: cache lookup, cycle-break, and
	/// insert-after-construction so a back-edge during `reader` misses the
	/// cache rather than observing a half-built value.
	fn get_or_read_raw(
		self: &Arc<Self>,
		struct_index: i32,
		instance_index: i32,
		reader: impl FnOnce(&Arc<Self>, &mut Cursor<&[u8]>) -> RuntimeResult<Arc<dyn Any + Send + Sync>>,
	) -> RuntimeResult<Option<Arc<dyn Any + Send + Sync>>> {
		if struct_index < 0 || instance_index < 0 {
			return Ok(None);
		}
		let key = (struct_index, instance_index);

		if let Some(existing) = self.instance_cache.get(&key) {
			return Ok(Some(existing.clone()));
		}

		let _guard = match enter_in_flight(key) {
			Some(guard) => guard,
			None => {
				#[cfg(feature = "tracing")]
				tracing::debug!(struct_index, instance_index, "cycle break: re-entrant read of in-flight instance");
				return Ok(None);
			},
		};

		let mut cursor = self.database.get_reader(struct_index, instance_index)?;
		let value = reader(self, &mut cursor)?;

		// Only the first writer for a key is retained; a racing loser's value
		// is simply dropped, which is sound because `Read` is pure.
		let entry = self.instance_cache.entry(key).or_insert(value);
		Ok(Some(entry.clone()))
	}

	/// Parses a name-pool offset into an enum value, memoised per
	/// `(enum type, name offset)` so repeated lookups of the same option across
	/// many instances skip the string compare. A scalar `EnumChoice` field's
	/// inline bytes already are this offset; an array slot's caller resolves
	/// it first via [`crate::raw::Database::enum_value_offset`]. Unknown names
	/// return `fallback` (generated code always supplies its enum's `Unknown`
	/// variant) and are reported on the debug channel.
	pub fn enum_parse<T, F>(&self, name_offset: i32, parse: F, fallback: T) -> T
	where
		T: Clone + Send + Sync + 'static,
		F: FnOnce(&str) -> Option<T>,
	{
		let key = (TypeId::of::<T>(), name_offset);
		if let Some(cached) = self.enum_cache.get(&key) {
			if let Some(value) = cached.downcast_ref::<T>() {
				return value.clone();
			}
		}
		let name = self.database.name(name_offset);
		let value = name.and_then(&parse).unwrap_or_else(|| {
			#[cfg(feature = "tracing")]
			tracing::debug!(name_offset, ?name, "enum parse miss, falling back to Unknown");
			fallback.clone()
		});
		self.enum_cache.entry(key).or_insert_with(|| Arc::new(value.clone()) as Arc<dyn Any + Send + Sync>);
		value
	}

	pub fn create_reference<T>(self: &Arc<Self>, reference: ReferenceHandle) -> Option<LazyRef<T>>
	where
		T: Record,
	{
		if reference.is_null() {
			return None;
		}
		Some(LazyRef::from_reference(self.clone(), reference.guid()))
	}

	pub fn create_pointer<T>(self: &Arc<Self>, pointer: PointerHandle) -> Option<LazyRef<T>>
	where
		T: Record,
	{
		if pointer.is_null() {
			return None;
		}
		Some(LazyRef::from_pointer(self.clone(), pointer.struct_index, pointer.instance_index))
	}

	/// Reads an array property's `(count, first_index)` handle off the
	/// cursor. Generated code pairs this with a per-element-type copy from
	/// the matching pool, or with repeated `get_or_read_instance` calls for
	/// arrays of embedded classes.
	pub fn read_array_handle(&self, cursor: &mut Cursor<&[u8]>) -> RuntimeResult<ArrayHandle> {
		use crate::utilities::FromByteStream;
		Ok(ArrayHandle::read(cursor, &())?)
	}
}

impl std::fmt::Debug for Runtime {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Runtime")
			.field("cached_instances", &self.instance_cache.len())
			.field("cached_enum_values", &self.enum_cache.len())
			.finish()
	}
}

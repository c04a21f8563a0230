use crate::error::RuntimeResult;
use crate::structured::record::Record;
use crate::structured::runtime::Runtime;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

#[derive(Clone)]
enum Target {
	/// A GUID-keyed link; the struct/instance index it resolves to is only
	/// known once the main-record index has been consulted.
	Reference { id: Uuid },
	/// An already-resolved `(struct_index, instance_index)` link, the shape
	/// strong and weak pointers share.
	Pointer { struct_index: i32, instance_index: i32 },
}

struct Resolution<T> {
	struct_index: i32,
	instance_index: i32,
	is_main_record: bool,
	file_path: Option<String>,
	value: Option<Arc<T>>,
}

impl<T> Clone for Resolution<T> {
	fn clone(&self) -> Self {
		Resolution {
			struct_index: self.struct_index,
			instance_index: self.instance_index,
			is_main_record: self.is_main_record,
			file_path: self.file_path.clone(),
			value: self.value.clone(),
		}
	}
}

/// Deferred-resolution handle to a reference or pointer property. Holds only
/// a GUID or an index pair until `value()` is first called; the resolved
/// value is then memoised in a single-assignment cell, so a racing second
/// caller that also resolves it concurrently sees the same outcome discarded
/// in favour of whichever write landed first (the instance cache underneath
/// is the actual source of truth, so both resolutions agree on content).
pub struct LazyRef<T> {
	runtime: Arc<Runtime>,
	target: Target,
	resolution: OnceLock<Resolution<T>>,
}

impl<T: Record> LazyRef<T> {
	pub(crate) fn from_reference(runtime: Arc<Runtime>, id: Uuid) -> Self {
		Self { runtime, target: Target::Reference { id }, resolution: OnceLock::new() }
	}

	pub(crate) fn from_pointer(runtime: Arc<Runtime>, struct_index: i32, instance_index: i32) -> Self {
		Self { runtime, target: Target::Pointer { struct_index, instance_index }, resolution: OnceLock::new() }
	}

	fn resolve(&self) -> RuntimeResult<&Resolution<T>> {
		if let Some(resolved) = self.resolution.get() {
			return Ok(resolved);
		}

		let (struct_index, instance_index, is_main_record, file_path) = match &self.target {
			Target::Pointer { struct_index, instance_index } => (*struct_index, *instance_index, false, None),
			Target::Reference { id } => match self.runtime.database().try_get_record_info(*id) {
				Some((struct_index, instance_index, is_main, file_offset)) => {
					let file_path = is_main.then(|| self.runtime.database().string(file_offset)).flatten().map(str::to_owned);
					(struct_index, instance_index, is_main, file_path)
				},
				None => (-1, -1, false, None),
			},
		};

		let value = match self.runtime.get_or_read_instance_polymorphic(struct_index, instance_index)? {
			Some(any) => T::narrow(any),
			None => None,
		};

		let resolution = Resolution { struct_index, instance_index, is_main_record, file_path, value };
		// Another thread may have raced us here; whichever `set` wins is kept,
		// and both computed the same answer, so either is a correct result.
		let _ = self.resolution.set(resolution);
		Ok(self.resolution.get().expect("resolution was just set or already present"))
	}

	/// The materialised target, or `None` if the link was null, the GUID was
	/// unknown, or resolving it hit an in-flight cycle.
	pub fn value(&self) -> RuntimeResult<Option<Arc<T>>> {
		Ok(self.resolve()?.value.clone())
	}

	pub fn record_id(&self) -> Option<Uuid> {
		match &self.target {
			Target::Reference { id } => Some(*id),
			Target::Pointer { .. } => None,
		}
	}

	pub fn is_external_file(&self) -> bool {
		self.resolve().map(|r| r.is_main_record).unwrap_or(false)
	}

	pub fn external_file_path(&self) -> Option<String> {
		self.resolve().ok().and_then(|r| r.file_path.clone())
	}

	pub fn struct_index(&self) -> Option<i32> {
		self.resolve().ok().map(|r| r.struct_index)
	}

	pub fn instance_index(&self) -> Option<i32> {
		self.resolve().ok().map(|r| r.instance_index)
	}

	pub fn is_resolved(&self) -> bool {
		self.resolution.get().is_some()
	}
}

/// Cloning does not re-resolve: an already-resolved target carries its
/// resolution over, an unresolved one starts fresh. Needed so a struct with
/// descendants can clone its embedded base out of a type-erased descendant
/// value in [`Record::narrow`](crate::structured::record::Record::narrow).
impl<T: Record> Clone for LazyRef<T> {
	fn clone(&self) -> Self {
		let resolution = OnceLock::new();
		if let Some(existing) = self.resolution.get() {
			let _ = resolution.set(existing.clone());
		}
		Self { runtime: self.runtime.clone(), target: self.target.clone(), resolution }
	}
}

impl<T> std::fmt::Debug for LazyRef<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.target {
			Target::Reference { id } => write!(f, "LazyRef::Reference({id})"),
			Target::Pointer { struct_index, instance_index } => write!(f, "LazyRef::Pointer({struct_index}, {instance_index})"),
		}
	}
}

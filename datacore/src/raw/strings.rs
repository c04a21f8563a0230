use dashmap::DashMap;
use owning_ref::ArcRef;
use std::fmt::{Debug, Formatter};

/// A NUL-terminated-string blob, offset-addressed, with interned lookups.
///
/// Two of these exist per archive: one carrying file paths and user-facing
/// content strings, one carrying schema and record names (absent on archives
/// older than version 6, in which case it aliases the first). Grounded on the
/// closest sibling reader's two-string-table split and its interning cache,
/// generalised to the concurrent-reader model SPEC_FULL.md §5 requires.
///
/// The teacher's own interner borrows from a `Bump` arena under a single
/// writer; decoding into that same arena from multiple racing reader threads
/// without exclusive access would be unsound. Each distinct offset is instead
/// decoded into the process's leaked heap exactly once (`Box::leak`), giving
/// out a plain `'static`-backed `&str` with no borrow on the pool or the
/// cache; the leak is bounded by the number of distinct offsets ever looked
/// up, which is bounded by the string pool's own size, and matches the
/// archive's own whole-session lifetime (SPEC_FULL.md §3 Lifecycle).
pub struct StringPool {
	data: ArcRef<[u8]>,
	cache: DashMap<i32, &'static str>,
}

impl StringPool {
	pub fn new(data: ArcRef<[u8]>) -> Self {
		Self { data, cache: DashMap::new() }
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	/// Resolves a byte offset into the pool to the NUL-terminated string
	/// starting there, interning it behind the offset on first lookup. Two
	/// threads racing on the same missing offset may both decode and leak a
	/// copy; only one survives in the cache, matching the instance cache's
	/// "only one winner" semantics (SPEC_FULL.md §5) at the cost of a second,
	/// orphaned leak on the losing thread.
	pub fn get(&self, offset: i32) -> Option<&str> {
		if offset < 0 {
			return None;
		}
		if let Some(cached) = self.cache.get(&offset) {
			return Some(*cached);
		}
		let start = offset as usize;
		let bytes = self.data.get(start..)?;
		let end = bytes.iter().position(|b| *b == 0)?;
		let text = std::str::from_utf8(&bytes[..end]).ok()?;
		let leaked: &'static str = Box::leak(text.to_owned().into_boxed_str());
		self.cache.insert(offset, leaked);
		Some(leaked)
	}
}

impl Debug for StringPool {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "StringPool({} bytes)", self.data.len())
	}
}

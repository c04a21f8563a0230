use crate::error::{ReadError, ReadResult};
use crate::utilities::FromByteStream;
use owning_ref::ArcRef;
use std::io::Cursor;
use std::marker::PhantomData;

/// A contiguous, bounds-checked array of fixed-size elements sliced out of the
/// archive's byte buffer. One of these backs each primitive value pool plus
/// the reference/strong-pointer/weak-pointer pools described by the header's
/// counts. Zero-copy: indexing re-decodes the element's bytes on demand
/// rather than materialising a `Vec<T>` up front.
pub struct Pool<T> {
	data: ArcRef<[u8]>,
	count: usize,
	_marker: PhantomData<T>,
}

impl<T> Pool<T>
where
	T: FromByteStream<Deps = ()>,
{
	pub(crate) fn new(data: ArcRef<[u8]>, count: usize) -> Self {
		Self { data, count, _marker: PhantomData }
	}

	pub fn len(&self) -> usize {
		self.count
	}

	pub fn is_empty(&self) -> bool {
		self.count == 0
	}

	fn element_size() -> usize {
		std::mem::size_of::<T>()
	}

	pub fn get(&self, index: i32) -> ReadResult<T> {
		if index < 0 || index as usize >= self.count {
			return Err(ReadError::BadIndex { kind: "pool", index: index as i64, len: self.count });
		}
		let size = Self::element_size();
		let start = index as usize * size;
		let bytes = self.data.get(start..start + size).ok_or(ReadError::EndOfBuffer)?;
		let mut cursor = Cursor::new(bytes);
		Ok(T::read(&mut cursor, &())?)
	}

	/// Reads `count` consecutive elements starting at `first_index`, the
	/// representation every array property stores on disk.
	pub fn slice(&self, first_index: i32, count: i32) -> ReadResult<Vec<T>> {
		if count == 0 {
			return Ok(Vec::new());
		}
		let mut out = Vec::with_capacity(count as usize);
		for i in 0..count {
			out.push(self.get(first_index + i)?);
		}
		Ok(out)
	}
}

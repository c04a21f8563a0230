use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Errors raised while parsing archive bytes into a [`crate::raw::Database`].
///
/// Mirrors the shape of a hand-rolled error enum rather than `thiserror`: a handful
/// of domain variants plus a transparent wrapper around the lower-level IO failure,
/// since the underlying cursor reads are themselves fallible `std::io` operations.
#[derive(Debug)]
pub enum ReadError {
	Io(std::io::Error),
	/// The archive's header version is outside the range this reader understands.
	UnsupportedVersion(u32),
	/// A section count or offset computed while parsing would read past the buffer.
	EndOfBuffer,
	/// A struct, property, enum, or pool index stored in the archive is out of range.
	BadIndex { kind: &'static str, index: i64, len: usize },
	/// A direct `getRecord(guid)` lookup named a GUID absent from the main-record
	/// index. Distinct from a reference silently resolving to null
	/// ([`crate::structured::runtime::Runtime`]'s resolution path never raises
	/// this; only a caller asking for a record by GUID directly does).
	UnknownRecord(Uuid),
	/// The struct/enum table fingerprints computed from the archive disagree with
	/// the ones baked into generated code.
	SchemaMismatch { expected_struct_hash: u64, actual_struct_hash: u64, expected_enum_hash: u64, actual_enum_hash: u64 },
	#[cfg(feature = "mmap")]
	Mmap(std::io::Error),
}

impl Display for ReadError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			ReadError::Io(e) => write!(f, "io error while reading archive: {e}"),
			ReadError::UnsupportedVersion(v) => write!(f, "unsupported archive version {v}"),
			ReadError::EndOfBuffer => write!(f, "attempted to read past the end of the archive buffer"),
			ReadError::BadIndex { kind, index, len } => {
				write!(f, "{kind} index {index} out of range (len {len})")
			},
			ReadError::UnknownRecord(id) => write!(f, "no main record indexed under guid {id}"),
			ReadError::SchemaMismatch { expected_struct_hash, actual_struct_hash, expected_enum_hash, actual_enum_hash } => write!(
				f,
				"schema fingerprint mismatch: structs expected {expected_struct_hash:#x} got {actual_struct_hash:#x}, \
				 enums expected {expected_enum_hash:#x} got {actual_enum_hash:#x}"
			),
			#[cfg(feature = "mmap")]
			ReadError::Mmap(e) => write!(f, "failed to memory-map archive: {e}"),
		}
	}
}

impl std::error::Error for ReadError {}

impl From<std::io::Error> for ReadError {
	fn from(e: std::io::Error) -> Self {
		match e.kind() {
			std::io::ErrorKind::UnexpectedEof => ReadError::EndOfBuffer,
			_ => ReadError::Io(e),
		}
	}
}

pub type ReadResult<T> = Result<T, ReadError>;

/// Errors surfaced by the typed materialisation runtime. Distinct from [`ReadError`]
/// since these can only arise once a [`crate::raw::Database`] has already parsed
/// successfully; they indicate either archive/generated-code drift or a caller misuse.
#[derive(Debug)]
pub enum RuntimeError {
	/// Dispatch returned nothing for a struct index that was not the null sentinel.
	NullDispatch { struct_index: i32, instance_index: i32 },
	/// A cached instance's concrete type did not match the type requested by the caller.
	TypeMismatch { struct_index: i32, instance_index: i32 },
	Read(ReadError),
}

impl Display for RuntimeError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			RuntimeError::NullDispatch { struct_index, instance_index } => {
				write!(f, "dispatch produced no value for struct {struct_index} instance {instance_index}")
			},
			RuntimeError::TypeMismatch { struct_index, instance_index } => {
				write!(f, "cached instance for struct {struct_index} instance {instance_index} has an incompatible type")
			},
			RuntimeError::Read(e) => Display::fmt(e, f),
		}
	}
}

impl std::error::Error for RuntimeError {}

impl From<ReadError> for RuntimeError {
	fn from(e: ReadError) -> Self {
		RuntimeError::Read(e)
	}
}

impl From<std::io::Error> for RuntimeError {
	fn from(e: std::io::Error) -> Self {
		RuntimeError::Read(ReadError::from(e))
	}
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

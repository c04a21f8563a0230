use crate::utilities::{impl_from_byte_stream, FromByteStream};
use std::io::Cursor;
use uuid::Uuid;

impl FromByteStream for Uuid {
	type Deps = ();
	fn read(stream: &mut Cursor<&[u8]>, _: &Self::Deps) -> std::io::Result<Self> {
		let bytes = <[u8; 16]>::read(stream, &())?;
		Ok(Uuid::from_bytes_le(bytes))
	}
}

/// Tag stored alongside every property, naming the shape of its value.
///
/// Values 0..=18 are read directly from the archive; `from_u16` rejects
/// anything outside that range rather than guessing, since a future archive
/// revision may widen the tag space in ways this reader does not yet model.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum DataType {
	Boolean = 0,
	Int8 = 1,
	Int16 = 2,
	Int32 = 3,
	Int64 = 4,
	UInt8 = 5,
	UInt16 = 6,
	UInt32 = 7,
	UInt64 = 8,
	Single = 9,
	Double = 10,
	Guid = 11,
	StringId = 12,
	Locale = 13,
	EnumChoice = 14,
	Class = 15,
	StrongPointer = 16,
	WeakPointer = 17,
	Reference = 18,
}

impl DataType {
	pub fn from_u16(value: u16) -> Option<Self> {
		use DataType::*;
		Some(match value {
			0 => Boolean,
			1 => Int8,
			2 => Int16,
			3 => Int32,
			4 => Int64,
			5 => UInt8,
			6 => UInt16,
			7 => UInt32,
			8 => UInt64,
			9 => Single,
			10 => Double,
			11 => Guid,
			12 => StringId,
			13 => Locale,
			14 => EnumChoice,
			15 => Class,
			16 => StrongPointer,
			17 => WeakPointer,
			18 => Reference,
			_ => return None,
		})
	}

	/// Width in bytes of one *scalar* occurrence of this type within an
	/// instance's inline byte region. Array properties instead store an
	/// 8-byte `(count: i32, first_index: i32)` pair regardless of element type.
	pub const fn inline_size(self) -> usize {
		use DataType::*;
		match self {
			Boolean | Int8 | UInt8 => 1,
			Int16 | UInt16 => 2,
			Int32 | UInt32 | Single | StringId | Locale | EnumChoice => 4,
			Int64 | UInt64 | Double => 8,
			Guid => 16,
			Class => 0, // embedded size depends on the target struct, resolved by the caller
			Reference => 20, // 16-byte guid + 4-byte instance index
			StrongPointer | WeakPointer => 8, // (struct_index: i32, instance_index: i32)
		}
	}
}

/// Raw, fixed-size row of the struct-definition table.
#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct StructDefinition {
	pub name_offset: i32,
	pub parent_type_index: i32,
	pub attribute_count: u16,
	pub first_attribute_index: u16,
	pub node_type: u16,
	_padding: u16,
	pub struct_size: u32,
	pub struct_crc32: u32,
}

impl_from_byte_stream!(StructDefinition);

/// Raw, fixed-size row of the property-definition table.
#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct PropertyDefinition {
	pub name_offset: i32,
	/// Meaning depends on `data_type`: the embedded/referenced/pointed-to
	/// struct index for `Class`/`Reference`/`StrongPointer`/`WeakPointer`,
	/// the enum index for `EnumChoice`, and unused for every other tag.
	pub struct_index: i32,
	pub data_type: u16,
	pub conversion_type: u16,
	pub padding: [u8; 2],
	pub array_size: u16,
}

impl_from_byte_stream!(PropertyDefinition);

impl PropertyDefinition {
	/// `conversion_type == 1` marks an array property; any other value is scalar.
	/// Grounded on the closest sibling reader's `is_array` check.
	pub fn is_array(&self) -> bool {
		self.conversion_type == 1
	}

	pub fn data_type(&self) -> Option<DataType> {
		DataType::from_u16(self.data_type)
	}
}

/// Raw, fixed-size row of the enum-definition table.
#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct EnumDefinition {
	pub name_offset: i32,
	pub value_count: u16,
	pub first_value_index: u16,
}

impl_from_byte_stream!(EnumDefinition);

/// One option of an enum: a string-pool offset naming it.
#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct EnumOptionDefinition {
	pub name_offset: i32,
}

impl_from_byte_stream!(EnumOptionDefinition);

/// Raw, fixed-size row of the record-definition table (the main-record index
/// before GUID lookup is built).
#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct RecordDefinition {
	pub struct_index: i32,
	pub instance_index: i32,
	pub id: [u8; 16],
	pub name_offset: i32,
	pub filename_offset: i32,
	pub flags: u16,
	_padding: u16,
}

impl_from_byte_stream!(RecordDefinition);

/// Raw, fixed-size row of the struct-index -> instance-count data-mapping table
/// used to derive per-struct base offsets into the instance data section.
#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct DataMapping {
	pub struct_index: i32,
	pub struct_count: i32,
}

impl_from_byte_stream!(DataMapping);

/// A `(count, first_index)` pair describing an array property's slice into
/// the pool matching its element type.
#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct ArrayHandle {
	pub count: i32,
	pub first_index: i32,
}

impl_from_byte_stream!(ArrayHandle);

/// A resolved `(struct_index, instance_index)` link, the on-disk shape of
/// both strong and weak pointer pool elements. The distinction between
/// strong and weak is advisory only; this reader treats both identically.
#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct PointerHandle {
	pub struct_index: i32,
	pub instance_index: i32,
}

impl_from_byte_stream!(PointerHandle);

impl PointerHandle {
	pub const NULL: PointerHandle = PointerHandle { struct_index: -1, instance_index: -1 };

	pub fn is_null(&self) -> bool {
		self.struct_index < 0 || self.instance_index < 0
	}
}

/// An unresolved GUID link to any main record, with an accompanying instance
/// index hint retained for scalar reference fields as read off disk.
#[derive(Debug, Copy, Clone)]
#[repr(C)]
pub struct ReferenceHandle {
	pub id: [u8; 16],
	pub instance_index: i32,
}

impl_from_byte_stream!(ReferenceHandle);

impl ReferenceHandle {
	pub fn guid(&self) -> Uuid {
		Uuid::from_bytes_le(self.id)
	}

	pub fn is_null(&self) -> bool {
		self.id == [0u8; 16]
	}
}

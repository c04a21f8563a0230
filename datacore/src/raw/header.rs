use crate::error::{ReadError, ReadResult};
use crate::utilities::FromByteStream;
use std::io::Cursor;

/// Lowest and highest archive format version this reader understands.
/// Versions below 5 are known to lack a second string pool (see
/// [`Header::has_separate_name_pool`]); versions above 6 are unreleased as far
/// as this reader's grounding material goes and are rejected rather than
/// silently misparsed.
pub const MIN_SUPPORTED_VERSION: u32 = 5;
pub const MAX_SUPPORTED_VERSION: u32 = 6;

/// The archive's fixed-order header: a format version, then a count for every
/// schema table and value pool, in the exact order they are laid out on disk.
///
/// Field order here is load-bearing: it is the order fields are read from the
/// stream, which must match the archive byte-for-byte.
#[derive(Debug, Clone, Copy)]
pub struct Header {
	pub version: u32,

	pub struct_definition_count: i32,
	pub property_definition_count: i32,
	pub enum_definition_count: i32,
	pub data_mapping_count: i32,
	pub record_definition_count: i32,

	pub bool_count: i32,
	pub int8_count: i32,
	pub int16_count: i32,
	pub int32_count: i32,
	pub int64_count: i32,
	pub uint8_count: i32,
	pub uint16_count: i32,
	pub uint32_count: i32,
	pub uint64_count: i32,
	pub single_count: i32,
	pub double_count: i32,
	pub guid_count: i32,
	pub string_id_count: i32,
	pub locale_count: i32,
	pub enum_value_count: i32,
	pub strong_pointer_count: i32,
	pub weak_pointer_count: i32,
	pub reference_count: i32,
	pub enum_option_count: i32,

	pub string_pool_1_length: u32,
	pub string_pool_2_length: u32,
}

impl Header {
	/// Versions 6 and up carry a second, name-only string pool; earlier
	/// versions alias it onto the first (content) pool.
	pub fn has_separate_name_pool(&self) -> bool {
		self.version >= 6
	}

	pub fn read(stream: &mut Cursor<&[u8]>) -> ReadResult<Self> {
		let _unknown1 = u32::read(stream, &())?;
		let version = u32::read(stream, &())?;
		if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version) {
			return Err(ReadError::UnsupportedVersion(version));
		}
		let _unknown2 = u32::read(stream, &())?;
		let _unknown3 = u32::read(stream, &())?;

		macro_rules! i32_field {
			() => {
				i32::read(stream, &())?
			};
		}

		Ok(Header {
			version,
			struct_definition_count: i32_field!(),
			property_definition_count: i32_field!(),
			enum_definition_count: i32_field!(),
			data_mapping_count: i32_field!(),
			record_definition_count: i32_field!(),
			bool_count: i32_field!(),
			int8_count: i32_field!(),
			int16_count: i32_field!(),
			int32_count: i32_field!(),
			int64_count: i32_field!(),
			uint8_count: i32_field!(),
			uint16_count: i32_field!(),
			uint32_count: i32_field!(),
			uint64_count: i32_field!(),
			single_count: i32_field!(),
			double_count: i32_field!(),
			guid_count: i32_field!(),
			string_id_count: i32_field!(),
			locale_count: i32_field!(),
			enum_value_count: i32_field!(),
			strong_pointer_count: i32_field!(),
			weak_pointer_count: i32_field!(),
			reference_count: i32_field!(),
			enum_option_count: i32_field!(),
			string_pool_1_length: u32::read(stream, &())?,
			string_pool_2_length: u32::read(stream, &())?,
		})
	}
}

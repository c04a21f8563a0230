//! Byte-level archive builder shared by the `#[cfg(test)]` modules across
//! this crate. Tests assemble a tiny synthetic archive field-by-field, in the
//! exact order [`crate::raw::Database::parse`] expects, rather than going
//! through the public raw types: that way a test failure points at a real
//! wire-format disagreement, not a struct-literal shortcut.

use uuid::Uuid;

#[derive(Default)]
struct Buf(Vec<u8>);

impl Buf {
	fn i32(&mut self, v: i32) -> &mut Self {
		self.0.extend_from_slice(&v.to_le_bytes());
		self
	}
	fn u32(&mut self, v: u32) -> &mut Self {
		self.0.extend_from_slice(&v.to_le_bytes());
		self
	}
	fn u16(&mut self, v: u16) -> &mut Self {
		self.0.extend_from_slice(&v.to_le_bytes());
		self
	}
	fn bytes(&mut self, v: &[u8]) -> &mut Self {
		self.0.extend_from_slice(v);
		self
	}
}

/// One value pool under construction: its encoded elements plus a running
/// count, mirroring the shape [`crate::raw::Pool`] decodes back out of.
#[derive(Default)]
struct PoolBuf {
	bytes: Vec<u8>,
	count: i32,
}

impl PoolBuf {
	fn push(&mut self, encoded: &[u8]) -> i32 {
		let index = self.count;
		self.bytes.extend_from_slice(encoded);
		self.count += 1;
		index
	}
}

/// Builds one archive's worth of schema tables, value pools, string pools,
/// and instance bytes, then serialises them into the exact byte layout
/// [`crate::raw::Database::parse`] reads back.
#[derive(Default)]
pub(crate) struct ArchiveBuilder {
	struct_definitions: Buf,
	struct_definition_count: i32,
	property_definitions: Buf,
	property_definition_count: i32,
	enum_definitions: Buf,
	enum_definition_count: i32,
	enum_options: Buf,
	enum_option_count: i32,
	data_mappings: Buf,
	data_mapping_count: i32,
	records: Buf,
	record_definition_count: i32,

	bool_pool: PoolBuf,
	int8_pool: PoolBuf,
	int16_pool: PoolBuf,
	int32_pool: PoolBuf,
	int64_pool: PoolBuf,
	uint8_pool: PoolBuf,
	uint16_pool: PoolBuf,
	uint32_pool: PoolBuf,
	uint64_pool: PoolBuf,
	single_pool: PoolBuf,
	double_pool: PoolBuf,
	guid_pool: PoolBuf,
	string_id_pool: PoolBuf,
	locale_pool: PoolBuf,
	enum_value_pool: PoolBuf,
	strong_pointer_pool: PoolBuf,
	weak_pointer_pool: PoolBuf,
	reference_pool: PoolBuf,

	strings: Vec<u8>,
	names: Vec<u8>,
	data_section: Vec<u8>,
}

impl ArchiveBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_struct(&mut self, name_offset: i32, parent_type_index: i32, first_attribute_index: u16, attribute_count: u16, struct_size: u32) -> i32 {
		let index = self.struct_definition_count;
		self.struct_definitions
			.i32(name_offset)
			.i32(parent_type_index)
			.u16(attribute_count)
			.u16(first_attribute_index)
			.u16(0) // node_type, unused by this reader
			.u16(0) // padding
			.u32(struct_size)
			.u32(0); // struct_crc32, not exercised by these tests
		self.struct_definition_count += 1;
		index
	}

	pub fn add_property(&mut self, name_offset: i32, struct_index: i32, data_type: u16, is_array: bool) -> i32 {
		let index = self.property_definition_count;
		self.property_definitions.i32(name_offset).i32(struct_index).u16(data_type).u16(if is_array { 1 } else { 0 }).bytes(&[0, 0]).u16(0);
		self.property_definition_count += 1;
		index
	}

	pub fn add_enum(&mut self, name_offset: i32, first_value_index: u16, value_count: u16) -> i32 {
		let index = self.enum_definition_count;
		self.enum_definitions.i32(name_offset).u16(value_count).u16(first_value_index);
		self.enum_definition_count += 1;
		index
	}

	pub fn add_enum_option(&mut self, name_offset: i32) -> i32 {
		let index = self.enum_option_count;
		self.enum_options.i32(name_offset);
		self.enum_option_count += 1;
		index
	}

	/// Declares that `struct_count` consecutive instances of `struct_index`
	/// occupy the next region of the data section, in the order regions are
	/// expected to appear (see `compute_struct_offsets`).
	pub fn add_data_mapping(&mut self, struct_index: i32, struct_count: i32) {
		self.data_mappings.i32(struct_index).i32(struct_count);
		self.data_mapping_count += 1;
	}

	pub fn add_record(&mut self, struct_index: i32, instance_index: i32, id: Uuid, name_offset: i32, filename_offset: i32) -> i32 {
		let index = self.record_definition_count;
		self.records.i32(struct_index).i32(instance_index).bytes(&id.to_bytes_le()).i32(name_offset).i32(filename_offset).u16(0).u16(0);
		self.record_definition_count += 1;
		index
	}

	pub fn intern_name(&mut self, name: &str) -> i32 {
		let offset = self.names.len() as i32;
		self.names.extend_from_slice(name.as_bytes());
		self.names.push(0);
		offset
	}

	pub fn intern_string(&mut self, value: &str) -> i32 {
		let offset = self.strings.len() as i32;
		self.strings.extend_from_slice(value.as_bytes());
		self.strings.push(0);
		offset
	}

	pub fn push_bool(&mut self, v: bool) -> i32 {
		self.bool_pool.push(&[v as u8])
	}
	pub fn push_int8(&mut self, v: i8) -> i32 {
		self.int8_pool.push(&v.to_le_bytes())
	}
	pub fn push_int16(&mut self, v: i16) -> i32 {
		self.int16_pool.push(&v.to_le_bytes())
	}
	pub fn push_int32(&mut self, v: i32) -> i32 {
		self.int32_pool.push(&v.to_le_bytes())
	}
	pub fn push_int64(&mut self, v: i64) -> i32 {
		self.int64_pool.push(&v.to_le_bytes())
	}
	pub fn push_uint8(&mut self, v: u8) -> i32 {
		self.uint8_pool.push(&v.to_le_bytes())
	}
	pub fn push_uint16(&mut self, v: u16) -> i32 {
		self.uint16_pool.push(&v.to_le_bytes())
	}
	pub fn push_uint32(&mut self, v: u32) -> i32 {
		self.uint32_pool.push(&v.to_le_bytes())
	}
	pub fn push_uint64(&mut self, v: u64) -> i32 {
		self.uint64_pool.push(&v.to_le_bytes())
	}
	pub fn push_single(&mut self, v: f32) -> i32 {
		self.single_pool.push(&v.to_le_bytes())
	}
	pub fn push_double(&mut self, v: f64) -> i32 {
		self.double_pool.push(&v.to_le_bytes())
	}
	pub fn push_guid(&mut self, v: Uuid) -> i32 {
		self.guid_pool.push(&v.to_bytes_le())
	}
	pub fn push_string_id(&mut self, string_offset: i32) -> i32 {
		self.string_id_pool.push(&string_offset.to_le_bytes())
	}
	pub fn push_locale(&mut self, string_offset: i32) -> i32 {
		self.locale_pool.push(&string_offset.to_le_bytes())
	}
	/// Pushes an index into the name pool, the same shape scalar and array
	/// `EnumChoice` properties both address.
	pub fn push_enum_value(&mut self, name_offset: i32) -> i32 {
		self.enum_value_pool.push(&name_offset.to_le_bytes())
	}
	pub fn push_strong_pointer(&mut self, struct_index: i32, instance_index: i32) -> i32 {
		self.strong_pointer_pool.push(&{
			let mut b = Buf::default();
			b.i32(struct_index).i32(instance_index);
			b.0
		})
	}
	pub fn push_weak_pointer(&mut self, struct_index: i32, instance_index: i32) -> i32 {
		self.weak_pointer_pool.push(&{
			let mut b = Buf::default();
			b.i32(struct_index).i32(instance_index);
			b.0
		})
	}
	pub fn push_reference(&mut self, id: Uuid, instance_index: i32) -> i32 {
		self.reference_pool.push(&{
			let mut b = Buf::default();
			b.bytes(&id.to_bytes_le()).i32(instance_index);
			b.0
		})
	}

	/// Appends raw bytes to the instance data section. Callers are
	/// responsible for matching the struct layout and ordering declared via
	/// [`Self::add_data_mapping`].
	pub fn push_instance_bytes(&mut self, bytes: &[u8]) {
		self.data_section.extend_from_slice(bytes);
	}

	pub fn build(self) -> Vec<u8> {
		let mut out = Buf::default();
		out.u32(0); // _unknown1
		out.u32(6); // version: always emit the two-pool layout in tests
		out.u32(0); // _unknown2
		out.u32(0); // _unknown3

		out.i32(self.struct_definition_count);
		out.i32(self.property_definition_count);
		out.i32(self.enum_definition_count);
		out.i32(self.data_mapping_count);
		out.i32(self.record_definition_count);

		out.i32(self.bool_pool.count);
		out.i32(self.int8_pool.count);
		out.i32(self.int16_pool.count);
		out.i32(self.int32_pool.count);
		out.i32(self.int64_pool.count);
		out.i32(self.uint8_pool.count);
		out.i32(self.uint16_pool.count);
		out.i32(self.uint32_pool.count);
		out.i32(self.uint64_pool.count);
		out.i32(self.single_pool.count);
		out.i32(self.double_pool.count);
		out.i32(self.guid_pool.count);
		out.i32(self.string_id_pool.count);
		out.i32(self.locale_pool.count);
		out.i32(self.enum_value_pool.count);
		out.i32(self.strong_pointer_pool.count);
		out.i32(self.weak_pointer_pool.count);
		out.i32(self.reference_pool.count);
		out.i32(self.enum_option_count);

		out.u32(self.strings.len() as u32);
		out.u32(self.names.len() as u32);

		out.bytes(&self.struct_definitions.0);
		out.bytes(&self.property_definitions.0);
		out.bytes(&self.enum_definitions.0);
		out.bytes(&self.enum_options.0);
		out.bytes(&self.data_mappings.0);
		out.bytes(&self.records.0);

		out.bytes(&self.int8_pool.bytes);
		out.bytes(&self.int16_pool.bytes);
		out.bytes(&self.int32_pool.bytes);
		out.bytes(&self.int64_pool.bytes);
		out.bytes(&self.uint8_pool.bytes);
		out.bytes(&self.uint16_pool.bytes);
		out.bytes(&self.uint32_pool.bytes);
		out.bytes(&self.uint64_pool.bytes);
		out.bytes(&self.bool_pool.bytes);
		out.bytes(&self.single_pool.bytes);
		out.bytes(&self.double_pool.bytes);
		out.bytes(&self.guid_pool.bytes);
		out.bytes(&self.string_id_pool.bytes);
		out.bytes(&self.locale_pool.bytes);
		out.bytes(&self.enum_value_pool.bytes);
		out.bytes(&self.strong_pointer_pool.bytes);
		out.bytes(&self.weak_pointer_pool.bytes);
		out.bytes(&self.reference_pool.bytes);

		out.bytes(&self.strings);
		out.bytes(&self.names);
		out.bytes(&self.data_section);

		out.0
	}
}

use crate::error::{ReadError, ReadResult};
use crate::raw::header::Header;
use crate::raw::pools::Pool;
use crate::raw::schema::{
	DataMapping, EnumDefinition, EnumOptionDefinition, PointerHandle, PropertyDefinition, ReferenceHandle, RecordDefinition, StructDefinition,
};
use crate::raw::strings::StringPool;
use crate::utilities::FromByteStream;
use derivative::Derivative;
use fxhash::{FxHashMap, FxHasher64};
use owning_ref::ArcRef;
use std::hash::Hasher;
use std::io::Cursor;
use std::sync::Arc;
use uuid::Uuid;

/// A fully parsed, immutable DataCore archive.
///
/// Construction reads every section exactly once, in the fixed order the
/// on-disk format lays them out in (see module docs on each raw type for the
/// per-field order within the header). Everything returned after that is a
/// bounds-checked, read-only view over the original bytes; no accessor here
/// mutates state, and the whole value is safe to share across threads.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Database {
	header: Header,

	#[derivative(Debug = "ignore")]
	struct_definitions: Vec<StructDefinition>,
	#[derivative(Debug = "ignore")]
	property_definitions: Vec<PropertyDefinition>,
	#[derivative(Debug = "ignore")]
	enum_definitions: Vec<EnumDefinition>,
	#[derivative(Debug = "ignore")]
	enum_options: Vec<EnumOptionDefinition>,
	#[derivative(Debug = "ignore")]
	data_mappings: Vec<DataMapping>,
	#[derivative(Debug = "ignore")]
	records: Vec<RecordDefinition>,

	#[derivative(Debug = "ignore")]
	bool_pool: Pool<bool>,
	#[derivative(Debug = "ignore")]
	int8_pool: Pool<i8>,
	#[derivative(Debug = "ignore")]
	int16_pool: Pool<i16>,
	#[derivative(Debug = "ignore")]
	int32_pool: Pool<i32>,
	#[derivative(Debug = "ignore")]
	int64_pool: Pool<i64>,
	#[derivative(Debug = "ignore")]
	uint8_pool: Pool<u8>,
	#[derivative(Debug = "ignore")]
	uint16_pool: Pool<u16>,
	#[derivative(Debug = "ignore")]
	uint32_pool: Pool<u32>,
	#[derivative(Debug = "ignore")]
	uint64_pool: Pool<u64>,
	#[derivative(Debug = "ignore")]
	single_pool: Pool<f32>,
	#[derivative(Debug = "ignore")]
	double_pool: Pool<f64>,
	#[derivative(Debug = "ignore")]
	guid_pool: Pool<Uuid>,
	#[derivative(Debug = "ignore")]
	string_id_pool: Pool<i32>,
	#[derivative(Debug = "ignore")]
	locale_pool: Pool<i32>,
	#[derivative(Debug = "ignore")]
	enum_value_pool: Pool<i32>,
	#[derivative(Debug = "ignore")]
	strong_pointer_pool: Pool<PointerHandle>,
	#[derivative(Debug = "ignore")]
	weak_pointer_pool: Pool<PointerHandle>,
	#[derivative(Debug = "ignore")]
	reference_pool: Pool<ReferenceHandle>,

	/// Content strings (file paths, user-facing text).
	string_pool: StringPool,
	/// Schema and record names. Aliases `string_pool`'s bytes on archives
	/// older than version 6, which carry only one pool.
	name_pool: StringPool,

	#[derivative(Debug = "ignore")]
	data_section: ArcRef<[u8]>,
	#[derivative(Debug = "ignore")]
	struct_offsets: Vec<usize>,

	#[derivative(Debug = "ignore")]
	record_map: FxHashMap<Uuid, usize>,
	#[derivative(Debug = "ignore")]
	main_record_indices: Vec<usize>,

	struct_fingerprint: u64,
	enum_fingerprint: u64,
}

fn read_structs<T: FromByteStream<Deps = ()>>(stream: &mut Cursor<&[u8]>, count: i32) -> ReadResult<Vec<T>> {
	let count = count.max(0) as usize;
	let mut out = Vec::with_capacity(count);
	for _ in 0..count {
		out.push(T::read(stream, &())?);
	}
	Ok(out)
}

fn make_pool<T: FromByteStream<Deps = ()>>(bytes: &ArcRef<[u8]>, offset: &mut usize, count: i32, element_size: usize) -> Pool<T> {
	let count = count.max(0) as usize;
	let len = count * element_size;
	let start = *offset;
	let end = start + len;
	let slice = bytes.clone().map(|full| &full[start..end]);
	*offset = end;
	Pool::new(slice, count)
}

impl Database {
	/// Loads an archive already fully resident in memory. Use [`Database::open`]
	/// (behind the `mmap` feature) to map a file instead of copying it.
	pub fn parse(data: Vec<u8>) -> ReadResult<Self> {
		let owned: Arc<[u8]> = Arc::from(data.into_boxed_slice());
		Self::parse_arc(ArcRef::new(owned))
	}

	#[cfg(feature = "mmap")]
	pub fn open(path: impl AsRef<std::path::Path>) -> ReadResult<Self> {
		let file = std::fs::File::open(path).map_err(ReadError::Mmap)?;
		let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(ReadError::Mmap)?;
		let bytes: Arc<[u8]> = Arc::from(&mmap[..]);
		drop(mmap);
		Self::parse_arc(ArcRef::new(bytes))
	}

	fn parse_arc(bytes: ArcRef<[u8]>) -> ReadResult<Self> {
		let full = bytes.clone().map(|b| &b[..]);
		let mut cursor = Cursor::new(&full[..]);
		let header = Header::read(&mut cursor)?;

		let struct_definitions = read_structs::<StructDefinition>(&mut cursor, header.struct_definition_count)?;
		let property_definitions = read_structs::<PropertyDefinition>(&mut cursor, header.property_definition_count)?;
		let enum_definitions = read_structs::<EnumDefinition>(&mut cursor, header.enum_definition_count)?;
		let enum_options = read_structs::<EnumOptionDefinition>(&mut cursor, header.enum_option_count)?;
		let data_mappings = read_structs::<DataMapping>(&mut cursor, header.data_mapping_count)?;
		let records = read_structs::<RecordDefinition>(&mut cursor, header.record_definition_count)?;

		let mut offset = cursor.position() as usize;

		let int8_pool = make_pool::<i8>(&bytes, &mut offset, header.int8_count, 1);
		let int16_pool = make_pool::<i16>(&bytes, &mut offset, header.int16_count, 2);
		let int32_pool = make_pool::<i32>(&bytes, &mut offset, header.int32_count, 4);
		let int64_pool = make_pool::<i64>(&bytes, &mut offset, header.int64_count, 8);
		let uint8_pool = make_pool::<u8>(&bytes, &mut offset, header.uint8_count, 1);
		let uint16_pool = make_pool::<u16>(&bytes, &mut offset, header.uint16_count, 2);
		let uint32_pool = make_pool::<u32>(&bytes, &mut offset, header.uint32_count, 4);
		let uint64_pool = make_pool::<u64>(&bytes, &mut offset, header.uint64_count, 8);
		let bool_pool = make_pool::<bool>(&bytes, &mut offset, header.bool_count, 1);
		let single_pool = make_pool::<f32>(&bytes, &mut offset, header.single_count, 4);
		let double_pool = make_pool::<f64>(&bytes, &mut offset, header.double_count, 8);
		let guid_pool = make_pool::<Uuid>(&bytes, &mut offset, header.guid_count, 16);
		let string_id_pool = make_pool::<i32>(&bytes, &mut offset, header.string_id_count, 4);
		let locale_pool = make_pool::<i32>(&bytes, &mut offset, header.locale_count, 4);
		let enum_value_pool = make_pool::<i32>(&bytes, &mut offset, header.enum_value_count, 4);
		let strong_pointer_pool = make_pool::<PointerHandle>(&bytes, &mut offset, header.strong_pointer_count, 8);
		let weak_pointer_pool = make_pool::<PointerHandle>(&bytes, &mut offset, header.weak_pointer_count, 8);
		let reference_pool = make_pool::<ReferenceHandle>(&bytes, &mut offset, header.reference_count, 20);

		let string_pool_1_len = header.string_pool_1_length as usize;
		let string_pool_1 = bytes.clone().map(|b| &b[offset..offset + string_pool_1_len]);
		offset += string_pool_1_len;

		let (string_pool, name_pool) = if header.has_separate_name_pool() {
			let string_pool_2_len = header.string_pool_2_length as usize;
			let string_pool_2 = bytes.clone().map(|b| &b[offset..offset + string_pool_2_len]);
			offset += string_pool_2_len;
			(StringPool::new(string_pool_1), StringPool::new(string_pool_2))
		} else {
			(StringPool::new(string_pool_1.clone()), StringPool::new(string_pool_1))
		};

		let data_section = bytes.clone().map(|b| &b[offset..]);

		let struct_offsets = compute_struct_offsets(&struct_definitions, &data_mappings);
		let (record_map, main_record_indices) = index_records(&records);

		let struct_fingerprint = fingerprint_structs(&struct_definitions, &property_definitions);
		let enum_fingerprint = fingerprint_enums(&enum_definitions, &enum_options);

		Ok(Database {
			header,
			struct_definitions,
			property_definitions,
			enum_definitions,
			enum_options,
			data_mappings,
			records,
			bool_pool,
			int8_pool,
			int16_pool,
			int32_pool,
			int64_pool,
			uint8_pool,
			uint16_pool,
			uint32_pool,
			uint64_pool,
			single_pool,
			double_pool,
			guid_pool,
			string_id_pool,
			locale_pool,
			enum_value_pool,
			strong_pointer_pool,
			weak_pointer_pool,
			reference_pool,
			string_pool,
			name_pool,
			data_section,
			struct_offsets,
			record_map,
			main_record_indices,
			struct_fingerprint,
			enum_fingerprint,
		})
	}

	pub fn header(&self) -> &Header {
		&self.header
	}

	pub fn struct_definitions(&self) -> &[StructDefinition] {
		&self.struct_definitions
	}

	pub fn property_definitions(&self) -> &[PropertyDefinition] {
		&self.property_definitions
	}

	pub fn enum_definitions(&self) -> &[EnumDefinition] {
		&self.enum_definitions
	}

	pub fn struct_fingerprint(&self) -> u64 {
		self.struct_fingerprint
	}

	pub fn enum_fingerprint(&self) -> u64 {
		self.enum_fingerprint
	}

	/// Fails with [`ReadError::SchemaMismatch`] if either fingerprint, or the
	/// struct/enum table count, disagrees with what generated code expects.
	pub fn validate_schema(&self, expected_struct_count: usize, expected_enum_count: usize, expected_struct_hash: u64, expected_enum_hash: u64) -> ReadResult<()> {
		if self.struct_definitions.len() != expected_struct_count
			|| self.enum_definitions.len() != expected_enum_count
			|| self.struct_fingerprint != expected_struct_hash
			|| self.enum_fingerprint != expected_enum_hash
		{
			return Err(ReadError::SchemaMismatch {
				expected_struct_hash,
				actual_struct_hash: self.struct_fingerprint,
				expected_enum_hash,
				actual_enum_hash: self.enum_fingerprint,
			});
		}
		Ok(())
	}

	fn struct_def(&self, struct_index: i32) -> ReadResult<&StructDefinition> {
		self.struct_definitions
			.get(struct_index as usize)
			.ok_or(ReadError::BadIndex { kind: "struct", index: struct_index as i64, len: self.struct_definitions.len() })
	}

	/// The struct's own properties together with every ancestor's, in
	/// base-to-derived order, matching the instance's on-disk layout.
	pub fn get_struct_properties(&self, struct_index: i32) -> ReadResult<Vec<PropertyDefinition>> {
		let mut chain = Vec::new();
		let mut current = struct_index;
		while current >= 0 {
			let def = self.struct_def(current)?;
			chain.push(*def);
			current = def.parent_type_index;
		}
		chain.reverse();

		let mut properties = Vec::new();
		for def in chain {
			let first = def.first_attribute_index as usize;
			let count = def.attribute_count as usize;
			let slice = self
				.property_definitions
				.get(first..first + count)
				.ok_or(ReadError::BadIndex { kind: "property", index: first as i64, len: self.property_definitions.len() })?;
			properties.extend_from_slice(slice);
		}
		Ok(properties)
	}

	/// A cursor positioned at the first byte of the given instance.
	pub fn get_reader(&self, struct_index: i32, instance_index: i32) -> ReadResult<Cursor<&[u8]>> {
		let def = self.struct_def(struct_index)?;
		let base = *self
			.struct_offsets
			.get(struct_index as usize)
			.ok_or(ReadError::BadIndex { kind: "struct", index: struct_index as i64, len: self.struct_offsets.len() })?;
		let stride = def.struct_size as usize;
		let start = base + stride * instance_index.max(0) as usize;
		let end = start + stride;
		let bytes = self.data_section.get(start..end).ok_or(ReadError::EndOfBuffer)?;
		Ok(Cursor::new(bytes))
	}

	pub fn get_record(&self, id: Uuid) -> ReadResult<&RecordDefinition> {
		let idx = *self.record_map.get(&id).ok_or(ReadError::UnknownRecord(id))?;
		Ok(&self.records[idx])
	}

	pub fn get_record_by_index(&self, index: usize) -> ReadResult<&RecordDefinition> {
		self.records.get(index).ok_or(ReadError::BadIndex { kind: "record", index: index as i64, len: self.records.len() })
	}

	/// The single entry point reference resolution goes through: look up a
	/// record's `(struct_index, instance_index)` and whether it is itself a
	/// file-owning main record, without failing when the GUID is unknown.
	pub fn try_get_record_info(&self, id: Uuid) -> Option<(i32, i32, bool, i32)> {
		let idx = *self.record_map.get(&id)?;
		let record = &self.records[idx];
		let is_main = self.main_record_indices.binary_search(&idx).is_ok();
		Some((record.struct_index, record.instance_index, is_main, record.filename_offset))
	}

	pub fn main_records(&self) -> impl Iterator<Item = &RecordDefinition> + '_ {
		self.main_record_indices.iter().map(move |&i| &self.records[i])
	}

	pub fn struct_name(&self, struct_index: i32) -> Option<&str> {
		self.name_pool.get(self.struct_definitions.get(struct_index as usize)?.name_offset)
	}

	pub fn property_name(&self, property: &PropertyDefinition) -> Option<&str> {
		self.name_pool.get(property.name_offset)
	}

	pub fn enum_name(&self, enum_index: i32) -> Option<&str> {
		self.name_pool.get(self.enum_definitions.get(enum_index as usize)?.name_offset)
	}

	pub fn enum_option_name(&self, option_index: i32) -> Option<&str> {
		self.name_pool.get(self.enum_options.get(option_index as usize)?.name_offset)
	}

	pub fn enum_options(&self, enum_index: i32) -> Option<&[EnumOptionDefinition]> {
		let def = self.enum_definitions.get(enum_index as usize)?;
		let first = def.first_value_index as usize;
		let count = def.value_count as usize;
		self.enum_options.get(first..first + count)
	}

	pub fn record_name(&self, record: &RecordDefinition) -> Option<&str> {
		self.name_pool.get(record.name_offset)
	}

	pub fn record_file_name(&self, record: &RecordDefinition) -> Option<&str> {
		self.string_pool.get(record.filename_offset)
	}

	pub fn string(&self, offset: i32) -> Option<&str> {
		self.string_pool.get(offset)
	}

	pub fn name(&self, offset: i32) -> Option<&str> {
		self.name_pool.get(offset)
	}

	pub fn locale_string(&self, locale_index: i32) -> ReadResult<Option<&str>> {
		let offset = self.locale_pool.get(locale_index)?;
		Ok(self.string_pool.get(offset))
	}

	pub fn string_from_id(&self, string_id_index: i32) -> ReadResult<Option<&str>> {
		let offset = self.string_id_pool.get(string_id_index)?;
		Ok(self.string_pool.get(offset))
	}

	/// Resolves one enum-array slot's pool entry to the name-pool offset it
	/// stores. Scalar `EnumChoice` properties skip this indirection entirely,
	/// since their inline bytes already are that offset (see
	/// [`crate::structured::Runtime::enum_parse`]).
	pub fn enum_value_offset(&self, enum_value_index: i32) -> ReadResult<i32> {
		self.enum_value_pool.get(enum_value_index)
	}

	pub fn bool_pool(&self) -> &Pool<bool> {
		&self.bool_pool
	}
	pub fn int8_pool(&self) -> &Pool<i8> {
		&self.int8_pool
	}
	pub fn int16_pool(&self) -> &Pool<i16> {
		&self.int16_pool
	}
	pub fn int32_pool(&self) -> &Pool<i32> {
		&self.int32_pool
	}
	pub fn int64_pool(&self) -> &Pool<i64> {
		&self.int64_pool
	}
	pub fn uint8_pool(&self) -> &Pool<u8> {
		&self.uint8_pool
	}
	pub fn uint16_pool(&self) -> &Pool<u16> {
		&self.uint16_pool
	}
	pub fn uint32_pool(&self) -> &Pool<u32> {
		&self.uint32_pool
	}
	pub fn uint64_pool(&self) -> &Pool<u64> {
		&self.uint64_pool
	}
	pub fn single_pool(&self) -> &Pool<f32> {
		&self.single_pool
	}
	pub fn double_pool(&self) -> &Pool<f64> {
		&self.double_pool
	}
	pub fn guid_pool(&self) -> &Pool<Uuid> {
		&self.guid_pool
	}
	pub fn strong_pointer_pool(&self) -> &Pool<PointerHandle> {
		&self.strong_pointer_pool
	}
	pub fn weak_pointer_pool(&self) -> &Pool<PointerHandle> {
		&self.weak_pointer_pool
	}
	pub fn reference_pool(&self) -> &Pool<ReferenceHandle> {
		&self.reference_pool
	}
}

/// Base byte offset, within the instance data section, of every struct's
/// instance region. Derived from the data-mapping table rather than stored
/// directly: each mapping names a struct index and how many instances of it
/// appear, in the order struct regions are laid out, so offsets accumulate
/// as `offset += struct_size * struct_count` while walking the table once.
fn compute_struct_offsets(structs: &[StructDefinition], mappings: &[DataMapping]) -> Vec<usize> {
	let mut offsets = vec![0usize; structs.len()];
	let mut cursor = 0usize;
	for mapping in mappings {
		let idx = mapping.struct_index;
		if idx < 0 || idx as usize >= structs.len() {
			continue;
		}
		offsets[idx as usize] = cursor;
		cursor += structs[idx as usize].struct_size as usize * mapping.struct_count.max(0) as usize;
	}
	offsets
}

/// A GUID is a "main record" the first time its file-name offset is seen;
/// later records sharing the same file are internal to it. Grounded on the
/// closest sibling reader's main-record derivation heuristic, since the
/// header carries no explicit main-record flag on every version.
fn index_records(records: &[RecordDefinition]) -> (FxHashMap<Uuid, usize>, Vec<usize>) {
	let mut record_map = FxHashMap::default();
	let mut seen_files: FxHashMap<i32, ()> = FxHashMap::default();
	let mut main_indices = Vec::new();

	for (i, record) in records.iter().enumerate() {
		let id = Uuid::from_bytes_le(record.id);
		record_map.insert(id, i);
		if seen_files.insert(record.filename_offset, ()).is_none() {
			main_indices.push(i);
		}
	}
	main_indices.sort_unstable();
	(record_map, main_indices)
}

fn fingerprint_structs(structs: &[StructDefinition], properties: &[PropertyDefinition]) -> u64 {
	let mut hasher = FxHasher64::default();
	for s in structs {
		hasher.write_i32(s.name_offset);
		hasher.write_i32(s.parent_type_index);
		hasher.write_u16(s.attribute_count);
		hasher.write_u16(s.first_attribute_index);
		hasher.write_u32(s.struct_size);
	}
	for p in properties {
		hasher.write_i32(p.name_offset);
		hasher.write_i32(p.struct_index);
		hasher.write_u16(p.data_type);
		hasher.write_u16(p.conversion_type);
	}
	hasher.finish()
}

fn fingerprint_enums(enums: &[EnumDefinition], options: &[EnumOptionDefinition]) -> u64 {
	let mut hasher = FxHasher64::default();
	for e in enums {
		hasher.write_i32(e.name_offset);
		hasher.write_u16(e.value_count);
		hasher.write_u16(e.first_value_index);
	}
	for o in options {
		hasher.write_i32(o.name_offset);
	}
	hasher.finish()
}

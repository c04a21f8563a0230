//! Translates a parsed archive's schema tables into Rust source: one struct
//! per schema struct, one enum per schema enum, and a single dispatch table
//! tying struct indices back to the concrete types generated for them.
//!
//! Every emitted item is built from [`quote`] token trees rather than string
//! formatting, so the pieces compose the way the rest of the generator's
//! output does: a property becomes a `(field name, field type, read
//! expression)` triple, a struct folds its properties into a `Read` impl body,
//! and the whole schema folds into one dispatch `match`.

use datacore::raw::{DataType, Database, PropertyDefinition};
use fxhash::FxHashMap;
use proc_macro2::TokenStream;
use quote::quote;

use crate::naming::{field_ident, type_ident};

/// Maps every struct index to the set of structs that embed it, directly or
/// transitively, as `base`, paired with how many `.base` hops separate the
/// descendant from this struct. A struct with a non-empty entry here needs an
/// overridden [`Record::narrow`](datacore::Record::narrow) so a reference
/// declared against it can resolve to any of its descendants.
pub fn descendants_by_ancestor(db: &Database) -> FxHashMap<i32, Vec<(i32, u32)>> {
	let mut map: FxHashMap<i32, Vec<(i32, u32)>> = FxHashMap::default();
	for (index, def) in db.struct_definitions().iter().enumerate() {
		let index = index as i32;
		let mut depth = 1u32;
		let mut ancestor = def.parent_type_index;
		while ancestor >= 0 {
			map.entry(ancestor).or_default().push((index, depth));
			let Some(ancestor_def) = db.struct_definitions().get(ancestor as usize) else { break };
			ancestor = ancestor_def.parent_type_index;
			depth += 1;
		}
	}
	map
}

/// Disambiguates schema names that collide once sanitised into Rust
/// identifiers, by suffixing every name after the first with its table index.
/// Most archives never hit this path; it exists because nothing in the schema
/// itself guarantees cross-struct or cross-enum name uniqueness.
pub struct NameTable {
	names: FxHashMap<i32, String>,
}

impl NameTable {
	pub fn structs(db: &Database) -> Self {
		Self::build(db.struct_definitions().len(), |i| db.struct_name(i as i32).unwrap_or("Struct").to_owned())
	}

	pub fn enums(db: &Database) -> Self {
		Self::build(db.enum_definitions().len(), |i| db.enum_name(i as i32).unwrap_or("Enum").to_owned())
	}

	fn build(count: usize, name_of: impl Fn(usize) -> String) -> Self {
		let mut seen: FxHashMap<String, ()> = FxHashMap::default();
		let mut names = FxHashMap::default();
		for i in 0..count {
			let base = name_of(i);
			let name = match seen.insert(base.clone(), ()) {
				None => base,
				Some(()) => format!("{base}_{i}"),
			};
			names.insert(i as i32, name);
		}
		Self { names }
	}

	pub fn ident(&self, index: i32) -> proc_macro2::Ident {
		type_ident(self.names.get(&index).map(String::as_str).unwrap_or("Struct"))
	}
}

/// A single struct field: its Rust identifier, its type, and the expression
/// that reads it off the instance cursor (already ending in `?` where
/// fallible, ready to be used as the field's initializer).
struct FieldCode {
	name: proc_macro2::Ident,
	ty: TokenStream,
	read: TokenStream,
}

fn scalar_primitive_type(data_type: DataType) -> Option<TokenStream> {
	use DataType::*;
	Some(match data_type {
		Boolean => quote!(bool),
		Int8 => quote!(i8),
		Int16 => quote!(i16),
		Int32 => quote!(i32),
		Int64 => quote!(i64),
		UInt8 => quote!(u8),
		UInt16 => quote!(u16),
		UInt32 => quote!(u32),
		UInt64 => quote!(u64),
		Single => quote!(f32),
		Double => quote!(f64),
		Guid => quote!(::datacore::uuid::Uuid),
		_ => return None,
	})
}

/// One array property's element pool, for the primitive data types that have
/// a dedicated value pool rather than being addressed through the instance or
/// reference/pointer pools.
fn primitive_pool_accessor(data_type: DataType) -> Option<TokenStream> {
	use DataType::*;
	Some(match data_type {
		Boolean => quote!(bool_pool),
		Int8 => quote!(int8_pool),
		Int16 => quote!(int16_pool),
		Int32 => quote!(int32_pool),
		Int64 => quote!(int64_pool),
		UInt8 => quote!(uint8_pool),
		UInt16 => quote!(uint16_pool),
		UInt32 => quote!(uint32_pool),
		UInt64 => quote!(uint64_pool),
		Single => quote!(single_pool),
		Double => quote!(double_pool),
		Guid => quote!(guid_pool),
		_ => return None,
	})
}

/// Builds the `(field, type, read expression)` triple for one property,
/// dispatching first on whether it is an array, then on its element
/// [`DataType`]. `structs`/`enums` resolve a property's `struct_index` (whose
/// meaning itself depends on `data_type`, see [`PropertyDefinition`]) to the
/// Rust type generated for the target struct or enum.
fn property_field(db: &Database, prop: &PropertyDefinition, structs: &NameTable, enums: &NameTable) -> FieldCode {
	let name = field_ident(db.property_name(prop).unwrap_or("field"));
	let data_type = prop.data_type().expect("schema fingerprint validation rejects unknown data type tags before generated code runs");

	if prop.is_array() {
		return array_field(name, data_type, prop.struct_index, structs, enums);
	}
	scalar_field(name, data_type, prop.struct_index, structs, enums)
}

fn scalar_field(name: proc_macro2::Ident, data_type: DataType, struct_index: i32, structs: &NameTable, enums: &NameTable) -> FieldCode {
	use DataType::*;

	if let Some(ty) = scalar_primitive_type(data_type) {
		let read = quote!(<#ty as ::datacore::FromByteStream>::read(cursor, &())?);
		return FieldCode { name, ty, read };
	}

	match data_type {
		// A scalar pool-backed property's inline bytes already are the
		// resolved pool element (a content- or name-pool offset); only array
		// properties index through the intermediate id pool first.
		StringId => FieldCode {
			ty: quote!(String),
			read: quote! {{
				let __offset = <i32 as ::datacore::FromByteStream>::read(cursor, &())?;
				runtime.database().string(__offset).unwrap_or_default().to_owned()
			}},
			name,
		},
		Locale => FieldCode {
			ty: quote!(String),
			read: quote! {{
				let __offset = <i32 as ::datacore::FromByteStream>::read(cursor, &())?;
				runtime.database().string(__offset).unwrap_or_default().to_owned()
			}},
			name,
		},
		EnumChoice => {
			let enum_ty = enums.ident(struct_index);
			FieldCode {
				ty: quote!(#enum_ty),
				read: quote! {{
					let __offset = <i32 as ::datacore::FromByteStream>::read(cursor, &())?;
					runtime.enum_parse(__offset, #enum_ty::from_name, #enum_ty::Unknown)
				}},
				name,
			}
		},
		Class => {
			let struct_ty = structs.ident(struct_index);
			FieldCode { ty: quote!(#struct_ty), read: quote!(#struct_ty::read(runtime, cursor)?), name }
		},
		Reference => {
			let struct_ty = structs.ident(struct_index);
			FieldCode {
				ty: quote!(Option<::datacore::LazyRef<#struct_ty>>),
				read: quote! {{
					let __handle = <::datacore::raw::ReferenceHandle as ::datacore::FromByteStream>::read(cursor, &())?;
					runtime.create_reference::<#struct_ty>(__handle)
				}},
				name,
			}
		},
		StrongPointer | WeakPointer => {
			let struct_ty = structs.ident(struct_index);
			FieldCode {
				ty: quote!(Option<::datacore::LazyRef<#struct_ty>>),
				read: quote! {{
					let __handle = <::datacore::raw::PointerHandle as ::datacore::FromByteStream>::read(cursor, &())?;
					runtime.create_pointer::<#struct_ty>(__handle)
				}},
				name,
			}
		},
		Boolean | Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64 | Single | Double | Guid => unreachable!("handled above"),
	}
}

fn array_field(name: proc_macro2::Ident, data_type: DataType, struct_index: i32, structs: &NameTable, enums: &NameTable) -> FieldCode {
	use DataType::*;

	let read_handle = quote!(let __handle = runtime.read_array_handle(cursor)?;);

	if let Some(pool) = primitive_pool_accessor(data_type) {
		let ty = scalar_primitive_type(data_type).expect("every primitive pool accessor has a matching scalar type");
		return FieldCode {
			ty: quote!(Vec<#ty>),
			read: quote! {{
				#read_handle
				runtime.database().#pool().slice(__handle.first_index, __handle.count)?
			}},
			name,
		};
	}

	match data_type {
		StringId => FieldCode {
			ty: quote!(Vec<String>),
			read: quote! {{
				#read_handle
				let mut __items = Vec::with_capacity(__handle.count.max(0) as usize);
				for __i in 0..__handle.count {
					__items.push(runtime.database().string_from_id(__handle.first_index + __i)?.unwrap_or_default().to_owned());
				}
				__items
			}},
			name,
		},
		Locale => FieldCode {
			ty: quote!(Vec<String>),
			read: quote! {{
				#read_handle
				let mut __items = Vec::with_capacity(__handle.count.max(0) as usize);
				for __i in 0..__handle.count {
					__items.push(runtime.database().locale_string(__handle.first_index + __i)?.unwrap_or_default().to_owned());
				}
				__items
			}},
			name,
		},
		EnumChoice => {
			let enum_ty = enums.ident(struct_index);
			FieldCode {
				ty: quote!(Vec<#enum_ty>),
				read: quote! {{
					#read_handle
					let mut __items = Vec::with_capacity(__handle.count.max(0) as usize);
					for __i in 0..__handle.count {
						let __offset = runtime.database().enum_value_offset(__handle.first_index + __i)?;
						__items.push(runtime.enum_parse(__offset, #enum_ty::from_name, #enum_ty::Unknown));
					}
					__items
				}},
				name,
			}
		},
		Class => {
			let struct_ty = structs.ident(struct_index);
			FieldCode {
				ty: quote!(Vec<::std::sync::Arc<#struct_ty>>),
				read: quote! {{
					#read_handle
					let mut __items = Vec::with_capacity(__handle.count.max(0) as usize);
					for __i in 0..__handle.count {
						let __idx = __handle.first_index + __i;
						let __item = runtime
							.get_or_read_instance::<#struct_ty>(#struct_ty::STRUCT_INDEX, __idx)?
							.ok_or(::datacore::RuntimeError::NullDispatch { struct_index: #struct_ty::STRUCT_INDEX, instance_index: __idx })?;
						__items.push(__item);
					}
					__items
				}},
				name,
			}
		},
		Reference => {
			let struct_ty = structs.ident(struct_index);
			FieldCode {
				ty: quote!(Vec<Option<::datacore::LazyRef<#struct_ty>>>),
				read: quote! {{
					#read_handle
					runtime
						.database()
						.reference_pool()
						.slice(__handle.first_index, __handle.count)?
						.into_iter()
						.map(|__h| runtime.create_reference::<#struct_ty>(__h))
						.collect::<Vec<_>>()
				}},
				name,
			}
		},
		StrongPointer => {
			let struct_ty = structs.ident(struct_index);
			FieldCode {
				ty: quote!(Vec<Option<::datacore::LazyRef<#struct_ty>>>),
				read: quote! {{
					#read_handle
					runtime
						.database()
						.strong_pointer_pool()
						.slice(__handle.first_index, __handle.count)?
						.into_iter()
						.map(|__h| runtime.create_pointer::<#struct_ty>(__h))
						.collect::<Vec<_>>()
				}},
				name,
			}
		},
		WeakPointer => {
			let struct_ty = structs.ident(struct_index);
			FieldCode {
				ty: quote!(Vec<Option<::datacore::LazyRef<#struct_ty>>>),
				read: quote! {{
					#read_handle
					runtime
						.database()
						.weak_pointer_pool()
						.slice(__handle.first_index, __handle.count)?
						.into_iter()
						.map(|__h| runtime.create_pointer::<#struct_ty>(__h))
						.collect::<Vec<_>>()
				}},
				name,
			}
		},
		Boolean | Int8 | Int16 | Int32 | Int64 | UInt8 | UInt16 | UInt32 | UInt64 | Single | Double | Guid => unreachable!("handled above"),
	}
}

/// Emits one enum: a plain-data variant per option, plus an always-present
/// `Unknown` variant used as the fallback `Runtime::enum_parse` falls back to
/// when a string id names no known option (schema drift, or a value this
/// reader's snapshot of the enum table predates).
pub fn generate_enum(db: &Database, enum_index: i32, enums: &NameTable) -> TokenStream {
	let enum_ty = enums.ident(enum_index);
	let options = db.enum_options(enum_index).unwrap_or(&[]);

	let mut variant_idents = Vec::with_capacity(options.len());
	let mut variant_names = Vec::with_capacity(options.len());
	for (i, _) in options.iter().enumerate() {
		let name = db.enum_option_name((db.enum_definitions()[enum_index as usize].first_value_index as i32) + i as i32).unwrap_or("Unknown");
		variant_idents.push(type_ident(name));
		variant_names.push(name.to_owned());
	}

	quote! {
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
		pub enum #enum_ty {
			#(#variant_idents,)*
			/// Fallback for a string id this enum's schema snapshot does not name.
			Unknown,
		}

		impl #enum_ty {
			pub fn from_name(name: &str) -> Option<Self> {
				match name {
					#(#variant_names => Some(Self::#variant_idents),)*
					_ => None,
				}
			}
		}
	}
}

/// Emits one struct: its own properties as fields (ancestor properties live
/// in the embedded `base`, not duplicated here), plus its `Record` impl.
///
/// `narrow` is overridden, rather than left at its downcast-only default,
/// exactly when some other struct embeds this one transitively as `base`: the
/// override tries every descendant's type-erased value in turn and clones the
/// matching `.base` chain back out, so a `reference<Base>` field can resolve
/// to a `Derived` stored on disk without the runtime ever naming `Derived`.
pub fn generate_struct(db: &Database, struct_index: i32, structs: &NameTable, enums: &NameTable, descendants: &FxHashMap<i32, Vec<(i32, u32)>>) -> TokenStream {
	let struct_ty = structs.ident(struct_index);
	let def = &db.struct_definitions()[struct_index as usize];
	let has_parent = def.parent_type_index >= 0;

	let own_properties: Vec<PropertyDefinition> = {
		let first = def.first_attribute_index as usize;
		let count = def.attribute_count as usize;
		db.property_definitions().get(first..first + count).map(<[_]>::to_vec).unwrap_or_default()
	};

	let fields: Vec<FieldCode> = own_properties.iter().map(|p| property_field(db, p, structs, enums)).collect();
	let field_names: Vec<_> = fields.iter().map(|f| &f.name).collect();
	let field_types: Vec<_> = fields.iter().map(|f| &f.ty).collect();
	let field_reads: Vec<_> = fields.iter().map(|f| &f.read).collect();

	let base_decl = has_parent.then(|| {
		let parent_ty = structs.ident(def.parent_type_index);
		quote!(pub base: #parent_ty,)
	});
	let base_field_init = has_parent.then(|| quote!(base,));
	let base_read_stmt = has_parent.then(|| {
		let parent_ty = structs.ident(def.parent_type_index);
		quote!(let base = #parent_ty::read(runtime, cursor)?;)
	});

	let narrow_override = match descendants.get(&struct_index) {
		None | Some([]) => quote!(),
		Some(children) => {
			let arms = children.iter().map(|(descendant_index, depth)| {
				let descendant_ty = structs.ident(*descendant_index);
				let hops = (0..*depth).map(|_| quote!(.base));
				quote! {
					if let Ok(__v) = ::std::sync::Arc::downcast::<#descendant_ty>(any.clone()) {
						return Some(::std::sync::Arc::new(__v #(#hops)* .clone()));
					}
				}
			});
			quote! {
				fn narrow(any: ::std::sync::Arc<dyn ::std::any::Any + Send + Sync>) -> Option<::std::sync::Arc<Self>> {
					if let Ok(v) = ::std::sync::Arc::downcast::<Self>(any.clone()) {
						return Some(v);
					}
					#(#arms)*
					None
				}
			}
		},
	};

	quote! {
		#[derive(Debug, Clone)]
		pub struct #struct_ty {
			#base_decl
			#(pub #field_names: #field_types,)*
		}

		impl ::datacore::Record for #struct_ty {
			const STRUCT_INDEX: i32 = #struct_index;

			fn read(runtime: &::std::sync::Arc<::datacore::Runtime>, cursor: &mut ::std::io::Cursor<&[u8]>) -> ::datacore::RuntimeResult<Self> {
				#base_read_stmt
				#(let #field_names = { #field_reads };)*
				Ok(Self { #base_field_init #(#field_names,)* })
			}

			#narrow_override
		}
	}
}

/// Emits the crate-wide dispatch table: one `match` arm per struct, each
/// calling `Runtime::get_or_read_instance` for that struct's concrete type
/// and erasing the result back behind `Arc<dyn Any>`. An index outside the
/// schema's struct table is generator/runtime drift, not a data error, and is
/// reported as [`RuntimeError::NullDispatch`](datacore::RuntimeError::NullDispatch).
pub fn generate_dispatch(db: &Database, structs: &NameTable, dispatcher_name: &str) -> TokenStream {
	let dispatcher_ty = type_ident(dispatcher_name);
	let arms = (0..db.struct_definitions().len() as i32).map(|struct_index| {
		let struct_ty = structs.ident(struct_index);
		quote! {
			#struct_index => runtime
				.get_or_read_instance::<#struct_ty>(struct_index, instance_index)
				.map(|v| v.map(|v| v as ::std::sync::Arc<dyn ::std::any::Any + Send + Sync>)),
		}
	});

	quote! {
		#[derive(Debug, Default)]
		pub struct #dispatcher_ty;

		impl ::datacore::Dispatch for #dispatcher_ty {
			fn dispatch(
				&self,
				runtime: &::std::sync::Arc<::datacore::Runtime>,
				struct_index: i32,
				instance_index: i32,
			) -> ::datacore::RuntimeResult<Option<::std::sync::Arc<dyn ::std::any::Any + Send + Sync>>> {
				match struct_index {
					#(#arms)*
					_ => Err(::datacore::RuntimeError::NullDispatch { struct_index, instance_index }),
				}
			}
		}
	}
}

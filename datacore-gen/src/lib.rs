//! Generates a Rust module tree of [`datacore::Record`] types and a
//! [`datacore::Dispatch`] implementation from a parsed [`datacore::Database`].
//!
//! Output is four files: `structs.rs`, `enums.rs`, `dispatch.rs`, and a small
//! `schema.rs` carrying the fingerprint/count constants
//! [`datacore::Runtime::validate_schema`] checks generated code against at
//! load time, plus a `mod.rs` wiring them together. Each is produced by
//! building a [`proc_macro2::TokenStream`] in [`codegen`] and formatting it
//! with `prettyplease`, the same shape the teacher's own proc-macro crate
//! uses for its derive output, just driven at archive-parse time instead of
//! compile time.

pub mod codegen;
mod naming;

use codegen::{descendants_by_ancestor, generate_dispatch, generate_enum, generate_struct, NameTable};
use datacore::raw::Database;
use std::fs;
use std::path::{Path, PathBuf};

/// Tunables for one generation run. Kept as a plain struct, separate from the
/// `clap` CLI front-end, so the generator can also be driven programmatically
/// (for instance from a build script or a test that generates into a temp dir).
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
	/// Directory the generated `.rs` files are written into. Created if
	/// missing.
	pub output_dir: PathBuf,
	/// Name of the struct generated to implement [`datacore::Dispatch`].
	pub dispatcher_name: String,
	/// Whether to also emit `schema.rs` with the archive's fingerprint and
	/// table-count constants.
	pub emit_manifest: bool,
	/// Rust's nearest analogue of a target namespace: when set, the four
	/// generated files are written one level deeper, under
	/// `output_dir/module_name/`, and `output_dir/mod.rs` is reduced to a
	/// single `pub mod #module_name;` pointing at that submodule — so the
	/// struct/enum/dispatch tree for one archive schema can sit alongside
	/// another's under a shared parent module instead of colliding on
	/// `enums`/`structs`/`dispatch`. `None` keeps the flat, single-schema
	/// layout of writing those four files directly under `output_dir`.
	pub module_name: Option<String>,
}

impl Default for GeneratorConfig {
	fn default() -> Self {
		Self { output_dir: PathBuf::from("generated"), dispatcher_name: "GeneratedDispatch".to_owned(), emit_manifest: true, module_name: None }
	}
}

fn write_formatted(path: &Path, tokens: proc_macro2::TokenStream) -> std::io::Result<()> {
	let file = syn::parse2::<syn::File>(tokens).unwrap_or_else(|e| panic!("generated tokens for {} failed to parse as a file: {e}", path.display()));
	let formatted = prettyplease::unparse(&file);
	fs::write(path, formatted)
}

/// Runs code generation for every struct and enum in `database`'s schema,
/// writing the result under `config.output_dir` (or, when `module_name` is
/// set, under `config.output_dir/module_name`, with a one-line `mod.rs`
/// re-exporting that submodule left at `config.output_dir` itself).
pub fn generate(database: &Database, config: &GeneratorConfig) -> std::io::Result<()> {
	let schema_dir = match &config.module_name {
		Some(name) => config.output_dir.join(name),
		None => config.output_dir.clone(),
	};
	fs::create_dir_all(&schema_dir)?;

	let structs = NameTable::structs(database);
	let enums = NameTable::enums(database);
	let descendants = descendants_by_ancestor(database);

	tracing::info!(
		struct_count = database.struct_definitions().len(),
		enum_count = database.enum_definitions().len(),
		output_dir = %schema_dir.display(),
		module_name = config.module_name.as_deref().unwrap_or("<none>"),
		"generating typed records",
	);

	let enum_tokens = (0..database.enum_definitions().len() as i32).map(|i| generate_enum(database, i, &enums));
	write_formatted(&schema_dir.join("enums.rs"), quote::quote! { #(#enum_tokens)* })?;

	let struct_tokens = (0..database.struct_definitions().len() as i32).map(|i| generate_struct(database, i, &structs, &enums, &descendants));
	write_formatted(
		&schema_dir.join("structs.rs"),
		quote::quote! {
			use ::datacore::Record as _;
			use super::enums::*;
			#(#struct_tokens)*
		},
	)?;

	let dispatch_tokens = generate_dispatch(database, &structs, &config.dispatcher_name);
	write_formatted(
		&schema_dir.join("dispatch.rs"),
		quote::quote! {
			use ::datacore::Record as _;
			use super::structs::*;
			#dispatch_tokens
		},
	)?;

	if config.emit_manifest {
		let struct_count = database.struct_definitions().len();
		let enum_count = database.enum_definitions().len();
		let struct_fingerprint = database.struct_fingerprint();
		let enum_fingerprint = database.enum_fingerprint();
		write_formatted(
			&schema_dir.join("schema.rs"),
			quote::quote! {
				/// Number of struct definitions this snapshot of the schema was generated from.
				pub const STRUCT_COUNT: usize = #struct_count;
				/// Number of enum definitions this snapshot of the schema was generated from.
				pub const ENUM_COUNT: usize = #enum_count;
				/// Fingerprint over every struct and property definition at generation time.
				pub const STRUCT_FINGERPRINT: u64 = #struct_fingerprint;
				/// Fingerprint over every enum and enum-option definition at generation time.
				pub const ENUM_FINGERPRINT: u64 = #enum_fingerprint;

				/// Rejects a database whose schema has drifted from the one these types
				/// were generated against, before any record is read from it.
				pub fn validate(runtime: &::datacore::Runtime) -> ::datacore::RuntimeResult<()> {
					runtime.validate_schema(STRUCT_COUNT, ENUM_COUNT, STRUCT_FINGERPRINT, ENUM_FINGERPRINT)
				}
			},
		)?;
	}

	let schema_mod = config.emit_manifest.then(|| quote::quote!(pub mod schema;));
	write_formatted(
		&schema_dir.join("mod.rs"),
		quote::quote! {
			pub mod enums;
			pub mod structs;
			pub mod dispatch;
			#schema_mod
		},
	)?;

	if let Some(name) = &config.module_name {
		let sanitized = naming::sanitize(name);
		let module_ident = proc_macro2::Ident::new(&sanitized, proc_macro2::Span::call_site());
		write_formatted(&config.output_dir.join("mod.rs"), quote::quote! { pub mod #module_ident; })?;
	}

	Ok(())
}

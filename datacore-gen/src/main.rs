//! CLI front-end for [`datacore_gen`]: parses an archive, validates it
//! against nothing but its own internal fingerprints (there is no prior
//! generation to check against yet), and writes generated Rust sources.

use clap::Parser;
use datacore::raw::Database;
use datacore_gen::GeneratorConfig;
use std::path::PathBuf;
use std::process::ExitCode;

/// Generates typed Rust record definitions from a DataCore archive's schema.
#[derive(Parser, Debug)]
#[command(name = "datacore-gen", version, about)]
struct Cli {
	/// Path to the archive file to read the schema from.
	archive: PathBuf,

	/// Directory generated `.rs` files are written into.
	#[arg(short, long, default_value = "generated")]
	output: PathBuf,

	/// Name of the generated `Dispatch` implementor.
	#[arg(long, default_value = "GeneratedDispatch")]
	dispatcher_name: String,

	/// Skip emitting `schema.rs`'s fingerprint/count constants.
	#[arg(long)]
	no_manifest: bool,

	/// Target module name generated code is nested under, Rust's nearest
	/// analogue of a target namespace. Leave unset to write the four
	/// generated files directly under `--output`.
	#[arg(long)]
	module_name: Option<String>,
}

fn main() -> ExitCode {
	tracing_subscriber::fmt::init();
	let cli = Cli::parse();

	let bytes = match std::fs::read(&cli.archive) {
		Ok(bytes) => bytes,
		Err(e) => {
			tracing::error!(path = %cli.archive.display(), error = %e, "failed to read archive");
			return ExitCode::FAILURE;
		},
	};

	let database = match Database::parse(bytes) {
		Ok(db) => db,
		Err(e) => {
			tracing::error!(error = %e, "failed to parse archive");
			return ExitCode::FAILURE;
		},
	};

	let config = GeneratorConfig { output_dir: cli.output, dispatcher_name: cli.dispatcher_name, emit_manifest: !cli.no_manifest, module_name: cli.module_name };

	if let Err(e) = datacore_gen::generate(&database, &config) {
		tracing::error!(error = %e, "code generation failed");
		return ExitCode::FAILURE;
	}

	tracing::info!(output_dir = %config.output_dir.display(), "generation complete");
	ExitCode::SUCCESS
}

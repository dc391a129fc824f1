//! Diagnostic CLI: load a code-object table as JSON, run one entry point,
//! and print the resulting labeled value or the `IfcError` that ended the
//! transaction. Gated behind the `cli` feature, keeping the binary target
//! optional alongside the library crate.

use clap::Parser;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use taintcore::bytecode::{CodeObjectId, CodeObjectTable};
use taintcore::config::VmConfig;
use taintcore::host::{HeapObjectModel, NullHost};
use taintcore::origin::OriginRegistry;
use taintcore::value::LabeledValue;
use taintcore::vm::{FunctionInfo, Transaction};

/// A serialized `CodeObjectTable` plus the numeric id of the entry point to
/// run; the on-disk shape a host's loader would hand this crate.
#[derive(serde::Deserialize)]
struct RunFile {
    code_objects: CodeObjectTable,
    entry: u32,
}

/// Run a taintcore transaction against a serialized code-object table.
#[derive(Parser)]
#[command(name = "taintcore-run", version, about)]
struct Args {
    /// Path to a JSON file containing a `CodeObjectTable` and an `entry` id.
    path: PathBuf,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let raw = match fs::read_to_string(&args.path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("failed to read {}: {e}", args.path.display());
            return ExitCode::FAILURE;
        }
    };
    let run_file: RunFile = match serde_json::from_str(&raw) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to parse {}: {e}", args.path.display());
            return ExitCode::FAILURE;
        }
    };

    let functions: HashMap<_, FunctionInfo> = HashMap::new();
    let mut objects = HeapObjectModel::new();
    let mut host = NullHost;
    let origins = OriginRegistry::new(VmConfig::default().origin_registry_capacity);
    let config = VmConfig::default();

    let mut txn = Transaction::new(
        &run_file.code_objects,
        &functions,
        &mut objects,
        &mut host,
        &origins,
        config,
    );

    let entry = CodeObjectId(run_file.entry);
    let args: Vec<LabeledValue> = Vec::new();
    match txn.run(entry, &args) {
        Ok(result) => {
            println!("{result:?}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

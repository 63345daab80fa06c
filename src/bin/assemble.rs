//! Two-pass AArch64-subset assembler: `assemble <input.s> <output.bin>`.

use a64emu::encode::{assemble as assemble_source, EncodeError};
use clap::Parser;
use std::fs;
use std::io;
use thiserror::Error;

/// Assemble a subset-of-AArch64 source file into a flat little-endian
/// machine-word binary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the assembly source file
    input: String,

    /// Path to write the assembled binary to
    output: String,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("could not read '{path}': {source}")]
    Read { path: String, source: io::Error },
    #[error("could not write '{path}': {source}")]
    Write { path: String, source: io::Error },
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

fn run(args: Args) -> Result<(), CliError> {
    let source = fs::read_to_string(&args.input).map_err(|source| CliError::Read {
        path: args.input.clone(),
        source,
    })?;
    log::debug!("assembling {} ({} bytes)", args.input, source.len());

    let words = assemble_source(&source)?;
    log::info!("emitted {} word(s)", words.len());

    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in &words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    fs::write(&args.output, &bytes).map_err(|source| CliError::Write {
        path: args.output.clone(),
        source,
    })?;
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(err) = run(args) {
        log::error!("{err}");
        eprintln!("assemble: {err}");
        std::process::exit(1);
    }
}

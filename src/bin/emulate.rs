//! Emulate a subset-of-AArch64 binary: `emulate <input.bin> [output.txt]`.

use a64emu::dump::write_dump;
use a64emu::exec::{Emulator, ExecError};
use clap::Parser;
use clap_num::maybe_hex;
use std::fs;
use std::io::{self, Write};
use thiserror::Error;

/// Run a flat little-endian machine-word binary against the AArch64-subset
/// emulator until it halts, then dump registers, PSTATE and non-zero memory.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the assembled binary
    input: String,

    /// Path to write the final dump to (stdout if omitted)
    output: Option<String>,

    /// Log each fetched instruction at debug level before it executes
    #[arg(short, long)]
    trace: bool,

    /// Stop stepping and report early once PC reaches this address (use 0x
    /// prefix for hexadecimal)
    #[arg(short, long, value_parser=maybe_hex::<u32>)]
    pc_breakpoint: Option<u32>,

    /// Safety valve against a malformed program with no HALT; a correct
    /// program always reaches one, so this never changes documented
    /// semantics
    #[arg(short, long, default_value_t = 10_000_000)]
    max_steps: u64,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("could not read '{path}': {source}")]
    Read { path: String, source: io::Error },
    #[error("could not write '{path}': {source}")]
    Write { path: String, source: io::Error },
    #[error(transparent)]
    Exec(#[from] ExecError),
}

fn run(args: Args) -> Result<(), CliError> {
    let bytes = fs::read(&args.input).map_err(|source| CliError::Read {
        path: args.input.clone(),
        source,
    })?;
    log::debug!("loaded {} ({} bytes)", args.input, bytes.len());

    let mut emulator = Emulator::new();
    emulator.load_image(&bytes)?;

    let mut stepped = 0u64;
    loop {
        if let Some(bp) = args.pc_breakpoint {
            if emulator.pc() == bp as u64 {
                log::info!("stopped at breakpoint 0x{bp:08x}");
                break;
            }
        }
        if args.trace {
            log::debug!("pc=0x{:08x}", emulator.pc());
        }
        match emulator.step()? {
            a64emu::exec::StepOutcome::Halted => break,
            a64emu::exec::StepOutcome::Continued => {
                stepped += 1;
                if stepped >= args.max_steps {
                    return Err(CliError::Exec(ExecError::MaxStepsExceeded {
                        limit: args.max_steps,
                    }));
                }
            }
        }
    }

    let mut dump = Vec::new();
    write_dump(&mut dump, &emulator).expect("writing to an in-memory buffer cannot fail");

    match &args.output {
        Some(path) => fs::write(path, &dump).map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        })?,
        None => io::stdout()
            .write_all(&dump)
            .map_err(|source| CliError::Write {
                path: "<stdout>".to_string(),
                source,
            })?,
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(err) = run(args) {
        log::error!("{err}");
        eprintln!("emulate: {err}");
        std::process::exit(1);
    }
}

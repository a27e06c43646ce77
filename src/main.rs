//! Assembler and virtual machine command-line interface.
//!
//! # Usage
//! ```text
//! bytevm build <source.asm> [OPTIONS]
//! bytevm run <image.fbc> [OPTIONS]
//! ```
//!
//! # Build options
//! - `-o, --output <file>`: Output file path (defaults to `<source>.fbc`)
//!
//! # Run options
//! - `-s, --memory-size <bytes>`: Machine memory size (defaults to 1024)
//! - `-d, --debug`: Trap on `BRK`
//! - `--dump`: Print every thread's registers and memory `0..128` after the run
//! - `--dump-memory <start>:<end>`: Dump this memory range instead (implies `--dump`)
//!
//! # Global options
//! - `-v, --verbose`: Debug logging tagged with thread names (the level is
//!   also settable through `BYTEVM_LOG`)
//!
//! A guest `EXIT` ends the process with the guest's status. Compile errors,
//! load errors and host faults exit with status 1.

use bytevm::utils::log::{self, Level};
use bytevm::virtual_machine::assembler::assemble_file;
use bytevm::virtual_machine::errors::{CompileError, VMError};
use bytevm::virtual_machine::vm::{DEFAULT_MEMORY_SIZE, Machine, MachineConfig};
use bytevm::{debug, error, info};
use bytevm_derive::Error;
use std::env;
use std::fs;
use std::fmt::Write;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process;

const IMAGE_EXTENSION: &str = "fbc";
const DEFAULT_DUMP_RANGE: Range<u64> = 0..128;

const USAGE: &str = "\
Usage:
  {program} build <source.asm> [-o|--output <file>]
  {program} run <image.fbc> [-s|--memory-size <bytes>] [-d|--debug]
                [--dump] [--dump-memory <start>:<end>]
  {program} -h|--help

Global options:
  -v, --verbose   Log debug messages";

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("assembly failed: {0}")]
    Compile(#[from] CompileError),
    #[error("{0}")]
    Vm(#[from] VMError),
    #[error("{0}")]
    Io(#[from] io::Error),
}

enum Command {
    Build {
        source: PathBuf,
        output: Option<PathBuf>,
    },
    Run {
        image: PathBuf,
        config: MachineConfig,
        dump: Option<Range<u64>>,
    },
}

fn main() {
    log::init_from_env();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("bytevm");

    let mut rest = Vec::with_capacity(args.len());
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "-v" | "--verbose" => {
                log::set_min_level(Level::Debug);
                log::set_show_thread(true);
            }
            _ => rest.push(arg.as_str()),
        }
    }

    if rest.is_empty() || matches!(rest[0], "-h" | "--help") {
        print_usage(program);
        process::exit(if rest.is_empty() { 1 } else { 0 });
    }

    let result = parse_command(&rest).and_then(execute);
    match result {
        Ok(code) => process::exit(code),
        Err(CliError::Usage(message)) => {
            error!("{message}\n");
            print_usage(program);
            process::exit(1);
        }
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}

fn parse_command(args: &[&str]) -> Result<Command, CliError> {
    let (subcommand, args) = args
        .split_first()
        .ok_or_else(|| CliError::Usage("missing command".into()))?;
    let (input, options) = args
        .split_first()
        .ok_or_else(|| CliError::Usage(format!("{subcommand} requires an input file")))?;
    let input = PathBuf::from(*input);

    match *subcommand {
        "build" => {
            let mut output = None;
            let mut i = 0;
            while i < options.len() {
                match options[i] {
                    k @ ("-o" | "--output") => {
                        output = Some(PathBuf::from(option_value(options, i, k)?));
                        i += 2;
                    }
                    other => return Err(CliError::Usage(format!("unexpected argument: {other}"))),
                }
            }
            Ok(Command::Build {
                source: input,
                output,
            })
        }
        "run" => {
            let mut config = MachineConfig::default();
            let mut dump = None;
            let mut i = 0;
            while i < options.len() {
                match options[i] {
                    k @ ("-s" | "--memory-size") => {
                        let value = option_value(options, i, k)?;
                        config.memory_size = value.parse::<usize>().map_err(|_| {
                            CliError::Usage(format!("invalid memory size: '{value}'"))
                        })?;
                        i += 2;
                    }
                    "-d" | "--debug" => {
                        config.debug = true;
                        i += 1;
                    }
                    "--dump" => {
                        dump.get_or_insert(DEFAULT_DUMP_RANGE);
                        i += 1;
                    }
                    k @ "--dump-memory" => {
                        dump = Some(parse_range(option_value(options, i, k)?)?);
                        i += 2;
                    }
                    other => return Err(CliError::Usage(format!("unexpected argument: {other}"))),
                }
            }
            Ok(Command::Run {
                image: input,
                config,
                dump,
            })
        }
        other => Err(CliError::Usage(format!("unknown command: {other}"))),
    }
}

/// Parses `start:end`, each part decimal or `0x` hex.
fn parse_range(value: &str) -> Result<Range<u64>, CliError> {
    let invalid = || CliError::Usage(format!("invalid memory range: '{value}'"));
    let parse = |text: &str| match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    let (start, end) = value.split_once(':').ok_or_else(invalid)?;
    let start = parse(start).map_err(|_| invalid())?;
    let end = parse(end).map_err(|_| invalid())?;
    if start > end {
        return Err(invalid());
    }
    Ok(start..end)
}

fn option_value<'a>(options: &[&'a str], i: usize, key: &str) -> Result<&'a str, CliError> {
    options
        .get(i + 1)
        .copied()
        .ok_or_else(|| CliError::Usage(format!("{key} requires an argument")))
}

/// Runs a command and returns the process exit code.
fn execute(command: Command) -> Result<i32, CliError> {
    match command {
        Command::Build { source, output } => {
            let output = output.unwrap_or_else(|| default_output(&source));
            build(&source, &output)?;
            Ok(0)
        }
        Command::Run {
            image,
            config,
            dump,
        } => run(&image, config, dump),
    }
}

fn default_output(source: &Path) -> PathBuf {
    source.with_extension(IMAGE_EXTENSION)
}

fn build(source: &Path, output: &Path) -> Result<(), CliError> {
    let image = assemble_file(source)?;
    fs::write(output, &image)?;
    info!(
        "{} -> {} ({} bytes)",
        source.display(),
        output.display(),
        image.len()
    );
    Ok(())
}

fn run(path: &Path, config: MachineConfig, dump: Option<Range<u64>>) -> Result<i32, CliError> {
    let image = fs::read(path)?;
    debug!(
        "running {} with {} bytes of memory (default {DEFAULT_MEMORY_SIZE})",
        path.display(),
        config.memory_size
    );
    let machine = Machine::load(&image, config)?;
    let result = machine.run();

    if let Some(range) = dump {
        eprint!("{}", render_dump(&machine, range));
    }

    result?;
    Ok(machine.exit_status().map_or(0, |status| status as i32))
}

/// Registers of every thread, then a hex dump of `range`.
fn render_dump(machine: &Machine, range: Range<u64>) -> String {
    let mut out = String::new();
    for index in 0..machine.thread_count() as u64 {
        match machine.dump_registers(index) {
            Ok(registers) => {
                let _ = writeln!(out, "thread {index}:\n{registers}");
            }
            Err(e) => {
                let _ = writeln!(out, "thread {index}: {e}\n");
            }
        }
    }
    let _ = writeln!(out, "memory {:#x}..{:#x}:", range.start, range.end);
    out.push_str(&machine.dump_memory(range.start, range.end));
    out
}

fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytevm::virtual_machine::assembler::assemble_source;

    fn run_options(options: &[&str]) -> Option<Range<u64>> {
        let mut args = vec!["run", "prog.fbc"];
        args.extend_from_slice(options);
        match parse_command(&args).unwrap() {
            Command::Run { dump, .. } => dump,
            Command::Build { .. } => panic!("expected run command"),
        }
    }

    #[test]
    fn dump_defaults_to_low_memory() {
        assert_eq!(run_options(&[]), None);
        assert_eq!(run_options(&["--dump"]), Some(DEFAULT_DUMP_RANGE));
        assert_eq!(run_options(&["--dump-memory", "0x10:64"]), Some(16..64));
        assert_eq!(
            run_options(&["--dump-memory", "8:16", "--dump"]),
            Some(8..16)
        );
    }

    #[test]
    fn dump_range_must_be_ordered() {
        assert!(matches!(parse_range("64:16"), Err(CliError::Usage(_))));
        assert!(matches!(parse_range("16"), Err(CliError::Usage(_))));
        assert!(matches!(parse_range("a:b"), Err(CliError::Usage(_))));
    }

    #[test]
    fn dump_includes_registers_and_memory() {
        let image = assemble_source("mov x0, 7\nhlt").unwrap();
        let machine = Machine::load(&image, MachineConfig::default()).unwrap();
        machine.run().unwrap();

        let dump = render_dump(&machine, 0..16);
        assert!(dump.starts_with("thread 0:\n"));
        assert!(dump.contains(" x0 = 0x0000000000000007 (7)"));
        assert!(dump.contains("memory 0x0..0x10:\n00000000: 00 05 00 00"));
    }

    #[test]
    fn dump_reports_busy_thread() {
        let image = assemble_source("hlt").unwrap();
        let machine = Machine::load(&image, MachineConfig::default()).unwrap();
        let main = machine.thread(0).unwrap();
        let _held = main.lock_registers();
        let dump = render_dump(&machine, 0..0);
        assert!(dump.starts_with("thread 0: thread 0 is still running\n"));
    }
}

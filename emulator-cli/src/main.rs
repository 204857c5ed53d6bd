//! Operator-facing binary: parses the CLI surface, loads an ELF64 guest
//! binary through `emulator-elf`, wires a Unicorn-backed `CpuEngine` and
//! `LinuxSyscalls` into an `emulator_core::Emulator`, and runs it.

mod engine;
mod linux_syscalls;

use clap::Parser;
use emulator_core::{
    load_image,
    Emulator,
    Loader,
    TraceFlags,
};
use emulator_abi::LinuxX86_64;
use emulator_elf::ElfLoader;
use std::fs;
use std::process::ExitCode;

/// Loads an ELF64 guest binary and runs it under a Unicorn-backed
/// emulator (spec §6, "Operator surface").
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Dump the entry point's disassembly and a register snapshot before
    /// starting, and on a fatal run error.
    #[arg(long)]
    verbose: bool,

    /// Trace every dispatched syscall.
    #[arg(long)]
    trace_sys: bool,

    /// Trace every guest memory read/write.
    #[arg(long)]
    trace_mem: bool,

    /// Trace every executed instruction (disassembled).
    #[arg(long)]
    trace_exec: bool,

    /// Trace register changes at each traced block/instruction.
    #[arg(long)]
    trace_reg: bool,

    /// Redirect absolute guest paths (e.g. the dynamic interpreter, or an
    /// `open()` argument) under this sysroot.
    #[arg(long)]
    load_prefix: Option<String>,

    /// `KEY=VALUE` environment entries handed to the guest, repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// The guest binary to load.
    binary: String,

    /// Arguments passed to the guest as `argv[1..]`.
    guest_args: Vec<String>,
}

fn build_auxv() -> Vec<u8> {
    // AT_NULL only; this workspace doesn't hand the guest AT_PAGESZ/
    // AT_RANDOM/etc. (spec Non-goals: no vDSO, no AT_SYSINFO_EHDR).
    vec![0u8; 16]
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(&args.binary)?;
    let loader = ElfLoader::parse(&bytes)?;

    let prefix = args.load_prefix.clone().unwrap_or_default();
    let mut cpu_engine = engine::UnicornEngine::new()?;

    let image = load_image(
        &loader,
        &mut cpu_engine,
        |p| p.to_string(),
        |p| {
            let interp_bytes = fs::read(p).map_err(|e| emulator_core::EmulatorError::LoaderError(e.to_string()))?;
            let interp_loader = ElfLoader::parse(&interp_bytes)
                .map_err(|e| emulator_core::EmulatorError::LoaderError(e.to_string()))?;
            Ok(Box::new(interp_loader) as Box<dyn emulator_core::Loader>)
        },
    )?;

    let data_segment = loader.data_segment();
    let mut emu = Emulator::new(
        cpu_engine,
        Box::new(LinuxX86_64),
        image.base,
        image.entry,
        image.bin_entry,
        image.interp_base,
        data_segment,
        &prefix,
    )
    .with_syscall_handler(Box::new(linux_syscalls::LinuxSyscalls))
    .with_symbols(loader.symbols().to_vec(), Vec::new())
    .with_trace_flags(TraceFlags {
        verbose: args.verbose,
        trace_sys: args.trace_sys,
        trace_mem: args.trace_mem,
        trace_exec: args.trace_exec,
        trace_reg: args.trace_reg,
    });

    let mut argv = vec![args.binary.clone()];
    argv.extend(args.guest_args.clone());
    let auxv = build_auxv();

    emulator_core::run(&mut emu, &argv, &args.env, &auxv, 0x7fff_0000_0000, 0x80_0000, 0)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("emulator: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trace_flags_and_load_prefix() {
        let args = Args::try_parse_from([
            "emulator",
            "--verbose",
            "--trace-sys",
            "--trace-reg",
            "--load-prefix",
            "/sysroot",
            "--env",
            "HOME=/root",
            "./a.out",
            "--",
            "hello",
        ])
        .unwrap();

        assert!(args.verbose);
        assert!(args.trace_sys);
        assert!(!args.trace_mem);
        assert!(args.trace_reg);
        assert_eq!(args.load_prefix.as_deref(), Some("/sysroot"));
        assert_eq!(args.env, vec!["HOME=/root".to_string()]);
        assert_eq!(args.binary, "./a.out");
        assert_eq!(args.guest_args, vec!["hello".to_string()]);
    }

    #[test]
    fn defaults_are_all_off() {
        let args = Args::try_parse_from(["emulator", "./a.out"]).unwrap();
        assert!(!args.verbose);
        assert!(!args.trace_sys);
        assert!(args.load_prefix.is_none());
        assert!(args.env.is_empty());
        assert!(args.guest_args.is_empty());
    }
}

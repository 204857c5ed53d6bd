//! Run driver (C6). The only component allowed to call `CpuEngine::start`.

use crate::emulator::Emulator;
use crate::error::EmulatorError;
use crate::stack;
use emulator_abi::{
    EmulatorOps,
    OsTable,
    Register,
};

/// Installs hooks, seeds the stack, runs the OS table's `Init` (if any),
/// optionally dumps the entry point, then starts the engine at `entry`
/// and runs until `stop`, a fault, or `pc == end_addr` (spec §4.6).
///
/// On a start error, registers and the reconstructed stack trace are
/// dumped to the operator stream before the error is propagated.
pub fn run(
    emu: &mut Emulator,
    args: &[String],
    env: &[String],
    auxv: &[u8],
    stack_hint: u64,
    stack_size: u64,
    end_addr: u64,
) -> Result<(), EmulatorError> {
    emu.install_hooks();

    let sp_register = emu.sp_register();
    stack::setup_stack(emu, stack_hint, stack_size, sp_register)?;
    stack::posix_init(emu, args, env, auxv)?;

    // `&dyn OsTable` is a plain fat pointer (Copy); snapshotting it before
    // the call lets `init` below take `emu` mutably as `&mut dyn
    // EmulatorOps` without aliasing the immutable borrow `os_table()`
    // would otherwise hold on `emu` for the call's duration.
    let os_table_ptr: *const dyn OsTable = emu.os_table();
    // SAFETY: `emu` outlives this call; the raw pointer is only
    // reborrowed for the duration of `init` below.
    let os_table: &dyn OsTable = unsafe { &*os_table_ptr };
    os_table.init(emu, args, env)?;

    if emu.core().hooks.borrow().flags.verbose {
        let entry = emu.entry();
        eprintln!("entry: 0x{entry:x}");
        eprintln!("{}", emu.engine_mut().disas(entry, 64));
        dump_diagnostics(emu);
    }

    let entry = emu.entry();
    if let Err(err) = emu.engine_mut().start(entry, end_addr) {
        eprintln!("run failed: {err}");
        dump_diagnostics(emu);
        return Err(err);
    }
    Ok(())
}

fn dump_diagnostics(emu: &Emulator) {
    for &reg in &Register::ALL {
        eprintln!("  {:>6} = 0x{:x}", reg.name(), emu.reg_read(reg).unwrap_or(0));
    }
    for frame in emu.core().hooks.borrow().stacktrace.frames() {
        eprintln!("  # 0x{:x} (sp 0x{:x})", frame.addr, frame.sp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DataSegment;
    use crate::testing::MockEngine;
    use emulator_abi::LinuxX86_64;

    #[test]
    fn s7_run_seeds_stack_and_starts_the_engine_at_entry() {
        let mut emu = Emulator::new(
            MockEngine::new(0x1000),
            Box::new(LinuxX86_64),
            0,
            0x400100,
            0x400100,
            0,
            DataSegment { start: 0, end: 0 },
            "",
        );

        run(
            &mut emu,
            &["prog".to_string()],
            &[],
            &[0u8; 16],
            0x7000_0000,
            0x2000,
            0,
        )
        .unwrap();

        let sp = emu.reg_read(emu.sp_register()).unwrap();
        assert!(sp < 0x7000_0000 + 0x2000);
        assert!(sp > 0);
    }
}

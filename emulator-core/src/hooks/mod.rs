//! Hook/tracer controller (C5).

mod deadlock;
mod stacktrace;
mod status_diff;
mod trace_flags;

pub use deadlock::DeadlockDetector;
pub use stacktrace::{
    Frame,
    Stacktrace,
};
pub use status_diff::{
    RegisterChange,
    StatusDiff,
};
pub use trace_flags::TraceFlags;

use crate::emulator::{
    EmulatorCore,
    EmulatorHandle,
};
use crate::engine::{
    AccessKind,
    CpuEngine,
};
use crate::symbol;
use emulator_abi::{
    EmulatorOps,
    OsTable,
    Register,
};
use std::rc::Rc;

/// The mutable state a running emulator's hooks accumulate between events.
/// Lives behind a `RefCell` inside `EmulatorCore` (itself shared via `Rc`)
/// so hook closures registered on the engine can reach it without owning
/// the engine themselves (spec "Design Notes: back-reference to the
/// emulator from hooks").
#[derive(Debug, Default)]
pub struct HookState {
    pub flags: TraceFlags,
    pub status_diff: StatusDiff,
    pub stacktrace: Stacktrace,
    pub deadlock: DeadlockDetector,
}

fn indent(units: usize) -> String {
    "  ".repeat(units)
}

fn dump_registers(engine: &dyn CpuEngine) {
    for &reg in &Register::ALL {
        eprintln!("  {:>6} = 0x{:x}", reg.name(), engine.reg_read(reg).unwrap_or(0));
    }
}

/// Installs the block/code/memory/invalid-memory/interrupt hooks enabled
/// by `core`'s trace flags onto `engine` (spec §4.5). Called once by the
/// run driver (C6) before `CpuEngine::start`.
pub fn install(engine: &mut dyn CpuEngine, core: Rc<EmulatorCore>) {
    {
        let block_core = core.clone();
        engine.hook_add_block(Box::new(move |engine, addr, _size| {
            let sp = engine.reg_read(block_core.os_table.sp_register()).unwrap_or(0);
            let (depth, flags, deadlock_suspected) = {
                let mut hooks = block_core.hooks.borrow_mut();
                hooks.stacktrace.on_block(addr, sp);
                (hooks.stacktrace.depth(), hooks.flags, hooks.deadlock.is_deadlocked())
            };
            let sym = symbol::symbolicate(
                addr,
                block_core.base,
                &block_core.main_symbols,
                block_core.interp_base,
                &block_core.interp_symbols,
            );
            eprintln!("{}+ block {sym} @0x{addr:x}", indent(depth));

            if flags.trace_reg && !flags.trace_exec && !deadlock_suspected {
                let regs: Vec<(Register, u64)> = Register::ALL
                    .iter()
                    .map(|&r| (r, engine.reg_read(r).unwrap_or(0)))
                    .collect();
                let changes = block_core.hooks.borrow_mut().status_diff.update(&regs);
                for change in &changes {
                    eprintln!(
                        "{}  {} = 0x{:x} (was 0x{:x})",
                        indent(depth),
                        change.reg.name(),
                        change.new,
                        change.old
                    );
                }
            }
        }));
    }

    {
        let code_core = core.clone();
        engine.hook_add_code(Box::new(move |engine, addr, size| {
            let regs: Vec<(Register, u64)> = Register::ALL
                .iter()
                .map(|&r| (r, engine.reg_read(r).unwrap_or(0)))
                .collect();
            let (changes, flags, depth) = {
                let mut hooks = code_core.hooks.borrow_mut();
                let changes = hooks.status_diff.update(&regs);
                (changes, hooks.flags, hooks.stacktrace.depth())
            };

            if flags.trace_exec {
                eprintln!("{}{}", indent(depth), engine.disas(addr, size as u64));
                if flags.trace_reg {
                    for change in &changes {
                        let line = format!("{}  {} = 0x{:x}", indent(depth), change.reg.name(), change.new);
                        eprintln!("{line:<40}(was 0x{:x})", change.old);
                    }
                }
            }

            let regs_changed = !changes.is_empty();
            code_core.hooks.borrow_mut().deadlock.observe(addr, regs_changed);
            if code_core.hooks.borrow().deadlock.is_deadlocked() {
                let sym = symbol::symbolicate(
                    addr,
                    code_core.base,
                    &code_core.main_symbols,
                    code_core.interp_base,
                    &code_core.interp_symbols,
                );
                eprintln!("FATAL: deadlock detected at 0x{addr:x} ({sym})");
                dump_registers(engine);
                engine.stop();
            }
        }));
    }

    {
        let mem_core = core.clone();
        engine.hook_add_mem(Box::new(move |_engine, access| {
            let hooks = mem_core.hooks.borrow();
            if !hooks.flags.trace_mem {
                return;
            }
            let depth = hooks.stacktrace.depth();
            drop(hooks);
            let tag = if access.kind == AccessKind::Write { "W" } else { "R" };
            eprintln!(
                "{}{tag} 0x{:x} {} 0x{:x}",
                indent(depth.saturating_sub(1)),
                access.addr,
                access.size,
                access.value
            );
        }));
    }

    {
        engine.hook_add_mem_invalid(Box::new(move |_engine, access| {
            eprintln!(
                "invalid {}: @0x{:x}, size = {}",
                access.kind.label(),
                access.addr,
                access.size
            );
            false
        }));
    }

    {
        let intr_core = core;
        engine.hook_add_interrupt(Box::new(move |engine, intno| {
            let mut handle = EmulatorHandle::new(engine, intr_core.clone());
            let os_table: &dyn OsTable = intr_core.os_table.as_ref();
            os_table.interrupt(&mut handle as &mut dyn EmulatorOps, intno);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DataSegment;
    use crate::testing::MockEngine;
    use emulator_abi::{
        LinuxX86_64,
        SyscallHandler,
        SyscallOutcome,
    };
    use std::cell::RefCell;

    #[derive(Debug, Default)]
    struct NullHandler;

    impl SyscallHandler for NullHandler {
        fn call(
            &self,
            _emu: &mut dyn EmulatorOps,
            _num: u64,
            _name: &str,
            _get_args: &dyn Fn(u32) -> Vec<u64>,
        ) -> SyscallOutcome {
            SyscallOutcome::Value(0)
        }
    }

    fn deadlock_test_core() -> Rc<EmulatorCore> {
        Rc::new(EmulatorCore {
            os_table: Box::new(LinuxX86_64),
            syscall_handler: Box::new(NullHandler),
            base: 0,
            entry: 0,
            bin_entry: 0,
            interp_base: 0,
            main_symbols: Vec::new(),
            interp_symbols: Vec::new(),
            prefix: String::new(),
            data_segment: RefCell::new(DataSegment { start: 0, end: 0 }),
            hooks: RefCell::new(HookState::default()),
        })
    }

    /// Scenario S5: three consecutive code-hook events at the same address
    /// with no register change must stop the engine (and, per the FATAL
    /// line emitted just above `engine.stop()`, report the deadlock).
    #[test]
    fn s5_three_consecutive_identical_code_events_stop_the_engine() {
        let mut engine = MockEngine::new(0x1000);
        install(&mut engine, deadlock_test_core());

        engine.fire_code_hook(0x1000, 4);
        assert!(!engine.was_stopped());
        engine.fire_code_hook(0x1000, 4);
        assert!(!engine.was_stopped());
        engine.fire_code_hook(0x1000, 4);
        assert!(engine.was_stopped());
    }

    #[test]
    fn a_register_change_between_events_does_not_stop_the_engine() {
        let mut engine = MockEngine::new(0x1000);
        install(&mut engine, deadlock_test_core());

        engine.fire_code_hook(0x1000, 4);
        engine.reg_write(Register::Rax, 1).unwrap();
        engine.fire_code_hook(0x1000, 4);
        engine.fire_code_hook(0x1000, 4);
        assert!(!engine.was_stopped());
    }
}

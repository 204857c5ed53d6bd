//! The `Emulator` façade: owns the CPU engine and the guest address space,
//! and implements [`EmulatorOps`] — the surface OS init code and the
//! syscall layer see (spec §6).

use crate::engine::CpuEngine;
use crate::hooks::HookState;
use crate::loader::{
    DataSegment,
    Symbol,
};
use crate::prefix;
use crate::symbol;
use emulator_abi::{
    EmulatorOps,
    OpsError,
    OsTable,
    Register,
    SyscallHandler,
    SyscallOutcome,
};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A [`SyscallHandler`] that answers every call with `0`. The placeholder
/// installed at construction; real wiring replaces it via
/// [`Emulator::with_syscall_handler`] (`emulator-cli` installs `LinuxSyscalls`).
#[derive(Debug, Default)]
struct NullSyscallHandler;

impl SyscallHandler for NullSyscallHandler {
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

/// Everything about a loaded guest except the engine itself. Shared via
/// `Rc` so hook closures registered on the engine can reach it without
/// owning the engine themselves (spec "Design Notes": "engine holds a
/// non-owning callback context").
pub(crate) struct EmulatorCore {
    pub(crate) os_table: Box<dyn OsTable>,
    pub(crate) syscall_handler: Box<dyn SyscallHandler>,
    pub(crate) base: u64,
    pub(crate) entry: u64,
    pub(crate) bin_entry: u64,
    pub(crate) interp_base: u64,
    pub(crate) main_symbols: Vec<Symbol>,
    pub(crate) interp_symbols: Vec<Symbol>,
    pub(crate) prefix: String,
    pub(crate) data_segment: RefCell<DataSegment>,
    pub(crate) hooks: RefCell<HookState>,
}

impl fmt::Debug for EmulatorCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatorCore")
            .field("base", &self.base)
            .field("entry", &self.entry)
            .field("bin_entry", &self.bin_entry)
            .field("interp_base", &self.interp_base)
            .field("prefix", &self.prefix)
            .field("data_segment", &self.data_segment)
            .finish_non_exhaustive()
    }
}

/// Borrows an engine reference together with a shared [`EmulatorCore`] and
/// implements [`EmulatorOps`] over that pair. This is the type hook
/// closures construct on every invocation (they only ever receive `&mut
/// dyn CpuEngine` from the engine itself, never the owning `Emulator`);
/// `Emulator`'s own `EmulatorOps` impl is a thin wrapper around the same
/// logic so both paths stay in lockstep.
pub struct EmulatorHandle<'a> {
    engine: &'a mut dyn CpuEngine,
    core: Rc<EmulatorCore>,
}

impl<'a> fmt::Debug for EmulatorHandle<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatorHandle").finish_non_exhaustive()
    }
}

impl<'a> EmulatorHandle<'a> {
    pub(crate) fn new(engine: &'a mut dyn CpuEngine, core: Rc<EmulatorCore>) -> Self {
        Self { engine, core }
    }

    fn sp_register(&self) -> Register {
        self.core.os_table.sp_register()
    }

    fn word_size(&self) -> usize {
        self.core.os_table.word_size()
    }
}

impl<'a> EmulatorOps for EmulatorHandle<'a> {
    fn push(&mut self, word: u64) -> Result<(), OpsError> {
        let bytes = word.to_le_bytes();
        let word_size = self.word_size();
        self.push_bytes(&bytes[..word_size])
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), OpsError> {
        let sp_reg = self.sp_register();
        let sp = self.reg_read(sp_reg)?;
        let new_sp = sp - bytes.len() as u64;
        self.mem_write(new_sp, bytes)?;
        self.reg_write(sp_reg, new_sp)
    }

    fn reg_read(&self, reg: Register) -> Result<u64, OpsError> {
        self.engine
            .reg_read(reg)
            .map_err(|e| OpsError::Engine { reason: e.to_string() })
    }

    fn reg_write(&mut self, reg: Register, value: u64) -> Result<(), OpsError> {
        self.engine
            .reg_write(reg, value)
            .map_err(|e| OpsError::Engine { reason: e.to_string() })
    }

    fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<(), OpsError> {
        self.engine
            .mem_read(addr, buf)
            .map_err(|e| OpsError::Engine { reason: e.to_string() })
    }

    fn mem_write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), OpsError> {
        self.engine
            .mem_write(addr, bytes)
            .map_err(|e| OpsError::Engine { reason: e.to_string() })
    }

    fn mem_map(&mut self, addr: u64, size: u64) -> Result<(), OpsError> {
        self.engine
            .mem_map(addr, size)
            .map_err(|e| OpsError::Engine { reason: e.to_string() })
    }

    fn mmap(&mut self, hint: u64, size: u64) -> Result<u64, OpsError> {
        self.engine
            .mmap(hint, size)
            .map_err(|e| OpsError::Engine { reason: e.to_string() })
    }

    fn brk(&mut self, addr: u64) -> Result<u64, OpsError> {
        let mut data = self.core.data_segment.borrow_mut();
        prefix::brk(self.engine, &mut data, addr).map_err(|e| OpsError::Engine { reason: e.to_string() })
    }

    fn base(&self) -> u64 {
        self.core.base
    }

    fn bin_entry(&self) -> u64 {
        self.core.bin_entry
    }

    fn entry(&self) -> u64 {
        self.core.entry
    }

    fn interp_base(&self) -> u64 {
        self.core.interp_base
    }

    fn symbolicate(&self, addr: u64) -> String {
        symbol::symbolicate(
            addr,
            self.core.base,
            &self.core.main_symbols,
            self.core.interp_base,
            &self.core.interp_symbols,
        )
    }

    fn prefix_path(&self, path: &str, force: bool) -> String {
        prefix::prefix_path(&self.core.prefix, path, force)
    }

    fn syscall(&mut self, num: u64, name: &str, get_args: &dyn Fn(u32) -> Vec<u64>) -> SyscallOutcome {
        let (flags, depth) = {
            let hooks = self.core.hooks.borrow();
            (hooks.flags, hooks.stacktrace.depth())
        };
        // Spec §4.8: "when syscall tracing is combined with exec/reg
        // tracing, prepend an `s ` marker at the current indent".
        if flags.trace_sys && (flags.trace_exec || flags.trace_reg) {
            eprintln!("{}s {name}({num})", "  ".repeat(depth.saturating_sub(1)));
        }

        // `&dyn SyscallHandler` is a plain fat pointer (Copy), so grabbing
        // it out of `self.core` first means the call below can still take
        // `self` mutably as `&mut dyn EmulatorOps` without a borrow conflict.
        let handler: &dyn SyscallHandler = self.core.syscall_handler.as_ref();
        let handler_ptr: *const dyn SyscallHandler = handler;
        // SAFETY: `core` outlives this call (`Rc` held by `self`); we only
        // use the reborrowed reference for the duration of `call` below.
        let handler: &dyn SyscallHandler = unsafe { &*handler_ptr };
        let outcome = handler.call(self, num, name, get_args);

        if flags.trace_sys && (flags.trace_exec || flags.trace_reg) {
            eprintln!("{}  = {outcome}", "  ".repeat(depth.saturating_sub(1)));
        }
        outcome
    }
}

/// Owns the CPU engine and the process image; the only implementor of
/// [`EmulatorOps`] in this workspace.
pub struct Emulator {
    engine: Box<dyn CpuEngine>,
    core: Rc<EmulatorCore>,
}

impl fmt::Debug for Emulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emulator").field("core", &self.core).finish_non_exhaustive()
    }
}

impl Emulator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: impl CpuEngine + 'static,
        os_table: Box<dyn OsTable>,
        base: u64,
        entry: u64,
        bin_entry: u64,
        interp_base: u64,
        data_segment: DataSegment,
        prefix: &str,
    ) -> Self {
        Self {
            engine: Box::new(engine),
            core: Rc::new(EmulatorCore {
                os_table,
                syscall_handler: Box::new(NullSyscallHandler),
                base,
                entry,
                bin_entry,
                interp_base,
                main_symbols: Vec::new(),
                interp_symbols: Vec::new(),
                prefix: prefix.to_string(),
                data_segment: RefCell::new(data_segment),
                hooks: RefCell::new(HookState::default()),
            }),
        }
    }

    /// Replaces the syscall handler. Panics if hooks have already been
    /// installed (Rc has other clones) — call before `install_hooks`.
    pub fn with_syscall_handler(mut self, handler: Box<dyn SyscallHandler>) -> Self {
        Rc::get_mut(&mut self.core)
            .expect("with_syscall_handler must run before install_hooks")
            .syscall_handler = handler;
        self
    }

    pub fn with_symbols(mut self, main: Vec<Symbol>, interp: Vec<Symbol>) -> Self {
        let core = Rc::get_mut(&mut self.core).expect("with_symbols must run before install_hooks");
        core.main_symbols = main;
        core.interp_symbols = interp;
        self
    }

    pub fn with_trace_flags(self, flags: crate::hooks::TraceFlags) -> Self {
        self.core.hooks.borrow_mut().flags = flags;
        self
    }

    pub fn sp_register(&self) -> Register {
        self.core.os_table.sp_register()
    }

    pub fn engine_mut(&mut self) -> &mut dyn CpuEngine {
        self.engine.as_mut()
    }

    pub fn os_table(&self) -> &dyn OsTable {
        self.core.os_table.as_ref()
    }

    fn handle(&mut self) -> EmulatorHandle<'_> {
        EmulatorHandle::new(self.engine.as_mut(), self.core.clone())
    }

    /// Installs the C5 hooks enabled by the current trace flags. Called
    /// once by the run driver (C6) before `CpuEngine::start`.
    pub fn install_hooks(&mut self) {
        crate::hooks::install(self.engine.as_mut(), self.core.clone());
    }

    pub(crate) fn core(&self) -> &EmulatorCore {
        &self.core
    }
}

impl EmulatorOps for Emulator {
    fn push(&mut self, word: u64) -> Result<(), OpsError> {
        self.handle().push(word)
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), OpsError> {
        self.handle().push_bytes(bytes)
    }

    fn reg_read(&self, reg: Register) -> Result<u64, OpsError> {
        self.engine
            .reg_read(reg)
            .map_err(|e| OpsError::Engine { reason: e.to_string() })
    }

    fn reg_write(&mut self, reg: Register, value: u64) -> Result<(), OpsError> {
        self.handle().reg_write(reg, value)
    }

    fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<(), OpsError> {
        self.engine
            .mem_read(addr, buf)
            .map_err(|e| OpsError::Engine { reason: e.to_string() })
    }

    fn mem_write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), OpsError> {
        self.handle().mem_write(addr, bytes)
    }

    fn mem_map(&mut self, addr: u64, size: u64) -> Result<(), OpsError> {
        self.handle().mem_map(addr, size)
    }

    fn mmap(&mut self, hint: u64, size: u64) -> Result<u64, OpsError> {
        self.handle().mmap(hint, size)
    }

    fn brk(&mut self, addr: u64) -> Result<u64, OpsError> {
        self.handle().brk(addr)
    }

    fn base(&self) -> u64 {
        self.core.base
    }

    fn bin_entry(&self) -> u64 {
        self.core.bin_entry
    }

    fn entry(&self) -> u64 {
        self.core.entry
    }

    fn interp_base(&self) -> u64 {
        self.core.interp_base
    }

    fn symbolicate(&self, addr: u64) -> String {
        symbol::symbolicate(
            addr,
            self.core.base,
            &self.core.main_symbols,
            self.core.interp_base,
            &self.core.interp_symbols,
        )
    }

    fn prefix_path(&self, path: &str, force: bool) -> String {
        prefix::prefix_path(&self.core.prefix, path, force)
    }

    fn syscall(&mut self, num: u64, name: &str, get_args: &dyn Fn(u32) -> Vec<u64>) -> SyscallOutcome {
        self.handle().syscall(num, name, get_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;
    use emulator_abi::LinuxX86_64;

    #[test]
    fn fresh_emulator_reports_constructed_addresses() {
        let emu = Emulator::new(
            MockEngine::new(0x1000),
            Box::new(LinuxX86_64),
            0x1000,
            0x2000,
            0x1500,
            0x3000,
            DataSegment { start: 0x4000, end: 0x4000 },
            "",
        );
        assert_eq!(emu.base(), 0x1000);
        assert_eq!(emu.entry(), 0x2000);
        assert_eq!(emu.bin_entry(), 0x1500);
        assert_eq!(emu.interp_base(), 0x3000);
    }

    #[test]
    fn push_and_read_back_a_word() {
        let mut emu = Emulator::new(
            MockEngine::new(0x1000),
            Box::new(LinuxX86_64),
            0,
            0,
            0,
            0,
            DataSegment { start: 0, end: 0 },
            "",
        );
        emu.reg_write(emu.sp_register(), 0x8000).unwrap();
        emu.push(0xdead_beef).unwrap();
        assert_eq!(emu.reg_read(emu.sp_register()).unwrap(), 0x8000 - 8);
        let mut buf = [0u8; 8];
        emu.mem_read(0x8000 - 8, &mut buf).unwrap();
        assert_eq!(u64::from_le_bytes(buf), 0xdead_beef);
    }
}

//! [`CpuEngine`] implementation backed by `unicorn-engine` (Unicorn CPU
//! emulator bindings). `emulator-core` never names this crate; this is
//! the one concrete engine `emulator-cli` wires into the `Emulator`
//! façade.

use emulator_abi::Register;
use emulator_core::{
    AccessKind,
    ByteOrder,
    CpuEngine,
    EmulatorError,
    MemoryAccess,
};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use unicorn_engine::unicorn_const::{
    Arch,
    HookType,
    Mode,
    Permission,
};
use unicorn_engine::{
    RegisterX86,
    Unicorn,
};

fn map_register(reg: Register) -> RegisterX86 {
    match reg {
        Register::Rax => RegisterX86::RAX,
        Register::Rbx => RegisterX86::RBX,
        Register::Rcx => RegisterX86::RCX,
        Register::Rdx => RegisterX86::RDX,
        Register::Rsi => RegisterX86::RSI,
        Register::Rdi => RegisterX86::RDI,
        Register::Rbp => RegisterX86::RBP,
        Register::Rsp => RegisterX86::RSP,
        Register::Rip => RegisterX86::RIP,
        Register::R8 => RegisterX86::R8,
        Register::R9 => RegisterX86::R9,
        Register::R10 => RegisterX86::R10,
        Register::R11 => RegisterX86::R11,
        Register::R12 => RegisterX86::R12,
        Register::R13 => RegisterX86::R13,
        Register::R14 => RegisterX86::R14,
        Register::R15 => RegisterX86::R15,
        Register::Eflags => RegisterX86::EFLAGS,
        _ => panic!("unsupported register for x86_64: {reg:?}"),
    }
}

fn map_error(err: unicorn_engine::unicorn_const::uc_error) -> EmulatorError {
    EmulatorError::InvalidMemory(format!("{err:?}"))
}

type BlockHook = Box<dyn FnMut(&mut dyn CpuEngine, u64, u32)>;
type CodeHook = Box<dyn FnMut(&mut dyn CpuEngine, u64, u32)>;
type MemHook = Box<dyn FnMut(&mut dyn CpuEngine, MemoryAccess)>;
type MemInvalidHook = Box<dyn FnMut(&mut dyn CpuEngine, MemoryAccess) -> bool>;
type InterruptHook = Box<dyn FnMut(&mut dyn CpuEngine, u32)>;

/// User-supplied callbacks, boxed up by [`UnicornEngine::hook_add_block`]
/// et al. and fired by the *one* native Unicorn hook of each kind that
/// `UnicornEngine::new` registers up front. Held behind `Rc<RefCell<_>>`
/// (not inside `UnicornEngine` itself) so the native closures, which must
/// be `'static`, don't need a self-referential pointer back into the
/// engine they're registered on.
#[derive(Default)]
struct HookSlots {
    block: Option<BlockHook>,
    code: Option<CodeHook>,
    mem: Option<MemHook>,
    mem_invalid: Option<MemInvalidHook>,
    interrupt: Option<InterruptHook>,
}

/// Borrows a live `&mut Unicorn` and implements [`CpuEngine`] over it.
/// Constructed fresh inside every native hook callback, the same way
/// `emulator-core`'s `EmulatorHandle` wraps a borrowed engine reference
/// (see `emulator-core::emulator::EmulatorHandle`).
struct UnicornHandle<'a, 'b> {
    uc: &'a mut Unicorn<'b, ()>,
}

impl<'a, 'b> fmt::Debug for UnicornHandle<'a, 'b> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnicornHandle").finish_non_exhaustive()
    }
}

impl<'a, 'b> CpuEngine for UnicornHandle<'a, 'b> {
    fn page_size(&self) -> u64 {
        0x1000
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::Little
    }

    fn mem_map(&mut self, addr: u64, size: u64) -> Result<(), EmulatorError> {
        self.uc.mem_map(addr, size as usize, Permission::ALL).map_err(map_error)
    }

    fn mmap(&mut self, hint: u64, size: u64) -> Result<u64, EmulatorError> {
        self.uc.mem_map(hint, size as usize, Permission::ALL).map_err(map_error)?;
        Ok(hint)
    }

    fn mem_write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), EmulatorError> {
        self.uc.mem_write(addr, bytes).map_err(map_error)
    }

    fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<(), EmulatorError> {
        self.uc.mem_read(addr, buf).map_err(map_error)
    }

    fn reg_read(&self, reg: Register) -> Result<u64, EmulatorError> {
        self.uc.reg_read(map_register(reg)).map_err(map_error)
    }

    fn reg_write(&mut self, reg: Register, value: u64) -> Result<(), EmulatorError> {
        self.uc.reg_write(map_register(reg), value).map_err(map_error)
    }

    fn hook_add_block(&mut self, _callback: Box<dyn FnMut(&mut dyn CpuEngine, u64, u32)>) {
        unimplemented!("hooks are installed once on the owning UnicornEngine before start")
    }

    fn hook_add_code(&mut self, _callback: Box<dyn FnMut(&mut dyn CpuEngine, u64, u32)>) {
        unimplemented!("hooks are installed once on the owning UnicornEngine before start")
    }

    fn hook_add_mem(&mut self, _callback: Box<dyn FnMut(&mut dyn CpuEngine, MemoryAccess)>) {
        unimplemented!("hooks are installed once on the owning UnicornEngine before start")
    }

    fn hook_add_mem_invalid(&mut self, _callback: Box<dyn FnMut(&mut dyn CpuEngine, MemoryAccess) -> bool>) {
        unimplemented!("hooks are installed once on the owning UnicornEngine before start")
    }

    fn hook_add_interrupt(&mut self, _callback: Box<dyn FnMut(&mut dyn CpuEngine, u32)>) {
        unimplemented!("hooks are installed once on the owning UnicornEngine before start")
    }

    fn disas(&self, addr: u64, size: u64) -> String {
        let mut buf = vec![0u8; size as usize];
        match self.uc.mem_read(addr, &mut buf) {
            Ok(()) => format!("{addr:#x}: {}", buf.iter().map(|b| format!("{b:02x}")).collect::<String>()),
            Err(err) => format!("{addr:#x}: <unreadable: {err:?}>"),
        }
    }

    fn start(&mut self, pc: u64, end_addr: u64) -> Result<(), EmulatorError> {
        self.uc.emu_start(pc, end_addr, 0, 0).map_err(map_error)
    }

    fn stop(&mut self) {
        let _ = self.uc.emu_stop();
    }
}

/// The `CpuEngine` this workspace boxes into `Emulator`. Owns the Unicorn
/// instance and the (independently heap-allocated) hook callback slots.
pub struct UnicornEngine {
    uc: Unicorn<'static, ()>,
    hooks: Rc<RefCell<HookSlots>>,
    next_mmap: u64,
}

impl fmt::Debug for UnicornEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnicornEngine").finish_non_exhaustive()
    }
}

impl UnicornEngine {
    pub fn new() -> Result<Self, EmulatorError> {
        let mut uc = Unicorn::new(Arch::X86, Mode::MODE_64).map_err(map_error)?;
        let hooks = Rc::new(RefCell::new(HookSlots::default()));

        let block_hooks = hooks.clone();
        uc.add_block_hook(1, 0, move |uc, addr, size| {
            if let Some(mut cb) = block_hooks.borrow_mut().block.take() {
                let mut handle = UnicornHandle { uc };
                cb(&mut handle, addr, size);
                block_hooks.borrow_mut().block = Some(cb);
            }
        })
        .map_err(map_error)?;

        let code_hooks = hooks.clone();
        uc.add_code_hook(1, 0, move |uc, addr, size| {
            if let Some(mut cb) = code_hooks.borrow_mut().code.take() {
                let mut handle = UnicornHandle { uc };
                cb(&mut handle, addr, size);
                code_hooks.borrow_mut().code = Some(cb);
            }
        })
        .map_err(map_error)?;

        let mem_hooks = hooks.clone();
        uc.add_mem_hook(HookType::MEM_READ | HookType::MEM_WRITE, 1, 0, move |uc, mem_type, addr, size, value| {
            if let Some(mut cb) = mem_hooks.borrow_mut().mem.take() {
                let mut handle = UnicornHandle { uc };
                let kind = if mem_type == unicorn_engine::unicorn_const::MemType::WRITE {
                    AccessKind::Write
                } else {
                    AccessKind::Read
                };
                cb(
                    &mut handle,
                    MemoryAccess {
                        addr,
                        size: size as u32,
                        value: value as u64,
                        kind,
                    },
                );
                mem_hooks.borrow_mut().mem = Some(cb);
            }
            true
        })
        .map_err(map_error)?;

        let invalid_hooks = hooks.clone();
        uc.add_mem_hook(
            HookType::MEM_READ_INVALID | HookType::MEM_WRITE_INVALID | HookType::MEM_FETCH_INVALID,
            1,
            0,
            move |uc, mem_type, addr, size, value| {
                let kind = match mem_type {
                    unicorn_engine::unicorn_const::MemType::WRITE_UNMAPPED
                    | unicorn_engine::unicorn_const::MemType::WRITE_PROT => AccessKind::Write,
                    unicorn_engine::unicorn_const::MemType::FETCH_UNMAPPED
                    | unicorn_engine::unicorn_const::MemType::FETCH_PROT => AccessKind::Fetch,
                    _ => AccessKind::Read,
                };
                if let Some(mut cb) = invalid_hooks.borrow_mut().mem_invalid.take() {
                    let mut handle = UnicornHandle { uc };
                    let resume = cb(
                        &mut handle,
                        MemoryAccess {
                            addr,
                            size: size as u32,
                            value: value as u64,
                            kind,
                        },
                    );
                    invalid_hooks.borrow_mut().mem_invalid = Some(cb);
                    resume
                } else {
                    false
                }
            },
        )
        .map_err(map_error)?;

        let intr_hooks = hooks.clone();
        uc.add_intr_hook(move |uc, intno| {
            if let Some(mut cb) = intr_hooks.borrow_mut().interrupt.take() {
                let mut handle = UnicornHandle { uc };
                cb(&mut handle, intno);
                intr_hooks.borrow_mut().interrupt = Some(cb);
            }
        })
        .map_err(map_error)?;

        Ok(Self {
            uc,
            hooks,
            next_mmap: 0x7000_0000,
        })
    }
}

impl CpuEngine for UnicornEngine {
    fn page_size(&self) -> u64 {
        0x1000
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::Little
    }

    fn mem_map(&mut self, addr: u64, size: u64) -> Result<(), EmulatorError> {
        self.uc.mem_map(addr, size as usize, Permission::ALL).map_err(map_error)
    }

    fn mmap(&mut self, hint: u64, size: u64) -> Result<u64, EmulatorError> {
        let addr = if hint != 0 { hint } else { self.next_mmap };
        self.uc.mem_map(addr, size as usize, Permission::ALL).map_err(map_error)?;
        self.next_mmap = addr + size + self.page_size();
        Ok(addr)
    }

    fn mem_write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), EmulatorError> {
        self.uc.mem_write(addr, bytes).map_err(map_error)
    }

    fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<(), EmulatorError> {
        self.uc.mem_read(addr, buf).map_err(map_error)
    }

    fn reg_read(&self, reg: Register) -> Result<u64, EmulatorError> {
        self.uc.reg_read(map_register(reg)).map_err(map_error)
    }

    fn reg_write(&mut self, reg: Register, value: u64) -> Result<(), EmulatorError> {
        self.uc.reg_write(map_register(reg), value).map_err(map_error)
    }

    fn hook_add_block(&mut self, callback: Box<dyn FnMut(&mut dyn CpuEngine, u64, u32)>) {
        self.hooks.borrow_mut().block = Some(callback);
    }

    fn hook_add_code(&mut self, callback: Box<dyn FnMut(&mut dyn CpuEngine, u64, u32)>) {
        self.hooks.borrow_mut().code = Some(callback);
    }

    fn hook_add_mem(&mut self, callback: Box<dyn FnMut(&mut dyn CpuEngine, MemoryAccess)>) {
        self.hooks.borrow_mut().mem = Some(callback);
    }

    fn hook_add_mem_invalid(&mut self, callback: Box<dyn FnMut(&mut dyn CpuEngine, MemoryAccess) -> bool>) {
        self.hooks.borrow_mut().mem_invalid = Some(callback);
    }

    fn hook_add_interrupt(&mut self, callback: Box<dyn FnMut(&mut dyn CpuEngine, u32)>) {
        self.hooks.borrow_mut().interrupt = Some(callback);
    }

    fn disas(&self, addr: u64, size: u64) -> String {
        let mut buf = vec![0u8; size as usize];
        match self.uc.mem_read(addr, &mut buf) {
            Ok(()) => format!("{addr:#x}: {}", buf.iter().map(|b| format!("{b:02x}")).collect::<String>()),
            Err(err) => format!("{addr:#x}: <unreadable: {err:?}>"),
        }
    }

    fn start(&mut self, pc: u64, end_addr: u64) -> Result<(), EmulatorError> {
        self.uc.emu_start(pc, end_addr, 0, 0).map_err(map_error)
    }

    fn stop(&mut self) {
        let _ = self.uc.emu_stop();
    }
}

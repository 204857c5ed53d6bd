use crate::register::Register;
use crate::syscall::SyscallOutcome;
use std::fmt::Debug;

/// The emulator surface exposed to OS init code and to the syscall
/// implementation layer (spec §6, "Emulator interface exposed to OS init /
/// syscall layer"). `emulator-core::Emulator` is the only implementor; this
/// trait exists so that `emulator-abi` (the OS table) and the syscall layer
/// can be compiled without depending on `emulator-core` itself.
pub trait EmulatorOps: Debug {
    /// Pushes a single machine word, decrementing SP by the word size.
    fn push(&mut self, word: u64) -> Result<(), OpsError>;

    /// Pushes raw bytes, decrementing SP by `bytes.len()` (no alignment).
    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), OpsError>;

    fn reg_read(&self, reg: Register) -> Result<u64, OpsError>;
    fn reg_write(&mut self, reg: Register, value: u64) -> Result<(), OpsError>;

    fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<(), OpsError>;
    fn mem_write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), OpsError>;
    fn mem_map(&mut self, addr: u64, size: u64) -> Result<(), OpsError>;
    fn mmap(&mut self, hint: u64, size: u64) -> Result<u64, OpsError>;

    /// Linux-style program break. `addr == 0` queries the current break.
    fn brk(&mut self, addr: u64) -> Result<u64, OpsError>;

    fn base(&self) -> u64;
    fn bin_entry(&self) -> u64;
    fn entry(&self) -> u64;
    fn interp_base(&self) -> u64;

    /// `name+0xOFFSET`, or an empty string if no symbol covers `addr`.
    fn symbolicate(&self, addr: u64) -> String;

    /// Redirects an absolute guest path under the configured sysroot.
    fn prefix_path(&self, path: &str, force: bool) -> String;

    /// Routes a trapped syscall to the syscall layer (C8) and returns its
    /// outcome. The `(arch, OS)` table calls this from `OsTable::interrupt`
    /// once it has decoded the number and built the argument fetcher; the
    /// only implementor (`emulator_core::Emulator`) owns both the engine
    /// and the registered `SyscallHandler`, so this needs no second
    /// `&mut`-aliasing trait to bridge them.
    fn syscall(&mut self, num: u64, name: &str, get_args: &dyn Fn(u32) -> Vec<u64>) -> SyscallOutcome;
}

/// Error surface for [`EmulatorOps`]; kept separate from
/// `emulator_core::EmulatorError` so this crate has no dependency on the
/// core crate (avoids the cyclic `core -> abi -> core` dependency that a
/// shared error type would force).
#[derive(Debug, Clone, thiserror::Error)]
pub enum OpsError {
    #[error("no such register for this architecture")]
    UnsupportedRegister,
    #[error("guest memory access out of bounds at 0x{addr:x} (size {size})")]
    OutOfBounds { addr: u64, size: u64 },
    #[error("engine rejected the operation: {reason}")]
    Engine { reason: String },
}

use crate::ops::{
    EmulatorOps,
    OpsError,
};
use crate::register::Register;
use std::fmt::Debug;
use thiserror::Error;

/// Errors an [`OsTable`] can raise during `Init`. Construction-time only;
/// a missing table entirely is `ArchUnsupported`, raised by the caller
/// before an `OsTable` is even selected.
#[derive(Debug, Error)]
pub enum ArchTableError {
    #[error("OS init failed: {0}")]
    Init(#[from] OpsError),
}

/// The `(arch, OS)` capability record consumed by the core (spec §6,
/// "Arch/OS table interface"). Modeled as a trait object rather than an
/// enum-per-OS so new targets can be added without touching the core crate,
/// preferring one vtable lookup per trap over a match on a closed set
/// (Design Note "OS table polymorphism").
pub trait OsTable: Debug {
    /// The register that holds the guest stack pointer.
    fn sp_register(&self) -> Register;

    /// Machine word size in bytes (4 or 8).
    fn word_size(&self) -> usize;

    /// Optional per-OS startup hook, called once after the stack is built
    /// and before the engine starts. Most OS tables have nothing to do here;
    /// the default no-ops.
    fn init(
        &self,
        _emu: &mut dyn EmulatorOps,
        _args: &[String],
        _env: &[String],
    ) -> Result<(), ArchTableError> {
        Ok(())
    }

    /// Routes a trapping interrupt/syscall instruction to the syscall
    /// bridge (C8) via [`EmulatorOps::syscall`]. The table's job is only to
    /// know, per its own ABI, where the syscall number/args/return value
    /// live.
    fn interrupt(&self, emu: &mut dyn EmulatorOps, intno: u32);

    /// Syscall number -> name. `None` is a fatal programmer error upstream
    /// (spec: `SyscallMissingName`).
    fn syscall_name(&self, num: u64) -> Option<&'static str>;
}

//! Register identifiers and per-`(arch, OS)` capability tables.
//!
//! This crate defines the vocabulary shared between the emulator core and
//! the syscall implementation layer without either depending on the other:
//! `OsTable` and `SyscallHandler` are the two capability traits the core
//! consumes, and `EmulatorOps` is the single trait both of them are handed
//! to reach into the running emulator.
#![deny(missing_debug_implementations)]

mod linux_x86_64;
mod ops;
mod ostable;
mod register;
mod syscall;

pub use linux_x86_64::LinuxX86_64;
pub use ops::{
    EmulatorOps,
    OpsError,
};
pub use ostable::{
    ArchTableError,
    OsTable,
};
pub use register::Register;
pub use syscall::{
    SyscallHandler,
    SyscallOutcome,
};

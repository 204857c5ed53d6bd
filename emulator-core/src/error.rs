use thiserror::Error;

/// Errors the core can raise while loading an image or driving a run.
///
/// One `thiserror` enum per concern, as `libroottask` does with
/// `RootMemMapperError`/`ProcessError`, generalized here since this crate
/// is a hosted library rather than a `no_std` roottask runtime.
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("loader reported an unsupported binary type (expected EXEC or DYN)")]
    UnsupportedLoadType,

    #[error("loader failed: {0}")]
    LoaderError(String),

    #[error("engine rejected mapping 0x{addr:x} (size 0x{size:x}): {reason}")]
    MapError {
        addr: u64,
        size: u64,
        reason: String,
    },

    #[error("engine rejected write of {len} bytes at 0x{addr:x}: {reason}")]
    WriteError {
        addr: u64,
        len: usize,
        reason: String,
    },

    #[error("no (arch, OS) table available for this target")]
    ArchUnsupported,

    #[error("syscall {num} trapped with no name in the arch/OS table")]
    SyscallMissingName { num: u64 },

    #[error("invalid memory access during run: {0}")]
    InvalidMemory(String),

    #[error("deadlock detected at 0x{addr:x} ({symbol})")]
    Deadlock { addr: u64, symbol: String },
}

impl From<emulator_abi::OpsError> for EmulatorError {
    fn from(err: emulator_abi::OpsError) -> Self {
        Self::WriteError {
            addr: 0,
            len: 0,
            reason: err.to_string(),
        }
    }
}

impl From<emulator_abi::ArchTableError> for EmulatorError {
    fn from(err: emulator_abi::ArchTableError) -> Self {
        Self::LoaderError(err.to_string())
    }
}

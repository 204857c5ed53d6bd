use core::fmt;

/// A CPU register identifier, architecture-tagged so a single enum can serve
/// every `(arch, OS)` table without per-arch generics leaking into the core.
///
/// Keeps register access behind a small, closed vocabulary (mirroring
/// `libhrstd`'s `Mtd`/`UtcbDataException` field names) rather than raw
/// integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    Rip,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Eflags,
}

impl Register {
    /// Stable lowercase name, used in trace output and symbolication dumps.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rax => "rax",
            Self::Rbx => "rbx",
            Self::Rcx => "rcx",
            Self::Rdx => "rdx",
            Self::Rsi => "rsi",
            Self::Rdi => "rdi",
            Self::Rbp => "rbp",
            Self::Rsp => "rsp",
            Self::Rip => "rip",
            Self::R8 => "r8",
            Self::R9 => "r9",
            Self::R10 => "r10",
            Self::R11 => "r11",
            Self::R12 => "r12",
            Self::R13 => "r13",
            Self::R14 => "r14",
            Self::R15 => "r15",
            Self::Eflags => "eflags",
        }
    }

    /// The System V AMD64 syscall argument registers, in ABI order (arg0..arg5).
    pub const SYSV_SYSCALL_ARGS: [Self; 6] =
        [Self::Rdi, Self::Rsi, Self::Rdx, Self::R10, Self::R8, Self::R9];

    /// Every register this table knows, in the order a register dump
    /// should print them. Used by the hook controller's status-diff and
    /// fatal-error dumps, which have no fixed subset of interest.
    pub const ALL: [Self; 18] = [
        Self::Rax,
        Self::Rbx,
        Self::Rcx,
        Self::Rdx,
        Self::Rsi,
        Self::Rdi,
        Self::Rbp,
        Self::Rsp,
        Self::Rip,
        Self::R8,
        Self::R9,
        Self::R10,
        Self::R11,
        Self::R12,
        Self::R13,
        Self::R14,
        Self::R15,
        Self::Eflags,
    ];
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//! Linux/x86-64 `(arch, OS)` table.
//!
//! The syscall number set below mirrors the one `libhrstd`'s
//! `foreign_syscall::linux::syscall_num::LinuxSyscallNum` enum names, plus
//! `exit`/`exit_group`, which that enum stubs with `todo!` but a
//! user-space emulator cannot leave unimplemented.

use crate::ops::EmulatorOps;
use crate::ostable::OsTable;
use crate::register::Register;
use crate::syscall::SyscallOutcome;

/// `(number, name)` table, linear-scanned like `libhrstd`'s
/// `TryFrom<u64> for LinuxSyscallNum`, which iterates its enum variants
/// rather than using a generated jump table — fine at this table size.
const SYSCALLS: &[(u64, &str)] = &[
    (0, "read"),
    (1, "write"),
    (2, "open"),
    (3, "close"),
    (5, "fstat"),
    (7, "poll"),
    (8, "lseek"),
    (9, "mmap"),
    (10, "mprotect"),
    (11, "munmap"),
    (12, "brk"),
    (13, "rt_sigaction"),
    (14, "rt_sigprocmask"),
    (16, "ioctl"),
    (20, "writev"),
    (28, "madvise"),
    (39, "getpid"),
    (56, "clone"),
    (60, "exit"),
    (63, "uname"),
    (72, "fcntl"),
    (87, "unlink"),
    (99, "sysinfo"),
    (131, "sigaltstack"),
    (158, "arch_prctl"),
    (186, "gettid"),
    (202, "futex"),
    (204, "sched_getaffinity"),
    (218, "set_tid_address"),
    (228, "clock_gettime"),
    (231, "exit_group"),
    (267, "readlinkat"),
    (302, "prlimit64"),
];

/// The Linux x86-64 `(arch, OS)` table: System V AMD64 syscall ABI,
/// `syscall`/`int 0x80` trap routing, and the name table above.
#[derive(Debug, Default)]
pub struct LinuxX86_64;

impl OsTable for LinuxX86_64 {
    fn sp_register(&self) -> Register {
        Register::Rsp
    }

    fn word_size(&self) -> usize {
        8
    }

    fn interrupt(&self, emu: &mut dyn EmulatorOps, intno: u32) {
        // Both `syscall` and `int 0x80` land here; Linux/x86-64 only uses
        // `syscall` for 64-bit guests, but legacy `int 0x80` is routed
        // identically since the register convention this table reads
        // (RAX=num, RDI/RSI/RDX/R10/R8/R9=args, RAX=return) is the same
        // either way.
        log::trace!("interrupt {intno} trapped, dispatching syscall");
        let num = match emu.reg_read(Register::Rax) {
            Ok(v) => v,
            Err(e) => {
                log::error!("failed to read RAX for syscall dispatch: {e}");
                return;
            }
        };
        let name = match self.syscall_name(num) {
            Some(name) => name,
            None => panic!("syscall {num} has no name in the Linux/x86-64 table"),
        };

        // Read every SysV arg register up front into an owned vector so
        // `get_args` below no longer borrows `emu`: `syscall` needs `emu`
        // mutably, and a closure capturing `emu` by reference would still
        // be held live across that call.
        let all_args: Vec<u64> = Register::SYSV_SYSCALL_ARGS
            .iter()
            .map(|r| emu.reg_read(*r).unwrap_or(0))
            .collect();
        let get_args = move |n: u32| -> Vec<u64> { all_args[..n as usize].to_vec() };

        match emu.syscall(num, name, &get_args) {
            SyscallOutcome::Value(v) => {
                if let Err(e) = emu.reg_write(Register::Rax, v) {
                    log::error!("failed to write syscall return value: {e}");
                }
            }
            SyscallOutcome::Exit(code) => {
                log::info!("guest requested exit({code}) via syscall {num} ({name})");
            }
        }
    }

    fn syscall_name(&self, num: u64) -> Option<&'static str> {
        SYSCALLS
            .iter()
            .find(|(n, _)| *n == num)
            .map(|(_, name)| *name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_syscalls_resolve() {
        let table = LinuxX86_64;
        assert_eq!(table.syscall_name(0), Some("read"));
        assert_eq!(table.syscall_name(1), Some("write"));
        assert_eq!(table.syscall_name(12), Some("brk"));
        assert_eq!(table.syscall_name(231), Some("exit_group"));
    }

    #[test]
    fn unknown_syscall_resolves_to_none() {
        let table = LinuxX86_64;
        assert_eq!(table.syscall_name(9999), None);
    }

    #[test]
    fn word_size_and_sp_register_match_sysv_amd64() {
        let table = LinuxX86_64;
        assert_eq!(table.word_size(), 8);
        assert_eq!(table.sp_register(), Register::Rsp);
    }
}
